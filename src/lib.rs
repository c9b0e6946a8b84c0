//! # UDIN Batch
//!
//! 批量从 UDIN 门户下载证书 PDF 的服务：上传表格，浏览器逐个提交 UDIN，
//! 验证码和两个 OTP 由操作员（或短信中继）通过仪表盘实时提供。
//!
//! ## 架构设计
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - `JsExecutor`，持有查询页，执行表单脚本并取回结果
//! - `browser/` - `AutomationDriver` 接口及基于 chromiumoxide 的实现
//!
//! ### ② 任务状态层（Job）
//! - `job/record` - 任务记录（仪表盘轮询的 JSON）
//! - `job/store` - 任务记录仓库
//! - `job/gate` - 人工输入闸门（验证码、手机 OTP、邮箱 OTP）
//!
//! ### ③ 流程层（Workflow）
//! - `JobCtx` - 上下文封装（job_id + 记录仓库 + 闸门）
//! - `IdentifierFlow` - 单个 UDIN 的流程（填表 → 验证码 → OTP → 下载）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/job_runner` - 单个任务的状态机
//! - `orchestrator/manager` - 所有任务的注册表
//!
//! ### ⑤ 接入层
//! - `server/` - axum 仪表盘
//! - `relay` - 短信 OTP 中继
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod identifiers;
pub mod infrastructure;
pub mod job;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod relay;
pub mod server;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::{AutomationDriver, ChromiumLauncher, DriverLauncher};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use identifiers::{IdentifierSource, SpreadsheetSource};
pub use job::{ChallengeGate, Delivery, GateKind, JobGates, JobRecord, JobStatus, JobStore};
pub use models::FormValues;
pub use orchestrator::{JobManager, JobRunner, JobStats};
pub use workflow::{IdentifierFlow, JobCtx, ProcessResult, StageTimeouts};
