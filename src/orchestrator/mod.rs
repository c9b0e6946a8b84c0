//! 编排层（Orchestration Layer）
//!
//! ## 模块划分
//!
//! ### `manager` - 任务管理器
//! - 持有全部任务记录和闸门
//! - 为每个任务启动一个后台 task
//! - 把仪表盘 / 中继投递的值转交到正确的闸门
//!
//! ### `job_runner` - 单个任务执行器
//! - 读取表格、启动浏览器
//! - 遍历 UDIN 列表，委托 `workflow::IdentifierFlow` 处理单个 UDIN
//! - 维护任务状态机，关闭浏览器
//!
//! ## 层次关系
//!
//! ```text
//! manager (处理多个任务)
//!     ↓
//! job_runner (处理 Vec<UDIN>)
//!     ↓
//! workflow::IdentifierFlow (处理单个 UDIN)
//!     ↓
//! browser::AutomationDriver (基础设施：浏览器)
//! ```

pub mod job_runner;
pub mod manager;

pub use job_runner::{JobRunner, JobStats};
pub use manager::JobManager;
