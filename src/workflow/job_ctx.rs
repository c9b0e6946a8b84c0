//! 任务上下文
//!
//! 封装"我正在为哪个任务工作"：任务 ID、记录仓库、闸门槽位。
//! 流程对任务记录的所有写入都经过这里。

use std::fmt::Display;
use std::sync::Arc;

use crate::job::{GateKind, GateWindow, JobGates, JobStore, JobUpdate};
use crate::utils::logging::short_id;

/// 任务上下文
#[derive(Debug, Clone)]
pub struct JobCtx {
    pub job_id: String,
    store: Arc<JobStore>,
    gates: Arc<JobGates>,
}

impl JobCtx {
    pub fn new(job_id: impl Into<String>, store: Arc<JobStore>, gates: Arc<JobGates>) -> Self {
        Self {
            job_id: job_id.into(),
            store,
            gates,
        }
    }

    /// 合并更新到任务记录
    pub fn update(&self, update: JobUpdate) {
        self.store.merge_update(&self.job_id, update);
    }

    /// 追加一条面向操作员的消息
    pub fn message(&self, message: impl Into<String>) {
        self.update(JobUpdate::message(message));
    }

    /// 打开新的等待窗口
    pub fn open_gate(&self, kind: GateKind) -> GateWindow {
        self.gates.open(kind)
    }
}

impl Display for JobCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[任务 {}]", short_id(&self.job_id))
    }
}
