//! 任务管理器 - 编排层
//!
//! 进程内唯一的任务注册表：
//! - 任务记录仓库（供轮询读取）
//! - 每个任务的闸门槽位和后台 task 句柄
//!
//! 外部调用只能读取记录或向闸门投递值，不能直接改流程字段。

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::browser::DriverLauncher;
use crate::config::Config;
use crate::error::JobError;
use crate::identifiers::IdentifierSource;
use crate::job::{Delivery, GateKind, JobGates, JobRecord, JobStatus, JobStore, JobUpdate};
use crate::models::FormValues;
use crate::orchestrator::job_runner::{JobRunner, CRASH_MESSAGE};
use crate::utils::logging::short_id;
use crate::workflow::{IdentifierFlow, JobCtx, StageTimeouts};

/// 一个任务的后台执行单元
struct Worker {
    gates: Arc<JobGates>,
    task: JoinHandle<()>,
}

/// 任务管理器
pub struct JobManager {
    config: Config,
    store: Arc<JobStore>,
    workers: Mutex<HashMap<String, Worker>>,
    source: Arc<dyn IdentifierSource>,
    launcher: Arc<dyn DriverLauncher>,
}

impl JobManager {
    pub fn new(
        config: Config,
        source: Arc<dyn IdentifierSource>,
        launcher: Arc<dyn DriverLauncher>,
    ) -> Self {
        Self {
            config,
            store: Arc::new(JobStore::new()),
            workers: Mutex::new(HashMap::new()),
            source,
            launcher,
        }
    }

    /// 生成新的任务 ID
    pub fn new_job_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    fn workers(&self) -> MutexGuard<'_, HashMap<String, Worker>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 创建任务并在后台启动执行器
    pub fn start_job(&self, job_id: &str, file: PathBuf, values: FormValues) -> JobRecord {
        self.evict_finished();
        let record = self.store.create(job_id, &file.display().to_string());
        let gates = JobGates::new();

        let ctx = JobCtx::new(job_id, self.store.clone(), gates.clone());
        let flow = IdentifierFlow::new(
            self.config.target_url.clone(),
            values,
            StageTimeouts::from(&self.config),
        );
        let runner = JobRunner::new(
            ctx,
            file,
            self.source.clone(),
            self.launcher.clone(),
            flow,
            self.config.item_delay(),
        );

        let store = self.store.clone();
        let id = job_id.to_string();
        let task = tokio::spawn(async move {
            // 执行器 panic 时也要让仪表盘看到终态
            if AssertUnwindSafe(runner.run()).catch_unwind().await.is_err() {
                error!("[任务 {}] 💥 执行器异常退出", short_id(&id));
                store.merge_update(
                    &id,
                    JobUpdate::new()
                        .status(JobStatus::Error)
                        .captcha(None, false)
                        .awaiting_otp(false)
                        .with_message(CRASH_MESSAGE),
                );
            }
        });

        let mut workers = self.workers();
        workers.insert(job_id.to_string(), Worker { gates, task });
        let active = workers
            .values()
            .filter(|worker| !worker.task.is_finished())
            .count();
        drop(workers);
        info!("[任务 {}] 📋 已创建，运行中的任务: {}", short_id(job_id), active);
        record
    }

    /// 已结束任务超过上限时，丢弃最旧的记录和闸门
    fn evict_finished(&self) {
        let finished = self.store.finished_oldest_first();
        let excess = finished.len().saturating_sub(self.config.max_finished_jobs);
        if excess == 0 {
            return;
        }

        let mut workers = self.workers();
        for job_id in &finished[..excess] {
            self.store.remove(job_id);
            workers.remove(job_id);
        }
        drop(workers);
        debug!("🧹 清理了 {} 个已结束的任务", excess);
    }

    /// 任务记录快照
    pub fn snapshot(&self, job_id: &str) -> Result<JobRecord, JobError> {
        self.store.read(job_id)
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.workers().contains_key(job_id)
    }

    /// 向任务的闸门投递人工输入
    pub fn supply(
        &self,
        job_id: &str,
        kind: GateKind,
        value: impl Into<String>,
    ) -> Result<Delivery, JobError> {
        let gates = self
            .workers()
            .get(job_id)
            .map(|worker| worker.gates.clone())
            .ok_or_else(|| JobError::NotFound {
                job_id: job_id.to_string(),
            })?;
        Ok(gates.supply(kind, value))
    }
}
