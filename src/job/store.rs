//! 任务记录仓库
//!
//! 所有任务记录放在同一把互斥锁保护的 map 中。
//! 读 / 合并都是很短的临界区，锁内不做任何 I/O。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::JobError;
use crate::job::record::{JobRecord, JobUpdate};

/// 任务记录仓库
#[derive(Debug, Default)]
pub struct JobStore {
    records: Mutex<HashMap<String, JobRecord>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, JobRecord>> {
        // 临界区内不会 panic 到一半，毒化后的数据仍然一致
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 创建新的任务记录（状态为 uploaded）
    pub fn create(&self, job_id: &str, file: &str) -> JobRecord {
        let record = JobRecord::new(job_id, file);
        self.lock().insert(job_id.to_string(), record.clone());
        record
    }

    /// 原子地合并部分字段；任务不存在时静默忽略
    pub fn merge_update(&self, job_id: &str, update: JobUpdate) {
        if let Some(record) = self.lock().get_mut(job_id) {
            record.apply(update);
        }
    }

    /// 读取某一时刻的快照
    pub fn read(&self, job_id: &str) -> Result<JobRecord, JobError> {
        self.lock()
            .get(job_id)
            .cloned()
            .ok_or_else(|| JobError::NotFound {
                job_id: job_id.to_string(),
            })
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.lock().contains_key(job_id)
    }

    /// 任意一个正在等待 OTP 的任务（遍历顺序不固定）
    pub fn first_awaiting_otp(&self) -> Option<String> {
        self.lock()
            .values()
            .find(|record| record.awaiting_otp)
            .map(|record| record.id.clone())
    }

    pub fn ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn remove(&self, job_id: &str) -> Option<JobRecord> {
        self.lock().remove(job_id)
    }

    /// 已结束（done / error）的任务 ID，按最后更新时间从旧到新
    pub fn finished_oldest_first(&self) -> Vec<String> {
        let records = self.lock();
        let mut finished: Vec<_> = records
            .values()
            .filter(|record| record.status.is_terminal())
            .map(|record| (record.updated_at, record.id.clone()))
            .collect();
        finished.sort();
        finished.into_iter().map(|(_, id)| id).collect()
    }
}
