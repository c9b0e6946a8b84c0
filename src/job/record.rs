//! 任务记录
//!
//! 一个任务的状态快照：进度、当前 UDIN、等待标志、最近的 PDF、消息日志。
//! 仪表盘轮询读取的就是这个结构的 JSON。

use chrono::{DateTime, Utc};
use serde::Serialize;

/// 消息日志保留的最大条数
pub const MAX_MESSAGES: usize = 200;

/// 任务状态
///
/// `Uploaded → Running → {Done | Error}`，后两者为终态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Uploaded,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

/// 任务记录
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub file: String,
    pub status: JobStatus,
    pub current: Option<String>,
    pub progress: usize,
    pub total: usize,
    pub messages: Vec<String>,
    pub captcha_b64: Option<String>,
    pub awaiting_captcha: bool,
    pub awaiting_otp: bool,
    pub last_pdf: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(id: impl Into<String>, file: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            file: file.into(),
            status: JobStatus::Uploaded,
            current: None,
            progress: 0,
            total: 0,
            messages: Vec::new(),
            captcha_b64: None,
            awaiting_captcha: false,
            awaiting_otp: false,
            last_pdf: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 合并部分字段更新
    ///
    /// `message` 追加到日志末尾，日志只保留最近 [`MAX_MESSAGES`] 条；
    /// `progress` 始终被限制在 `total` 以内。
    pub fn apply(&mut self, update: JobUpdate) {
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(current) = update.current {
            self.current = current;
        }
        if let Some(total) = update.total {
            self.total = total;
        }
        if let Some(progress) = update.progress {
            self.progress = progress;
        }
        if let Some(captcha_b64) = update.captcha_b64 {
            self.captcha_b64 = captcha_b64;
        }
        if let Some(awaiting) = update.awaiting_captcha {
            self.awaiting_captcha = awaiting;
        }
        if let Some(awaiting) = update.awaiting_otp {
            self.awaiting_otp = awaiting;
        }
        if let Some(last_pdf) = update.last_pdf {
            self.last_pdf = last_pdf;
        }
        self.progress = self.progress.min(self.total);

        if let Some(message) = update.message {
            self.messages.push(message);
            if self.messages.len() > MAX_MESSAGES {
                let overflow = self.messages.len() - MAX_MESSAGES;
                self.messages.drain(..overflow);
            }
        }
        self.updated_at = Utc::now();
    }
}

/// 部分字段更新
///
/// 外层 `Option` 表示"是否更新该字段"，可空字段内层 `Option` 表示新值本身。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub current: Option<Option<String>>,
    pub progress: Option<usize>,
    pub total: Option<usize>,
    pub captcha_b64: Option<Option<String>>,
    pub awaiting_captcha: Option<bool>,
    pub awaiting_otp: Option<bool>,
    pub last_pdf: Option<Option<String>>,
    pub message: Option<String>,
}

impl JobUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    /// 仅追加一条消息
    pub fn message(message: impl Into<String>) -> Self {
        Self::default().with_message(message)
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn current(mut self, current: Option<String>) -> Self {
        self.current = Some(current);
        self
    }

    pub fn progress(mut self, progress: usize) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn total(mut self, total: usize) -> Self {
        self.total = Some(total);
        self
    }

    pub fn captcha(mut self, captcha_b64: Option<String>, awaiting: bool) -> Self {
        self.captcha_b64 = Some(captcha_b64);
        self.awaiting_captcha = Some(awaiting);
        self
    }

    pub fn awaiting_otp(mut self, awaiting: bool) -> Self {
        self.awaiting_otp = Some(awaiting);
        self
    }

    pub fn last_pdf(mut self, last_pdf: Option<String>) -> Self {
        self.last_pdf = Some(last_pdf);
        self
    }
}
