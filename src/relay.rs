//! OTP 中继
//!
//! 短信转发器把整条短信 POST 过来，这里负责提取验证码
//! 并把它投递到正在等待 OTP 的任务。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::job::{Delivery, GateKind};
use crate::orchestrator::JobManager;
use crate::utils::logging::{short_id, truncate_text};

fn otp_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\b([0-9]{4,8})\b").ok())
        .as_ref()
}

/// 提取文本中第一个独立的 4-8 位数字
pub fn extract_otp(text: &str) -> Option<String> {
    otp_pattern()?
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// 中继请求体
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayMessage {
    pub body: Option<String>,
    pub text: Option<String>,
    pub job_id: Option<String>,
    pub channel: Option<String>,
    pub from: Option<String>,
}

impl RelayMessage {
    /// 短信正文：优先 `body`，其次 `text`
    pub fn content(&self) -> &str {
        self.body
            .as_deref()
            .filter(|body| !body.is_empty())
            .or(self.text.as_deref())
            .unwrap_or_default()
    }

    fn target_kind(&self) -> GateKind {
        self.channel
            .as_deref()
            .and_then(GateKind::from_channel)
            .unwrap_or(GateKind::MobileOtp)
    }
}

/// 中继处理结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RelayOutcome {
    NoOtp,
    NoWaitingJob,
    Ok {
        otp: String,
        job_id: String,
        channel: &'static str,
    },
}

/// 把一条中继消息路由到目标任务
///
/// 显式 `job_id` 指向已知任务时直接使用；否则取任意一个正在等待 OTP 的任务。
/// 目标任务当前没有打开对应窗口时视为没有等待者。
pub fn route(manager: &JobManager, message: &RelayMessage) -> RelayOutcome {
    let content = message.content();
    debug!(
        "📨 收到中继消息 (from={:?}): {}",
        message.from,
        truncate_text(content, 80)
    );

    let Some(otp) = extract_otp(content) else {
        return RelayOutcome::NoOtp;
    };

    let explicit = message
        .job_id
        .as_deref()
        .filter(|id| manager.contains(id))
        .map(str::to_string);
    let Some(job_id) = explicit.or_else(|| manager.store().first_awaiting_otp()) else {
        info!("📭 收到 OTP 但没有等待中的任务");
        return RelayOutcome::NoWaitingJob;
    };

    let kind = message.target_kind();
    match manager.supply(&job_id, kind, otp.clone()) {
        Ok(Delivery::Delivered) => {
            info!("[任务 {}] 📲 中继 OTP 已投递 ({})", short_id(&job_id), kind.label());
            RelayOutcome::Ok {
                otp,
                job_id,
                channel: kind.label(),
            }
        }
        Ok(Delivery::NoOpenWindow) | Err(_) => {
            warn!(
                "[任务 {}] ⚠️ 没有打开的 {} 窗口，中继 OTP 被丢弃",
                short_id(&job_id),
                kind.label()
            );
            RelayOutcome::NoWaitingJob
        }
    }
}
