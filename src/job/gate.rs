//! 人工输入闸门
//!
//! 后台任务在这里等待验证码 / OTP：外部调用 `supply` 放入值，
//! 唯一的等待者被唤醒。每个等待窗口都会创建新的闸门，
//! 上一个窗口残留的值不会泄漏到下一个窗口。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;

/// 闸门等待失败
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GateError {
    #[error("no value supplied within {0:?}")]
    TimedOut(Duration),
}

/// 单槽位、单等待者的闸门
///
/// 多次 `supply` 只保留最后一次的值。
#[derive(Debug)]
pub struct ChallengeGate {
    slot: watch::Sender<Option<String>>,
}

impl ChallengeGate {
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    /// 放入值并唤醒等待者；没有等待者时值被保存
    pub fn supply(&self, value: impl Into<String>) {
        self.slot.send_replace(Some(value.into()));
    }

    pub fn is_signaled(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// 已放入的值（不消费）
    pub fn peek(&self) -> Option<String> {
        self.slot.borrow().clone()
    }

    /// 一直等待直到有值
    pub async fn recv(&self) -> String {
        let mut rx = self.slot.subscribe();
        let value = rx
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|value| value.clone());
        match value {
            Some(value) => value,
            // 发送端由 self 持有，不会提前关闭
            None => std::future::pending().await,
        }
    }

    /// 等待值，超过 `timeout` 返回 [`GateError::TimedOut`]
    pub async fn wait(&self, timeout: Duration) -> Result<String, GateError> {
        tokio::time::timeout(timeout, self.recv())
            .await
            .map_err(|_| GateError::TimedOut(timeout))
    }
}

impl Default for ChallengeGate {
    fn default() -> Self {
        Self::new()
    }
}

/// 闸门种类：每个任务各一个槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateKind {
    Captcha,
    MobileOtp,
    EmailOtp,
}

impl GateKind {
    /// 解析中继渠道提示（`mobile` / `email`）
    pub fn from_channel(channel: &str) -> Option<Self> {
        match channel.trim().to_ascii_lowercase().as_str() {
            "mobile" | "sms" => Some(GateKind::MobileOtp),
            "email" | "mail" => Some(GateKind::EmailOtp),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GateKind::Captcha => "captcha",
            GateKind::MobileOtp => "mobile",
            GateKind::EmailOtp => "email",
        }
    }
}

/// 投递结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// 值已放入当前窗口的闸门
    Delivered,
    /// 当前没有打开的窗口，值被丢弃
    NoOpenWindow,
}

type Slot = Mutex<Option<Arc<ChallengeGate>>>;

/// 一个任务的三个闸门槽位
#[derive(Debug, Default)]
pub struct JobGates {
    captcha: Slot,
    mobile_otp: Slot,
    email_otp: Slot,
}

impl JobGates {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn slot(&self, kind: GateKind) -> MutexGuard<'_, Option<Arc<ChallengeGate>>> {
        let slot = match kind {
            GateKind::Captcha => &self.captcha,
            GateKind::MobileOtp => &self.mobile_otp,
            GateKind::EmailOtp => &self.email_otp,
        };
        slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 打开新的等待窗口，窗口对象释放时自动关闭
    pub fn open(self: &Arc<Self>, kind: GateKind) -> GateWindow {
        let gate = Arc::new(ChallengeGate::new());
        *self.slot(kind) = Some(gate.clone());
        GateWindow {
            gates: self.clone(),
            kind,
            gate,
        }
    }

    /// 向当前窗口投递值
    pub fn supply(&self, kind: GateKind, value: impl Into<String>) -> Delivery {
        match self.slot(kind).as_ref() {
            Some(gate) => {
                gate.supply(value);
                Delivery::Delivered
            }
            None => Delivery::NoOpenWindow,
        }
    }

    pub fn is_open(&self, kind: GateKind) -> bool {
        self.slot(kind).is_some()
    }

    fn close(&self, kind: GateKind, gate: &Arc<ChallengeGate>) {
        let mut slot = self.slot(kind);
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, gate)) {
            *slot = None;
        }
    }
}

/// 一个打开的等待窗口
pub struct GateWindow {
    gates: Arc<JobGates>,
    kind: GateKind,
    gate: Arc<ChallengeGate>,
}

impl GateWindow {
    pub fn kind(&self) -> GateKind {
        self.kind
    }
}

impl std::ops::Deref for GateWindow {
    type Target = ChallengeGate;

    fn deref(&self) -> &Self::Target {
        &self.gate
    }
}

impl Drop for GateWindow {
    fn drop(&mut self) {
        self.gates.close(self.kind, &self.gate);
    }
}
