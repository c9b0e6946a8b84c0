//! 集成测试共用的假驱动、假来源和"操作员"

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;

use udin_batch::error::{AppError, AppResult, SchemaError};
use udin_batch::{
    AutomationDriver, Config, DriverLauncher, GateKind, IdentifierSource, JobManager, JobRecord,
};

/// 假驱动的行为脚本
#[derive(Debug, Clone, Default)]
pub struct Script {
    /// 这些 UDIN 的页面上有验证码
    pub captcha_for: HashSet<String>,
    /// 这些 UDIN 会下载到 PDF
    pub pdf_for: HashSet<String>,
    /// 填写 UDIN 输入框时失败
    pub udin_field_missing: bool,
    /// 验证码图片在第几次查找之后才出现（0 表示立即出现）
    pub captcha_after_lookups: usize,
    /// 填写这个 UDIN 时驱动 panic
    pub panic_on: Option<String>,
}

impl Script {
    pub fn captcha_and_pdf(udins: &[&str]) -> Self {
        let set: HashSet<String> = udins.iter().map(|u| u.to_string()).collect();
        Self {
            captcha_for: set.clone(),
            pdf_for: set,
            ..Self::default()
        }
    }
}

/// 记录假驱动被如何调用
#[derive(Debug, Default)]
pub struct Probe {
    pub launches: AtomicUsize,
    pub shutdowns: AtomicUsize,
    pub captcha_lookups: AtomicUsize,
    pub fills: Mutex<Vec<(String, String)>>,
    pub clicks: Mutex<Vec<String>>,
}

impl Probe {
    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    pub fn captcha_lookups(&self) -> usize {
        self.captcha_lookups.load(Ordering::SeqCst)
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    /// 某个选择器被填入的所有值
    pub fn filled(&self, selector: &str) -> Vec<String> {
        self.fills
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| s == selector)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

pub struct MockDriver {
    script: Script,
    probe: Arc<Probe>,
    current_udin: Option<String>,
    lookups: usize,
}

#[async_trait]
impl AutomationDriver for MockDriver {
    async fn open(&mut self, _url: &str) -> AppResult<()> {
        self.current_udin = None;
        self.lookups = 0;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, _timeout: Duration) -> AppResult<bool> {
        Ok(!(selector == "#Udin" && self.script.udin_field_missing))
    }

    async fn fill(&mut self, selector: &str, text: &str) -> AppResult<()> {
        if selector == "#Udin" && self.script.panic_on.as_deref() == Some(text) {
            panic!("driver crashed while filling {}", text);
        }
        if selector == "#Udin" {
            self.current_udin = Some(text.to_string());
        }
        self.probe
            .fills
            .lock()
            .unwrap()
            .push((selector.to_string(), text.to_string()));
        Ok(())
    }

    async fn click(&mut self, selector: &str) -> AppResult<()> {
        self.probe.clicks.lock().unwrap().push(selector.to_string());
        Ok(())
    }

    async fn select(&mut self, _selector: &str, _visible_text: &str) -> AppResult<()> {
        Ok(())
    }

    async fn check(&mut self, _selector: &str) -> AppResult<()> {
        Ok(())
    }

    async fn find_captcha_image(&mut self) -> AppResult<Option<String>> {
        self.probe.captcha_lookups.fetch_add(1, Ordering::SeqCst);
        self.lookups += 1;
        let present = self
            .current_udin
            .as_ref()
            .is_some_and(|udin| self.script.captcha_for.contains(udin))
            && self.lookups > self.script.captcha_after_lookups;
        Ok(present.then(|| "img#captchaImg".to_string()))
    }

    async fn capture_challenge_image(&mut self, _selector: &str) -> AppResult<Vec<u8>> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }

    async fn await_downloaded_file(
        &mut self,
        identifier: &str,
        _timeout: Duration,
    ) -> AppResult<Option<PathBuf>> {
        Ok(self
            .script
            .pdf_for
            .contains(identifier)
            .then(|| PathBuf::from(format!("downloads/{}.pdf", identifier))))
    }

    async fn shutdown(&mut self) -> AppResult<()> {
        self.probe.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 假启动器：可以模拟启动失败
pub struct MockLauncher {
    pub script: Script,
    pub probe: Arc<Probe>,
    pub fail: bool,
}

impl MockLauncher {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            probe: Arc::new(Probe::default()),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Script::default())
        }
    }
}

#[async_trait]
impl DriverLauncher for MockLauncher {
    async fn launch(&self, _job_id: &str) -> AppResult<Box<dyn AutomationDriver>> {
        if self.fail {
            return Err(AppError::driver_launch_failed(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "chrome not installed",
            )));
        }
        self.probe.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDriver {
            script: self.script.clone(),
            probe: self.probe.clone(),
            current_udin: None,
            lookups: 0,
        }))
    }
}

/// 固定列表的 UDIN 来源
pub struct StaticSource(pub Result<Vec<String>, String>);

impl StaticSource {
    pub fn udins(udins: &[&str]) -> Self {
        Self(Ok(udins.iter().map(|u| u.to_string()).collect()))
    }

    pub fn missing_column(column: &str) -> Self {
        Self(Err(column.to_string()))
    }
}

impl IdentifierSource for StaticSource {
    fn extract(&self, _path: &Path) -> Result<Vec<String>, SchemaError> {
        self.0.clone().map_err(|column| SchemaError::MissingColumn { column })
    }
}

/// 测试用配置：不等待固定间隔
pub fn test_config() -> Config {
    Config {
        item_delay_ms: 0,
        otp_settle_ms: 0,
        element_wait_secs: 1,
        ..Config::default()
    }
}

pub fn manager_with(source: StaticSource, launcher: MockLauncher) -> (Arc<JobManager>, Arc<Probe>) {
    let probe = launcher.probe.clone();
    let manager = JobManager::new(test_config(), Arc::new(source), Arc::new(launcher));
    (Arc::new(manager), probe)
}

/// 轮询直到任务进入终态
pub async fn wait_terminal(manager: &JobManager, job_id: &str) -> JobRecord {
    loop {
        let record = manager.snapshot(job_id).expect("任务应该存在");
        if record.status.is_terminal() {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
}

/// 操作员：看到等待标志就提交输入
///
/// `answer_captcha` 决定是否为当前 UDIN 回答验证码。
pub fn spawn_operator(
    manager: Arc<JobManager>,
    job_id: String,
    answer_captcha: impl Fn(&str) -> bool + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let Ok(record) = manager.snapshot(&job_id) else {
                return;
            };
            if record.status.is_terminal() {
                return;
            }
            let current = record.current.clone().unwrap_or_default();
            if record.awaiting_captcha && answer_captcha(&current) {
                let _ = manager.supply(&job_id, GateKind::Captcha, "ab12");
            }
            if record.awaiting_otp {
                let _ = manager.supply(&job_id, GateKind::EmailOtp, "222222");
                let _ = manager.supply(&job_id, GateKind::MobileOtp, "111111");
            }
        }
    })
}

pub fn has_message(record: &JobRecord, message: &str) -> bool {
    record.messages.iter().any(|m| m == message)
}
