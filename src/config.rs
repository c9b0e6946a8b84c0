use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AppError, AppResult, ConfigError};

/// 默认配置文件名（存在时自动加载）
pub const DEFAULT_CONFIG_FILE: &str = "udin.toml";

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 上传表格存放目录
    pub upload_dir: PathBuf,
    /// PDF 存放目录
    pub download_dir: PathBuf,
    /// 目标URL
    pub target_url: String,
    /// 表格中的 UDIN 列名
    pub identifier_column: String,
    /// 验证码等待时间（秒）
    pub captcha_timeout_secs: u64,
    /// OTP 等待时间（秒）
    pub otp_timeout_secs: u64,
    /// PDF 下载等待时间（秒）
    pub download_timeout_secs: u64,
    /// 页面元素等待时间（秒）
    pub element_wait_secs: u64,
    /// 两个 UDIN 之间的间隔（毫秒）
    pub item_delay_ms: u64,
    /// 提交 OTP 后等待页面响应的时间（毫秒）
    pub otp_settle_ms: u64,
    /// 是否使用无头浏览器
    pub headless: bool,
    /// 浏览器可执行文件路径，未设置时由 chromiumoxide 自动查找
    pub chrome_executable: Option<PathBuf>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 最多保留的已结束任务数，超出时丢弃最旧的
    pub max_finished_jobs: usize,
    // --- 表单默认值 ---
    pub authority_type: String,
    pub authority_name: String,
    pub mobile: String,
    pub email: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            upload_dir: PathBuf::from("uploads"),
            download_dir: PathBuf::from("downloads"),
            target_url: "https://udin.icai.org/search-udin".to_string(),
            identifier_column: "UDIN".to_string(),
            captcha_timeout_secs: 300,
            otp_timeout_secs: 180,
            download_timeout_secs: 30,
            element_wait_secs: 20,
            item_delay_ms: 1000,
            otp_settle_ms: 2000,
            headless: false,
            chrome_executable: None,
            verbose_logging: false,
            max_finished_jobs: 200,
            authority_type: "Others".to_string(),
            authority_name: String::new(),
            mobile: String::new(),
            email: String::new(),
        }
    }
}

impl Config {
    /// 加载配置：TOML 文件（可选）+ 环境变量覆盖
    ///
    /// 文件路径取自 `UDIN_CONFIG`，未设置时尝试当前目录下的 `udin.toml`。
    pub fn load() -> AppResult<Self> {
        let explicit = std::env::var("UDIN_CONFIG").ok().map(PathBuf::from);
        let base = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        base.with_env_overrides()
    }

    /// 仅使用环境变量（忽略配置文件）
    pub fn from_env() -> AppResult<Self> {
        Self::default().with_env_overrides()
    }

    /// 从 TOML 文件读取，缺省字段使用默认值
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::File(crate::error::FileError::ReadFailed {
                path: path.display().to_string(),
                source: Box::new(e),
            })
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            AppError::Config(ConfigError::FileParseFailed { source, .. }) => {
                AppError::Config(ConfigError::FileParseFailed {
                    path: path.display().to_string(),
                    source,
                })
            }
            other => other,
        })
    }

    /// 解析 TOML 文本
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        Ok(toml::from_str(content)?)
    }

    fn with_env_overrides(mut self) -> AppResult<Self> {
        if let Some(v) = parse_env::<u16>("PORT")? {
            self.port = v;
        }
        if let Ok(v) = std::env::var("HOST") {
            self.host = v;
        }
        if let Ok(v) = std::env::var("UPLOAD_DIR") {
            self.upload_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("DOWNLOAD_DIR") {
            self.download_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("TARGET_URL") {
            self.target_url = v;
        }
        if let Some(v) = parse_env("CAPTCHA_TIMEOUT_SECS")? {
            self.captcha_timeout_secs = v;
        }
        if let Some(v) = parse_env("OTP_TIMEOUT_SECS")? {
            self.otp_timeout_secs = v;
        }
        if let Some(v) = parse_env("DOWNLOAD_TIMEOUT_SECS")? {
            self.download_timeout_secs = v;
        }
        if let Some(v) = parse_env("HEADLESS")? {
            self.headless = v;
        }
        if let Ok(v) = std::env::var("CHROME_EXECUTABLE") {
            self.chrome_executable = Some(PathBuf::from(v));
        }
        if let Some(v) = parse_env("VERBOSE_LOGGING")? {
            self.verbose_logging = v;
        }
        if let Some(v) = parse_env("MAX_FINISHED_JOBS")? {
            self.max_finished_jobs = v;
        }
        Ok(self)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn captcha_timeout(&self) -> Duration {
        Duration::from_secs(self.captcha_timeout_secs)
    }

    pub fn otp_timeout(&self) -> Duration {
        Duration::from_secs(self.otp_timeout_secs)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn element_wait(&self) -> Duration {
        Duration::from_secs(self.element_wait_secs)
    }

    pub fn item_delay(&self) -> Duration {
        Duration::from_millis(self.item_delay_ms)
    }

    pub fn otp_settle(&self) -> Duration {
        Duration::from_millis(self.otp_settle_ms)
    }
}

fn parse_env<T: FromStr>(var_name: &str) -> AppResult<Option<T>> {
    match std::env::var(var_name) {
        Ok(value) => value.trim().parse::<T>().map(Some).map_err(|_| {
            AppError::Config(ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            })
        }),
        Err(_) => Ok(None),
    }
}
