use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 表格结构错误（缺列、空表、无法解析）
    Schema(SchemaError),
    /// 验证码 / OTP 等待失败
    Challenge(ChallengeError),
    /// 浏览器驱动错误
    Driver(DriverError),
    /// 任务查询错误
    Job(JobError),
    /// 文件操作错误
    File(FileError),
    /// 配置错误
    Config(ConfigError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Schema(e) => write!(f, "{}", e),
            AppError::Challenge(e) => write!(f, "{}", e),
            AppError::Driver(e) => write!(f, "{}", e),
            AppError::Job(e) => write!(f, "{}", e),
            AppError::File(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Schema(e) => Some(e),
            AppError::Challenge(e) => Some(e),
            AppError::Driver(e) => Some(e),
            AppError::Job(e) => Some(e),
            AppError::File(e) => Some(e),
            AppError::Config(e) => Some(e),
        }
    }
}

/// 表格结构错误
#[derive(Debug)]
pub enum SchemaError {
    /// 表头缺少标识列
    MissingColumn { column: String },
    /// 工作簿没有工作表或表头
    EmptyWorkbook { path: String },
    /// 无法打开或解析工作簿
    Unreadable {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::MissingColumn { column } => {
                write!(f, "Excel must have '{}' column", column)
            }
            SchemaError::EmptyWorkbook { path } => {
                write!(f, "Spreadsheet has no sheet or header row: {}", path)
            }
            SchemaError::Unreadable { path, source } => {
                write!(f, "Cannot read spreadsheet {}: {}", path, source)
            }
        }
    }
}

impl SchemaError {
    /// 补充出错的文件路径
    pub fn at(self, path: impl Into<String>) -> Self {
        match self {
            SchemaError::Unreadable { source, .. } => SchemaError::Unreadable {
                path: path.into(),
                source,
            },
            other => other,
        }
    }
}

impl std::error::Error for SchemaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SchemaError::Unreadable { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 人工输入等待失败（单个 UDIN 级别，不终止任务）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChallengeError {
    /// 验证码超时或为空
    CaptchaTimeout,
    /// OTP 未在时限内全部到达
    OtpTimeout { missing: Vec<&'static str> },
}

impl fmt::Display for ChallengeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChallengeError::CaptchaTimeout => write!(f, "No captcha entered in time"),
            ChallengeError::OtpTimeout { missing } => {
                write!(
                    f,
                    "Did not receive both Mobile and Email OTPs in time (missing: {})",
                    missing.join(", ")
                )
            }
        }
    }
}

impl std::error::Error for ChallengeError {}

/// 浏览器驱动错误
#[derive(Debug)]
pub enum DriverError {
    /// 启动浏览器失败
    LaunchFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 导航失败
    NavigationFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 页面元素不存在
    ElementNotFound { selector: String },
    /// 执行脚本失败
    ScriptExecutionFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 驱动已关闭
    Closed,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::LaunchFailed { source } => {
                write!(f, "Browser failed to start: {}", source)
            }
            DriverError::NavigationFailed { url, source } => {
                write!(f, "Navigation to {} failed: {}", url, source)
            }
            DriverError::ElementNotFound { selector } => {
                write!(f, "Element not found: {}", selector)
            }
            DriverError::ScriptExecutionFailed { source } => {
                write!(f, "Browser script failed: {}", source)
            }
            DriverError::Closed => write!(f, "Browser session already closed"),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DriverError::LaunchFailed { source }
            | DriverError::NavigationFailed { source, .. }
            | DriverError::ScriptExecutionFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 任务查询错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// 任务不存在
    NotFound { job_id: String },
}

impl fmt::Display for JobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobError::NotFound { job_id } => write!(f, "job not found: {}", job_id),
        }
    }
}

impl std::error::Error for JobError {}

/// 文件操作错误
#[derive(Debug)]
pub enum FileError {
    /// 文件不存在
    NotFound { path: String },
    /// 读取文件失败
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入文件失败
    WriteFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 非法文件名
    InvalidName { name: String },
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::NotFound { path } => write!(f, "File not found: {}", path),
            FileError::ReadFailed { path, source } => {
                write!(f, "Failed to read {}: {}", path, source)
            }
            FileError::WriteFailed { path, source } => {
                write!(f, "Failed to write {}: {}", path, source)
            }
            FileError::InvalidName { name } => write!(f, "Invalid file name: {}", name),
        }
    }
}

impl std::error::Error for FileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileError::ReadFailed { source, .. } | FileError::WriteFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 配置文件解析失败
    FileParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 环境变量解析失败
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::FileParseFailed { path, source } => {
                write!(f, "配置文件 {} 解析失败: {}", path, source)
            }
            ConfigError::EnvVarParseFailed {
                var_name,
                value,
                expected_type,
            } => {
                write!(
                    f,
                    "环境变量 {} 解析失败: 值 '{}' 无法转换为 {}",
                    var_name, value, expected_type
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::FileParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        AppError::Driver(DriverError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Driver(DriverError::ScriptExecutionFailed {
            source: Box::new(err),
        })
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(ConfigError::FileParseFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<calamine::Error> for SchemaError {
    fn from(err: calamine::Error) -> Self {
        SchemaError::Unreadable {
            path: String::new(),
            source: Box::new(err),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: String::new(),
            source: Box::new(err),
        })
    }
}

impl From<SchemaError> for AppError {
    fn from(err: SchemaError) -> Self {
        AppError::Schema(err)
    }
}

impl From<ChallengeError> for AppError {
    fn from(err: ChallengeError) -> Self {
        AppError::Challenge(err)
    }
}

impl From<DriverError> for AppError {
    fn from(err: DriverError) -> Self {
        AppError::Driver(err)
    }
}

impl From<JobError> for AppError {
    fn from(err: JobError) -> Self {
        AppError::Job(err)
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建浏览器启动错误
    pub fn driver_launch_failed(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        AppError::Driver(DriverError::LaunchFailed {
            source: Box::new(source),
        })
    }

    /// 创建导航错误
    pub fn navigation_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::Driver(DriverError::NavigationFailed {
            url: url.into(),
            source: Box::new(source),
        })
    }

    /// 创建元素缺失错误
    pub fn element_not_found(selector: impl Into<String>) -> Self {
        AppError::Driver(DriverError::ElementNotFound {
            selector: selector.into(),
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source: Box::new(source),
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
