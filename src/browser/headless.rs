//! 启动 Chromium 浏览器
//!
//! 每个任务一个独立的浏览器进程和用户目录，下载目录指向任务私有的暂存目录。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde_json::json;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::browser::chromium::ChromiumDriver;
use crate::browser::driver::{AutomationDriver, DriverLauncher};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::infrastructure::JsExecutor;
use crate::utils::logging::short_id;

/// 暂存目录名（位于下载目录下）
pub const STAGING_DIR: &str = ".staging";

/// Chromium 驱动启动器
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    config: Config,
}

impl ChromiumLauncher {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// 任务的下载暂存目录
    pub fn staging_dir(&self, job_id: &str) -> PathBuf {
        self.config.download_dir.join(STAGING_DIR).join(job_id)
    }

    fn profile_dir(&self, job_id: &str) -> PathBuf {
        std::env::temp_dir().join(format!("udin-profile-{}", job_id))
    }
}

#[async_trait]
impl DriverLauncher for ChromiumLauncher {
    async fn launch(&self, job_id: &str) -> AppResult<Box<dyn AutomationDriver>> {
        info!("[任务 {}] 🚀 启动浏览器...", short_id(job_id));

        let staging = absolute(&self.staging_dir(job_id))?;
        let profile = self.profile_dir(job_id);

        let mut builder = BrowserConfig::builder()
            .user_data_dir(&profile)
            .args(vec![
                "--no-sandbox",            // 禁用沙盒，防止权限问题导致的崩溃
                "--disable-dev-shm-usage", // 防止共享内存不足
                "--no-first-run",
                "--no-default-browser-check",
            ]);
        builder = if self.config.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };
        if let Some(executable) = &self.config.chrome_executable {
            builder = builder.chrome_executable(executable);
        }
        let browser_config = builder.build().map_err(|e| {
            error!("配置浏览器失败: {}", e);
            AppError::driver_launch_failed(std::io::Error::other(e))
        })?;

        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| AppError::file_write_failed(staging.display().to_string(), e))?;
        if let Err(e) = write_profile_preferences(&profile, &staging).await {
            remove_job_dirs(&profile, &staging).await;
            return Err(e);
        }

        // 启动浏览器
        let (mut browser, mut handler) = match Browser::launch(browser_config).await {
            Ok(launched) => launched,
            Err(e) => {
                error!("启动浏览器失败: {}", e);
                remove_job_dirs(&profile, &staging).await;
                return Err(AppError::driver_launch_failed(e));
            }
        };
        debug!("浏览器启动成功");

        // 在后台处理浏览器事件
        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        let page = match prepare_page(&browser, &staging).await {
            Ok(page) => page,
            Err(e) => {
                // 进程已经起来了，返回错误前先关掉
                warn!("[任务 {}] 浏览器初始化失败，正在关闭: {}", short_id(job_id), e);
                let _ = browser.close().await;
                let _ = browser.wait().await;
                handler_task.abort();
                remove_job_dirs(&profile, &staging).await;
                return Err(e);
            }
        };
        info!("[任务 {}] ✅ 浏览器已就绪", short_id(job_id));

        Ok(Box::new(ChromiumDriver::new(
            browser,
            handler_task,
            JsExecutor::new(page),
            staging,
            self.config.download_dir.clone(),
            profile,
        )))
    }
}

/// 设置下载目录并打开空白页
async fn prepare_page(browser: &Browser, staging: &Path) -> AppResult<Page> {
    // 添加短暂延迟以等待浏览器状态同步
    sleep(Duration::from_millis(300)).await;

    let download_behavior = SetDownloadBehaviorParams::builder()
        .behavior(SetDownloadBehaviorBehavior::Allow)
        .download_path(staging.to_string_lossy().to_string())
        .build()
        .map_err(|e| AppError::driver_launch_failed(std::io::Error::other(e)))?;
    browser
        .execute(download_behavior)
        .await
        .map_err(AppError::driver_launch_failed)?;

    browser.new_page("about:blank").await.map_err(|e| {
        error!("创建页面失败: {}", e);
        AppError::driver_launch_failed(e)
    })
}

/// 删除任务的用户目录；暂存目录只在为空时删除
pub(crate) async fn remove_job_dirs(profile: &Path, staging: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(profile).await {
        debug!("清理用户目录失败 {}: {}", profile.display(), e);
    }
    if let Err(e) = tokio::fs::remove_dir(staging).await {
        debug!("暂存目录未清理 {}: {}", staging.display(), e);
    }
}

fn absolute(path: &Path) -> AppResult<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// 写入用户目录的偏好设置：PDF 直接下载而不是用内置阅读器打开
async fn write_profile_preferences(profile: &Path, staging: &Path) -> AppResult<()> {
    let default_dir = profile.join("Default");
    tokio::fs::create_dir_all(&default_dir)
        .await
        .map_err(|e| AppError::file_write_failed(default_dir.display().to_string(), e))?;

    let prefs = json!({
        "download": {
            "default_directory": staging.to_string_lossy(),
            "prompt_for_download": false,
        },
        "plugins": { "always_open_pdf_externally": true },
    });
    let path = default_dir.join("Preferences");
    tokio::fs::write(&path, serde_json::to_vec(&prefs)?)
        .await
        .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
    Ok(())
}
