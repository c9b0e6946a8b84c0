use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use udin_batch::server::{self, AppState};
use udin_batch::utils::logging::log_startup;
use udin_batch::{logger, ChromiumLauncher, Config, JobManager, SpreadsheetSource};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::load().context("加载配置失败")?;

    // 初始化日志
    logger::init(config.verbose_logging);
    log_startup(&config);

    for dir in [&config.upload_dir, &config.download_dir] {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("创建目录 {} 失败", dir.display()))?;
    }

    let manager = JobManager::new(
        config.clone(),
        Arc::new(SpreadsheetSource::new(config.identifier_column.clone())),
        Arc::new(ChromiumLauncher::new(config.clone())),
    );

    let listener = TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("无法监听 {}", config.bind_addr()))?;

    server::serve(listener, AppState::new(Arc::new(manager))).await
}
