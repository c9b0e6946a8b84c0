//! 任务执行器 - 编排层
//!
//! ## 职责
//!
//! 一个任务从头到尾的状态机：`uploaded → running → done | error`。
//!
//! 1. **读取表格**：失败（缺列等）直接进入 `error`，进度保持 0
//! 2. **启动浏览器**：失败进入 `error`
//! 3. **逐个处理 UDIN**：单个失败只记日志，继续下一个
//! 4. **收尾**：关闭浏览器（恰好一次），进入 `done`

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::browser::{AutomationDriver, DriverLauncher};
use crate::identifiers::IdentifierSource;
use crate::job::{JobStatus, JobUpdate};
use crate::utils::logging::{log_item_start, log_job_complete, log_job_start};
use crate::workflow::{IdentifierFlow, JobCtx, ProcessResult};

/// 执行器异常退出时写入任务日志的消息
pub const CRASH_MESSAGE: &str = "Worker crashed unexpectedly";

/// 处理统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JobStats {
    pub success: usize,
    pub failed: usize,
    pub total: usize,
}

/// 单个任务的执行器
pub struct JobRunner {
    ctx: JobCtx,
    file: PathBuf,
    source: Arc<dyn IdentifierSource>,
    launcher: Arc<dyn DriverLauncher>,
    flow: IdentifierFlow,
    item_delay: Duration,
}

impl JobRunner {
    pub fn new(
        ctx: JobCtx,
        file: PathBuf,
        source: Arc<dyn IdentifierSource>,
        launcher: Arc<dyn DriverLauncher>,
        flow: IdentifierFlow,
        item_delay: Duration,
    ) -> Self {
        Self {
            ctx,
            file,
            source,
            launcher,
            flow,
            item_delay,
        }
    }

    /// 执行整个任务；所有结果都写进任务记录
    pub async fn run(self) -> JobStats {
        let ctx = &self.ctx;

        let udins = match self.read_identifiers().await {
            Ok(udins) => udins,
            Err(message) => {
                error!("{} ❌ 读取表格失败: {}", ctx, message);
                self.fail(message);
                return JobStats::default();
            }
        };

        let total = udins.len();
        ctx.update(
            JobUpdate::new()
                .status(JobStatus::Running)
                .total(total)
                .progress(0)
                .with_message(format!("Starting job {}", ctx.job_id)),
        );
        log_job_start(&ctx.job_id, total);

        let mut driver = match self.launcher.launch(&ctx.job_id).await {
            Ok(driver) => driver,
            Err(e) => {
                error!("{} ❌ 浏览器启动失败: {}", ctx, e);
                self.fail(e.to_string());
                return JobStats {
                    total,
                    ..Default::default()
                };
            }
        };

        // 处理过程中 panic 也要先关闭浏览器
        let processed = AssertUnwindSafe(self.process_all(driver.as_mut(), &udins))
            .catch_unwind()
            .await;

        if let Err(e) = driver.shutdown().await {
            warn!("{} 关闭浏览器时出错: {}", ctx, e);
        }

        let stats = match processed {
            Ok(stats) => stats,
            Err(_) => {
                error!("{} 💥 处理过程中发生 panic，任务终止", ctx);
                ctx.update(
                    JobUpdate::new()
                        .status(JobStatus::Error)
                        .current(None)
                        .captcha(None, false)
                        .awaiting_otp(false)
                        .with_message(CRASH_MESSAGE),
                );
                return JobStats {
                    total,
                    ..Default::default()
                };
            }
        };

        ctx.update(
            JobUpdate::new()
                .status(JobStatus::Done)
                .current(None)
                .with_message("All UDINs processed."),
        );
        log_job_complete(&ctx.job_id, stats.success, stats.failed, stats.total);
        stats
    }

    /// 逐个处理 UDIN（顺序执行，不并发）
    async fn process_all(&self, driver: &mut dyn AutomationDriver, udins: &[String]) -> JobStats {
        let ctx = &self.ctx;
        let total = udins.len();
        let mut stats = JobStats {
            total,
            ..Default::default()
        };

        for (index, udin) in udins.iter().enumerate() {
            let position = index + 1;
            log_item_start(&ctx.job_id, position, total, udin);
            ctx.update(
                JobUpdate::new()
                    .current(Some(udin.clone()))
                    .progress(index)
                    .with_message(format!("Processing {}", udin)),
            );

            let ok = match self.flow.run(driver, ctx, udin).await {
                Ok(ProcessResult::Downloaded(_)) | Ok(ProcessResult::NoDocument) => {
                    stats.success += 1;
                    true
                }
                Err(e) => {
                    error!("{} UDIN {} 处理失败: {}", ctx, udin, e);
                    ctx.message(format!("Error processing {}: {}", udin, e));
                    stats.failed += 1;
                    false
                }
            };

            ctx.update(
                JobUpdate::new()
                    .progress(position)
                    .with_message(format!("{} {}", udin, if ok { "completed" } else { "failed" })),
            );
            info!("{} 进度 {}/{}", ctx, position, total);

            if !self.item_delay.is_zero() {
                sleep(self.item_delay).await;
            }
        }

        stats
    }

    /// 表格解析是阻塞 I/O，放到阻塞线程池执行
    async fn read_identifiers(&self) -> Result<Vec<String>, String> {
        let source = self.source.clone();
        let file = self.file.clone();
        match tokio::task::spawn_blocking(move || source.extract(&file)).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(e) => Err(format!("Spreadsheet reader crashed: {}", e)),
        }
    }

    fn fail(&self, message: String) {
        self.ctx.update(
            JobUpdate::new()
                .status(JobStatus::Error)
                .current(None)
                .with_message(message),
        );
    }
}
