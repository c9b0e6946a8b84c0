//! 单个 UDIN 的处理流程 - 流程层
//!
//! 流程顺序：
//! 1. 打开查询页，填写固定字段和 UDIN
//! 2. 验证码：截图 → 等待人工输入 → 填入
//! 3. 点击发送 OTP
//! 4. 同时等待手机和邮箱两个 OTP → 分别填入并验证
//! 5. 等待 PDF 下载

use std::path::PathBuf;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::browser::{AutomationDriver, PortalForm};
use crate::config::Config;
use crate::error::{AppError, AppResult, ChallengeError};
use crate::job::{GateKind, JobUpdate};
use crate::models::FormValues;
use crate::workflow::job_ctx::JobCtx;

/// 查找验证码图片的轮询间隔
const CAPTCHA_POLL: Duration = Duration::from_millis(500);

/// 各阶段的等待时限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub element: Duration,
    pub captcha: Duration,
    pub otp: Duration,
    pub otp_settle: Duration,
    pub download: Duration,
}

impl From<&Config> for StageTimeouts {
    fn from(config: &Config) -> Self {
        Self {
            element: config.element_wait(),
            captcha: config.captcha_timeout(),
            otp: config.otp_timeout(),
            otp_settle: config.otp_settle(),
            download: config.download_timeout(),
        }
    }
}

/// 单个 UDIN 的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessResult {
    /// 已下载 PDF
    Downloaded(PathBuf),
    /// 流程走完但没有等到 PDF
    NoDocument,
}

/// UDIN 处理流程
///
/// - 编排一次查询的全部步骤
/// - 不持有浏览器（由调用方传入驱动）
/// - 只在必需步骤失败时返回错误，可选字段失败只记日志
pub struct IdentifierFlow {
    target_url: String,
    form: PortalForm,
    values: FormValues,
    timeouts: StageTimeouts,
}

impl IdentifierFlow {
    pub fn new(target_url: impl Into<String>, values: FormValues, timeouts: StageTimeouts) -> Self {
        Self {
            target_url: target_url.into(),
            form: PortalForm::default(),
            values,
            timeouts,
        }
    }

    pub async fn run(
        &self,
        driver: &mut dyn AutomationDriver,
        ctx: &JobCtx,
        udin: &str,
    ) -> AppResult<ProcessResult> {
        // ========== 步骤 1: 填写表单 ==========
        driver.open(&self.target_url).await?;
        self.fill_static_fields(driver, ctx).await;
        self.fill_udin(driver, udin).await?;

        // ========== 步骤 2: 验证码 ==========
        self.handle_captcha(driver, ctx).await?;

        // ========== 步骤 3: 发送 OTP ==========
        if let Err(e) = driver.click(self.form.send_otp).await {
            debug!("{} 未能点击发送 OTP 按钮（可能已自动发送）: {}", ctx, e);
        }

        // ========== 步骤 4: 双 OTP ==========
        self.handle_otp(driver, ctx).await?;

        // ========== 步骤 5: 下载 PDF ==========
        match driver
            .await_downloaded_file(udin, self.timeouts.download)
            .await?
        {
            Some(path) => {
                let file_name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().to_string())
                    .unwrap_or_else(|| path.display().to_string());
                info!("{} 📥 已下载: {}", ctx, file_name);
                ctx.update(
                    JobUpdate::new()
                        .last_pdf(Some(file_name))
                        .with_message(format!("Downloaded PDF for {}", udin)),
                );
                Ok(ProcessResult::Downloaded(path))
            }
            None => {
                warn!("{} ⚠️ 未等到 {} 的 PDF", ctx, udin);
                ctx.message(format!("No PDF found for {}", udin));
                Ok(ProcessResult::NoDocument)
            }
        }
    }

    /// 固定字段：全部是可选的，找不到就跳过
    async fn fill_static_fields(&self, driver: &mut dyn AutomationDriver, ctx: &JobCtx) {
        match driver
            .wait_for(self.form.authority_type, self.timeouts.element)
            .await
        {
            Ok(true) => {
                if let Err(e) = driver
                    .select(self.form.authority_type, &self.values.authority_type)
                    .await
                {
                    debug!("{} 选择机构类型失败: {}", ctx, e);
                }
            }
            Ok(false) => debug!("{} 未找到机构类型下拉框", ctx),
            Err(e) => debug!("{} 等待机构类型下拉框失败: {}", ctx, e),
        }

        for (selector, value) in [
            (self.form.authority_name, &self.values.authority_name),
            (self.form.mobile, &self.values.mobile),
            (self.form.email, &self.values.email),
        ] {
            if let Err(e) = driver.fill(selector, value).await {
                debug!("{} 跳过字段 {}: {}", ctx, selector, e);
            }
        }
    }

    async fn fill_udin(&self, driver: &mut dyn AutomationDriver, udin: &str) -> AppResult<()> {
        if !driver.wait_for(self.form.udin, self.timeouts.element).await? {
            return Err(AppError::element_not_found(self.form.udin));
        }
        driver.fill(self.form.udin, udin).await?;
        // 免责声明复选框不一定存在
        let _ = driver.check(self.form.disclaimer).await;
        Ok(())
    }

    async fn handle_captcha(
        &self,
        driver: &mut dyn AutomationDriver,
        ctx: &JobCtx,
    ) -> AppResult<()> {
        let Some(image) = self.locate_captcha(driver, ctx).await else {
            info!("{} 页面没有验证码，继续", ctx);
            ctx.message("No captcha found; continuing...");
            return Ok(());
        };

        let captcha_b64 = match driver.capture_challenge_image(&image).await {
            Ok(bytes) => Some(BASE64.encode(bytes)),
            Err(e) => {
                warn!("{} 验证码截图失败: {}", ctx, e);
                ctx.message(format!("Canvas extraction failed: {}", e));
                None
            }
        };

        let window = ctx.open_gate(GateKind::Captcha);
        ctx.update(
            JobUpdate::new()
                .captcha(captcha_b64, true)
                .with_message("Awaiting captcha input..."),
        );
        info!("{} ⏳ 等待验证码输入（最长 {:?}）", ctx, self.timeouts.captcha);

        let answer = window.wait(self.timeouts.captcha).await;
        ctx.update(JobUpdate::new().captcha(None, false));
        drop(window);

        let answer = match answer {
            Ok(answer) if !answer.trim().is_empty() => answer,
            _ => return Err(ChallengeError::CaptchaTimeout.into()),
        };
        driver.fill(self.form.captcha_input, answer.trim()).await?;
        Ok(())
    }

    /// 验证码图片可能由页面脚本稍后插入，最多等待 `element` 时长
    async fn locate_captcha(
        &self,
        driver: &mut dyn AutomationDriver,
        ctx: &JobCtx,
    ) -> Option<String> {
        let deadline = Instant::now() + self.timeouts.element;
        loop {
            match driver.find_captcha_image().await {
                Ok(Some(image)) => return Some(image),
                Ok(None) => {}
                Err(e) => debug!("{} 查找验证码失败: {}", ctx, e),
            }
            if Instant::now() >= deadline {
                return None;
            }
            sleep(CAPTCHA_POLL).await;
        }
    }

    async fn handle_otp(&self, driver: &mut dyn AutomationDriver, ctx: &JobCtx) -> AppResult<()> {
        let mobile = ctx.open_gate(GateKind::MobileOtp);
        let email = ctx.open_gate(GateKind::EmailOtp);
        ctx.update(
            JobUpdate::new()
                .awaiting_otp(true)
                .with_message("Waiting for both Mobile and Email OTPs (via relay or manual entry)..."),
        );
        info!("{} ⏳ 等待手机和邮箱 OTP（最长 {:?}）", ctx, self.timeouts.otp);

        // 两个 OTP 到达顺序不定，全部到齐才继续
        let joined = tokio::time::timeout(self.timeouts.otp, async {
            tokio::join!(mobile.recv(), email.recv())
        })
        .await;
        ctx.update(JobUpdate::new().awaiting_otp(false));

        let (mobile_otp, email_otp) = match joined {
            Ok(values) => values,
            Err(_) => {
                let missing = [&mobile, &email]
                    .into_iter()
                    .filter(|window| !window.is_signaled())
                    .map(|window| window.kind().label())
                    .collect();
                return Err(ChallengeError::OtpTimeout { missing }.into());
            }
        };
        drop(mobile);
        drop(email);

        // 提交失败不终止当前 UDIN
        if let Err(e) = self
            .submit_otp(driver, self.form.otp_mobile, self.form.verify_mobile, &mobile_otp)
            .await
        {
            warn!("{} 手机 OTP 提交失败: {}", ctx, e);
            ctx.message(format!("Mobile OTP error: {}", e));
        }
        if let Err(e) = self
            .submit_otp(driver, self.form.otp_email, self.form.verify_email, &email_otp)
            .await
        {
            warn!("{} 邮箱 OTP 提交失败: {}", ctx, e);
            ctx.message(format!("Email OTP error: {}", e));
        }

        sleep(self.timeouts.otp_settle).await;
        Ok(())
    }

    async fn submit_otp(
        &self,
        driver: &mut dyn AutomationDriver,
        field: &str,
        verify_button: &str,
        otp: &str,
    ) -> AppResult<()> {
        driver.fill(field, otp.trim()).await?;
        driver.click(verify_button).await
    }
}
