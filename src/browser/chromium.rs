//! 基于 chromiumoxide 的驱动实现
//!
//! 表单操作大多通过注入 JS 完成（与页面上的 jQuery 校验兼容），
//! 点击走 CDP 的真实鼠标事件。

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chromiumoxide::Browser;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::browser::downloads;
use crate::browser::driver::AutomationDriver;
use crate::browser::headless::remove_job_dirs;
use crate::browser::selectors::{CAPTCHA_IMAGE_CANDIDATES, CAPTCHA_MARKER_ATTR, CAPTCHA_SRC_HINT};
use crate::error::{AppError, AppResult, DriverError};
use crate::infrastructure::{js_literal, JsExecutor};

/// 元素轮询间隔
const ELEMENT_POLL: Duration = Duration::from_millis(250);

/// 验证码图片加载等待上限
const IMAGE_LOAD_WAIT: Duration = Duration::from_secs(5);

/// Chromium 驱动
pub struct ChromiumDriver {
    browser: Browser,
    handler_task: JoinHandle<()>,
    executor: JsExecutor,
    staging_dir: PathBuf,
    download_dir: PathBuf,
    profile_dir: PathBuf,
    /// 当前 UDIN 开始的时间，早于它的下载文件不算数
    item_started: SystemTime,
    closed: bool,
}

impl ChromiumDriver {
    pub fn new(
        browser: Browser,
        handler_task: JoinHandle<()>,
        executor: JsExecutor,
        staging_dir: PathBuf,
        download_dir: PathBuf,
        profile_dir: PathBuf,
    ) -> Self {
        Self {
            browser,
            handler_task,
            executor,
            staging_dir,
            download_dir,
            profile_dir,
            item_started: SystemTime::now(),
            closed: false,
        }
    }

    fn executor(&self) -> AppResult<&JsExecutor> {
        if self.closed {
            Err(AppError::Driver(DriverError::Closed))
        } else {
            Ok(&self.executor)
        }
    }

    /// 执行返回布尔值的脚本，`false` 视为元素不存在
    async fn eval_on_element(&self, selector: &str, js_code: String) -> AppResult<()> {
        let found = self.executor()?.eval_flag(js_code).await?;
        if found {
            Ok(())
        } else {
            Err(AppError::element_not_found(selector))
        }
    }
}

#[async_trait]
impl AutomationDriver for ChromiumDriver {
    async fn open(&mut self, url: &str) -> AppResult<()> {
        debug!("导航到: {}", url);
        // 每个 UDIN 都从打开查询页开始
        match downloads::clear_staging(&self.staging_dir).await {
            Ok(0) => {}
            Ok(n) => warn!("清理了 {} 个残留的下载文件", n),
            Err(e) => warn!("清理暂存目录失败 {}: {}", self.staging_dir.display(), e),
        }
        self.item_started = SystemTime::now();

        let page = self.executor()?.page();
        page.goto(url)
            .await
            .map_err(|e| AppError::navigation_failed(url, e))?;
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> AppResult<bool> {
        let js_code = format!(
            "document.querySelector({}) !== null",
            js_literal(selector)?
        );
        let deadline = Instant::now() + timeout;
        loop {
            let present = self.executor()?.eval_flag(js_code.as_str()).await?;
            if present {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(ELEMENT_POLL).await;
        }
    }

    async fn fill(&mut self, selector: &str, text: &str) -> AppResult<()> {
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                el.focus();
                el.value = '';
                el.value = {text};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()
            "#,
            selector = js_literal(selector)?,
            text = js_literal(text)?,
        );
        self.eval_on_element(selector, js_code).await
    }

    async fn click(&mut self, selector: &str) -> AppResult<()> {
        let element = self
            .executor()?
            .page()
            .find_element(selector)
            .await
            .map_err(|_| AppError::element_not_found(selector))?;
        element.click().await?;
        Ok(())
    }

    async fn select(&mut self, selector: &str, visible_text: &str) -> AppResult<()> {
        let js_code = format!(
            r#"
            (() => {{
                const sel = document.querySelector({selector});
                if (!sel) return false;
                const wanted = {text};
                const options = Array.from(sel.options);
                let chosen = options.find(o => o.text.trim() === wanted);
                if (!chosen) chosen = options.find(o => o.value);
                if (!chosen) return false;
                sel.value = chosen.value;
                sel.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()
            "#,
            selector = js_literal(selector)?,
            text = js_literal(visible_text)?,
        );
        self.eval_on_element(selector, js_code).await
    }

    async fn check(&mut self, selector: &str) -> AppResult<()> {
        let js_code = format!(
            r#"
            (() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                if (!el.checked) el.click();
                return true;
            }})()
            "#,
            selector = js_literal(selector)?,
        );
        self.eval_on_element(selector, js_code).await
    }

    async fn find_captcha_image(&mut self) -> AppResult<Option<String>> {
        let js_code = format!(
            r#"
            (() => {{
                const candidates = {candidates};
                let img = null;
                for (const c of candidates) {{
                    img = document.querySelector(c);
                    if (img) break;
                }}
                if (!img) {{
                    img = Array.from(document.getElementsByTagName('img'))
                        .find(i => (i.getAttribute('src') || '').toLowerCase().includes({hint}));
                }}
                if (!img) return false;
                img.setAttribute({marker}, '1');
                return true;
            }})()
            "#,
            candidates = js_literal(CAPTCHA_IMAGE_CANDIDATES)?,
            hint = js_literal(CAPTCHA_SRC_HINT)?,
            marker = js_literal(CAPTCHA_MARKER_ATTR)?,
        );
        let found = self.executor()?.eval_flag(js_code).await?;
        Ok(found.then(|| format!("img[{}='1']", CAPTCHA_MARKER_ATTR)))
    }

    async fn capture_challenge_image(&mut self, selector: &str) -> AppResult<Vec<u8>> {
        let selector_literal = js_literal(selector)?;

        // 等图片加载完，否则 canvas 是空白的
        let loaded_js = format!(
            "(() => {{ const img = document.querySelector({0}); return !!img && img.complete && img.naturalWidth > 0; }})()",
            selector_literal
        );
        let deadline = Instant::now() + IMAGE_LOAD_WAIT;
        loop {
            let loaded = self.executor()?.eval_flag(loaded_js.as_str()).await?;
            if loaded || Instant::now() >= deadline {
                break;
            }
            sleep(ELEMENT_POLL).await;
        }

        // 把已显示的 <img> 画到 canvas 上取数据，不重新请求验证码
        let capture_js = format!(
            r#"
            (() => {{
                const img = document.querySelector({selector});
                if (!img) return '';
                const canvas = document.createElement('canvas');
                canvas.width = img.naturalWidth;
                canvas.height = img.naturalHeight;
                const ctx = canvas.getContext('2d');
                ctx.drawImage(img, 0, 0);
                return canvas.toDataURL('image/png').split(',')[1] || '';
            }})()
            "#,
            selector = selector_literal,
        );
        let encoded: String = self.executor()?.eval_as(capture_js).await?;
        if encoded.is_empty() {
            return Err(AppError::element_not_found(selector));
        }
        BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| AppError::Driver(DriverError::ScriptExecutionFailed { source: Box::new(e) }))
    }

    async fn await_downloaded_file(
        &mut self,
        identifier: &str,
        timeout: Duration,
    ) -> AppResult<Option<PathBuf>> {
        self.executor()?;
        let found = downloads::wait_for_pdf(
            &self.staging_dir,
            &self.download_dir,
            identifier,
            self.item_started,
            timeout,
        )
        .await?;
        Ok(found)
    }

    async fn shutdown(&mut self) -> AppResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        info!("🛑 关闭浏览器");

        let close_result = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler_task.abort();

        remove_job_dirs(&self.profile_dir, &self.staging_dir).await;

        close_result.map(|_| ()).map_err(|e| {
            warn!("关闭浏览器失败: {}", e);
            AppError::from(e)
        })
    }
}
