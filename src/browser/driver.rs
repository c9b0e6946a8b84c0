//! 浏览器驱动能力
//!
//! 任务流程只依赖这里的 trait，不直接接触 chromiumoxide，
//! 测试时可以换成脚本化的假驱动。

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::AppResult;

/// 页面自动化能力
///
/// 元素一律用 CSS 选择器引用。驱动实例由单个任务独占，
/// `shutdown` 在每个任务结束时恰好调用一次。
#[async_trait]
pub trait AutomationDriver: Send {
    /// 打开页面，开始一个新的 UDIN
    ///
    /// 此前残留或迟到的下载文件不会被之后的 `await_downloaded_file` 返回。
    async fn open(&mut self, url: &str) -> AppResult<()>;

    /// 等待元素出现，超时返回 `false`
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> AppResult<bool>;

    /// 清空输入框并填入文本
    async fn fill(&mut self, selector: &str, text: &str) -> AppResult<()>;

    async fn click(&mut self, selector: &str) -> AppResult<()>;

    /// 按可见文本选择下拉项；文本不存在时选第一个有值的选项
    async fn select(&mut self, selector: &str, visible_text: &str) -> AppResult<()>;

    /// 勾选复选框（已勾选则不动）
    async fn check(&mut self, selector: &str) -> AppResult<()>;

    /// 查找验证码图片，返回可以再次定位它的选择器
    async fn find_captcha_image(&mut self) -> AppResult<Option<String>>;

    /// 按当前显示的内容截取验证码图片（PNG 字节）
    ///
    /// 不能重新请求图片地址，否则服务端会换一张新验证码。
    async fn capture_challenge_image(&mut self, selector: &str) -> AppResult<Vec<u8>>;

    /// 等待上次 `open` 之后新下载的 PDF，按 UDIN 重命名后返回最终路径
    async fn await_downloaded_file(
        &mut self,
        identifier: &str,
        timeout: Duration,
    ) -> AppResult<Option<PathBuf>>;

    /// 释放浏览器资源
    async fn shutdown(&mut self) -> AppResult<()>;
}

/// 为任务启动驱动
#[async_trait]
pub trait DriverLauncher: Send + Sync {
    async fn launch(&self, job_id: &str) -> AppResult<Box<dyn AutomationDriver>>;
}
