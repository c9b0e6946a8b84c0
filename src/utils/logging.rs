/// 日志工具模块
///
/// 提供日志格式化和输出的辅助函数
use tracing::info;

use crate::config::Config;

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 UDIN 批量下载服务启动");
    info!("🌐 监听地址: http://{}", config.bind_addr());
    info!("📁 上传目录: {}", config.upload_dir.display());
    info!("📥 下载目录: {}", config.download_dir.display());
    info!(
        "⏱️ 等待时限: 验证码 {}s / OTP {}s / PDF {}s",
        config.captcha_timeout_secs, config.otp_timeout_secs, config.download_timeout_secs
    );
    info!("{}", "=".repeat(60));
}

/// 记录任务开始信息
pub fn log_job_start(job_id: &str, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("[任务 {}] 📦 开始处理，共 {} 个 UDIN", short_id(job_id), total);
    info!("{}", "=".repeat(60));
}

/// 记录单个 UDIN 开始
pub fn log_item_start(job_id: &str, index: usize, total: usize, udin: &str) {
    info!("\n[任务 {}] {}", short_id(job_id), "─".repeat(30));
    info!(
        "[任务 {}] 处理第 {}/{} 个 UDIN: {}",
        short_id(job_id),
        index,
        total,
        udin
    );
}

/// 打印任务最终统计
pub fn log_job_complete(job_id: &str, success: usize, failed: usize, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("[任务 {}] 📊 处理完成统计", short_id(job_id));
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("✅ 成功: {}/{}", success, total);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
}

/// 任务 ID 的短形式（日志前缀用）
pub fn short_id(job_id: &str) -> &str {
    match job_id.char_indices().nth(8) {
        Some((idx, _)) => &job_id[..idx],
        None => job_id,
    }
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
