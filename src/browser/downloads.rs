//! 下载目录轮询
//!
//! 浏览器把文件下载到任务私有的暂存目录，找到完成的 PDF 后
//! 移动到共享下载目录并以 UDIN 命名。
//!
//! 每个 UDIN 开始前清空暂存目录，并且只接受开始之后写入的文件，
//! 上一个 UDIN 迟到的下载不会被算到下一个 UDIN 头上。

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// 轮询间隔
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// UDIN 转为安全的文件名主体
pub fn artifact_stem(identifier: &str) -> String {
    let stem: String = identifier
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if stem.is_empty() {
        "document".to_string()
    } else {
        stem
    }
}

/// 删除暂存目录中残留的文件，返回删除的个数
pub async fn clear_staging(staging: &Path) -> std::io::Result<usize> {
    let mut entries = match fs::read_dir(staging).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }
    Ok(removed)
}

/// 暂存目录中 `since` 之后写入的最新 PDF
pub async fn newest_pdf(staging: &Path, since: SystemTime) -> std::io::Result<Option<PathBuf>> {
    let mut entries = match fs::read_dir(staging).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };

    let mut newest: Option<(SystemTime, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            continue;
        }
        let modified = entry
            .metadata()
            .await
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        if modified < since {
            debug!("忽略旧的下载文件: {}", path.display());
            continue;
        }
        if newest.as_ref().map_or(true, |(time, _)| modified > *time) {
            newest = Some((modified, path));
        }
    }
    Ok(newest.map(|(_, path)| path))
}

/// 把暂存的 PDF 移到下载目录；移动失败时保留原路径
pub async fn move_artifact(src: &Path, dest_dir: &Path, identifier: &str) -> PathBuf {
    let dest = dest_dir.join(format!("{}.pdf", artifact_stem(identifier)));
    if let Err(e) = fs::create_dir_all(dest_dir).await {
        warn!("无法创建下载目录 {}: {}", dest_dir.display(), e);
        return src.to_path_buf();
    }
    if fs::rename(src, &dest).await.is_ok() {
        return dest;
    }
    // 跨设备时 rename 会失败，退回复制 + 删除
    match fs::copy(src, &dest).await {
        Ok(_) => {
            let _ = fs::remove_file(src).await;
            dest
        }
        Err(e) => {
            warn!("重命名 PDF 失败 {}: {}", src.display(), e);
            src.to_path_buf()
        }
    }
}

/// 在 `timeout` 内等待暂存目录出现 `since` 之后的 PDF
pub async fn wait_for_pdf(
    staging: &Path,
    dest_dir: &Path,
    identifier: &str,
    since: SystemTime,
    timeout: Duration,
) -> std::io::Result<Option<PathBuf>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(src) = newest_pdf(staging, since).await? {
            debug!("检测到下载文件: {}", src.display());
            return Ok(Some(move_artifact(&src, dest_dir, identifier).await));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        sleep(POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    #[test]
    fn test_artifact_stem_sanitizes() {
        assert_eq!(artifact_stem("24012345BKABCD1234"), "24012345BKABCD1234");
        assert_eq!(artifact_stem("../etc/passwd"), "___etc_passwd");
        assert_eq!(artifact_stem("  "), "document");
    }

    #[tokio::test]
    async fn test_partial_downloads_ignored() {
        let staging = tempfile::tempdir().unwrap();
        std::fs::write(staging.path().join("cert.pdf.crdownload"), b"...").unwrap();
        assert_eq!(newest_pdf(staging.path(), UNIX_EPOCH).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_staging_dir_is_empty() {
        let root = tempfile::tempdir().unwrap();
        let missing = root.path().join("nope");
        assert_eq!(newest_pdf(&missing, UNIX_EPOCH).await.unwrap(), None);
        assert_eq!(clear_staging(&missing).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_leftover_download_not_credited_to_next_udin() {
        let staging = tempfile::tempdir().unwrap();
        let downloads = tempfile::tempdir().unwrap();
        // 上一个 UDIN 超时后才下载完成的文件
        std::fs::write(staging.path().join("certificate_U1.pdf"), b"U1 body").unwrap();

        assert_eq!(clear_staging(staging.path()).await.unwrap(), 1);
        let found = wait_for_pdf(
            staging.path(),
            downloads.path(),
            "U2",
            SystemTime::now(),
            Duration::ZERO,
        )
        .await
        .unwrap();

        assert_eq!(found, None);
        assert!(!downloads.path().join("U2.pdf").exists());
    }

    #[tokio::test]
    async fn test_files_older_than_item_start_ignored() {
        let staging = tempfile::tempdir().unwrap();
        std::fs::write(staging.path().join("late.pdf"), b"U1 body").unwrap();

        let item_started = SystemTime::now() + Duration::from_secs(60);
        assert_eq!(newest_pdf(staging.path(), item_started).await.unwrap(), None);
        assert!(newest_pdf(staging.path(), UNIX_EPOCH).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_wait_for_pdf_moves_and_renames() {
        let staging = tempfile::tempdir().unwrap();
        let downloads = tempfile::tempdir().unwrap();
        std::fs::write(staging.path().join("Certificate.PDF"), b"%PDF-1.4").unwrap();

        let path = wait_for_pdf(
            staging.path(),
            downloads.path(),
            "U1",
            UNIX_EPOCH,
            Duration::from_secs(1),
        )
        .await
        .unwrap()
        .unwrap();

        assert_eq!(path, downloads.path().join("U1.pdf"));
        assert!(path.exists());
        assert_eq!(newest_pdf(staging.path(), UNIX_EPOCH).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_wait_for_pdf_times_out() {
        let staging = tempfile::tempdir().unwrap();
        let downloads = tempfile::tempdir().unwrap();
        let found = wait_for_pdf(
            staging.path(),
            downloads.path(),
            "U1",
            UNIX_EPOCH,
            Duration::from_millis(50),
        )
        .await
        .unwrap();
        assert_eq!(found, None);
    }
}
