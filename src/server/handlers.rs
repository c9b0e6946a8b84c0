use std::path::{Path as FsPath, PathBuf};

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::AppState;
use crate::error::{AppError, AppResult, FileError};
use crate::job::{Delivery, GateKind};
use crate::models::FormValues;
use crate::orchestrator::JobManager;
use crate::relay::{self, RelayMessage};
use crate::utils::logging::short_id;

const INDEX_HTML: &str = include_str!("../../assets/index.html");
const STATUS_HTML: &str = include_str!("../../assets/status.html");

fn json_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// 宽松解析 JSON：不要求 Content-Type，解析失败视为空对象
fn lenient_json(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

/// 取出字段的非空文本，数字也接受
fn text_field(body: &Bytes, key: &str) -> Option<String> {
    let text = match lenient_json(body).get(key)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

pub(super) async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub(super) async fn upload(State(state): State<AppState>, mut multipart: Multipart) -> Response {
    let manager = &state.manager;
    let job_id = JobManager::new_job_id();
    let mut values = FormValues::from_config(manager.config());
    let mut saved: Option<PathBuf> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("⚠️ 解析上传表单失败: {}", e);
                return (e.status(), e.body_text()).into_response();
            }
        };

        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let original = field.file_name().unwrap_or_default().to_string();
            let data = match field.bytes().await {
                Ok(data) => data,
                Err(e) => return (e.status(), e.body_text()).into_response(),
            };
            // 未选择文件时浏览器仍会提交一个空的 file 字段
            if original.is_empty() && data.is_empty() {
                continue;
            }
            match save_upload(&manager.config().upload_dir, &job_id, &original, &data).await {
                Ok(path) => saved = Some(path),
                Err(e) => {
                    error!("❌ 保存上传文件失败: {}", e);
                    return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
                }
            }
        } else if let Ok(text) = field.text().await {
            values.set(&name, text);
        }
    }

    let Some(path) = saved else {
        return (StatusCode::BAD_REQUEST, "No file uploaded").into_response();
    };

    info!(
        "[任务 {}] 📤 收到表格: {}",
        short_id(&job_id),
        path.display()
    );
    manager.start_job(&job_id, path, values);
    Redirect::to(&format!("/status/{}", job_id)).into_response()
}

/// 保存为 `<upload_dir>/<job_id>_<安全文件名>`
async fn save_upload(dir: &FsPath, job_id: &str, original: &str, data: &[u8]) -> AppResult<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| AppError::file_write_failed(dir.display().to_string(), e))?;
    let path = dir.join(format!("{}_{}", job_id, sanitize_filename(original)));
    tokio::fs::write(&path, data)
        .await
        .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;
    Ok(path)
}

/// 只保留字母、数字、`.`、`-`、`_`，去掉开头的点
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload.xlsx".to_string()
    } else {
        cleaned.to_string()
    }
}

pub(super) async fn status_page(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    if state.manager.snapshot(&job_id).is_err() {
        return (StatusCode::NOT_FOUND, "Unknown job").into_response();
    }
    Html(STATUS_HTML.replace("{{job_id}}", &job_id)).into_response()
}

pub(super) async fn job_info(State(state): State<AppState>, Path(job_id): Path<String>) -> Response {
    match state.manager.snapshot(&job_id) {
        Ok(record) => Json(record).into_response(),
        Err(_) => json_error(StatusCode::NOT_FOUND, "job not found"),
    }
}

/// 投递到闸门并转成 HTTP 响应
fn deliver(state: &AppState, job_id: &str, kind: GateKind, value: String, ok: Value) -> Response {
    match state.manager.supply(job_id, kind, value) {
        Ok(Delivery::Delivered) => {
            info!("[任务 {}] ⌨️ 收到 {} 输入", short_id(job_id), kind.label());
            Json(ok).into_response()
        }
        Ok(Delivery::NoOpenWindow) => {
            warn!(
                "[任务 {}] ⚠️ 收到 {} 输入，但当前没有等待窗口",
                short_id(job_id),
                kind.label()
            );
            Json(json!({ "status": "no_open_window" })).into_response()
        }
        Err(_) => json_error(StatusCode::NOT_FOUND, "worker not found"),
    }
}

pub(super) async fn submit_captcha(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    body: Bytes,
) -> Response {
    let Some(value) = text_field(&body, "captcha") else {
        return json_error(StatusCode::BAD_REQUEST, "no captcha");
    };
    deliver(&state, &job_id, GateKind::Captcha, value, json!({ "status": "ok" }))
}

pub(super) async fn submit_otp_mobile(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    body: Bytes,
) -> Response {
    submit_otp(&state, &job_id, &body, GateKind::MobileOtp)
}

pub(super) async fn submit_otp_email(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    body: Bytes,
) -> Response {
    submit_otp(&state, &job_id, &body, GateKind::EmailOtp)
}

fn submit_otp(state: &AppState, job_id: &str, body: &Bytes, kind: GateKind) -> Response {
    let Some(value) = text_field(body, "otp") else {
        return json_error(
            StatusCode::BAD_REQUEST,
            &format!("no {} otp", kind.label()),
        );
    };
    deliver(
        state,
        job_id,
        kind,
        value,
        json!({ "status": "ok", "type": kind.label() }),
    )
}

pub(super) async fn receive_otp(State(state): State<AppState>, body: Bytes) -> Response {
    let message: RelayMessage = serde_json::from_slice(&body).unwrap_or_default();
    Json(relay::route(&state.manager, &message)).into_response()
}

/// 在下载目录中定位文件，拒绝任何带路径成分的名字
pub async fn resolve_artifact(dir: &FsPath, filename: &str) -> Result<PathBuf, FileError> {
    if filename.is_empty() || filename.contains(['/', '\\']) || filename.contains("..") {
        return Err(FileError::InvalidName {
            name: filename.to_string(),
        });
    }

    let path = dir.join(filename);
    let is_file = tokio::fs::metadata(&path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false);
    if !is_file {
        return Err(FileError::NotFound {
            path: filename.to_string(),
        });
    }
    Ok(path)
}

pub(super) async fn download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Response {
    let path = match resolve_artifact(&state.manager.config().download_dir, &filename).await {
        Ok(path) => path,
        Err(e @ FileError::InvalidName { .. }) => {
            warn!("⚠️ 拒绝下载请求: {}", e);
            return json_error(StatusCode::BAD_REQUEST, &e.to_string());
        }
        Err(e) => return json_error(StatusCode::NOT_FOUND, &e.to_string()),
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => {
            let content_type = if filename.to_ascii_lowercase().ends_with(".pdf") {
                "application/pdf"
            } else {
                "application/octet-stream"
            };
            (
                [
                    (header::CONTENT_TYPE, content_type.to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", filename),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            error!("❌ 读取 {} 失败: {}", path.display(), e);
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "read failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("udins.xlsx"), "udins.xlsx");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\tmp\\my list (1).xlsx"), "my_list__1_.xlsx");
        assert_eq!(sanitize_filename("..."), "upload.xlsx");
    }

    #[test]
    fn test_text_field_is_lenient() {
        assert_eq!(
            text_field(&Bytes::from_static(br#"{"otp": 4821}"#), "otp"),
            Some("4821".to_string())
        );
        assert_eq!(
            text_field(&Bytes::from_static(br#"{"captcha": "  "}"#), "captcha"),
            None
        );
        assert_eq!(text_field(&Bytes::from_static(b"not json"), "otp"), None);
    }

    #[tokio::test]
    async fn test_resolve_artifact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("U1.pdf"), b"%PDF-1.4").unwrap();
        std::fs::create_dir(dir.path().join(".staging")).unwrap();

        assert_eq!(
            resolve_artifact(dir.path(), "U1.pdf").await.unwrap(),
            dir.path().join("U1.pdf")
        );
        assert!(matches!(
            resolve_artifact(dir.path(), "../U1.pdf").await,
            Err(FileError::InvalidName { .. })
        ));
        assert!(matches!(
            resolve_artifact(dir.path(), "a\\b.pdf").await,
            Err(FileError::InvalidName { .. })
        ));
        assert!(matches!(
            resolve_artifact(dir.path(), "missing.pdf").await,
            Err(FileError::NotFound { .. })
        ));
        // 目录不能被下载
        assert!(matches!(
            resolve_artifact(dir.path(), ".staging").await,
            Err(FileError::NotFound { .. })
        ));
    }
}
