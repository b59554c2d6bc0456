use crate::config::Config;
use crate::proxy::{UploadProxy, WorkflowProxy};
use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use faceswap_core::{ApiResponse, ImagePayload, ProxyError};
use faceswap_upstream::{ImageHost, WorkflowEngine};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Instrument;

/// Multipart form field carrying the image.
const IMAGE_FIELD: &str = "image";

/// Extra room on top of the image cap for multipart framing.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Shared handler state. Everything in here is immutable after startup.
#[derive(Clone)]
pub struct AppState {
    upload: Arc<UploadProxy>,
    workflow: Arc<WorkflowProxy>,
    status: Arc<StatusInfo>,
}

impl AppState {
    pub fn new(config: &Config, host: Arc<dyn ImageHost>, engine: Arc<dyn WorkflowEngine>) -> Self {
        Self {
            upload: Arc::new(UploadProxy::new(config, host)),
            workflow: Arc::new(WorkflowProxy::new(config, engine)),
            status: Arc::new(StatusInfo {
                version: env!("CARGO_PKG_VERSION"),
                started_at: Utc::now(),
                image_host_configured: config.image_host_configured(),
                workflow_configured: config.workflow_configured(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct StatusInfo {
    version: &'static str,
    started_at: DateTime<Utc>,
    image_host_configured: bool,
    workflow_configured: bool,
}

#[derive(Debug, Deserialize)]
struct SwapBody {
    face_image: Option<String>,
    base_image: Option<String>,
}

/// Request body cap: a base64 text field is a third larger than the image.
pub fn body_limit(max_upload_bytes: usize) -> usize {
    (max_upload_bytes / 3)
        .saturating_mul(4)
        .saturating_add(MULTIPART_OVERHEAD)
}

pub fn router(state: AppState, body_limit: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/upload", post(upload))
        .route("/api/coze", post(coze))
        .route("/api/status", get(status))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(trace_request))
        .with_state(state)
}

/// Tag each request with an id, log its outcome, echo the id back.
async fn trace_request(request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!(
        "request",
        %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    async move {
        let started = std::time::Instant::now();
        let mut response = next.run(request).await;
        tracing::info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request completed"
        );
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert("x-request-id", value);
        }
        response
    }
    .instrument(span)
    .await
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

async fn status(State(state): State<AppState>) -> Json<StatusInfo> {
    Json(StatusInfo::clone(&state.status))
}

async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let result: Result<_, ProxyError> = async {
        let multipart = multipart.map_err(|e| {
            ProxyError::InvalidInput(format!("Expected multipart/form-data body: {}", e.body_text()))
        })?;
        let payload = read_image_field(multipart).await?;
        state.upload.upload(payload).await
    }
    .await;

    envelope(result.map(|url| url.into_string()))
}

async fn coze(State(state): State<AppState>, body: Bytes) -> Response {
    let result: Result<_, ProxyError> = async {
        let body: SwapBody = serde_json::from_slice(&body)
            .map_err(|e| ProxyError::InvalidInput(format!("Invalid request body: {e}")))?;
        state.workflow.swap(body.face_image, body.base_image).await
    }
    .await;

    envelope(result.map(|r| r.output))
}

/// Pull the `image` field out of the form.
///
/// File parts (anything with a filename or content type, e.g. a browser
/// `Blob`) are raw bytes; plain text fields hold a data URL or base64.
async fn read_image_field(mut multipart: Multipart) -> Result<Option<ImagePayload>, ProxyError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let is_file = field.file_name().is_some() || field.content_type().is_some();
        let payload = if is_file {
            ImagePayload::Bytes(field.bytes().await.map_err(multipart_error)?.to_vec())
        } else {
            ImagePayload::Text(field.text().await.map_err(multipart_error)?)
        };
        return Ok(Some(payload));
    }
    Ok(None)
}

fn multipart_error(err: MultipartError) -> ProxyError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ProxyError::PayloadTooLarge("Image exceeds size limit".to_string())
    } else {
        ProxyError::InvalidInput(format!("Malformed multipart body: {}", err.body_text()))
    }
}

/// Fold a proxy outcome into the JSON envelope and its status code.
fn envelope(result: Result<String, ProxyError>) -> Response {
    match result {
        Ok(url) => (StatusCode::OK, Json(ApiResponse::ok(url))).into_response(),
        Err(err) => {
            let status =
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            match &err {
                ProxyError::Internal(detail) => {
                    tracing::error!(kind = err.kind(), detail = %detail, "request failed")
                }
                _ if status.is_server_error() => {
                    tracing::error!(kind = err.kind(), error = %err, "request failed")
                }
                _ => tracing::warn!(kind = err.kind(), error = %err, "request rejected"),
            }
            (status, Json(err.to_response())).into_response()
        }
    }
}
