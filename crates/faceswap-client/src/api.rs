//! HTTP client for the faceswapd proxies.
//!
//! The [`FaceSwapApi`] trait is the seam the orchestrator runs against;
//! [`HttpFaceSwapApi`] is the reqwest implementation.

use async_trait::async_trait;
use faceswap_core::{ApiResponse, HostedImageRef, ImagePayload, WorkflowRequest, WorkflowResult};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    /// The daemon answered with `{success: false, error}`.
    #[error("{message}")]
    Rejected { status: u16, message: String },
    /// Non-success status without a usable envelope.
    #[error("HTTP {status}: {reason}")]
    Status { status: u16, reason: String },
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ClientError {
    /// Error text supplied by the daemon, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            ClientError::Rejected { message, .. } => Some(message.as_str()),
            _ => None,
        }
    }

    /// HTTP status of the failed exchange, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Rejected { status, .. } | ClientError::Status { status, .. } => Some(*status),
            ClientError::Transport(e) => e.status().map(|s| s.as_u16()),
            ClientError::Malformed(_) => None,
        }
    }
}

/// Operations the orchestrator needs.
#[async_trait]
pub trait FaceSwapApi: Send + Sync {
    /// Store an image through the upload proxy.
    async fn upload(&self, payload: ImagePayload) -> Result<HostedImageRef, ClientError>;

    /// Run the face-swap workflow through the workflow proxy.
    async fn swap(&self, request: &WorkflowRequest) -> Result<WorkflowResult, ClientError>;

    /// Download raw bytes from an arbitrary URL.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ClientError>;
}

/// reqwest client bound to one faceswapd base URL.
#[derive(Clone)]
pub struct HttpFaceSwapApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFaceSwapApi {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Daemon status document (`GET /api/status`).
    pub async fn status(&self) -> Result<serde_json::Value, ClientError> {
        let response = self.client.get(self.endpoint("/api/status")).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl FaceSwapApi for HttpFaceSwapApi {
    async fn upload(&self, payload: ImagePayload) -> Result<HostedImageRef, ClientError> {
        let part = match payload {
            // A file name makes the daemon treat the part as raw bytes.
            ImagePayload::Bytes(bytes) => Part::bytes(bytes).file_name("blob"),
            ImagePayload::Text(text) => Part::text(text),
        };
        let form = Form::new().part("image", part);

        tracing::debug!(url = %self.endpoint("/api/upload"), "uploading image");
        let response = self
            .client
            .post(self.endpoint("/api/upload"))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        read_envelope(status, &body).map(HostedImageRef::new)
    }

    async fn swap(&self, request: &WorkflowRequest) -> Result<WorkflowResult, ClientError> {
        tracing::debug!(
            face_image = %request.face_image,
            base_image = %request.base_image,
            "requesting face swap"
        );
        let response = self
            .client
            .post(self.endpoint("/api/coze"))
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        read_envelope(status, &body).map(|output| WorkflowResult { output })
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ClientError> {
        tracing::debug!(url, "fetching image");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Extract the URL from a proxy envelope.
///
/// A successful exchange needs both a 2xx status and `success: true` with a
/// URL; otherwise the daemon's error text is preferred over the bare status.
pub fn read_envelope(status: StatusCode, body: &str) -> Result<String, ClientError> {
    let envelope = serde_json::from_str::<ApiResponse>(body).ok();

    match envelope {
        Some(ApiResponse {
            success: true,
            url: Some(url),
            ..
        }) if status.is_success() => Ok(url),
        Some(ApiResponse {
            error: Some(message),
            ..
        }) => Err(ClientError::Rejected {
            status: status.as_u16(),
            message,
        }),
        Some(_) if status.is_success() => Err(ClientError::Malformed(
            "envelope without url or error".to_string(),
        )),
        _ if status.is_success() => Err(ClientError::Malformed(format!(
            "expected a JSON envelope, got {} bytes",
            body.len()
        ))),
        _ => Err(status_error(status)),
    }
}

fn status_error(status: StatusCode) -> ClientError {
    ClientError::Status {
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
    }
}
