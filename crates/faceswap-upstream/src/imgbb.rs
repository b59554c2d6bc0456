//! ImgBB image host client.
//!
//! ImgBB takes the API key and the image, either as a url-encoded base64
//! field or as a multipart file part, and answers with `{data: {url}, success}` or
//! `{error: {message}, success: false}`.

use crate::error::UpstreamError;
use async_trait::async_trait;
use faceswap_core::{HostedImageRef, NormalizedImage};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_IMGBB_ENDPOINT: &str = "https://api.imgbb.com/1/upload";

const SERVICE: &str = "ImgBB";

/// Stores images and returns public URLs for them.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(
        &self,
        api_key: &str,
        image: &NormalizedImage,
    ) -> Result<HostedImageRef, UpstreamError>;
}

/// How the image body is sent to ImgBB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadEncoding {
    /// `application/x-www-form-urlencoded` with `key` and `image` fields.
    #[default]
    Base64,
    /// `multipart/form-data`; the image goes as a file part.
    Multipart,
}

impl FromStr for UploadEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base64" | "form" => Ok(UploadEncoding::Base64),
            "multipart" => Ok(UploadEncoding::Multipart),
            other => Err(format!("unknown upload encoding '{other}' (expected base64 or multipart)")),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImgbbResponse {
    #[serde(default)]
    success: bool,
    data: Option<ImgbbData>,
    error: Option<ImgbbErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ImgbbData {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImgbbErrorBody {
    message: Option<String>,
}

/// reqwest-backed ImgBB client.
#[derive(Clone)]
pub struct ImgbbHost {
    client: reqwest::Client,
    endpoint: String,
    encoding: UploadEncoding,
    expiration_secs: Option<u64>,
}

impl ImgbbHost {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, encoding: UploadEncoding) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            encoding,
            expiration_secs: None,
        }
    }

    /// Ask ImgBB to delete uploads after `secs` seconds.
    pub fn with_expiration(mut self, secs: Option<u64>) -> Self {
        self.expiration_secs = secs;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Multipart body: `image` is a file part carrying the decoded bytes
    /// with the sniffed MIME type and file name.
    fn multipart_form(&self, api_key: &str, image: &NormalizedImage) -> Result<Form, UpstreamError> {
        let part = Part::bytes(image.bytes().to_vec())
            .file_name(image.file_name())
            .mime_str(image.mime_type())
            .map_err(|source| UpstreamError::Transport {
                service: SERVICE,
                source,
            })?;
        let form = Form::new().text("key", api_key.to_string()).part("image", part);
        Ok(match self.expiration_secs {
            Some(secs) => form.text("expiration", secs.to_string()),
            None => form,
        })
    }
}

#[async_trait]
impl ImageHost for ImgbbHost {
    #[tracing::instrument(skip_all, fields(encoding = ?self.encoding, bytes = image.byte_len()))]
    async fn upload(
        &self,
        api_key: &str,
        image: &NormalizedImage,
    ) -> Result<HostedImageRef, UpstreamError> {
        let request = self.client.post(&self.endpoint);
        let request = match self.encoding {
            UploadEncoding::Base64 => {
                let mut fields = vec![("key", api_key.to_string()), ("image", image.base64().to_string())];
                if let Some(secs) = self.expiration_secs {
                    fields.push(("expiration", secs.to_string()));
                }
                request.form(&fields)
            }
            UploadEncoding::Multipart => request.multipart(self.multipart_form(api_key, image)?),
        };

        tracing::debug!(endpoint = %self.endpoint, mime = image.mime_type(), "uploading to ImgBB");

        let response = request.send().await.map_err(|source| {
            tracing::error!(error = %source, "ImgBB request failed");
            UpstreamError::Transport {
                service: SERVICE,
                source,
            }
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|source| UpstreamError::Transport {
            service: SERVICE,
            source,
        })?;

        let result = parse_upload_response(status, &body);
        match &result {
            Ok(url) => tracing::info!(status = status.as_u16(), url = %url, "ImgBB upload completed"),
            Err(e) => tracing::warn!(status = status.as_u16(), error = %e, "ImgBB upload failed"),
        }
        result
    }
}

/// Interpret an ImgBB response.
pub fn parse_upload_response(status: StatusCode, body: &str) -> Result<HostedImageRef, UpstreamError> {
    let parsed = serde_json::from_str::<ImgbbResponse>(body);

    if !status.is_success() {
        let message = parsed
            .ok()
            .and_then(|r| r.error)
            .and_then(|e| e.message)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown error").to_string());
        return Err(UpstreamError::Http {
            service: SERVICE,
            status: status.as_u16(),
            message,
        });
    }

    let parsed = parsed.map_err(|e| UpstreamError::ShapeMismatch {
        service: SERVICE,
        detail: format!("body is not an upload response: {e}"),
    })?;

    if !parsed.success {
        return Err(UpstreamError::Rejected {
            service: SERVICE,
            message: parsed
                .error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "Upload failed".to_string()),
        });
    }

    parsed
        .data
        .and_then(|d| d.url)
        .filter(|url| !url.is_empty())
        .map(HostedImageRef::new)
        .ok_or(UpstreamError::ShapeMismatch {
            service: SERVICE,
            detail: "missing data.url".to_string(),
        })
}
