use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on a single image, matching the image host's own limit (32 MiB).
pub const MAX_IMAGE_BYTES: usize = 32 * 1024 * 1024;

/// An image as it arrives at the upload proxy.
///
/// Browsers post either a file part (raw bytes) or a text field holding a
/// `data:` URL or a bare base64 string. Both shapes are folded into the
/// same forwarding body by [`crate::payload::normalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImagePayload {
    /// Raw binary content (file part, fetched blob).
    Bytes(Vec<u8>),
    /// A `data:<mime>;base64,<body>` URL or a bare base64 string.
    Text(String),
}

impl ImagePayload {
    pub fn is_empty(&self) -> bool {
        match self {
            ImagePayload::Bytes(b) => b.is_empty(),
            ImagePayload::Text(s) => s.trim().is_empty(),
        }
    }
}

/// Public URL of an image stored by the external host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostedImageRef(String);

impl HostedImageRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for HostedImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters of one face-swap workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowRequest {
    /// Image providing the face.
    pub face_image: String,
    /// Image whose face gets replaced.
    pub base_image: String,
}

impl WorkflowRequest {
    pub fn new(face: &HostedImageRef, base: &HostedImageRef) -> Self {
        Self {
            face_image: face.as_str().to_string(),
            base_image: base.as_str().to_string(),
        }
    }
}

/// Output of a workflow run.
///
/// The URL belongs to the workflow provider and carries no durability
/// guarantee; callers re-host it before showing it to anyone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub output: String,
}

/// JSON envelope returned by every proxy endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn ok(url: impl Into<String>) -> Self {
        Self {
            success: true,
            url: Some(url.into()),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            url: None,
            error: Some(message.into()),
        }
    }
}
