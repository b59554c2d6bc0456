//! faceswap-core — Shared data model for the face-swap proxies.
//!
//! Defines the transient image payloads that travel through the upload
//! proxy, the references handed back by the image host, the workflow
//! request/result pair, and the error taxonomy every proxy response is
//! folded into.

pub mod error;
pub mod payload;
pub mod types;

pub use error::ProxyError;
pub use payload::{normalize, NormalizedImage, PayloadError};
pub use types::{
    ApiResponse, HostedImageRef, ImagePayload, WorkflowRequest, WorkflowResult, MAX_IMAGE_BYTES,
};
