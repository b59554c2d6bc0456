//! Error taxonomy shared by the proxies.
//!
//! Every failure a proxy can hit is one of these variants; each carries
//! the HTTP status it is reported with and the message placed in the
//! `{success: false, error}` envelope.

use crate::payload::PayloadError;
use crate::types::ApiResponse;
use thiserror::Error;

/// Message used when an unexpected failure must not leak details to clients.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProxyError {
    /// A required input was absent. User-correctable.
    #[error("{0}")]
    InputMissing(String),
    /// Input was present but unusable (bad data URL, bad JSON body, ...).
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    /// Credentials or workflow identifier not configured. Operator-correctable.
    #[error("{0}")]
    ConfigMissing(String),
    /// The upstream service reported a failure; `message` is its own text.
    #[error("{message}")]
    Upstream { status: u16, message: String },
    /// The upstream answered with a body that does not match its contract.
    #[error("Unexpected upstream response: {0}")]
    UpstreamShapeMismatch(String),
    /// Anything else. The detail is logged, never returned.
    #[error("{}", INTERNAL_ERROR_MESSAGE)]
    Internal(String),
}

impl ProxyError {
    /// HTTP status the error is reported with.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::InputMissing(_) | ProxyError::InvalidInput(_) => 400,
            ProxyError::PayloadTooLarge(_) => 413,
            ProxyError::Upstream { status, .. } => *status,
            ProxyError::ConfigMissing(_)
            | ProxyError::UpstreamShapeMismatch(_)
            | ProxyError::Internal(_) => 500,
        }
    }

    /// Short machine-friendly name, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::InputMissing(_) => "input_missing",
            ProxyError::InvalidInput(_) => "invalid_input",
            ProxyError::PayloadTooLarge(_) => "payload_too_large",
            ProxyError::ConfigMissing(_) => "config_missing",
            ProxyError::Upstream { .. } => "upstream_failure",
            ProxyError::UpstreamShapeMismatch(_) => "upstream_shape_mismatch",
            ProxyError::Internal(_) => "internal_failure",
        }
    }

    pub fn to_response(&self) -> ApiResponse {
        ApiResponse::error(self.to_string())
    }
}

impl From<PayloadError> for ProxyError {
    fn from(err: PayloadError) -> Self {
        match err {
            PayloadError::Empty => ProxyError::InputMissing(err.to_string()),
            PayloadError::TooLarge { .. } => ProxyError::PayloadTooLarge(err.to_string()),
            PayloadError::MalformedDataUrl(_) | PayloadError::InvalidBase64(_) => {
                ProxyError::InvalidInput(err.to_string())
            }
        }
    }
}
