use thiserror::Error;

/// Failure talking to an external service.
///
/// `message` fields hold the service's own wording when it supplied one,
/// so proxies can surface it unchanged.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("{service} returned HTTP {status}: {message}")]
    Http {
        service: &'static str,
        status: u16,
        message: String,
    },
    #[error("{service} rejected the request: {message}")]
    Rejected {
        service: &'static str,
        message: String,
    },
    #[error("{service} response did not match its contract: {detail}")]
    ShapeMismatch {
        service: &'static str,
        detail: String,
    },
    #[error("{service} request failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl UpstreamError {
    pub fn service(&self) -> &'static str {
        match self {
            UpstreamError::Http { service, .. }
            | UpstreamError::Rejected { service, .. }
            | UpstreamError::ShapeMismatch { service, .. }
            | UpstreamError::Transport { service, .. } => service,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_names_the_failing_upstream() {
        let err = UpstreamError::Rejected {
            service: "ImgBB",
            message: "Upload failed".into(),
        };
        assert_eq!(err.service(), "ImgBB");

        let err = UpstreamError::ShapeMismatch {
            service: "Coze",
            detail: "missing data".into(),
        };
        assert_eq!(err.service(), "Coze");
    }
}
