use crate::config::{Config, Secret};
use faceswap_core::{
    normalize, HostedImageRef, ImagePayload, ProxyError, WorkflowRequest, WorkflowResult,
};
use faceswap_upstream::{ImageHost, UpstreamError, WorkflowEngine};
use std::sync::Arc;

/// Forwards one image to the image host with the server-held key.
pub struct UploadProxy {
    host: Arc<dyn ImageHost>,
    api_key: Option<Secret>,
    max_bytes: usize,
}

impl UploadProxy {
    pub fn new(config: &Config, host: Arc<dyn ImageHost>) -> Self {
        Self {
            host,
            api_key: config.imgbb.api_key.clone(),
            max_bytes: config.max_upload_bytes,
        }
    }

    /// Normalize `payload` and store it on the host.
    ///
    /// Checks run in order: image present, credential configured, payload
    /// well-formed. Nothing leaves the process until all three pass.
    pub async fn upload(&self, payload: Option<ImagePayload>) -> Result<HostedImageRef, ProxyError> {
        let payload = payload
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ProxyError::InputMissing("No image provided".to_string()))?;

        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProxyError::ConfigMissing("API key not configured".to_string()))?;

        let image = normalize(payload, self.max_bytes)?;
        tracing::debug!(
            bytes = image.byte_len(),
            mime = image.mime_type(),
            "image normalized"
        );

        self.host
            .upload(api_key.expose(), &image)
            .await
            .map_err(upload_error)
    }
}

/// Upload failures keep the host's HTTP status; everything else is a 500.
fn upload_error(err: UpstreamError) -> ProxyError {
    tracing::debug!(service = err.service(), error = %err, "upload forwarding failed");
    match err {
        UpstreamError::Http {
            status, message, ..
        } => ProxyError::Upstream {
            status,
            message: format!("ImgBB API error: {message}"),
        },
        UpstreamError::Rejected { message, .. } => ProxyError::Upstream {
            status: 500,
            message,
        },
        UpstreamError::ShapeMismatch { detail, .. } => ProxyError::UpstreamShapeMismatch(detail),
        err @ UpstreamError::Transport { .. } => ProxyError::Internal(err.to_string()),
    }
}

/// Runs the face-swap workflow with the server-held credentials.
pub struct WorkflowProxy {
    engine: Arc<dyn WorkflowEngine>,
    api_key: Option<Secret>,
    workflow_id: Option<String>,
}

impl WorkflowProxy {
    pub fn new(config: &Config, engine: Arc<dyn WorkflowEngine>) -> Self {
        Self {
            engine,
            api_key: config.coze.api_key.clone(),
            workflow_id: config.coze.workflow_id.clone(),
        }
    }

    /// Swap the face of `face_image` onto `base_image`. Both are hosted URLs.
    pub async fn swap(
        &self,
        face_image: Option<String>,
        base_image: Option<String>,
    ) -> Result<WorkflowResult, ProxyError> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let (Some(face_image), Some(base_image)) = (non_empty(face_image), non_empty(base_image))
        else {
            return Err(ProxyError::InputMissing(
                "Missing required parameters".to_string(),
            ));
        };

        let (Some(api_key), Some(workflow_id)) = (&self.api_key, &self.workflow_id) else {
            return Err(ProxyError::ConfigMissing(
                "API configuration missing".to_string(),
            ));
        };

        let request = WorkflowRequest {
            face_image,
            base_image,
        };
        self.engine
            .run(api_key.expose(), workflow_id, &request)
            .await
            .map_err(workflow_error)
    }
}

/// Workflow failures are all reported as 500, carrying the upstream text.
fn workflow_error(err: UpstreamError) -> ProxyError {
    tracing::debug!(service = err.service(), error = %err, "workflow run failed");
    match err {
        UpstreamError::Http { message, .. } | UpstreamError::Rejected { message, .. } => {
            ProxyError::Upstream {
                status: 500,
                message,
            }
        }
        UpstreamError::ShapeMismatch { detail, .. } => ProxyError::UpstreamShapeMismatch(detail),
        err @ UpstreamError::Transport { .. } => ProxyError::Internal(err.to_string()),
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    //! In-process stand-ins for the external services.

    use async_trait::async_trait;
    use faceswap_core::{HostedImageRef, NormalizedImage, WorkflowRequest, WorkflowResult};
    use faceswap_upstream::{ImageHost, UpstreamError, WorkflowEngine};
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records every forwarded base64 body and answers with a fixed outcome.
    #[derive(Clone, Default)]
    pub struct FakeHost {
        pub forwarded: Arc<Mutex<Vec<(String, String)>>>,
        failure: Option<(u16, &'static str, bool)>,
    }

    impl FakeHost {
        /// Fail with an HTTP error (`http = true`) or a `success: false` body.
        pub fn failing(status: u16, message: &'static str, http: bool) -> Self {
            Self {
                failure: Some((status, message, http)),
                ..Self::default()
            }
        }

        pub fn calls(&self) -> usize {
            self.forwarded.lock().len()
        }
    }

    #[async_trait]
    impl ImageHost for FakeHost {
        async fn upload(
            &self,
            api_key: &str,
            image: &NormalizedImage,
        ) -> Result<HostedImageRef, UpstreamError> {
            let n = {
                let mut forwarded = self.forwarded.lock();
                forwarded.push((api_key.to_string(), image.base64().to_string()));
                forwarded.len()
            };
            match self.failure {
                Some((status, message, true)) => Err(UpstreamError::Http {
                    service: "ImgBB",
                    status,
                    message: message.to_string(),
                }),
                Some((_, message, false)) => Err(UpstreamError::Rejected {
                    service: "ImgBB",
                    message: message.to_string(),
                }),
                None => Ok(HostedImageRef::new(format!("https://i.ibb.co/fake/{n}.png"))),
            }
        }
    }

    /// Records workflow calls and replays a scripted outcome.
    #[derive(Clone)]
    pub struct FakeEngine {
        pub calls: Arc<Mutex<Vec<(String, String, WorkflowRequest)>>>,
        outcome: Arc<dyn Fn() -> Result<WorkflowResult, UpstreamError> + Send + Sync>,
    }

    impl FakeEngine {
        pub fn returning(output: &'static str) -> Self {
            Self::with(move || {
                Ok(WorkflowResult {
                    output: output.to_string(),
                })
            })
        }

        pub fn with(
            outcome: impl Fn() -> Result<WorkflowResult, UpstreamError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                calls: Arc::new(Mutex::new(Vec::new())),
                outcome: Arc::new(outcome),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().len()
        }
    }

    #[async_trait]
    impl WorkflowEngine for FakeEngine {
        async fn run(
            &self,
            api_key: &str,
            workflow_id: &str,
            request: &WorkflowRequest,
        ) -> Result<WorkflowResult, UpstreamError> {
            self.calls
                .lock()
                .push((api_key.to_string(), workflow_id.to_string(), request.clone()));
            (self.outcome)()
        }
    }
}
