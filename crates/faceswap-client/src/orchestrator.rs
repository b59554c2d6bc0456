//! Drives one face-swap run: upload both images, invoke the workflow,
//! then move the result onto the image host.

use crate::api::{ClientError, FaceSwapApi};
use crate::session::{Phase, Session, SELECT_BOTH};
use faceswap_core::{HostedImageRef, ImagePayload, WorkflowRequest, WorkflowResult};
use thiserror::Error;

const PROCESS_FAILED: &str = "Process failed";

#[derive(Error, Debug)]
pub enum RehostError {
    #[error("Failed to fetch result image: {0}")]
    Fetch(#[source] ClientError),
    #[error("Failed to upload result image: {0}")]
    Upload(#[source] ClientError),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Please select both images first")]
    MissingSelection,
    #[error("upload failed: {0}")]
    Upload(#[source] ClientError),
    #[error("workflow failed: {0}")]
    Workflow(#[source] ClientError),
    #[error(transparent)]
    Rehost(#[from] RehostError),
}

impl PipelineError {
    /// Text shown to the user. The daemon's own error wins when it sent one.
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::MissingSelection => SELECT_BOTH.to_string(),
            PipelineError::Upload(ClientError::Status { reason, .. }) => {
                format!("Upload failed: {reason}")
            }
            PipelineError::Upload(e) => fallback(e, "Upload failed"),
            PipelineError::Workflow(e) => fallback(e, "Coze API call failed"),
            PipelineError::Rehost(RehostError::Fetch(e)) => {
                fallback(e, "Failed to fetch result image")
            }
            PipelineError::Rehost(RehostError::Upload(e)) => {
                fallback(e, "Failed to upload result image")
            }
        }
    }
}

fn fallback(error: &ClientError, default: &str) -> String {
    match error {
        ClientError::Rejected { message, .. } => message.clone(),
        // Never reached the daemon; no stage-specific text applies.
        ClientError::Transport(_) => PROCESS_FAILED.to_string(),
        _ => default.to_string(),
    }
}

/// Download a workflow output and store it on the image host.
pub async fn rehost<A>(api: &A, result: &WorkflowResult) -> Result<HostedImageRef, RehostError>
where
    A: FaceSwapApi + ?Sized,
{
    let bytes = api.fetch(&result.output).await.map_err(RehostError::Fetch)?;
    tracing::debug!(source = %result.output, bytes = bytes.len(), "result image fetched");
    api.upload(ImagePayload::Bytes(bytes))
        .await
        .map_err(RehostError::Upload)
}

type ProgressFn = Box<dyn Fn(Phase) + Send + Sync>;

/// Returns a session to `Idle` if its run is dropped before finishing.
struct InFlight<'a>(&'a mut Session);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.0.is_loading() {
            tracing::debug!(phase = ?self.0.phase(), "swap abandoned");
            self.0.enter(Phase::Idle);
        }
    }
}

/// Runs the swap pipeline against a [`FaceSwapApi`].
pub struct Orchestrator<A> {
    api: A,
    progress: Option<ProgressFn>,
}

impl<A: FaceSwapApi> Orchestrator<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            progress: None,
        }
    }

    /// Call `f` every time the run changes phase.
    pub fn with_progress(mut self, f: impl Fn(Phase) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    /// Run the full pipeline for the images selected in `session`.
    ///
    /// The outcome is also recorded on the session: the final URL on
    /// success, the user-facing message on failure. Either way the session
    /// is left ready for another submission. Dropping the future mid-run
    /// puts the session back to `Idle`.
    pub async fn run(&self, session: &mut Session) -> Result<HostedImageRef, PipelineError> {
        let Some((face, base)) = session.begin() else {
            session.fail(SELECT_BOTH.to_string());
            self.report(Phase::Error);
            return Err(PipelineError::MissingSelection);
        };
        self.report(Phase::Uploading);

        let mut flight = InFlight(session);
        let session = &mut *flight.0;
        let outcome = self.drive(session, face, base).await;
        match outcome {
            Ok(url) => {
                tracing::info!(url = %url, "face swap complete");
                session.finish(url.clone());
                self.report(Phase::Done);
                Ok(url)
            }
            Err(e) => {
                tracing::warn!(error = %e, "face swap failed");
                session.fail(e.user_message());
                self.report(Phase::Error);
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        session: &mut Session,
        face: ImagePayload,
        base: ImagePayload,
    ) -> Result<HostedImageRef, PipelineError> {
        let start = std::time::Instant::now();

        // Both uploads in flight together; the first failure wins.
        let (face_url, base_url) = tokio::try_join!(self.api.upload(face), self.api.upload(base))
            .map_err(PipelineError::Upload)?;
        tracing::info!(
            face = %face_url,
            base = %base_url,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "images uploaded"
        );

        let request = WorkflowRequest::new(&face_url, &base_url);
        session.record_uploads(face_url, base_url);
        self.report(Phase::Invoking);

        let result = self
            .api
            .swap(&request)
            .await
            .map_err(PipelineError::Workflow)?;
        tracing::info!(output = %result.output, "workflow finished");

        session.enter(Phase::Rehosting);
        self.report(Phase::Rehosting);
        let url = rehost(&self.api, &result).await?;
        tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "result re-hosted");
        Ok(url)
    }

    fn report(&self, phase: Phase) {
        if let Some(f) = &self.progress {
            f(phase);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::CountingPreviews;
    use crate::session::{SelectedImage, Slot};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Upload(Vec<u8>),
        Swap(WorkflowRequest),
        Fetch(String),
    }

    /// In-memory API: uploads are numbered, swaps return a fixed output.
    #[derive(Default)]
    struct FakeApi {
        calls: Mutex<Vec<Call>>,
        fail_upload_of: Option<Vec<u8>>,
        swap_error: Option<ClientError>,
        fetch_fails: bool,
        hang_uploads: bool,
        barrier: Option<Arc<tokio::sync::Barrier>>,
    }

    impl FakeApi {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }
    }

    fn rejected(status: u16, message: &str) -> ClientError {
        ClientError::Rejected {
            status,
            message: message.to_string(),
        }
    }

    #[async_trait]
    impl FaceSwapApi for FakeApi {
        async fn upload(&self, payload: ImagePayload) -> Result<HostedImageRef, ClientError> {
            let ImagePayload::Bytes(bytes) = payload else {
                return Err(ClientError::Malformed("text payload".into()));
            };
            let n = {
                let mut calls = self.calls.lock();
                calls.push(Call::Upload(bytes.clone()));
                calls.len()
            };
            if self.hang_uploads {
                std::future::pending::<()>().await;
            }
            // Only the two user images take part in the rendezvous.
            if let Some(barrier) = self.barrier.as_ref().filter(|_| bytes != b"swapped") {
                barrier.wait().await;
            }
            if self.fail_upload_of.as_ref() == Some(&bytes) {
                return Err(rejected(400, "Invalid image"));
            }
            Ok(HostedImageRef::new(format!("https://i.ibb.co/up/{n}.png")))
        }

        async fn swap(&self, request: &WorkflowRequest) -> Result<WorkflowResult, ClientError> {
            self.calls.lock().push(Call::Swap(request.clone()));
            if let Some(e) = &self.swap_error {
                return Err(match e {
                    ClientError::Rejected { status, message } => rejected(*status, message),
                    _ => ClientError::Status {
                        status: 500,
                        reason: "Internal Server Error".into(),
                    },
                });
            }
            Ok(WorkflowResult {
                output: "https://s.coze.cn/out.png".into(),
            })
        }

        async fn fetch(&self, url: &str) -> Result<Vec<u8>, ClientError> {
            self.calls.lock().push(Call::Fetch(url.to_string()));
            if self.fetch_fails {
                return Err(ClientError::Status {
                    status: 404,
                    reason: "Not Found".into(),
                });
            }
            Ok(b"swapped".to_vec())
        }
    }

    fn ready_session() -> Session {
        let mut session = Session::new(Arc::new(CountingPreviews::default()));
        session
            .select(Slot::Face, SelectedImage::new("face.png", b"face".to_vec()))
            .unwrap();
        session
            .select(Slot::Base, SelectedImage::new("base.png", b"base".to_vec()))
            .unwrap();
        session
    }

    #[tokio::test]
    async fn test_pipeline_happy_path_order() {
        let orchestrator = Orchestrator::new(FakeApi::default());
        let mut session = ready_session();

        let url = orchestrator.run(&mut session).await.unwrap();

        let calls = orchestrator.api().calls();
        assert_eq!(calls.len(), 5);
        let first_two = &calls[..2];
        assert!(first_two.contains(&Call::Upload(b"face".to_vec())));
        assert!(first_two.contains(&Call::Upload(b"base".to_vec())));

        let Call::Swap(request) = &calls[2] else {
            panic!("expected swap, got {:?}", calls[2]);
        };
        let (face_url, base_url) = session.uploaded().unwrap();
        assert_eq!(request.face_image, face_url.as_str());
        assert_eq!(request.base_image, base_url.as_str());

        assert_eq!(calls[3], Call::Fetch("https://s.coze.cn/out.png".into()));
        assert_eq!(calls[4], Call::Upload(b"swapped".to_vec()));

        assert_eq!(url.as_str(), "https://i.ibb.co/up/5.png");
        assert_eq!(session.result_url(), Some(&url));
        assert_eq!(session.phase(), Phase::Done);
        assert!(session.error().is_none());
    }

    #[tokio::test]
    async fn test_uploads_run_concurrently() {
        // Each upload waits for the other; sequential uploads would hang.
        let api = FakeApi {
            barrier: Some(Arc::new(tokio::sync::Barrier::new(2))),
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(api);
        let mut session = ready_session();

        let outcome =
            tokio::time::timeout(Duration::from_secs(5), orchestrator.run(&mut session)).await;
        assert!(matches!(outcome, Ok(Ok(_))), "uploads did not overlap");
    }

    #[tokio::test]
    async fn test_upload_failure_skips_workflow() {
        let api = FakeApi {
            fail_upload_of: Some(b"base".to_vec()),
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(api);
        let mut session = ready_session();

        let err = orchestrator.run(&mut session).await.unwrap_err();

        assert!(matches!(err, PipelineError::Upload(_)));
        assert!(!orchestrator
            .api()
            .calls()
            .iter()
            .any(|c| matches!(c, Call::Swap(_) | Call::Fetch(_))));
        assert_eq!(session.error(), Some("Invalid image"));
        assert_eq!(session.phase(), Phase::Error);
        assert!(session.can_submit());
    }

    #[tokio::test]
    async fn test_workflow_error_surfaces_verbatim() {
        let api = FakeApi {
            swap_error: Some(rejected(500, "Workflow execution failed")),
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(api);
        let mut session = ready_session();

        orchestrator.run(&mut session).await.unwrap_err();

        assert_eq!(session.error(), Some("Workflow execution failed"));
        assert!(session.result_url().is_none());
        assert!(session.uploaded().is_some());
    }

    #[tokio::test]
    async fn test_workflow_error_without_message_uses_default() {
        let api = FakeApi {
            swap_error: Some(ClientError::Malformed("x".into())),
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(api);
        let mut session = ready_session();

        orchestrator.run(&mut session).await.unwrap_err();
        assert_eq!(session.error(), Some("Coze API call failed"));
    }

    #[tokio::test]
    async fn test_fetch_failure_reported() {
        let api = FakeApi {
            fetch_fails: true,
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(api);
        let mut session = ready_session();

        let err = orchestrator.run(&mut session).await.unwrap_err();

        assert!(matches!(err, PipelineError::Rehost(RehostError::Fetch(_))));
        assert_eq!(session.error(), Some("Failed to fetch result image"));
    }

    #[tokio::test]
    async fn test_missing_selection() {
        let orchestrator = Orchestrator::new(FakeApi::default());
        let mut session = Session::new(Arc::new(CountingPreviews::default()));

        let err = orchestrator.run(&mut session).await.unwrap_err();

        assert!(matches!(err, PipelineError::MissingSelection));
        assert_eq!(session.error(), Some(SELECT_BOTH));
        assert!(orchestrator.api().calls().is_empty());
    }

    #[tokio::test]
    async fn test_resubmit_after_error() {
        let api = FakeApi {
            fetch_fails: true,
            ..Default::default()
        };
        let failing = Orchestrator::new(api);
        let mut session = ready_session();
        failing.run(&mut session).await.unwrap_err();
        assert!(session.error().is_some());

        let working = Orchestrator::new(FakeApi::default());
        let url = working.run(&mut session).await.unwrap();

        assert!(session.error().is_none());
        assert_eq!(session.result_url(), Some(&url));
        assert_eq!(session.phase(), Phase::Done);
    }

    #[tokio::test]
    async fn test_abandoned_run_leaves_session_resubmittable() {
        let stuck = Orchestrator::new(FakeApi {
            hang_uploads: true,
            ..Default::default()
        });
        let mut session = ready_session();

        let outcome = tokio::time::timeout(Duration::from_millis(50), stuck.run(&mut session)).await;

        assert!(outcome.is_err());
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!session.is_loading());
        assert!(session.can_submit());

        let url = Orchestrator::new(FakeApi::default())
            .run(&mut session)
            .await
            .unwrap();
        assert_eq!(session.result_url(), Some(&url));
    }

    #[tokio::test]
    async fn test_progress_reports_each_phase() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let orchestrator =
            Orchestrator::new(FakeApi::default()).with_progress(move |p| sink.lock().push(p));
        let mut session = ready_session();

        orchestrator.run(&mut session).await.unwrap();

        assert_eq!(
            *seen.lock(),
            vec![Phase::Uploading, Phase::Invoking, Phase::Rehosting, Phase::Done]
        );
    }

    #[tokio::test]
    async fn test_rehost_uploads_fetched_bytes() {
        let api = FakeApi::default();
        let result = WorkflowResult {
            output: "https://s.coze.cn/out.png".into(),
        };

        let url = rehost(&api, &result).await.unwrap();

        assert_eq!(
            api.calls(),
            vec![
                Call::Fetch("https://s.coze.cn/out.png".into()),
                Call::Upload(b"swapped".to_vec())
            ]
        );
        assert_eq!(url.as_str(), "https://i.ibb.co/up/2.png");
    }

    #[test]
    fn test_upload_message_prefers_server_text() {
        let err = PipelineError::Upload(rejected(400, "Invalid image"));
        assert_eq!(err.user_message(), "Invalid image");

        let err = PipelineError::Upload(ClientError::Status {
            status: 502,
            reason: "Bad Gateway".into(),
        });
        assert_eq!(err.user_message(), "Upload failed: Bad Gateway");
    }
}
