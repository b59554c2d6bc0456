//! Coze workflow client.
//!
//! `POST /v1/workflow/run` with `{workflow_id, parameters}` and a bearer
//! token. The answer is `{code, msg, data}` where `data` is itself a JSON
//! document serialized into a string; the swapped image URL sits under
//! its `output` key.

use crate::error::UpstreamError;
use async_trait::async_trait;
use faceswap_core::{WorkflowRequest, WorkflowResult};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

pub const DEFAULT_COZE_ENDPOINT: &str = "https://api.coze.cn/v1/workflow/run";

const SERVICE: &str = "Coze";

/// Runs the face-swap workflow.
#[async_trait]
pub trait WorkflowEngine: Send + Sync {
    async fn run(
        &self,
        api_key: &str,
        workflow_id: &str,
        request: &WorkflowRequest,
    ) -> Result<WorkflowResult, UpstreamError>;
}

#[derive(Serialize)]
struct RunBody<'a> {
    workflow_id: &'a str,
    parameters: &'a WorkflowRequest,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    code: Option<i64>,
    msg: Option<String>,
    data: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RunOutput {
    output: String,
}

/// reqwest-backed Coze client.
#[derive(Clone)]
pub struct CozeWorkflow {
    client: reqwest::Client,
    endpoint: String,
}

impl CozeWorkflow {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl WorkflowEngine for CozeWorkflow {
    #[tracing::instrument(skip_all, fields(workflow_id = workflow_id))]
    async fn run(
        &self,
        api_key: &str,
        workflow_id: &str,
        request: &WorkflowRequest,
    ) -> Result<WorkflowResult, UpstreamError> {
        tracing::debug!(
            endpoint = %self.endpoint,
            face_image = %request.face_image,
            base_image = %request.base_image,
            "running workflow"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&RunBody {
                workflow_id,
                parameters: request,
            })
            .send()
            .await
            .map_err(|source| {
                tracing::error!(error = %source, "Coze request failed");
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

        let result = parse_run_response(status, &body);
        match &result {
            Ok(r) => tracing::info!(output = %r.output, "workflow completed"),
            Err(e) => tracing::warn!(status = status.as_u16(), error = %e, "workflow failed"),
        }
        result
    }
}

/// Interpret a workflow run response, including the nested `data` document.
pub fn parse_run_response(status: StatusCode, body: &str) -> Result<WorkflowResult, UpstreamError> {
    if !status.is_success() {
        return Err(UpstreamError::Http {
            service: SERVICE,
            status: status.as_u16(),
            message: "Coze API call failed".to_string(),
        });
    }

    let parsed: RunResponse = serde_json::from_str(body).map_err(|e| UpstreamError::ShapeMismatch {
        service: SERVICE,
        detail: format!("body is not a run response: {e}"),
    })?;

    // A missing code counts as failure, same as a non-zero one.
    if parsed.code != Some(0) {
        return Err(UpstreamError::Rejected {
            service: SERVICE,
            message: parsed
                .msg
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "Coze API error".to_string()),
        });
    }

    let nested = match parsed.data {
        Some(serde_json::Value::String(s)) => s,
        Some(other) => {
            return Err(UpstreamError::ShapeMismatch {
                service: SERVICE,
                detail: format!("data is {}, expected a JSON string", json_kind(&other)),
            })
        }
        None => {
            return Err(UpstreamError::ShapeMismatch {
                service: SERVICE,
                detail: "missing data".to_string(),
            })
        }
    };

    let output: RunOutput = serde_json::from_str(&nested).map_err(|e| UpstreamError::ShapeMismatch {
        service: SERVICE,
        detail: format!("data does not hold an output URL: {e}"),
    })?;

    Ok(WorkflowResult {
        output: output.output,
    })
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
