//! Invocation wrapper
//!
//! Every stage entry point goes through [`invoke`]: the stage body's result
//! becomes a `{statusCode, body}` response, and an alert is sent either way.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Instant;
use t20i_common::Result;
use tracing::{error, info};

use crate::alerts::{format_alert, AlertChannel};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl InvocationResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status_code: 200,
            body: body.into(),
        }
    }

    pub fn internal_error(message: impl std::fmt::Display) -> Self {
        Self {
            status_code: 500,
            body: format!("Internal Server Error: {}", message),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == 200
    }
}

/// Run a stage body and translate its outcome
pub async fn invoke<F>(stage: &str, alerts: &dyn AlertChannel, body: F) -> InvocationResponse
where
    F: Future<Output = Result<String>>,
{
    let started = Instant::now();
    let outcome = body.await;
    let elapsed_ms = started.elapsed().as_millis() as u64;
    let now = chrono::Utc::now();

    match outcome {
        Ok(message) => {
            info!(stage, elapsed_ms, body = %message, "Invocation succeeded");
            alerts.notify(&format_alert(now, stage, true, &message)).await;
            InvocationResponse::ok(message)
        },
        Err(err) => {
            error!(
                stage,
                elapsed_ms,
                kind = err.kind(),
                retryable = err.is_retryable(),
                error = %err,
                "Invocation failed"
            );
            alerts
                .notify(&format_alert(now, stage, false, &err.to_string()))
                .await;
            InvocationResponse::internal_error(err)
        },
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::alerts::RecordingAlerts;
    use t20i_common::PipelineError;

    #[tokio::test]
    async fn test_success_response_and_alert() {
        let alerts = RecordingAlerts::new();
        let response = invoke("ingest", &alerts, async { Ok("3 new files".to_string()) }).await;

        assert_eq!(response, InvocationResponse::ok("3 new files"));
        let sent = alerts.messages().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].contains("SUCCESS"));
        assert!(sent[0].contains("3 new files"));
    }

    #[tokio::test]
    async fn test_error_response_and_alert() {
        let alerts = RecordingAlerts::new();
        let response = invoke("export", &alerts, async {
            Err(PipelineError::ConfigurationMissing("KAGGLE_KEY".into()))
        })
        .await;

        assert_eq!(response.status_code, 500);
        assert!(response.body.starts_with("Internal Server Error: "));
        assert!(response.body.contains("KAGGLE_KEY"));
        assert!(alerts.messages().await[0].contains("ERROR"));
    }

    #[test]
    fn test_response_serializes_status_code_field() {
        let text = serde_json::to_string(&InvocationResponse::ok("done")).unwrap();
        assert_eq!(text, r#"{"statusCode":200,"body":"done"}"#);
    }
}
