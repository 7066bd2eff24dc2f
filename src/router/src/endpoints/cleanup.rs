use crate::RouterState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use janitor::{CleanupResult, RunOutcome, RunStatus, SweepError};
use serde::Serialize;

/// Response envelope for a cleanup run.
///
/// `result` is present whenever the run produced one, including dry runs and
/// cancelled runs. `error` is present only for fatal failures.
#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CleanupResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CleanupResponse {
    pub fn from_outcome(outcome: Result<RunOutcome, SweepError>) -> Self {
        match outcome {
            Ok(RunOutcome { result, status }) => {
                let message = match status {
                    RunStatus::Completed if result.errors.is_empty() => format!(
                        "Cleanup completed: deleted {} of {} orphaned files",
                        result.deleted_files, result.orphaned_files
                    ),
                    RunStatus::Completed => format!(
                        "Cleanup completed with errors: deleted {} of {} orphaned files, {} failed",
                        result.deleted_files,
                        result.orphaned_files,
                        result.errors.len()
                    ),
                    RunStatus::DryRun => format!(
                        "Dry run: {} orphaned files would be deleted",
                        result.orphaned_files
                    ),
                    RunStatus::Cancelled => format!(
                        "Cleanup cancelled: deleted {} of {} orphaned files before cancellation",
                        result.deleted_files, result.orphaned_files
                    ),
                };
                Self {
                    success: true,
                    message,
                    result: Some(result),
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(kind = e.kind(), error = %e, "Cleanup run failed");
                Self {
                    success: false,
                    message: "Cleanup failed".to_string(),
                    result: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        if self.success {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Run one reconciliation and report its result.
///
/// The run is cancelled if the client disconnects, the request deadline
/// passes, or the server shuts down.
pub async fn trigger_cleanup<S: RouterState>(State(state): State<S>) -> impl IntoResponse {
    let cancel = state.shutdown().child_token();
    // Cancels the run when this handler is dropped or returns
    let _guard = cancel.clone().drop_guard();

    let deadline = state.request_timeout();
    let timer = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = timer.cancelled() => {}
            _ = tokio::time::sleep(deadline) => {
                tracing::warn!(timeout = ?deadline, "Cleanup request deadline reached, cancelling run");
                timer.cancel();
            }
        }
    });

    tracing::info!("Cleanup run triggered over HTTP");

    let reconciler = state.reconciler().clone();
    let token = cancel.clone();
    let run = tokio::spawn(async move { reconciler.run_until_cancelled(&token).await });

    let outcome = match run.await {
        Ok(outcome) => outcome,
        Err(e) => Err(SweepError::from(anyhow::Error::new(e))),
    };

    let response = CleanupResponse::from_outcome(outcome);
    (response.status_code(), Json(response))
}
