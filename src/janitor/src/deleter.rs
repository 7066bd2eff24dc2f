//! Orphan deletion with per-object failure isolation.
//!
//! - Each object is deleted independently; a failure is recorded and the
//!   remaining objects are still processed
//! - Deletes are dispatched in batches through a bounded worker pool, with a
//!   pause between batches
//! - No retries: a failed object stays orphaned and the next run picks it up

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tokio_util::sync::CancellationToken;

/// Removes a single object by its namespace-relative path.
///
/// Removing an object that is already gone must return an error, so a run
/// that loses a race with another run reports the path as a failure.
#[async_trait]
pub trait ObjectRemover: Send + Sync {
    async fn remove(&self, path: &str) -> anyhow::Result<()>;
}

/// A delete attempt that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub path: String,
    pub cause: String,
}

impl fmt::Display for DeleteFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.cause)
    }
}

/// What a deletion pass accomplished, in the order the paths were given.
#[derive(Debug, Clone, Default)]
pub struct DeletionOutcome {
    pub deleted: Vec<String>,
    pub failures: Vec<DeleteFailure>,
    /// Cancellation stopped the pass before every path was attempted.
    pub cancelled: bool,
}

impl DeletionOutcome {
    pub fn attempted(&self) -> usize {
        self.deleted.len() + self.failures.len()
    }
}

#[derive(Debug, Clone)]
pub struct DeleterSettings {
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub concurrency: usize,
    pub delete_timeout: Duration,
}

/// Deletes confirmed orphans.
pub struct OrphanDeleter {
    remover: Arc<dyn ObjectRemover>,
    settings: DeleterSettings,
}

impl OrphanDeleter {
    pub fn new(remover: Arc<dyn ObjectRemover>, settings: DeleterSettings) -> Self {
        Self { remover, settings }
    }

    /// Attempt to delete every path.
    ///
    /// Cancellation is checked before each delete is dispatched; deletes
    /// already in flight are awaited and recorded.
    pub async fn delete_all(
        &self,
        paths: &[String],
        cancel: &CancellationToken,
    ) -> DeletionOutcome {
        let mut outcome = DeletionOutcome::default();

        if paths.is_empty() {
            tracing::info!("No orphans to delete");
            return outcome;
        }

        let batch_size = self.settings.batch_size.max(1);
        let concurrency = self.settings.concurrency.max(1);
        let total_batches = paths.len().div_ceil(batch_size);

        tracing::info!(
            orphans = paths.len(),
            batch_size,
            concurrency,
            total_batches,
            "Starting deletion of orphans"
        );

        for (batch_idx, batch) in paths.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            tracing::debug!(
                batch = batch_idx + 1,
                total_batches,
                batch_size = batch.len(),
                "Processing deletion batch"
            );

            // `buffered` yields in input order, so results keep classification order.
            // Each future checks cancellation on its first poll, which is when it
            // is dispatched.
            let mut results = stream::iter(batch.to_vec())
                .map(|path| {
                    let remover = self.remover.clone();
                    let cancel = cancel.clone();
                    let timeout = self.settings.delete_timeout;
                    async move {
                        if cancel.is_cancelled() {
                            return None;
                        }
                        let result = delete_one(remover, &path, timeout).await;
                        Some((path, result))
                    }
                })
                .buffered(concurrency);

            while let Some(attempt) = results.next().await {
                let Some((path, result)) = attempt else {
                    continue;
                };
                match result {
                    Ok(()) => {
                        tracing::info!(path = %path, "Deleted orphan");
                        outcome.deleted.push(path);
                    }
                    Err(cause) => {
                        tracing::error!(path = %path, error = %cause, "Failed to delete orphan");
                        outcome.failures.push(DeleteFailure { path, cause });
                    }
                }
            }

            if batch_idx + 1 < total_batches && !self.settings.batch_pause.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.batch_pause) => {}
                }
            }
        }

        outcome.cancelled = outcome.attempted() < paths.len();

        tracing::info!(
            deleted = outcome.deleted.len(),
            failed = outcome.failures.len(),
            cancelled = outcome.cancelled,
            "Deletion complete"
        );

        outcome
    }
}

async fn delete_one(
    remover: Arc<dyn ObjectRemover>,
    path: &str,
    timeout: Duration,
) -> Result<(), String> {
    match tokio::time::timeout(timeout, remover.remove(path)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(format!("{e:#}")),
        Err(_) => Err(format!("delete timed out after {timeout:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Records removals; `failing` paths error out, `hanging` paths never finish.
    #[derive(Default)]
    struct FakeRemover {
        failing: HashSet<String>,
        hanging: HashSet<String>,
        removed: Mutex<Vec<String>>,
        cancel_after_first: Option<CancellationToken>,
    }

    #[async_trait]
    impl ObjectRemover for FakeRemover {
        async fn remove(&self, path: &str) -> anyhow::Result<()> {
            if self.hanging.contains(path) {
                futures::future::pending::<()>().await;
            }
            if let Some(token) = &self.cancel_after_first {
                token.cancel();
            }
            if self.failing.contains(path) {
                anyhow::bail!("permission denied");
            }
            self.removed.lock().unwrap().push(path.to_string());
            Ok(())
        }
    }

    fn settings() -> DeleterSettings {
        DeleterSettings {
            batch_size: 1000,
            batch_pause: Duration::ZERO,
            concurrency: 4,
            delete_timeout: Duration::from_secs(5),
        }
    }

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_empty_input() {
        let deleter = OrphanDeleter::new(Arc::new(FakeRemover::default()), settings());
        let outcome = deleter.delete_all(&[], &CancellationToken::new()).await;

        assert!(outcome.deleted.is_empty());
        assert!(outcome.failures.is_empty());
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let remover = Arc::new(FakeRemover {
            failing: ["two.png".to_string()].into(),
            ..Default::default()
        });
        let deleter = OrphanDeleter::new(remover.clone(), settings());

        let outcome = deleter
            .delete_all(
                &paths(&["one.png", "two.png", "three.png"]),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(outcome.deleted, vec!["one.png", "three.png"]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].path, "two.png");
        assert_eq!(outcome.failures[0].to_string(), "two.png: permission denied");
        assert!(!outcome.cancelled);
        assert_eq!(remover.removed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_a_per_item_failure() {
        let remover = Arc::new(FakeRemover {
            hanging: ["stuck.png".to_string()].into(),
            ..Default::default()
        });
        let deleter = OrphanDeleter::new(
            remover,
            DeleterSettings {
                delete_timeout: Duration::from_millis(20),
                ..settings()
            },
        );

        let outcome = deleter
            .delete_all(&paths(&["stuck.png", "ok.png"]), &CancellationToken::new())
            .await;

        assert_eq!(outcome.deleted, vec!["ok.png"]);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].cause.contains("timed out"));
    }

    #[tokio::test]
    async fn test_order_is_preserved_across_batches() {
        let deleter = OrphanDeleter::new(
            Arc::new(FakeRemover::default()),
            DeleterSettings {
                batch_size: 2,
                batch_pause: Duration::from_millis(1),
                ..settings()
            },
        );
        let input = paths(&["a.png", "b.png", "c.png", "d.png", "e.png"]);

        let outcome = deleter.delete_all(&input, &CancellationToken::new()).await;

        assert_eq!(outcome.deleted, input);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let remover = Arc::new(FakeRemover::default());
        let deleter = OrphanDeleter::new(remover.clone(), settings());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = deleter.delete_all(&paths(&["a.png", "b.png"]), &cancel).await;

        assert!(outcome.cancelled);
        assert!(outcome.deleted.is_empty());
        assert!(remover.removed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_keeps_completed_prefix() {
        let cancel = CancellationToken::new();
        let remover = Arc::new(FakeRemover {
            cancel_after_first: Some(cancel.clone()),
            ..Default::default()
        });
        let deleter = OrphanDeleter::new(
            remover.clone(),
            DeleterSettings {
                concurrency: 1,
                ..settings()
            },
        );

        let outcome = deleter
            .delete_all(&paths(&["a.png", "b.png", "c.png"]), &cancel)
            .await;

        assert!(outcome.cancelled);
        assert_eq!(outcome.deleted, vec!["a.png"]);
        assert_eq!(*remover.removed.lock().unwrap(), vec!["a.png".to_string()]);
    }
}
