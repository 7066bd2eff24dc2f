//! One reconciliation run: list, load references, classify, delete, report.
//!
//! Listing and reference loading fail closed: an error or timeout in either
//! aborts the run before anything is deleted. Per-object delete failures are
//! collected into the result instead.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use common::config::Configuration;
use common::database::ReferenceDatabase;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::classifier::{RetentionPolicy, diff};
use crate::config::SweepConfig;
use crate::deleter::{ObjectRemover, OrphanDeleter};
use crate::error::{QueryError, SweepError};
use crate::lister::{StorageLister, collect_listing};
use crate::references::{ReferenceSet, ReferenceSetLoader, SqlReferenceLoader};
use crate::report::{CleanupResult, ReportBuilder};
use crate::store::ObjectStoreBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Listing,
    ReferencesLoaded,
    Classifying,
    Deleting,
    Reported,
    Aborted,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::Listing => "listing",
            RunPhase::ReferencesLoaded => "references_loaded",
            RunPhase::Classifying => "classifying",
            RunPhase::Deleting => "deleting",
            RunPhase::Reported => "reported",
            RunPhase::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every confirmed orphan had a delete attempted.
    Completed,
    /// Orphans were identified but nothing was deleted.
    DryRun,
    /// Cancellation stopped the run; the result covers the work done so far.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub result: CleanupResult,
    pub status: RunStatus,
}

/// Sequences a reconciliation run over injected collaborators.
///
/// Holds no state between runs.
pub struct Reconciler {
    lister: Arc<dyn StorageLister>,
    references: Arc<dyn ReferenceSetLoader>,
    remover: Arc<dyn ObjectRemover>,
    config: SweepConfig,
    policy: RetentionPolicy,
}

impl Reconciler {
    pub fn new(
        lister: Arc<dyn StorageLister>,
        references: Arc<dyn ReferenceSetLoader>,
        remover: Arc<dyn ObjectRemover>,
        config: SweepConfig,
    ) -> Self {
        let policy = RetentionPolicy::new(config.grace_period);
        Self {
            lister,
            references,
            remover,
            config,
            policy,
        }
    }

    /// Wire up the object store and reference database named in `config`.
    pub async fn connect(config: &Configuration) -> Result<Self> {
        config.validate()?;

        let backend = Arc::new(
            ObjectStoreBackend::from_config(&config.storage)
                .context("Failed to initialize object store")?,
        );
        let database = ReferenceDatabase::connect(&config.database)
            .await
            .context("Failed to connect to reference database")?;
        let references = SqlReferenceLoader::new(database, config.references.clone())
            .context("Invalid reference configuration")?;

        Ok(Self::new(
            backend.clone(),
            Arc::new(references),
            backend,
            SweepConfig::from(&config.cleanup),
        ))
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    pub async fn run(&self) -> Result<RunOutcome, SweepError> {
        self.run_until_cancelled(&CancellationToken::new()).await
    }

    pub async fn run_until_cancelled(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, SweepError> {
        self.run_at(Utc::now(), cancel).await
    }

    /// Run with an explicit clock. Ages are measured against `now`.
    pub async fn run_at(
        &self,
        now: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<RunOutcome, SweepError> {
        let mut phase = RunPhase::Idle;
        tracing::info!(
            grace_period = ?self.config.grace_period,
            dry_run = self.config.dry_run,
            "Starting reconciliation run"
        );

        advance(&mut phase, RunPhase::Listing);
        let listing =
            match collect_listing(self.lister.as_ref(), self.config.list_timeout, cancel).await {
                Ok(listing) => listing,
                Err(e) => return Err(abort(&mut phase, e.into())),
            };
        let total_files = listing.objects.len();
        tracing::info!(total_files, complete = listing.complete, "Listed object store");

        if !listing.complete {
            return Ok(cancelled(&mut phase, ReportBuilder::new(total_files).build()));
        }

        let references = match self.load_references().await {
            Ok(references) => references,
            Err(e) => return Err(abort(&mut phase, e.into())),
        };
        advance(&mut phase, RunPhase::ReferencesLoaded);
        tracing::info!(references = references.len(), "Loaded reference set");

        if cancel.is_cancelled() {
            return Ok(cancelled(&mut phase, ReportBuilder::new(total_files).build()));
        }

        advance(&mut phase, RunPhase::Classifying);
        let mut diff = diff(listing.objects, &references, &self.policy, now);
        tracing::info!(
            total_files = diff.total,
            referenced = diff.referenced,
            protected = diff.protected,
            orphaned_files = diff.orphans.len(),
            "Classified objects"
        );

        if self.config.revalidate_before_delete && !self.config.dry_run && !diff.orphans.is_empty()
        {
            let fresh = match self.load_references().await {
                Ok(fresh) => fresh,
                Err(e) => return Err(abort(&mut phase, e.into())),
            };
            diff.orphans.retain(|orphan| {
                let now_referenced = fresh.contains(&orphan.path);
                if now_referenced {
                    tracing::warn!(
                        path = %orphan.path,
                        "Object became referenced since classification, skipping deletion"
                    );
                }
                !now_referenced
            });
        }

        let mut report = ReportBuilder::new(diff.total).orphaned(diff.orphans.len());

        if self.config.dry_run {
            for orphan in &diff.orphans {
                tracing::info!(
                    path = %orphan.path,
                    created_at = %orphan.created_at,
                    "[DRY-RUN] Would delete orphan"
                );
            }
            return Ok(finish(&mut phase, report.build(), RunStatus::DryRun));
        }

        if cancel.is_cancelled() {
            return Ok(cancelled(&mut phase, report.build()));
        }

        advance(&mut phase, RunPhase::Deleting);
        let deleter = OrphanDeleter::new(self.remover.clone(), self.config.deleter_settings());
        let outcome = deleter.delete_all(&diff.orphan_paths(), cancel).await;

        let status = if outcome.cancelled {
            RunStatus::Cancelled
        } else {
            RunStatus::Completed
        };
        report.record_outcome(outcome);

        Ok(finish(&mut phase, report.build(), status))
    }

    async fn load_references(&self) -> Result<ReferenceSet, QueryError> {
        let timeout = self.config.query_timeout;
        tokio::time::timeout(timeout, self.references.load())
            .await
            .map_err(|_| QueryError::Timeout(timeout))?
    }
}

fn advance(phase: &mut RunPhase, next: RunPhase) {
    tracing::debug!(from = %phase, to = %next, "Reconciliation phase change");
    *phase = next;
}

fn abort(phase: &mut RunPhase, error: SweepError) -> SweepError {
    tracing::error!(
        phase = %phase,
        kind = error.kind(),
        error = %error,
        "Reconciliation aborted before any deletion"
    );
    advance(phase, RunPhase::Aborted);
    error
}

fn cancelled(phase: &mut RunPhase, result: CleanupResult) -> RunOutcome {
    tracing::warn!(phase = %phase, "Reconciliation cancelled, reporting partial result");
    finish(phase, result, RunStatus::Cancelled)
}

fn finish(phase: &mut RunPhase, result: CleanupResult, status: RunStatus) -> RunOutcome {
    advance(phase, RunPhase::Reported);
    result.log_summary();
    RunOutcome { result, status }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::references::StaticReferences;
    use object_store::memory::InMemory;
    use object_store::path::Path as ObjectPath;
    use object_store::{ObjectStore, PutPayload};

    #[test]
    fn test_phase_names() {
        assert_eq!(RunPhase::ReferencesLoaded.to_string(), "references_loaded");
        assert_eq!(RunPhase::Aborted.to_string(), "aborted");
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_value(RunStatus::DryRun).unwrap(),
            serde_json::json!("dry_run")
        );
    }

    fn assert_send<T: Send>(_: &T) {}

    #[test]
    fn test_run_future_is_send() {
        let backend = Arc::new(ObjectStoreBackend::new(Arc::new(InMemory::new()), None));
        let reconciler = Reconciler::new(
            backend.clone(),
            Arc::new(StaticReferences::new(["a.png"])),
            backend,
            SweepConfig::default(),
        );
        let cancel = CancellationToken::new();

        assert_send(&reconciler.run());
        assert_send(&reconciler.run_until_cancelled(&cancel));
    }

    #[tokio::test]
    async fn test_fresh_uploads_in_memory_store() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        for key in ["u1/pending.png", "loose.png", "u1/kept.png"] {
            store
                .put(&ObjectPath::from(key), PutPayload::from(b"x".to_vec()))
                .await
                .unwrap();
        }
        let backend = Arc::new(ObjectStoreBackend::new(store, None));
        let reconciler = Reconciler::new(
            backend.clone(),
            Arc::new(StaticReferences::new(["u1/kept.png"])),
            backend.clone(),
            SweepConfig::default(),
        );

        let outcome = reconciler.run().await.unwrap();

        // The scoped upload is seconds old and stays; the loose file has no grace period
        assert_eq!(outcome.status, RunStatus::Completed);
        assert_eq!(outcome.result.total_files, 3);
        assert_eq!(outcome.result.orphaned_files, 1);
        assert_eq!(outcome.result.deleted_paths, vec!["loose.png"]);
    }

    #[tokio::test]
    async fn test_connect_from_configuration() {
        let mut config = Configuration::default();
        config.database = common::config::DatabaseConfig::in_memory();

        let reconciler = Reconciler::connect(&config).await.unwrap();
        assert!(!reconciler.config().dry_run);

        // The records table does not exist, so the run fails closed
        let result = reconciler.run().await;
        assert!(matches!(result, Err(SweepError::Query(_))));
    }
}
