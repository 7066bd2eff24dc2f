//! Storage reconciliation and garbage collection.
//!
//! Keeps an object store consistent with a table of references to its
//! objects by deleting objects that no row references.
//!
//! ## Safety Principles
//!
//! 1. **Referential safety**: a path in the reference set is never deleted
//! 2. **Grace period**: unreferenced scoped objects younger than the grace
//!    period are presumed mid-upload and kept
//! 3. **Fail closed**: a failed or timed-out listing or reference query aborts
//!    the run before any deletion
//! 4. **Failure isolation**: one failed delete never stops the others
//! 5. **Audit trail**: every deletion and failure is logged and reported
//!
//! ## Architecture
//!
//! - `lister`: enumerates the store, oldest objects first
//! - `references`: loads the set of referenced paths
//! - `classifier`: splits unreferenced objects into orphans and protected ones
//! - `deleter`: deletes orphans with per-object failure isolation
//! - `report`: the `CleanupResult` returned to callers
//! - `reconciler`: sequences one run over injected collaborators
//!
//! ## Usage
//!
//! ```no_run
//! use janitor::Reconciler;
//!
//! # async fn sweep(config: common::Configuration) -> anyhow::Result<()> {
//! let reconciler = Reconciler::connect(&config).await?;
//! let outcome = reconciler.run().await?;
//! println!("deleted {} orphans", outcome.result.deleted_files);
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod deleter;
pub mod error;
pub mod lister;
pub mod reconciler;
pub mod references;
pub mod report;
pub mod store;

pub use classifier::{Classification, Diff, RetentionPolicy, diff, is_scoped};
pub use config::SweepConfig;
pub use deleter::{DeleteFailure, DeleterSettings, DeletionOutcome, ObjectRemover, OrphanDeleter};
pub use error::{ListError, QueryError, SweepError};
pub use lister::{Listing, StorageLister, StorageObject, collect_listing};
pub use reconciler::{Reconciler, RunOutcome, RunPhase, RunStatus};
pub use references::{ReferenceSet, ReferenceSetLoader, SqlReferenceLoader, StaticReferences};
pub use report::{CleanupResult, ReportBuilder};
pub use store::ObjectStoreBackend;
