//! The externally visible result of a reconciliation run.

use serde::{Serialize, Serializer};

use crate::deleter::{DeleteFailure, DeletionOutcome};

/// Counts and paths for one run.
///
/// `errors` stays structured internally and is rendered as `"<path>: <cause>"`
/// strings when serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResult {
    pub total_files: usize,
    pub orphaned_files: usize,
    pub deleted_files: usize,
    #[serde(serialize_with = "render_failures")]
    pub errors: Vec<DeleteFailure>,
    pub deleted_paths: Vec<String>,
}

fn render_failures<S>(failures: &[DeleteFailure], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_seq(failures.iter().map(ToString::to_string))
}

impl CleanupResult {
    /// Whether the count invariants hold.
    pub fn is_consistent(&self) -> bool {
        self.deleted_files == self.deleted_paths.len()
            && self.deleted_files <= self.orphaned_files
            && self.orphaned_files <= self.total_files
            && self.deleted_files + self.errors.len() <= self.orphaned_files
    }

    pub fn log_summary(&self) {
        tracing::info!(
            total_files = self.total_files,
            orphaned_files = self.orphaned_files,
            deleted_files = self.deleted_files,
            errors = self.errors.len(),
            "Cleanup summary"
        );
    }
}

/// Accumulates a [`CleanupResult`].
///
/// `deleted_files` is derived from the recorded paths, never set directly.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    total_files: usize,
    orphaned_files: usize,
    deleted_paths: Vec<String>,
    errors: Vec<DeleteFailure>,
}

impl ReportBuilder {
    pub fn new(total_files: usize) -> Self {
        Self {
            total_files,
            ..Default::default()
        }
    }

    pub fn orphaned(mut self, orphaned_files: usize) -> Self {
        self.orphaned_files = orphaned_files;
        self
    }

    pub fn record_outcome(&mut self, outcome: DeletionOutcome) {
        self.deleted_paths.extend(outcome.deleted);
        self.errors.extend(outcome.failures);
    }

    pub fn build(self) -> CleanupResult {
        let result = CleanupResult {
            total_files: self.total_files,
            orphaned_files: self.orphaned_files,
            deleted_files: self.deleted_paths.len(),
            errors: self.errors,
            deleted_paths: self.deleted_paths,
        };
        debug_assert!(result.is_consistent(), "inconsistent report: {result:?}");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_derives_deleted_count() {
        let mut builder = ReportBuilder::new(3).orphaned(2);
        builder.record_outcome(DeletionOutcome {
            deleted: vec!["b/2.png".to_string(), "c.png".to_string()],
            ..Default::default()
        });

        let result = builder.build();
        assert_eq!(result.deleted_files, 2);
        assert_eq!(result.deleted_paths, vec!["b/2.png", "c.png"]);
        assert!(result.is_consistent());
    }

    #[test]
    fn test_serialized_shape() {
        let mut builder = ReportBuilder::new(5).orphaned(3);
        builder.record_outcome(DeletionOutcome {
            deleted: vec!["one.png".to_string(), "three.png".to_string()],
            failures: vec![DeleteFailure {
                path: "two.png".to_string(),
                cause: "not found".to_string(),
            }],
            cancelled: false,
        });

        let value = serde_json::to_value(builder.build()).unwrap();
        assert_eq!(
            value,
            json!({
                "totalFiles": 5,
                "orphanedFiles": 3,
                "deletedFiles": 2,
                "errors": ["two.png: not found"],
                "deletedPaths": ["one.png", "three.png"],
            })
        );
    }

    #[test]
    fn test_inconsistent_counts_are_detected() {
        let result = CleanupResult {
            total_files: 1,
            orphaned_files: 2,
            ..Default::default()
        };
        assert!(!result.is_consistent());

        let result = CleanupResult {
            total_files: 2,
            orphaned_files: 2,
            deleted_files: 1,
            ..Default::default()
        };
        assert!(!result.is_consistent());
    }
}
