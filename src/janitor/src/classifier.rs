//! Orphan classification.
//!
//! An object absent from the reference set is a confirmed orphan unless it
//! is *scoped* (its first `/` comes after position 0, i.e. it lives under a
//! per-user or per-session prefix) and younger than the grace period. Scoped
//! uploads are written before the row that references them, so a young
//! unreferenced scoped object is presumed to be mid-creation.

use chrono::{DateTime, TimeDelta, Utc};

use crate::lister::StorageObject;
use crate::references::ReferenceSet;

/// Whether a path was created under a scoping prefix.
pub fn is_scoped(path: &str) -> bool {
    matches!(path.find('/'), Some(index) if index > 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Present in the reference set.
    Referenced,
    /// Unreferenced, scoped and still inside the grace window.
    Protected { age: TimeDelta },
    /// Unreferenced and not protected.
    Orphan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    grace_period: TimeDelta,
}

impl RetentionPolicy {
    /// Durations too large for chrono saturate to the maximum window.
    pub fn new(grace_period: std::time::Duration) -> Self {
        Self {
            grace_period: TimeDelta::from_std(grace_period).unwrap_or(TimeDelta::MAX),
        }
    }

    pub fn grace_period(&self) -> TimeDelta {
        self.grace_period
    }

    pub fn classify(
        &self,
        object: &StorageObject,
        references: &ReferenceSet,
        now: DateTime<Utc>,
    ) -> Classification {
        if references.contains(&object.path) {
            return Classification::Referenced;
        }

        if !is_scoped(&object.path) {
            return Classification::Orphan;
        }

        // Timestamps in the future give a negative age and stay protected
        let age = now.signed_duration_since(object.created_at);
        if age < self.grace_period {
            Classification::Protected { age }
        } else {
            Classification::Orphan
        }
    }
}

/// Outcome of comparing one listing with the reference set.
#[derive(Debug, Clone, Default)]
pub struct Diff {
    pub total: usize,
    pub referenced: usize,
    pub protected: usize,
    /// Confirmed orphans in listing order.
    pub orphans: Vec<StorageObject>,
}

impl Diff {
    pub fn orphan_paths(&self) -> Vec<String> {
        self.orphans.iter().map(|o| o.path.clone()).collect()
    }
}

/// Classify every listed object.
pub fn diff(
    objects: Vec<StorageObject>,
    references: &ReferenceSet,
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> Diff {
    let mut diff = Diff {
        total: objects.len(),
        ..Default::default()
    };

    for object in objects {
        match policy.classify(&object, references, now) {
            Classification::Referenced => {
                tracing::trace!(path = %object.path, "Object is referenced, skipping");
                diff.referenced += 1;
            }
            Classification::Protected { age } => {
                tracing::debug!(
                    path = %object.path,
                    created_at = %object.created_at,
                    age_secs = age.num_seconds(),
                    grace_period_secs = policy.grace_period().num_seconds(),
                    "Skipping recent scoped object (within grace period)"
                );
                diff.protected += 1;
            }
            Classification::Orphan => {
                tracing::debug!(
                    path = %object.path,
                    created_at = %object.created_at,
                    "Identified orphan"
                );
                diff.orphans.push(object);
            }
        }
    }

    diff
}
