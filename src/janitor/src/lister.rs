//! Enumeration of the objects currently held in the store.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::ListError;

/// One physical object in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageObject {
    /// Path relative to the reconciled namespace.
    pub path: String,
    /// Creation timestamp as reported by the store.
    pub created_at: DateTime<Utc>,
}

impl StorageObject {
    pub fn new(path: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            path: path.into(),
            created_at,
        }
    }
}

/// Source of the objects in one logical bucket or namespace.
///
/// Every call to [`StorageLister::list`] starts a fresh enumeration, and
/// implementations hide any paging of the underlying store.
pub trait StorageLister: Send + Sync {
    fn list(&self) -> BoxStream<'_, Result<StorageObject, ListError>>;
}

/// Objects collected for one run, oldest first.
#[derive(Debug, Default)]
pub struct Listing {
    pub objects: Vec<StorageObject>,
    /// False when cancellation stopped the drain early.
    pub complete: bool,
}

/// Drain a lister into a [`Listing`] sorted by creation time ascending.
///
/// The whole drain shares one `timeout`. Cancellation is observed between
/// objects and yields an incomplete listing rather than an error; a listing
/// error or timeout is returned as-is and the partial listing is discarded.
pub async fn collect_listing(
    lister: &dyn StorageLister,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Listing, ListError> {
    let drain = async {
        let mut stream = lister.list();
        let mut objects = Vec::new();
        let mut complete = true;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    complete = false;
                    break;
                }
                next = stream.next() => match next {
                    Some(object) => objects.push(object?),
                    None => break,
                },
            }
        }

        objects.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.path.cmp(&b.path))
        });

        Ok::<_, ListError>(Listing { objects, complete })
    };

    tokio::time::timeout(timeout, drain)
        .await
        .map_err(|_| ListError::Timeout(timeout))?
}
