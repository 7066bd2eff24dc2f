//! `object_store` adapter for listing and removing objects.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use common::config::StorageConfig;
use common::storage::{create_object_store, namespace_prefix};
use futures::StreamExt;
use futures::stream::BoxStream;
use object_store::ObjectStore;
use object_store::path::Path as ObjectPath;

use crate::deleter::ObjectRemover;
use crate::error::ListError;
use crate::lister::{StorageLister, StorageObject};

/// One namespace of an object store, addressed by paths relative to `prefix`.
///
/// Paging of large buckets is handled by the `object_store` list stream.
/// The store's last-modified time stands in for the creation time; uploads
/// are never rewritten in place, so the two coincide.
#[derive(Debug, Clone)]
pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    prefix: Option<ObjectPath>,
}

impl ObjectStoreBackend {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: Option<ObjectPath>) -> Self {
        Self { store, prefix }
    }

    /// Build the store named by the configured DSN.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let store = create_object_store(config)
            .with_context(|| format!("Failed to create object store for {}", config.dsn))?;
        Ok(Self::new(store, namespace_prefix(config)))
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Path relative to the namespace, or `None` for keys outside it.
    fn relative_path(&self, location: &ObjectPath) -> Option<String> {
        match &self.prefix {
            None => Some(location.to_string()),
            Some(prefix) => {
                let parts: Vec<String> = location
                    .prefix_match(prefix)?
                    .map(|part| part.as_ref().to_string())
                    .collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("/"))
                }
            }
        }
    }

    /// Inverse of [`Self::relative_path`]. Listed paths are already encoded,
    /// so they are parsed rather than encoded again.
    fn absolute_path(&self, path: &str) -> Result<ObjectPath> {
        let relative =
            ObjectPath::parse(path).with_context(|| format!("Invalid object path {path}"))?;
        Ok(match &self.prefix {
            None => relative,
            Some(prefix) => prefix.parts().chain(relative.parts()).collect(),
        })
    }
}

impl StorageLister for ObjectStoreBackend {
    fn list(&self) -> BoxStream<'_, Result<StorageObject, ListError>> {
        tracing::debug!(prefix = ?self.prefix, "Listing object store");

        self.store
            .list(self.prefix.as_ref())
            .filter_map(move |meta| {
                let object = match meta {
                    Ok(meta) => self.relative_path(&meta.location).map(|path| {
                        Ok(StorageObject {
                            path,
                            created_at: meta.last_modified,
                        })
                    }),
                    Err(e) => Some(Err(ListError::from(e))),
                };
                futures::future::ready(object)
            })
            .boxed()
    }
}

#[async_trait]
impl ObjectRemover for ObjectStoreBackend {
    /// Most stores acknowledge deleting a missing key, so the object is looked
    /// up first and a missing one is reported as a failure.
    async fn remove(&self, path: &str) -> Result<()> {
        let location = self.absolute_path(path)?;
        match self.store.head(&location).await {
            Ok(_) => {}
            Err(object_store::Error::NotFound { .. }) => {
                anyhow::bail!("object not found")
            }
            Err(e) => return Err(e.into()),
        }
        self.store.delete(&location).await?;
        Ok(())
    }
}
