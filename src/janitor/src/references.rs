//! Loading the set of paths the system of record considers in use.

use std::collections::HashSet;

use async_trait::async_trait;
use common::config::ReferenceConfig;
use common::database::ReferenceDatabase;

use crate::error::QueryError;

/// Paths referenced by at least one row.
pub type ReferenceSet = HashSet<String>;

#[async_trait]
pub trait ReferenceSetLoader: Send + Sync {
    /// Load the complete reference set. Partial results are never returned.
    async fn load(&self) -> Result<ReferenceSet, QueryError>;
}

/// Reads the distinct values of one column of the reference table.
#[derive(Debug, Clone)]
pub struct SqlReferenceLoader {
    database: ReferenceDatabase,
    references: ReferenceConfig,
}

impl SqlReferenceLoader {
    /// Fails when the configured table or column is not a plain SQL identifier.
    pub fn new(
        database: ReferenceDatabase,
        references: ReferenceConfig,
    ) -> Result<Self, QueryError> {
        references
            .validate()
            .map_err(|e| QueryError::InvalidIdentifier(e.to_string()))?;
        Ok(Self {
            database,
            references,
        })
    }
}

#[async_trait]
impl ReferenceSetLoader for SqlReferenceLoader {
    async fn load(&self) -> Result<ReferenceSet, QueryError> {
        let paths = self.database.distinct_paths(&self.references).await?;

        tracing::debug!(
            table = %self.references.table,
            column = %self.references.column,
            references = paths.len(),
            "Loaded reference set"
        );

        Ok(paths.into_iter().collect())
    }
}

/// A fixed reference set.
#[derive(Debug, Clone, Default)]
pub struct StaticReferences(ReferenceSet);

impl StaticReferences {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(paths.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl ReferenceSetLoader for StaticReferences {
    async fn load(&self) -> Result<ReferenceSet, QueryError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::config::DatabaseConfig;

    async fn database_with_records(rows: &[&str]) -> ReferenceDatabase {
        let db = ReferenceDatabase::connect(&DatabaseConfig::in_memory())
            .await
            .unwrap();
        db.execute("CREATE TABLE records (id INTEGER PRIMARY KEY, storage_path TEXT)")
            .await
            .unwrap();
        for row in rows {
            db.execute(&format!(
                "INSERT INTO records (storage_path) VALUES ('{row}')"
            ))
            .await
            .unwrap();
        }
        db
    }

    #[tokio::test]
    async fn test_sql_loader_deduplicates() {
        let db = database_with_records(&["a/1.png", "a/1.png", "b/2.png"]).await;
        let loader = SqlReferenceLoader::new(db, ReferenceConfig::default()).unwrap();

        let set = loader.load().await.unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("a/1.png"));
        assert!(set.contains("b/2.png"));
    }

    #[tokio::test]
    async fn test_sql_loader_query_failure() {
        let db = database_with_records(&[]).await;
        let references = ReferenceConfig {
            table: "missing_table".to_string(),
            ..Default::default()
        };
        let loader = SqlReferenceLoader::new(db, references).unwrap();

        let result = loader.load().await;
        assert!(matches!(result, Err(QueryError::Database(_))));
    }

    #[tokio::test]
    async fn test_sql_loader_rejects_bad_identifiers() {
        let db = database_with_records(&[]).await;
        let references = ReferenceConfig {
            table: "records".to_string(),
            column: "path) OR (1=1".to_string(),
        };

        let result = SqlReferenceLoader::new(db, references);
        assert!(matches!(result, Err(QueryError::InvalidIdentifier(_))));
    }

    #[tokio::test]
    async fn test_static_references() {
        let loader = StaticReferences::new(["a/1.png", "c.png"]);
        let set = loader.load().await.unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.contains("c.png"));
    }
}
