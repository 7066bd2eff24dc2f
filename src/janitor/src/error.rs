use std::time::Duration;

/// The object store could not be enumerated. Fatal: the run performs no deletions.
#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("object store listing failed: {0}")]
    Store(#[from] object_store::Error),
    #[error("object store listing timed out after {0:?}")]
    Timeout(Duration),
}

/// The reference set could not be loaded. Fatal: the run performs no deletions.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("reference query failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("reference query timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid reference table or column: {0}")]
    InvalidIdentifier(String),
}

/// Reasons a reconciliation run is aborted.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error(transparent)]
    List(#[from] ListError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error("unexpected error: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl SweepError {
    /// Short machine-readable kind, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SweepError::List(_) => "list_error",
            SweepError::Query(_) => "query_error",
            SweepError::Unexpected(_) => "unexpected_error",
        }
    }
}
