use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{PgPool, SqlitePool};

use crate::config::{DatabaseConfig, ReferenceConfig};

/// Handle to the database holding the reference table (PostgreSQL or SQLite).
///
/// The janitor only ever reads from it.
#[derive(Clone, Debug)]
pub enum ReferenceDatabase {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

impl ReferenceDatabase {
    /// Connect to the database named by the configured DSN.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let dsn = config.dsn.as_str();
        log::info!("Connecting to reference database with DSN: {dsn}");

        let database = if dsn.starts_with("sqlite:") {
            let pool = if dsn.contains(":memory:") {
                // Every connection to an in-memory database sees a fresh database,
                // so keep exactly one alive for the pool's lifetime.
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .idle_timeout(None)
                    .max_lifetime(None)
                    .connect(dsn)
                    .await
            } else {
                SqlitePool::connect(dsn).await
            }
            .map_err(|e| {
                log::error!("Failed to connect to SQLite database with DSN '{dsn}': {e}");
                e
            })?;
            ReferenceDatabase::Sqlite(pool)
        } else {
            let pool = PgPool::connect(dsn).await.map_err(|e| {
                log::error!("Failed to connect to PostgreSQL database with DSN '{dsn}': {e}");
                e
            })?;
            ReferenceDatabase::Postgres(pool)
        };

        log::info!("Reference database connection established");
        Ok(database)
    }

    /// Distinct non-null values of the configured reference column.
    ///
    /// Callers must validate `references` first; the names are interpolated.
    pub async fn distinct_paths(
        &self,
        references: &ReferenceConfig,
    ) -> Result<Vec<String>, sqlx::Error> {
        let sql = format!(
            "SELECT DISTINCT {column} FROM {table} WHERE {column} IS NOT NULL",
            column = references.column,
            table = references.table,
        );

        match self {
            ReferenceDatabase::Postgres(pool) => {
                sqlx::query_scalar::<_, String>(&sql).fetch_all(pool).await
            }
            ReferenceDatabase::Sqlite(pool) => {
                sqlx::query_scalar::<_, String>(&sql).fetch_all(pool).await
            }
        }
    }

    /// Run a statement without results. Used for fixtures and schema setup.
    pub async fn execute(&self, sql: &str) -> Result<u64, sqlx::Error> {
        let affected = match self {
            ReferenceDatabase::Postgres(pool) => sqlx::query(sql).execute(pool).await?.rows_affected(),
            ReferenceDatabase::Sqlite(pool) => sqlx::query(sql).execute(pool).await?.rows_affected(),
        };
        Ok(affected)
    }
}
