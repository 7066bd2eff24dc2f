use std::path::Path;
use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "janitor.toml";

/// Prefix for environment variable overrides, e.g. `JANITOR__CLEANUP__DRY_RUN=true`.
pub const ENV_PREFIX: &str = "JANITOR__";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Object store DSN (`memory://`, `file:///path`, `s3://host/bucket`)
    pub dsn: String,
    /// Namespace inside the store that is reconciled. Empty means the whole bucket.
    #[serde(default)]
    pub prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("memory://"),
            prefix: String::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub dsn: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: String::from("sqlite://.data/janitor.db"),
        }
    }
}

impl DatabaseConfig {
    /// Create an in-memory database configuration
    pub fn in_memory() -> Self {
        Self {
            dsn: String::from("sqlite::memory:"),
        }
    }
}

/// Location of the column holding object paths in the system of record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Table holding the references, optionally schema-qualified (`public.records`)
    pub table: String,
    /// Column holding the object path
    pub column: String,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            table: String::from("records"),
            column: String::from("storage_path"),
        }
    }
}

impl ReferenceConfig {
    /// Table and column are interpolated into SQL, so both must be plain identifiers.
    pub fn validate(&self) -> Result<()> {
        let mut parts = self.table.split('.');
        let valid_table = match (parts.next(), parts.next(), parts.next()) {
            (Some(table), None, None) => is_sql_identifier(table),
            (Some(schema), Some(table), None) => {
                is_sql_identifier(schema) && is_sql_identifier(table)
            }
            _ => false,
        };
        if !valid_table {
            bail!("references.table is not a valid SQL identifier: {:?}", self.table);
        }
        if !is_sql_identifier(&self.column) {
            bail!(
                "references.column is not a valid SQL identifier: {:?}",
                self.column
            );
        }
        Ok(())
    }
}

/// Returns true for `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Orphan cleanup configuration.
///
/// Controls the sweep that removes stored objects no longer referenced by the
/// reference table.
///
/// Env: `JANITOR__CLEANUP__<FIELD>`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Run the sweep on a schedule when serving. Manual triggers work regardless.
    #[serde(default)]
    pub enabled: bool,

    /// Identify orphans without deleting them.
    #[serde(default)]
    pub dry_run: bool,

    /// Unreferenced scoped objects younger than this are presumed mid-upload.
    #[serde(with = "humantime_serde", default = "default_grace_period")]
    pub grace_period: Duration,

    /// Interval between scheduled sweeps.
    #[serde(with = "humantime_serde", default = "default_interval")]
    pub interval: Duration,

    /// Maximum orphans deleted per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between delete batches, to stay under store rate limits.
    #[serde(with = "humantime_serde", default = "default_batch_pause")]
    pub batch_pause: Duration,

    /// Concurrent delete requests within a batch.
    #[serde(default = "default_delete_concurrency")]
    pub delete_concurrency: usize,

    /// Reload the reference set right before deleting and skip anything that
    /// became referenced since classification.
    #[serde(default = "default_revalidate_before_delete")]
    pub revalidate_before_delete: bool,

    /// Upper bound for draining the full object listing.
    #[serde(with = "humantime_serde", default = "default_list_timeout")]
    pub list_timeout: Duration,

    /// Upper bound for loading the reference set.
    #[serde(with = "humantime_serde", default = "default_query_timeout")]
    pub query_timeout: Duration,

    /// Upper bound for a single delete request.
    #[serde(with = "humantime_serde", default = "default_delete_timeout")]
    pub delete_timeout: Duration,
}

fn default_grace_period() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_interval() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_batch_size() -> usize {
    1000
}

fn default_batch_pause() -> Duration {
    Duration::from_millis(100)
}

fn default_delete_concurrency() -> usize {
    8
}

fn default_revalidate_before_delete() -> bool {
    true
}

fn default_list_timeout() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_query_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_delete_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dry_run: false,
            grace_period: default_grace_period(),
            interval: default_interval(),
            batch_size: default_batch_size(),
            batch_pause: default_batch_pause(),
            delete_concurrency: default_delete_concurrency(),
            revalidate_before_delete: default_revalidate_before_delete(),
            list_timeout: default_list_timeout(),
            query_timeout: default_query_timeout(),
            delete_timeout: default_delete_timeout(),
        }
    }
}

impl CleanupConfig {
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("grace_period", self.grace_period),
            ("interval", self.interval),
            ("list_timeout", self.list_timeout),
            ("query_timeout", self.query_timeout),
            ("delete_timeout", self.delete_timeout),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                bail!("cleanup.{name} must be positive");
            }
        }

        if self.batch_size == 0 {
            bail!("cleanup.batch_size must be positive, got {}", self.batch_size);
        }

        if self.delete_concurrency == 0 {
            bail!(
                "cleanup.delete_concurrency must be positive, got {}",
                self.delete_concurrency
            );
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP trigger listens on
    pub bind: String,
    /// A cleanup request still running after this long is cancelled
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: String::from("0.0.0.0:8080"),
            request_timeout: Duration::from_secs(10 * 60),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Configuration {
    /// Object storage holding the reconciled objects
    pub storage: StorageConfig,
    /// Database holding the reference table
    pub database: DatabaseConfig,
    /// Reference table and column
    pub references: ReferenceConfig,
    /// Sweep policy
    pub cleanup: CleanupConfig,
    /// HTTP trigger
    pub server: ServerConfig,
}

impl Configuration {
    /// Load defaults, then `janitor.toml`, then `JANITOR__` environment overrides.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment(Path::new(DEFAULT_CONFIG_FILE))
            .extract()
            .map_err(Box::new)
    }

    /// Same as [`Configuration::load`] with an explicit file.
    pub fn load_from_path(path: &Path) -> Result<Self, Box<figment::Error>> {
        Self::figment(path).extract().map_err(Box::new)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.dsn.is_empty() {
            bail!("storage.dsn must not be empty");
        }
        if self.database.dsn.is_empty() {
            bail!("database.dsn must not be empty");
        }
        self.references.validate()?;
        self.cleanup.validate()?;
        if self.server.request_timeout.is_zero() {
            bail!("server.request_timeout must be positive");
        }
        Ok(())
    }
}
