//! Test configuration builder for creating test setups quickly.

use std::time::Duration;

use crate::config::{Configuration, DatabaseConfig};

/// Builder for creating test configurations.
///
/// # Example
///
/// ```rust,ignore
/// use common::testing::TestConfigBuilder;
///
/// let config = TestConfigBuilder::new()
///     .in_memory()
///     .with_grace_period(Duration::from_secs(3600))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Configuration::default(),
        }
    }

    /// In-memory object store and SQLite, no pauses between delete batches.
    pub fn in_memory(mut self) -> Self {
        self.config.storage.dsn = "memory://".to_string();
        self.config.database = DatabaseConfig::in_memory();
        self.config.cleanup.batch_pause = Duration::ZERO;
        self
    }

    pub fn with_storage_prefix(mut self, prefix: &str) -> Self {
        self.config.storage.prefix = prefix.to_string();
        self
    }

    pub fn with_reference_column(mut self, table: &str, column: &str) -> Self {
        self.config.references.table = table.to_string();
        self.config.references.column = column.to_string();
        self
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.config.cleanup.grace_period = grace_period;
        self
    }

    pub fn with_dry_run(mut self) -> Self {
        self.config.cleanup.dry_run = true;
        self
    }

    pub fn without_revalidation(mut self) -> Self {
        self.config.cleanup.revalidate_before_delete = false;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.server.request_timeout = timeout;
        self
    }

    pub fn build(self) -> Configuration {
        self.config
    }
}
