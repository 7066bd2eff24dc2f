//! Settings for a single reconciliation run.

use std::time::Duration;

use common::config::CleanupConfig;

use crate::deleter::DeleterSettings;

/// Per-run settings, derived from the `cleanup` configuration section.
///
/// Scheduling (`enabled`, `interval`) stays with the caller.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    pub grace_period: Duration,
    pub dry_run: bool,
    pub revalidate_before_delete: bool,
    pub batch_size: usize,
    pub batch_pause: Duration,
    pub delete_concurrency: usize,
    pub list_timeout: Duration,
    pub query_timeout: Duration,
    pub delete_timeout: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self::from(&CleanupConfig::default())
    }
}

impl From<&CleanupConfig> for SweepConfig {
    fn from(config: &CleanupConfig) -> Self {
        Self {
            grace_period: config.grace_period,
            dry_run: config.dry_run,
            revalidate_before_delete: config.revalidate_before_delete,
            batch_size: config.batch_size,
            batch_pause: config.batch_pause,
            delete_concurrency: config.delete_concurrency,
            list_timeout: config.list_timeout,
            query_timeout: config.query_timeout,
            delete_timeout: config.delete_timeout,
        }
    }
}

impl SweepConfig {
    pub fn deleter_settings(&self) -> DeleterSettings {
        DeleterSettings {
            batch_size: self.batch_size,
            batch_pause: self.batch_pause,
            concurrency: self.delete_concurrency,
            delete_timeout: self.delete_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cleanup_config() {
        let cleanup = CleanupConfig {
            grace_period: Duration::from_secs(3600),
            dry_run: true,
            delete_concurrency: 2,
            ..Default::default()
        };

        let sweep = SweepConfig::from(&cleanup);
        assert_eq!(sweep.grace_period, Duration::from_secs(3600));
        assert!(sweep.dry_run);
        assert!(sweep.revalidate_before_delete);

        let settings = sweep.deleter_settings();
        assert_eq!(settings.concurrency, 2);
        assert_eq!(settings.batch_size, 1000);
    }
}
