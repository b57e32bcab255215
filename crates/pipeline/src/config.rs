use std::str::FromStr;
use std::time::Duration;

use chemaudit_core::batch::MAX_BATCH_SIZE;
use chemaudit_events::channel::DEFAULT_CAPACITY;

/// A configuration variable was present but could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("{key} must be a valid {expected}, got {value:?}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub expected: &'static str,
}

/// Read `key` from the environment, falling back to `default` when unset.
pub fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError {
            key,
            value,
            expected: std::any::type_name::<T>(),
        }),
        Err(_) => Ok(default),
    }
}

/// Engine tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Largest batch a single submission may contain.
    pub max_batch_size: usize,
    /// Pending and running items admitted across all live batches.
    pub queue_capacity: usize,
    /// Global bound on concurrent validations.
    pub worker_pool_size: usize,
    /// Per-item timeout used when a submission does not set one.
    pub item_timeout: Duration,
    /// Upper clamp for per-submission timeouts.
    pub max_item_timeout: Duration,
    /// How long a terminal session stays queryable.
    pub retention: Duration,
    /// How long a live session may go unobserved before it is cancelled.
    pub abandon_grace: Duration,
    /// Buffer size of each session's progress channel.
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: MAX_BATCH_SIZE,
            queue_capacity: 50_000,
            worker_pool_size: default_pool_size(),
            item_timeout: Duration::from_secs(30),
            max_item_timeout: Duration::from_secs(300),
            retention: Duration::from_secs(3600),
            abandon_grace: Duration::from_secs(300),
            channel_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default              |
    /// |-----------------------------|----------------------|
    /// | `MAX_BATCH_SIZE`            | `10000`              |
    /// | `QUEUE_CAPACITY`            | `50000`              |
    /// | `WORKER_POOL_SIZE`          | available parallelism|
    /// | `ITEM_TIMEOUT_MS`           | `30000`              |
    /// | `MAX_ITEM_TIMEOUT_MS`       | `300000`             |
    /// | `BATCH_RETENTION_SECS`      | `3600`               |
    /// | `ABANDON_GRACE_SECS`        | `300`                |
    /// | `PROGRESS_CHANNEL_CAPACITY` | `1024`               |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let item_timeout_ms = env_or("ITEM_TIMEOUT_MS", duration_ms(defaults.item_timeout))?;
        let max_item_timeout_ms =
            env_or("MAX_ITEM_TIMEOUT_MS", duration_ms(defaults.max_item_timeout))?;
        let retention_secs = env_or("BATCH_RETENTION_SECS", defaults.retention.as_secs())?;
        let abandon_grace_secs = env_or("ABANDON_GRACE_SECS", defaults.abandon_grace.as_secs())?;

        Ok(Self {
            max_batch_size: env_or("MAX_BATCH_SIZE", defaults.max_batch_size)?.max(1),
            queue_capacity: env_or("QUEUE_CAPACITY", defaults.queue_capacity)?.max(1),
            worker_pool_size: env_or("WORKER_POOL_SIZE", defaults.worker_pool_size)?.max(1),
            item_timeout: Duration::from_millis(item_timeout_ms.max(1)),
            max_item_timeout: Duration::from_millis(max_item_timeout_ms.max(1)),
            retention: Duration::from_secs(retention_secs),
            abandon_grace: Duration::from_secs(abandon_grace_secs),
            channel_capacity: env_or("PROGRESS_CHANNEL_CAPACITY", defaults.channel_capacity)?
                .max(1),
        })
    }

    /// Resolve the timeout for one item from an optional per-batch override.
    pub fn resolve_item_timeout(&self, requested_ms: Option<u64>) -> Duration {
        match requested_ms {
            Some(ms) => Duration::from_millis(ms.max(1)).min(self.max_item_timeout),
            None => self.item_timeout.min(self.max_item_timeout),
        }
    }
}

fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
