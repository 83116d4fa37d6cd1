//! Session configuration: buffer capacity plus the producer and consumer
//! workloads. Loaded from TOML, every key optional.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_CAPACITY: usize = 5;
pub const DEFAULT_ITERATIONS: usize = 10;
pub const DEFAULT_PRODUCER_DELAY_MS: u64 = 500;
pub const DEFAULT_CONSUMER_DELAY_MS: u64 = 800;

/// Workload for one driver: how many handoffs, and the pause after each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DriverConfig {
    pub iterations: usize,
    pub delay_ms: u64,
}

impl DriverConfig {
    /// Delays are kept in whole milliseconds, matching the config file; any
    /// sub-millisecond remainder of `delay` is truncated.
    pub fn new(iterations: usize, delay: Duration) -> Self {
        Self {
            iterations,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// No pacing at all; used by tests and benches.
    pub fn unpaced(iterations: usize) -> Self {
        Self {
            iterations,
            delay_ms: 0,
        }
    }

    pub fn default_producer() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            delay_ms: DEFAULT_PRODUCER_DELAY_MS,
        }
    }

    pub fn default_consumer() -> Self {
        Self {
            iterations: DEFAULT_ITERATIONS,
            delay_ms: DEFAULT_CONSUMER_DELAY_MS,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawConfig")]
pub struct HandoffConfig {
    pub capacity: usize,
    pub producer: DriverConfig,
    pub consumer: DriverConfig,
}

impl Default for HandoffConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            producer: DriverConfig::default_producer(),
            consumer: DriverConfig::default_consumer(),
        }
    }
}

// On-disk shape. Missing keys fall back per role, which is why the sections
// are not deserialized into `DriverConfig` directly.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    capacity: Option<usize>,
    #[serde(default)]
    producer: RawDriver,
    #[serde(default)]
    consumer: RawDriver,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDriver {
    iterations: Option<usize>,
    delay_ms: Option<u64>,
}

impl RawDriver {
    fn or(self, fallback: DriverConfig) -> DriverConfig {
        DriverConfig {
            iterations: self.iterations.unwrap_or(fallback.iterations),
            delay_ms: self.delay_ms.unwrap_or(fallback.delay_ms),
        }
    }
}

impl From<RawConfig> for HandoffConfig {
    fn from(raw: RawConfig) -> Self {
        Self {
            capacity: raw.capacity.unwrap_or(DEFAULT_CAPACITY),
            producer: raw.producer.or(DriverConfig::default_producer()),
            consumer: raw.consumer.or(DriverConfig::default_consumer()),
        }
    }
}

impl HandoffConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: HandoffConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_producer(mut self, producer: DriverConfig) -> Self {
        self.producer = producer;
        self
    }

    pub fn with_consumer(mut self, consumer: DriverConfig) -> Self {
        self.consumer = consumer;
        self
    }
}
