use crate::utils::error::ConfigError;
use crate::utils::validation::{validate_positive_number, Validate};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine settings, passed explicitly to the service and the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Upper bound for a whole enrollment transaction.
    #[serde(default = "default_transaction_timeout_ms")]
    pub transaction_timeout_ms: u64,

    /// How long a transaction waits for a row lock.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    /// Maximum in-flight requests in a batch run.
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

fn default_transaction_timeout_ms() -> u64 {
    5_000
}

fn default_lock_timeout_ms() -> u64 {
    2_000
}

fn default_batch_concurrency() -> usize {
    8
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            transaction_timeout_ms: default_transaction_timeout_ms(),
            lock_timeout_ms: default_lock_timeout_ms(),
            batch_concurrency: default_batch_concurrency(),
        }
    }
}

impl EngineConfig {
    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Validate for EngineConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        validate_positive_number("engine.transaction_timeout_ms", self.transaction_timeout_ms, 1)?;
        validate_positive_number("engine.lock_timeout_ms", self.lock_timeout_ms, 1)?;
        validate_positive_number("engine.batch_concurrency", self.batch_concurrency, 1)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.transaction_timeout(), Duration::from_secs(5));
        assert_eq!(config.lock_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = EngineConfig {
            batch_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_timeouts_compared_at_full_width() {
        let wide = EngineConfig {
            transaction_timeout_ms: 1 << 32,
            lock_timeout_ms: 1 << 32,
            ..Default::default()
        };
        assert!(wide.validate().is_ok());

        let zero = EngineConfig {
            lock_timeout_ms: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }
}
