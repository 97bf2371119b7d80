use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 443;
pub const DEFAULT_TIMEOUT_MS: u64 = 1_000;
pub const DEFAULT_ATTEMPTS: u32 = 2;
pub const DEFAULT_CONCURRENCY: usize = 200;
pub const DEFAULT_TOP: usize = 20;

/// Upper bound on simultaneously open sockets regardless of what is requested.
pub const MAX_CONCURRENCY: usize = 5_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("port must be in 1..=65535")]
    ZeroPort,

    #[error("timeout per trial must be greater than zero")]
    ZeroTimeout,

    #[error("attempts per candidate must be at least 1")]
    ZeroAttempts,

    #[error("concurrency limit must be at least 1")]
    ZeroConcurrency,

    #[error("top-N cut must be at least 1")]
    ZeroTop,
}

/// Per-run probing parameters.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ProbeConfig {
    pub port: u16,
    pub timeout_ms: u64,
    pub attempts: u32,
    pub concurrency: usize,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            attempts: DEFAULT_ATTEMPTS,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Concurrency actually used by the scheduler.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::ZeroPort);
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}

/// Probing parameters plus the size of the emitted shortlist.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RankConfig {
    #[serde(flatten)]
    pub probe: ProbeConfig,
    pub top: usize,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            probe: ProbeConfig::default(),
            top: DEFAULT_TOP,
        }
    }
}

impl RankConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.probe.validate()?;
        if self.top == 0 {
            return Err(ConfigError::ZeroTop);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = RankConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.probe.port, 443);
        assert_eq!(cfg.probe.timeout(), Duration::from_secs(1));
        assert_eq!(cfg.top, 20);
    }

    #[test]
    fn zero_values_rejected() {
        let mut cfg = RankConfig::default();
        cfg.probe.attempts = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroAttempts));

        let mut cfg = RankConfig::default();
        cfg.probe.concurrency = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroConcurrency));

        let mut cfg = RankConfig::default();
        cfg.top = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroTop));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: RankConfig = serde_json::from_str(r#"{"port": 8443, "top": 5}"#).unwrap();
        assert_eq!(cfg.probe.port, 8443);
        assert_eq!(cfg.probe.attempts, DEFAULT_ATTEMPTS);
        assert_eq!(cfg.top, 5);
    }

    #[test]
    fn concurrency_is_clamped() {
        let cfg = ProbeConfig {
            concurrency: 1_000_000,
            ..ProbeConfig::default()
        };
        assert_eq!(cfg.effective_concurrency(), MAX_CONCURRENCY);
    }
}
