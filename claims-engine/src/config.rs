use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;

use crate::coverage::normalize_amount;
use crate::error::{EngineError, Result};

/// Tunables for the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Minimum prescription amount used while no threshold is configured.
    pub default_threshold: Decimal,
    /// How long a cached threshold may be served before it is re-read.
    /// Zero disables caching.
    pub threshold_cache_ttl: Duration,
    /// Candidate codes tried before minting gives up.
    pub code_max_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_threshold: Decimal::new(25_000, 2),
            threshold_cache_ttl: Duration::from_secs(30),
            code_max_attempts: 16,
        }
    }
}

impl EngineConfig {
    /// Read overrides from `CLAIMS_DEFAULT_THRESHOLD`,
    /// `CLAIMS_THRESHOLD_CACHE_TTL_SECS` and `CLAIMS_CODE_MAX_ATTEMPTS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup("CLAIMS_DEFAULT_THRESHOLD") {
            let amount = Decimal::from_str(raw.trim()).map_err(|e| {
                EngineError::Validation(format!("CLAIMS_DEFAULT_THRESHOLD={raw}: {e}"))
            })?;
            config.default_threshold = normalize_amount(amount, "CLAIMS_DEFAULT_THRESHOLD")?;
        }
        if let Some(raw) = lookup("CLAIMS_THRESHOLD_CACHE_TTL_SECS") {
            let secs: u64 = raw.trim().parse().map_err(|e| {
                EngineError::Validation(format!("CLAIMS_THRESHOLD_CACHE_TTL_SECS={raw}: {e}"))
            })?;
            config.threshold_cache_ttl = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup("CLAIMS_CODE_MAX_ATTEMPTS") {
            let attempts: u32 = raw.trim().parse().map_err(|e| {
                EngineError::Validation(format!("CLAIMS_CODE_MAX_ATTEMPTS={raw}: {e}"))
            })?;
            if attempts == 0 {
                return Err(EngineError::Validation(
                    "CLAIMS_CODE_MAX_ATTEMPTS must be at least 1".to_string(),
                ));
            }
            config.code_max_attempts = attempts;
        }

        Ok(config)
    }
}
