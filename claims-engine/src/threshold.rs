use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::coverage::normalize_amount;
use crate::error::Result;
use crate::models::{ConfigurableThreshold, RejectionReason};
use crate::storage::ThresholdStorage;

/// The threshold in force, and whether it came from storage or the default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentThreshold {
    pub prescription_amount: Decimal,
    pub configured: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ThresholdCheck {
    Pass,
    Fail(RejectionReason),
}

struct CachedThreshold {
    value: CurrentThreshold,
    loaded_at: Instant,
}

/// Evaluates claim amounts against the configurable minimum.
///
/// Reads are cached for `ttl`. Updates made through [`ThresholdPolicy::update`]
/// replace the cached value at once; writes that bypass this type become
/// visible after at most `ttl`, or immediately after [`ThresholdPolicy::invalidate`].
pub struct ThresholdPolicy {
    storage: Arc<dyn ThresholdStorage>,
    clock: Arc<dyn Clock>,
    default_amount: Decimal,
    ttl: Duration,
    cache: RwLock<Option<CachedThreshold>>,
}

impl ThresholdPolicy {
    pub fn new(
        storage: Arc<dyn ThresholdStorage>,
        clock: Arc<dyn Clock>,
        default_amount: Decimal,
        ttl: Duration,
    ) -> Self {
        Self {
            storage,
            clock,
            default_amount,
            ttl,
            cache: RwLock::new(None),
        }
    }

    /// The configured threshold, or the default when none was ever set.
    pub async fn get_or_default(&self) -> Result<CurrentThreshold> {
        if !self.ttl.is_zero() {
            if let Some(cached) = self.cache.read().await.as_ref() {
                if cached.loaded_at.elapsed() < self.ttl {
                    return Ok(cached.value.clone());
                }
            }
        }

        let value = match self.storage.current().await? {
            Some(config) => CurrentThreshold {
                prescription_amount: config.prescription_amount,
                configured: true,
                updated_at: Some(config.updated_at),
            },
            None => {
                debug!(default = %self.default_amount, "No threshold configured, using default");
                CurrentThreshold {
                    prescription_amount: self.default_amount,
                    configured: false,
                    updated_at: None,
                }
            }
        };
        self.store_in_cache(value.clone()).await;
        Ok(value)
    }

    /// Amounts strictly below the threshold fail.
    pub async fn evaluate(&self, amount: Decimal) -> Result<ThresholdCheck> {
        let threshold = self.get_or_default().await?.prescription_amount;
        if amount < threshold {
            return Ok(ThresholdCheck::Fail(RejectionReason::BelowThreshold { threshold }));
        }
        Ok(ThresholdCheck::Pass)
    }

    /// Set the threshold, creating the setting if it does not exist yet.
    pub async fn update(&self, amount: Decimal) -> Result<ConfigurableThreshold> {
        let amount = normalize_amount(amount, "prescriptionAmount")?;
        let saved = self.storage.upsert(amount, self.clock.now()).await?;
        info!(
            prescription_amount = %saved.prescription_amount,
            "Minimum prescription amount updated"
        );

        self.store_in_cache(CurrentThreshold {
            prescription_amount: saved.prescription_amount,
            configured: true,
            updated_at: Some(saved.updated_at),
        })
        .await;
        Ok(saved)
    }

    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
    }

    async fn store_in_cache(&self, value: CurrentThreshold) {
        if self.ttl.is_zero() {
            return;
        }
        *self.cache.write().await = Some(CachedThreshold {
            value,
            loaded_at: Instant::now(),
        });
    }
}
