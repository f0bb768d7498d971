//! Partial settings updates accepted at runtime.
//!
//! Field names follow the config file; the short names used by the
//! dashboard (`maxAttempts`, `baseDelay`, `backoff`, `windowMs`) are accepted
//! as aliases.

use serde::{Deserialize, Serialize};

use crate::resilience::{RateLimitConfig, RetryPolicy};

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ConfigPatch {
    #[serde(default)]
    pub retry: Option<RetryPatch>,

    #[serde(default, alias = "rateLimit")]
    pub rate_limit: Option<RateLimitPatch>,
}

impl ConfigPatch {
    /// Patch carrying every runtime-adjustable value of a full config.
    pub fn from_config(retry: &RetryPolicy, rate_limit: &RateLimitConfig) -> Self {
        Self {
            retry: Some(RetryPatch {
                max_attempts: Some(retry.max_attempts),
                base_delay_ms: Some(retry.base_delay_ms),
                max_delay_ms: Some(retry.max_delay_ms),
                backoff_multiplier: Some(retry.backoff_multiplier),
            }),
            rate_limit: Some(RateLimitPatch {
                max: Some(rate_limit.max),
                window_ms: Some(rate_limit.window_ms),
            }),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.retry.is_none() && self.rate_limit.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RetryPatch {
    #[serde(default, alias = "maxAttempts")]
    pub max_attempts: Option<u32>,

    #[serde(default, alias = "baseDelay", alias = "baseDelayMs")]
    pub base_delay_ms: Option<u64>,

    #[serde(default, alias = "maxDelay", alias = "maxDelayMs")]
    pub max_delay_ms: Option<u64>,

    #[serde(default, alias = "backoff", alias = "backoffMultiplier")]
    pub backoff_multiplier: Option<f64>,
}

impl RetryPatch {
    pub fn apply(&self, policy: &mut RetryPolicy) {
        if let Some(v) = self.max_attempts {
            policy.max_attempts = v;
        }
        if let Some(v) = self.base_delay_ms {
            policy.base_delay_ms = v;
        }
        if let Some(v) = self.max_delay_ms {
            policy.max_delay_ms = v;
        }
        if let Some(v) = self.backoff_multiplier {
            policy.backoff_multiplier = v;
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RateLimitPatch {
    #[serde(default)]
    pub max: Option<u32>,

    #[serde(default, alias = "windowMs")]
    pub window_ms: Option<u64>,
}

impl RateLimitPatch {
    pub fn apply(&self, config: &mut RateLimitConfig) {
        if let Some(v) = self.max {
            config.max = v;
        }
        if let Some(v) = self.window_ms {
            config.window_ms = v;
        }
    }
}
