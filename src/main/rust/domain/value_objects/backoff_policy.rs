use std::time::Duration;

use crate::domain::errors::{DomainError, Result};

/// Exponential wait between fetch attempts of a manifest or segment.
///
/// Retry `n` waits `initial * multiplier^(n-1)`, never more than `ceiling`.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    initial: Duration,
    ceiling: Duration,
    multiplier: f64,
}

impl BackoffPolicy {
    pub fn new(initial: Duration, ceiling: Duration, multiplier: f64) -> Result<Self> {
        if multiplier <= 1.0 {
            return Err(DomainError::InvalidBackoffMultiplier);
        }

        Ok(Self {
            initial,
            ceiling: ceiling.max(initial),
            multiplier,
        })
    }

    pub fn initial_delay(&self) -> Duration {
        self.initial
    }

    pub fn max_delay(&self) -> Duration {
        self.ceiling
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Wait before retry number `retry`, counted from 1
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.ceiling.as_secs_f64() {
            return self.ceiling;
        }
        Duration::from_secs_f64(secs)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            ceiling: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}
