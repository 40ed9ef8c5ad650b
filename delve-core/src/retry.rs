//! Retry policy — bounded attempts with exponential backoff.
//!
//! Every stage failure is treated as transient. When the attempts run out the
//! stage result is simply empty; deciding whether that is fatal belongs to the
//! pipeline, not the policy.

use crate::config::RetryConfig;
use crate::error::StageError;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Per-attempt request configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptProfile {
    /// Attach the stage's JSON schema as strict response guidance.
    pub strict_schema: bool,
}

impl AttemptProfile {
    pub const STRICT: Self = Self {
        strict_schema: true,
    };
    pub const RELAXED: Self = Self {
        strict_schema: false,
    };
}

/// Upper bound on the backoff exponent so the shift never overflows.
const MAX_BACKOFF_EXPONENT: u32 = 16;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff_unit: Duration,
    profiles: Vec<AttemptProfile>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Create a policy; `max_attempts` is clamped to at least one.
    ///
    /// The first attempt is strict, every later attempt relaxed.
    pub fn new(max_attempts: u32, backoff_unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_unit,
            profiles: vec![AttemptProfile::STRICT, AttemptProfile::RELAXED],
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.backoff_unit_ms),
        )
    }

    /// Replace the attempt table. The last entry applies to all later attempts.
    pub fn with_profiles(mut self, profiles: Vec<AttemptProfile>) -> Self {
        if !profiles.is_empty() {
            self.profiles = profiles;
        }
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff_unit(&self) -> Duration {
        self.backoff_unit
    }

    /// Profile for zero-based `attempt`.
    pub fn profile(&self, attempt: u32) -> AttemptProfile {
        let index = (attempt as usize).min(self.profiles.len().saturating_sub(1));
        self.profiles
            .get(index)
            .copied()
            .unwrap_or(AttemptProfile::RELAXED)
    }

    /// Sleep between attempt `attempt` and `attempt + 1`: `2^attempt` units.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(MAX_BACKOFF_EXPONENT);
        self.backoff_unit.saturating_mul(factor)
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// Returns `Ok(None)` on exhaustion. The only error is
    /// [`StageError::Cancelled`], either raised by `op` or observed while
    /// waiting out a backoff.
    pub async fn run<T, F, Fut>(
        &self,
        stage: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<Option<T>, StageError>
    where
        F: FnMut(u32, AttemptProfile) -> Fut,
        Fut: Future<Output = Result<T, StageError>>,
    {
        for attempt in 0..self.max_attempts {
            if cancel.is_cancelled() {
                return Err(StageError::Cancelled);
            }

            let error = match op(attempt, self.profile(attempt)).await {
                Ok(value) => return Ok(Some(value)),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            warn!(
                stage,
                attempt = attempt + 1,
                max_attempts = self.max_attempts,
                error = %error,
                "Stage attempt failed"
            );

            if attempt + 1 < self.max_attempts {
                let wait = self.backoff_for(attempt);
                info!(stage, backoff_ms = wait.as_millis() as u64, "Retrying after backoff");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(StageError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }

        warn!(
            stage,
            max_attempts = self.max_attempts,
            "Retries exhausted; stage result is empty"
        );
        Ok(None)
    }
}
