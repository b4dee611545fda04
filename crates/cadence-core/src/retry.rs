//! Bounded retry of step attempts.
//!
//! [`run_with_retry`] drives one step through up to `max_attempts`
//! attempts. Every attempt outcome is handed to an [`AttemptRecorder`]
//! before the loop acts on it, so the execution log always contains the
//! attempt before anything observes its result.

use std::{fmt, future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result, StepError};

/// Whether a failed attempt may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retryable,
    Fatal,
}

/// Delay schedule between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay before every retry
    Fixed { delay: Duration },
    /// `base * n` before the n-th retry
    Linear { base: Duration },
    /// `base * 2^(n-1)` before the n-th retry, capped at `max`
    Exponential {
        base: Duration,
        max: Duration,
        jitter: bool,
    },
}

impl Backoff {
    /// Delay before the given retry (1 for the first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let retry = retry.max(1);
        match self {
            Backoff::Fixed { delay } => *delay,
            Backoff::Linear { base } => base.saturating_mul(retry),
            Backoff::Exponential { base, max, jitter } => {
                let factor = 2u32.checked_pow(retry - 1).unwrap_or(u32::MAX);
                let delay = base.saturating_mul(factor).min(*max);
                if *jitter {
                    // ±10%
                    let jitter = fastrand::f64() * 0.2 - 0.1;
                    delay.mul_f64(1.0 + jitter).min(*max)
                } else {
                    delay
                }
            }
        }
    }
}

/// Decides how a step error is treated by the retry loop.
pub type Classifier = Arc<dyn Fn(&StepError) -> ErrorClass + Send + Sync>;

/// Default classification: transient failures and timeouts are retryable.
pub fn default_classifier() -> Classifier {
    Arc::new(|error: &StepError| {
        if error.is_retryable() {
            ErrorClass::Retryable
        } else {
            ErrorClass::Fatal
        }
    })
}

/// How many times, how long and how far apart a step is attempted.
#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
    /// Deadline for a single attempt; elapsed deadlines become
    /// [`StepError::Timeout`]
    pub attempt_timeout: Option<Duration>,
    classifier: Classifier,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
            attempt_timeout: None,
            classifier: default_classifier(),
        }
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self::new(
            1,
            Backoff::Fixed {
                delay: Duration::ZERO,
            },
        )
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn classify(&self, error: &StepError) -> ErrorClass {
        (self.classifier)(error)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().policy()
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("backoff", &self.backoff)
            .field("attempt_timeout", &self.attempt_timeout)
            .finish_non_exhaustive()
    }
}

/// Backoff shape selectable from configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Fixed,
    Linear,
    #[default]
    Exponential,
}

/// Serializable retry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    /// `None` disables the per-attempt deadline
    pub attempt_timeout_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffKind::Exponential,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter: true,
            attempt_timeout_ms: Some(300_000),
        }
    }
}

impl RetryConfig {
    /// Rejects settings that cannot produce a usable policy.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(EngineError::invalid_input(
                "retry.max_attempts",
                "must be at least 1",
            ));
        }
        if self.base_delay_ms == 0 {
            return Err(EngineError::invalid_input(
                "retry.base_delay_ms",
                "must be positive",
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(EngineError::invalid_input(
                "retry.max_delay_ms",
                "must not be smaller than base_delay_ms",
            ));
        }
        if self.attempt_timeout_ms == Some(0) {
            return Err(EngineError::invalid_input(
                "retry.attempt_timeout_ms",
                "must be positive",
            ));
        }
        Ok(())
    }

    /// Builds a policy with the default classifier.
    pub fn policy(&self) -> RetryPolicy {
        let base = Duration::from_millis(self.base_delay_ms);
        let backoff = match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed { delay: base },
            BackoffKind::Linear => Backoff::Linear { base },
            BackoffKind::Exponential => Backoff::Exponential {
                base,
                max: Duration::from_millis(self.max_delay_ms),
                jitter: self.jitter,
            },
        };
        let policy = RetryPolicy::new(self.max_attempts, backoff);
        match self.attempt_timeout_ms {
            Some(ms) => policy.with_attempt_timeout(Duration::from_millis(ms)),
            None => policy,
        }
    }
}

/// Outcome of one attempt as seen by the recorder.
#[derive(Debug, Clone, Copy)]
pub enum AttemptOutcome<'a> {
    Succeeded,
    Failed(&'a StepError),
}

/// Persists attempt outcomes and retry counters for one step.
#[async_trait]
pub trait AttemptRecorder: Send + Sync {
    /// Records the outcome of attempt `attempt` (1-based).
    async fn record_attempt(&self, attempt: u32, outcome: AttemptOutcome<'_>) -> Result<()>;

    /// Called right before attempt `next_attempt` starts after a retryable
    /// failure.
    async fn on_retry(&self, next_attempt: u32) -> Result<()>;
}

/// A successful attempt and how many attempts it took.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptSuccess<T> {
    pub value: T,
    pub attempts: u32,
}

/// Why the retry loop gave up on a step.
#[derive(Error, Debug)]
pub enum RetryFailure {
    #[error("{error}")]
    Fatal { attempts: u32, error: StepError },
    #[error("Exhausted {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: StepError },
    #[error("Cancelled after {attempts} attempts: {last}")]
    Cancelled { attempts: u32, last: StepError },
    #[error("Failed to record attempt: {0}")]
    Recorder(#[source] EngineError),
}

impl RetryFailure {
    /// The step-level error, absent when recording itself failed.
    pub fn step_error(&self) -> Option<&StepError> {
        match self {
            RetryFailure::Fatal { error, .. } => Some(error),
            RetryFailure::Exhausted { last, .. } | RetryFailure::Cancelled { last, .. } => {
                Some(last)
            }
            RetryFailure::Recorder(_) => None,
        }
    }

    /// Attempts made before giving up.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            RetryFailure::Fatal { attempts, .. }
            | RetryFailure::Exhausted { attempts, .. }
            | RetryFailure::Cancelled { attempts, .. } => Some(*attempts),
            RetryFailure::Recorder(_) => None,
        }
    }
}

/// Runs `execute` until it succeeds, fails fatally, exhausts the policy or
/// the token is cancelled between attempts.
///
/// `execute` receives the 1-based attempt number. A cancellation never
/// interrupts an attempt in flight; it stops the loop before the next one.
pub async fn run_with_retry<F, Fut, T>(
    step: &str,
    mut execute: F,
    policy: &RetryPolicy,
    recorder: &dyn AttemptRecorder,
    cancel: &CancellationToken,
) -> std::result::Result<AttemptSuccess<T>, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = std::result::Result<T, StepError>>,
{
    let mut attempt = 1;

    loop {
        log::debug!("Step '{step}': attempt {attempt}/{}", policy.max_attempts);

        let outcome = match policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, execute(attempt)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(StepError::Timeout { after: limit }),
            },
            None => execute(attempt).await,
        };

        match outcome {
            Ok(value) => {
                recorder
                    .record_attempt(attempt, AttemptOutcome::Succeeded)
                    .await
                    .map_err(RetryFailure::Recorder)?;
                if attempt > 1 {
                    log::info!("Step '{step}' succeeded on attempt {attempt}");
                }
                return Ok(AttemptSuccess {
                    value,
                    attempts: attempt,
                });
            }
            Err(error) => {
                recorder
                    .record_attempt(attempt, AttemptOutcome::Failed(&error))
                    .await
                    .map_err(RetryFailure::Recorder)?;

                if policy.classify(&error) == ErrorClass::Fatal {
                    log::error!("Step '{step}' failed with non-retryable error: {error}");
                    return Err(RetryFailure::Fatal {
                        attempts: attempt,
                        error,
                    });
                }

                if attempt >= policy.max_attempts {
                    log::error!("Step '{step}' failed after {attempt} attempts: {error}");
                    return Err(RetryFailure::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }

                let delay = policy.backoff.delay_for(attempt);
                log::warn!(
                    "Step '{step}' failed (attempt {attempt}/{}): {error}. Retrying in {delay:?}",
                    policy.max_attempts
                );

                if cancel.is_cancelled() {
                    return Err(RetryFailure::Cancelled {
                        attempts: attempt,
                        last: error,
                    });
                }
                tokio::select! {
                    _ = cancel.cancelled() => {
                        log::warn!("Step '{step}': retry abandoned, plan cancelled");
                        return Err(RetryFailure::Cancelled { attempts: attempt, last: error });
                    }
                    _ = tokio::time::sleep(delay) => {}
                }

                attempt += 1;
                recorder
                    .on_retry(attempt)
                    .await
                    .map_err(RetryFailure::Recorder)?;
            }
        }
    }
}
