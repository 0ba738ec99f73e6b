//! Retry Mechanism Module
//!
//! A [`RetryPolicy`] is a pure decision object: given a transient failure and
//! the number of retries already spent it answers "retry after D" or "stop".
//! It carries no mutable state, so one policy can be shared by any number of
//! concurrent calls.
//!
//! Auth expiry never reaches a policy; it is recovered by the refresh
//! coordinator without consuming retries.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use crate::defaults;
use crate::error::FailureCause;

/// How long to wait before the n-th retry (`n` starts at 1).
#[derive(Clone)]
pub enum DelayStrategy {
    /// Same delay before every retry.
    Fixed(Duration),
    /// `min(base^n, cap)` seconds.
    ExponentialBackoff { base: f64, cap: Duration },
    /// Caller-supplied function of the retry number.
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl std::fmt::Debug for DelayStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed(d) => f.debug_tuple("Fixed").field(d).finish(),
            Self::ExponentialBackoff { base, cap } => f
                .debug_struct("ExponentialBackoff")
                .field("base", base)
                .field("cap", cap)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl Default for DelayStrategy {
    fn default() -> Self {
        Self::ExponentialBackoff {
            base: defaults::retry::BACKOFF_BASE_SECS,
            cap: defaults::retry::BACKOFF_CAP,
        }
    }
}

impl DelayStrategy {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        match self {
            Self::Fixed(d) => *d,
            Self::ExponentialBackoff { base, cap } => {
                let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
                Duration::try_from_secs_f64(base.powi(exponent))
                    .map(|d| d.min(*cap))
                    .unwrap_or(*cap)
            }
            Self::Custom(f) => f(retry),
        }
    }
}

/// Predicate deciding whether a transient failure is worth another attempt.
#[derive(Clone)]
pub struct RetryCondition {
    condition: Arc<dyn Fn(&FailureCause, u32) -> bool + Send + Sync>,
}

impl std::fmt::Debug for RetryCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RetryCondition(..)")
    }
}

impl Default for RetryCondition {
    fn default() -> Self {
        Self::transient()
    }
}

impl RetryCondition {
    pub fn new<F>(condition: F) -> Self
    where
        F: Fn(&FailureCause, u32) -> bool + Send + Sync + 'static,
    {
        Self {
            condition: Arc::new(condition),
        }
    }

    /// 5xx responses, timeouts and connection loss.
    pub fn transient() -> Self {
        Self::new(|cause, _| cause.is_retryable())
    }

    pub fn never() -> Self {
        Self::new(|_, _| false)
    }

    /// Retry every transient failure, decode errors included. Use with care.
    pub fn always() -> Self {
        Self::new(|_, _| true)
    }

    /// Retry only the listed status codes.
    pub fn status_codes(codes: impl IntoIterator<Item = u16>) -> Self {
        let codes: BTreeSet<u16> = codes.into_iter().collect();
        Self::new(move |cause, _| {
            cause
                .status_code()
                .map(|code| codes.contains(&code))
                .unwrap_or(false)
        })
    }

    pub fn should_retry(&self, cause: &FailureCause, attempt: u32) -> bool {
        (self.condition)(cause, attempt)
    }
}

/// What to do after a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    Stop,
}

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// Delay before each retry.
    pub delay: DelayStrategy,
    /// Which failures are retried at all.
    pub condition: RetryCondition,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: defaults::retry::MAX_RETRIES,
            delay: DelayStrategy::default(),
            condition: RetryCondition::default(),
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: DelayStrategy::Fixed(Duration::ZERO),
            condition: RetryCondition::never(),
        }
    }

    /// Exponential backoff with the default condition.
    pub fn exponential(max_retries: u32, base: f64, cap: Duration) -> Self {
        Self::default()
            .with_max_retries(max_retries)
            .with_delay(DelayStrategy::ExponentialBackoff { base, cap })
    }

    /// Fixed delay with the default condition.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self::default()
            .with_max_retries(max_retries)
            .with_delay(DelayStrategy::Fixed(delay))
    }

    /// Set maximum retries
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_delay(mut self, delay: DelayStrategy) -> Self {
        self.delay = delay;
        self
    }

    /// Custom delay as a function of the 1-based retry number.
    pub fn with_custom_delay<F>(self, delay: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.with_delay(DelayStrategy::Custom(Arc::new(delay)))
    }

    pub fn with_condition(mut self, condition: RetryCondition) -> Self {
        self.condition = condition;
        self
    }

    /// `attempt` is the number of retries already spent on this call.
    pub fn should_retry(&self, cause: &FailureCause, attempt: u32) -> bool {
        attempt < self.max_retries && self.condition.should_retry(cause, attempt)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.delay.delay(retry)
    }

    pub fn decide(&self, cause: &FailureCause, attempt: u32) -> RetryDecision {
        if self.should_retry(cause, attempt) {
            RetryDecision::RetryAfter(self.delay_for(attempt + 1))
        } else {
            RetryDecision::Stop
        }
    }
}
