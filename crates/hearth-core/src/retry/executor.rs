//! Retry execution engine
//!
//! The async path sleeps with `tokio::time::sleep`. The blocking path
//! sleeps the current thread and exists only for call chains that cannot
//! be made asynchronous (the startup scan).

use std::fmt::Display;
use std::future::Future;
use std::time::{Duration, Instant};

use crate::types::RetryPolicy;

use super::error::RetryError;
use super::observer::{NoOpObserver, RetryObserver, TracingObserver};
use super::strategies::{
    calculate_delay, platform_delay_multiplier, AlwaysRetry, RetryPredicate, Retryable,
    RetryableErrors,
};

/// Run an async operation under `policy`, retrying errors that report
/// themselves as transient
///
/// Failures are logged against `label`. On exhaustion the returned
/// [`RetryError::Exhausted`] carries the final underlying error and the
/// attempt count.
pub async fn retry<F, Fut, T, E>(
    label: &str,
    policy: &RetryPolicy,
    op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + Display,
{
    RetryExecutorBuilder::new()
        .with_policy(policy.clone())
        .with_predicate(RetryableErrors)
        .with_observer(TracingObserver::new(label))
        .build()
        .execute(op)
        .await
}

/// Blocking counterpart of [`retry`]
///
/// Sleeps the calling thread between attempts. Never call this from an
/// async task.
pub fn retry_blocking<F, T, E>(label: &str, policy: &RetryPolicy, op: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Result<T, E>,
    E: Retryable + Display,
{
    RetryExecutorBuilder::new()
        .with_policy(policy.clone())
        .with_predicate(RetryableErrors)
        .with_observer(TracingObserver::new(label))
        .build()
        .execute_blocking(op)
}

/// Builder for configuring a `RetryExecutor`
///
/// # Example
///
/// ```rust
/// use hearth_core::retry::{RetryExecutorBuilder, RetryableErrors, TracingObserver};
/// use hearth_core::types::RetryPolicy;
///
/// let executor = RetryExecutorBuilder::new()
///     .with_policy(RetryPolicy::default())
///     .with_predicate(RetryableErrors)
///     .with_observer(TracingObserver::new("relocate"))
///     .with_delay_multiplier(1.0)
///     .build();
/// ```
pub struct RetryExecutorBuilder<P = AlwaysRetry, O = NoOpObserver> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    jitter: bool,
    delay_multiplier: f64,
}

impl Default for RetryExecutorBuilder<AlwaysRetry, NoOpObserver> {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryExecutorBuilder<AlwaysRetry, NoOpObserver> {
    /// Create a new builder with jitter enabled and the host platform multiplier
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy::default(),
            predicate: AlwaysRetry,
            observer: NoOpObserver,
            jitter: true,
            delay_multiplier: platform_delay_multiplier(),
        }
    }
}

impl<P, O> RetryExecutorBuilder<P, O> {
    /// Set the retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the retry predicate
    pub fn with_predicate<P2>(self, predicate: P2) -> RetryExecutorBuilder<P2, O> {
        RetryExecutorBuilder {
            policy: self.policy,
            predicate,
            observer: self.observer,
            jitter: self.jitter,
            delay_multiplier: self.delay_multiplier,
        }
    }

    /// Set the observer
    pub fn with_observer<O2>(self, observer: O2) -> RetryExecutorBuilder<P, O2> {
        RetryExecutorBuilder {
            policy: self.policy,
            predicate: self.predicate,
            observer,
            jitter: self.jitter,
            delay_multiplier: self.delay_multiplier,
        }
    }

    /// Enable or disable jitter
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Override the platform delay multiplier
    ///
    /// Non-finite or non-positive values are ignored.
    pub fn with_delay_multiplier(mut self, multiplier: f64) -> Self {
        if multiplier.is_finite() && multiplier > 0.0 {
            self.delay_multiplier = multiplier;
        }
        self
    }

    /// Build the executor
    pub fn build(self) -> RetryExecutor<P, O> {
        RetryExecutor {
            policy: self.policy,
            predicate: self.predicate,
            observer: self.observer,
            jitter: self.jitter,
            delay_multiplier: self.delay_multiplier,
        }
    }
}

/// What to do after a failed attempt
enum Step<E> {
    Stop(RetryError<E>),
    Wait(Duration, E),
}

/// A retry executor with configurable policy, predicate, and observer
///
/// Use `RetryExecutorBuilder` to create an instance.
pub struct RetryExecutor<P, O> {
    policy: RetryPolicy,
    predicate: P,
    observer: O,
    jitter: bool,
    delay_multiplier: f64,
}

impl<P, O> RetryExecutor<P, O>
where
    O: RetryObserver,
{
    /// At least one attempt always runs, even for a zero-attempt policy
    fn max_attempts(&self) -> u32 {
        self.policy.max_attempts.max(1)
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        calculate_delay(&self.policy, attempt, self.jitter).mul_f64(self.delay_multiplier)
    }

    fn on_failure<E>(&self, attempt: u32, err: E, start: Instant) -> Step<E>
    where
        E: Display,
        P: RetryPredicate<E>,
    {
        if !self.predicate.should_retry(&err) {
            self.observer
                .on_cancelled(attempt, Some(&err as &dyn Display));
            return Step::Stop(RetryError::non_retryable(attempt, err));
        }

        if attempt >= self.max_attempts() {
            self.observer.on_exhausted(attempt, &err);
            return Step::Stop(RetryError::exhausted(attempt, err, start.elapsed()));
        }

        let delay = self.delay_for(attempt);
        self.observer.on_attempt_failed(attempt, &err, delay);
        Step::Wait(delay, err)
    }

    /// Execute an async operation with retry logic
    pub async fn execute<F, Fut, T, E>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        P: RetryPredicate<E>,
    {
        let start = Instant::now();
        let max_attempts = self.max_attempts();
        let mut last_error: Option<E> = None;

        for attempt in 1..=max_attempts {
            self.observer.on_attempt_start(attempt, max_attempts);

            match op().await {
                Ok(result) => {
                    self.observer.on_success(attempt, start.elapsed());
                    return Ok(result);
                }
                Err(err) => match self.on_failure(attempt, err, start) {
                    Step::Stop(stop) => return Err(stop),
                    Step::Wait(delay, err) => {
                        last_error = Some(err);
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                },
            }
        }

        Err(RetryError::cancelled(max_attempts, last_error))
    }

    /// Execute a synchronous operation with retry logic, sleeping the thread
    pub fn execute_blocking<F, T, E>(&self, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Result<T, E>,
        E: Display,
        P: RetryPredicate<E>,
    {
        let start = Instant::now();
        let max_attempts = self.max_attempts();
        let mut last_error: Option<E> = None;

        for attempt in 1..=max_attempts {
            self.observer.on_attempt_start(attempt, max_attempts);

            match op() {
                Ok(result) => {
                    self.observer.on_success(attempt, start.elapsed());
                    return Ok(result);
                }
                Err(err) => match self.on_failure(attempt, err, start) {
                    Step::Stop(stop) => return Err(stop),
                    Step::Wait(delay, err) => {
                        last_error = Some(err);
                        if !delay.is_zero() {
                            std::thread::sleep(delay);
                        }
                    }
                },
            }
        }

        Err(RetryError::cancelled(max_attempts, last_error))
    }
}
