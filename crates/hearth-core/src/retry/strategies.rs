//! Retry delay strategies and predicates

use crate::types::{RetryPolicy, RetryStrategy};
use rand::Rng;
use std::io;
use std::sync::OnceLock;
use std::time::Duration;

static DELAY_MULTIPLIER_OVERRIDE: OnceLock<f64> = OnceLock::new();

/// Calculate the delay before the next retry attempt
///
/// `attempt` is 1-indexed. The result is capped at `max_delay_ms` before
/// jitter is applied; jitter adds at most 10% of the capped delay.
///
/// # Example
///
/// ```rust
/// use hearth_core::retry::calculate_delay;
/// use hearth_core::types::{RetryPolicy, RetryStrategy};
///
/// let policy = RetryPolicy {
///     max_attempts: 3,
///     strategy: RetryStrategy::ExponentialBackoff,
///     backoff_multiplier: 2.0,
///     initial_delay_ms: 500,
///     max_delay_ms: 4000,
/// };
///
/// assert_eq!(calculate_delay(&policy, 1, false).as_millis(), 500);
/// assert_eq!(calculate_delay(&policy, 2, false).as_millis(), 1000);
/// assert_eq!(calculate_delay(&policy, 5, false).as_millis(), 4000);
/// ```
pub fn calculate_delay(policy: &RetryPolicy, attempt: u32, jitter: bool) -> Duration {
    let attempt_index = attempt.saturating_sub(1);

    let base_delay_ms = match policy.strategy {
        RetryStrategy::None => 0,
        RetryStrategy::FixedDelay => policy.initial_delay_ms,
        RetryStrategy::ExponentialBackoff => {
            let multiplier = policy.backoff_multiplier.powf(attempt_index as f64);
            let raw = policy.initial_delay_ms as f64 * multiplier;
            if raw.is_finite() && raw < u64::MAX as f64 {
                raw as u64
            } else {
                u64::MAX
            }
        }
        RetryStrategy::LinearBackoff => policy
            .initial_delay_ms
            .saturating_mul(attempt_index as u64 + 1),
    };

    let capped_delay_ms = base_delay_ms.min(policy.max_delay_ms);

    let final_delay_ms = if jitter && capped_delay_ms >= 10 {
        let jitter_range = capped_delay_ms / 10;
        capped_delay_ms + rand::rng().random_range(0..=jitter_range)
    } else {
        capped_delay_ms
    };

    Duration::from_millis(final_delay_ms)
}

/// Delay multiplier for the current host platform
///
/// Directory listings on macOS and Windows lag behind writes more than on
/// Linux, so delays there are stretched by half.
pub fn platform_delay_multiplier() -> f64 {
    if let Some(multiplier) = DELAY_MULTIPLIER_OVERRIDE.get() {
        return *multiplier;
    }
    if cfg!(any(target_os = "macos", target_os = "windows")) {
        1.5
    } else {
        1.0
    }
}

/// Replace the platform multiplier for the rest of the process
///
/// Only the first positive value takes effect; returns whether it did.
pub fn set_platform_delay_multiplier(multiplier: f64) -> bool {
    multiplier > 0.0 && DELAY_MULTIPLIER_OVERRIDE.set(multiplier).is_ok()
}

/// Classification of errors into transient and permanent
///
/// Implemented by error types whose variants know whether repeating the
/// operation could succeed. Cancellation must never report `true`.
pub trait Retryable {
    /// Whether repeating the failed operation may succeed
    fn is_retryable(&self) -> bool;
}

#[cfg(target_os = "macos")]
const TRANSIENT_OS_CODES: &[i32] = &[16, 23, 24, 35]; // EBUSY ENFILE EMFILE EAGAIN
#[cfg(target_os = "windows")]
const TRANSIENT_OS_CODES: &[i32] = &[32, 33]; // sharing / lock violation
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const TRANSIENT_OS_CODES: &[i32] = &[11, 16, 23, 24]; // EAGAIN EBUSY ENFILE EMFILE

impl Retryable for io::Error {
    fn is_retryable(&self) -> bool {
        if let Some(code) = self.raw_os_error() {
            if TRANSIENT_OS_CODES.contains(&code) {
                return true;
            }
        }
        matches!(
            self.kind(),
            io::ErrorKind::NotFound
                | io::ErrorKind::PermissionDenied
                | io::ErrorKind::ResourceBusy
                | io::ErrorKind::TimedOut
                | io::ErrorKind::Interrupted
                | io::ErrorKind::WouldBlock
        )
    }
}

/// A predicate that determines whether an error should be retried
pub trait RetryPredicate<E: ?Sized>: Send + Sync {
    /// Determine whether the given error should be retried
    fn should_retry(&self, error: &E) -> bool;
}

/// Retries exactly the errors that classify themselves as transient
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryableErrors;

impl<E: Retryable + ?Sized> RetryPredicate<E> for RetryableErrors {
    fn should_retry(&self, error: &E) -> bool {
        error.is_retryable()
    }
}

/// A predicate that always returns true (all errors are retryable)
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl<E: ?Sized> RetryPredicate<E> for AlwaysRetry {
    fn should_retry(&self, _error: &E) -> bool {
        true
    }
}

/// A predicate that uses a closure to determine retryability
pub struct ClosurePredicate<F> {
    predicate: F,
}

impl<F> ClosurePredicate<F> {
    /// Create a new closure-based predicate
    pub fn new(predicate: F) -> Self {
        Self { predicate }
    }
}

impl<E, F> RetryPredicate<E> for ClosurePredicate<F>
where
    F: Fn(&E) -> bool + Send + Sync,
{
    fn should_retry(&self, error: &E) -> bool {
        (self.predicate)(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(strategy: RetryStrategy, initial: u64, max: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            strategy,
            backoff_multiplier: 2.0,
            initial_delay_ms: initial,
            max_delay_ms: max,
        }
    }

    #[test]
    fn test_exponential_doubles_until_cap() {
        let policy = policy(RetryStrategy::ExponentialBackoff, 500, 4000);

        assert_eq!(calculate_delay(&policy, 1, false), Duration::from_millis(500));
        assert_eq!(calculate_delay(&policy, 2, false), Duration::from_millis(1000));
        assert_eq!(calculate_delay(&policy, 3, false), Duration::from_millis(2000));
        assert_eq!(calculate_delay(&policy, 4, false), Duration::from_millis(4000));
        assert_eq!(calculate_delay(&policy, 5, false), Duration::from_millis(4000));
    }

    #[test]
    fn test_huge_attempt_does_not_overflow() {
        let policy = policy(RetryStrategy::ExponentialBackoff, 1000, 3000);
        assert_eq!(
            calculate_delay(&policy, u32::MAX, false),
            Duration::from_millis(3000)
        );
    }

    #[test]
    fn test_linear_and_fixed() {
        let linear = policy(RetryStrategy::LinearBackoff, 100, 10_000);
        assert_eq!(calculate_delay(&linear, 3, false), Duration::from_millis(300));

        let fixed = policy(RetryStrategy::FixedDelay, 250, 10_000);
        assert_eq!(calculate_delay(&fixed, 4, false), Duration::from_millis(250));
    }

    #[test]
    fn test_jitter_stays_within_ten_percent() {
        let policy = policy(RetryStrategy::FixedDelay, 1000, 30_000);

        for _ in 0..200 {
            let delay = calculate_delay(&policy, 1, true);
            assert!(delay >= Duration::from_millis(1000));
            assert!(delay <= Duration::from_millis(1100));
        }
    }

    #[test]
    fn test_jitter_no_effect_on_zero_delay() {
        let policy = policy(RetryStrategy::None, 0, 30_000);
        assert_eq!(calculate_delay(&policy, 1, true), Duration::ZERO);
    }

    #[test]
    fn test_non_positive_multiplier_is_ignored() {
        assert!(!set_platform_delay_multiplier(0.0));
        assert!(!set_platform_delay_multiplier(-1.0));
    }

    #[test]
    fn test_platform_multiplier_is_at_least_one() {
        assert!(platform_delay_multiplier() >= 1.0);
    }

    #[test]
    fn test_io_error_classification() {
        assert!(io::Error::new(io::ErrorKind::NotFound, "x").is_retryable());
        assert!(io::Error::new(io::ErrorKind::ResourceBusy, "x").is_retryable());
        assert!(io::Error::new(io::ErrorKind::TimedOut, "x").is_retryable());
        assert!(!io::Error::new(io::ErrorKind::InvalidData, "x").is_retryable());
        assert!(!io::Error::new(io::ErrorKind::AlreadyExists, "x").is_retryable());
    }

    #[test]
    fn test_retryable_errors_predicate() {
        let predicate = RetryableErrors;
        assert!(predicate.should_retry(&io::Error::new(io::ErrorKind::Interrupted, "x")));
        assert!(!predicate.should_retry(&io::Error::new(io::ErrorKind::Unsupported, "x")));
    }
}
