//! Error types for the retry execution engine

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Errors that can occur during retry execution
///
/// Generic over `E`, the error type of the operation being retried. Callers
/// that want the last underlying error rather than the wrapper use
/// [`RetryError::into_source`].
#[derive(Debug)]
pub enum RetryError<E> {
    /// All retry attempts have been exhausted
    Exhausted {
        /// Number of attempts made before giving up
        attempts: u32,
        /// The error from the final attempt
        source: E,
        /// Total duration spent across all attempts
        total_duration: Duration,
    },

    /// The retry operation was cancelled before any attempt produced an error
    Cancelled {
        /// Number of attempts made before cancellation
        attempts: u32,
        /// The last error that occurred, if any
        last_error: Option<E>,
    },

    /// The predicate classified the error as permanent
    NonRetryable {
        /// Attempt on which the permanent error surfaced
        attempt: u32,
        /// The permanent error
        source: E,
    },
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted {
                attempts,
                source,
                total_duration,
            } => write!(
                f,
                "{} (gave up after {} attempts over {:.2}s)",
                source,
                attempts,
                total_duration.as_secs_f64()
            ),
            RetryError::Cancelled {
                attempts,
                last_error: Some(err),
            } => write!(f, "retry cancelled after {} attempts: {}", attempts, err),
            RetryError::Cancelled { attempts, .. } => {
                write!(f, "retry cancelled after {} attempts", attempts)
            }
            RetryError::NonRetryable { source, .. } => write!(f, "{}", source),
        }
    }
}

impl<E: Error + 'static> Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source_ref().map(|e| e as &(dyn Error + 'static))
    }
}

impl<E> RetryError<E> {
    /// Create a new exhausted error
    pub fn exhausted(attempts: u32, source: E, total_duration: Duration) -> Self {
        RetryError::Exhausted {
            attempts,
            source,
            total_duration,
        }
    }

    /// Create a new cancelled error
    pub fn cancelled(attempts: u32, last_error: Option<E>) -> Self {
        RetryError::Cancelled {
            attempts,
            last_error,
        }
    }

    /// Create a new non-retryable error
    pub fn non_retryable(attempt: u32, source: E) -> Self {
        RetryError::NonRetryable { attempt, source }
    }

    /// Get the number of attempts made
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Cancelled { attempts, .. } => *attempts,
            RetryError::NonRetryable { attempt, .. } => *attempt,
        }
    }

    /// Check if this error indicates all retries were exhausted
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// Check if this error is non-retryable
    pub fn is_non_retryable(&self) -> bool {
        matches!(self, RetryError::NonRetryable { .. })
    }

    /// Get the underlying error, consuming this error
    pub fn into_source(self) -> Option<E> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::Cancelled { last_error, .. } => last_error,
            RetryError::NonRetryable { source, .. } => Some(source),
        }
    }

    /// Get a reference to the underlying error
    pub fn source_ref(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { source, .. } => Some(source),
            RetryError::Cancelled { last_error, .. } => last_error.as_ref(),
            RetryError::NonRetryable { source, .. } => Some(source),
        }
    }
}
