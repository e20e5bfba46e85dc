//! Retry execution engine with policy-based configuration
//!
//! Every filesystem touch in the install pipeline goes through this module.
//! Freshly extracted trees, renames and manifest writes are not always
//! visible immediately on every platform, so transient failures are
//! retried with exponential backoff before they are reported.
//!
//! # Features
//!
//! - Multiple retry strategies: None, Fixed, Exponential, Linear backoff
//! - Jitter of up to 10% of the computed delay
//! - Platform delay multiplier (slower event propagation on macOS/Windows)
//! - Retry predicates, including the [`Retryable`] classification trait
//! - Observable attempts via the `RetryObserver` trait
//! - Async execution plus a blocking variant for synchronous call chains
//!
//! # Example
//!
//! ```rust,no_run
//! use hearth_core::retry::{retry, RetryError};
//! use hearth_core::types::RetryPolicy;
//!
//! async fn example() -> Result<String, RetryError<std::io::Error>> {
//!     let policy = RetryPolicy::default();
//!
//!     retry("read manifest", &policy, || async {
//!         tokio::fs::read_to_string("info.json").await
//!     })
//!     .await
//! }
//! ```

mod error;
mod executor;
mod observer;
mod strategies;

pub use error::RetryError;
pub use executor::{retry, retry_blocking, RetryExecutor, RetryExecutorBuilder};
pub use observer::{NoOpObserver, RetryObserver, TracingObserver};
pub use strategies::{
    calculate_delay, platform_delay_multiplier, set_platform_delay_multiplier, AlwaysRetry,
    ClosurePredicate, RetryPredicate, Retryable, RetryableErrors,
};
