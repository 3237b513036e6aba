//! Retry primitives for calls that cross a network boundary.
//!
//! Backoff lives here rather than inside the callers so the index core keeps
//! its retry discipline in one place and applications can wrap their own
//! calls (ingestion, retrieval) with the same policy.
//!
//! ```rust,ignore
//! use resilience::{RetryConfig, retry_cancellable};
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let names = retry_cancellable(
//!     || async { backend.list_collections().await },
//!     &RetryConfig::fixed(3, Duration::from_secs(2)),
//!     &token,
//! )
//! .await?;
//! ```

pub mod retry;

pub use retry::{
    RetryConfig, RetryError, retry, retry_cancellable, retry_cancellable_if, retry_with_backoff,
};
pub use tokio_util::sync::CancellationToken;
