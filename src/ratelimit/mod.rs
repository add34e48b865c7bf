//! # GitHub rate-limit receiver
//!
//! Polls GitHub's `rate_limit` endpoint on a fixed interval and emits the
//! remaining core quota as the `github_rate_limit_remaining` gauge, labelled
//! with the configured `name` and `target`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let handle = RateLimitPoller::builder(raw.validate()?)
//!     .sink(Arc::clone(&sink))
//!     .start()?;
//! // ...
//! handle.shutdown().await;
//! ```

pub mod client;
pub mod poller;

pub use client::{GithubRateLimitClient, RateLimitSource, RateLimits};
pub use poller::{build_batch, RateLimitPoller, RateLimitPollerBuilder, METRIC_NAME};
