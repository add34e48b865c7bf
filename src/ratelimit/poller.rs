//! Periodic rate-limit sampling loop.
//!
//! ## Responsibility
//! Every `interval`, sample the owned [`RateLimitSource`] and hand one gauge
//! [`MetricBatch`] to the configured [`MetricsSink`].
//!
//! ## Guarantees
//! - The first sample happens one full interval after start.
//! - Missed ticks are skipped, never caught up; one cycle's fetch and emit
//!   finish before the next tick is awaited.
//! - A failed fetch or delivery is logged and the loop carries on.
//! - Stop is observed between ticks and during an in-flight fetch; nothing is
//!   emitted once stop has been requested.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::client::{GithubRateLimitClient, RateLimitSource};
use crate::config::PollerConfig;
use crate::error::FetchError;
use crate::lifecycle::{StopSignal, TaskHandle};
use crate::pdata::{
    now_unix_nanos, Attributes, InstrumentationScope, Metric, MetricBatch, NumberDataPoint,
};
use crate::sink::MetricsSink;

pub const METRIC_NAME: &str = "github_rate_limit_remaining";
pub const METRIC_UNIT: &str = "requests";
pub const SCOPE_NAME: &str = "telemetry_receivers/githubratelimit";
pub const SCOPE_VERSION: &str = "v0.1.0";

/// Consecutive fetch failures after which each failure is logged at `error`.
const ESCALATE_AFTER_FAILURES: u32 = 5;

/// Build the batch for one successful sample.
///
/// The data point carries exactly two labels, `name` and `target`, taken
/// from `config`, and is stamped with `time_unix_nano`.
pub fn build_batch(config: &PollerConfig, value: f64, time_unix_nano: u64) -> MetricBatch {
    let mut attributes = Attributes::new();
    attributes.put_str("name", config.name());
    attributes.put_str("target", config.target());

    let point = NumberDataPoint {
        time_unix_nano,
        value,
        attributes,
    };

    let mut batch = MetricBatch::new(InstrumentationScope::new(SCOPE_NAME, SCOPE_VERSION));
    batch.metrics.push(Metric::gauge(METRIC_NAME, METRIC_UNIT, point));
    batch
}

/// The poller runner. Use [`RateLimitPoller::builder`] for construction.
pub struct RateLimitPoller<S> {
    config: PollerConfig,
    interval: Duration,
    source: S,
    sink: Option<Arc<dyn MetricsSink>>,
}

impl RateLimitPoller<GithubRateLimitClient> {
    /// Start building a poller from validated settings.
    pub fn builder(config: PollerConfig) -> RateLimitPollerBuilder {
        RateLimitPollerBuilder::new(config)
    }
}

impl<S: RateLimitSource> RateLimitPoller<S> {
    async fn run(self, mut stop: StopSignal) {
        let period = self.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            name = %self.config.name(),
            target = %self.config.target(),
            interval_secs = period.as_secs_f64(),
            "Starting github rate limit receiver"
        );

        let mut consecutive_failures: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = stop.stopped() => break,
                _ = ticker.tick() => {}
            }

            debug!("Fetching rate limit");
            let sampled = tokio::select! {
                biased;
                _ = stop.stopped() => break,
                r = self.source.sample() => r,
            };

            match sampled {
                Ok(value) => {
                    consecutive_failures = 0;
                    self.emit(value);
                }
                Err(e) => {
                    consecutive_failures = consecutive_failures.saturating_add(1);

                    if consecutive_failures >= ESCALATE_AFTER_FAILURES {
                        error!(
                            error = %e,
                            url = %self.config.endpoint(),
                            consecutive_failures,
                            "Failed to fetch rate limit repeatedly, will retry next tick"
                        );
                    } else {
                        warn!(
                            error = %e,
                            url = %self.config.endpoint(),
                            "Failed to fetch rate limit, will retry next tick"
                        );
                    }
                }
            }
        }

        info!("Shutting down github rate limit receiver");
    }

    fn emit(&self, value: f64) {
        let Some(sink) = &self.sink else {
            error!("Metrics consumer is not initialized");
            return;
        };
        let batch = build_batch(&self.config, value, now_unix_nanos());
        if let Err(e) = sink.consume_metrics(batch) {
            error!(error = %e, "Failed to deliver rate limit metrics");
        }
    }
}

/// Builder for [`RateLimitPoller`].
///
/// # Example
/// ```rust,ignore
/// let handle = RateLimitPoller::builder(cfg.validate()?)
///     .sink(Arc::new(JsonLinesSink::stdout()))
///     .start()?;
/// // ...
/// handle.shutdown().await;
/// ```
pub struct RateLimitPollerBuilder {
    config: PollerConfig,
    interval: Duration,
    sink: Option<Arc<dyn MetricsSink>>,
}

impl RateLimitPollerBuilder {
    pub fn new(config: PollerConfig) -> Self {
        Self {
            interval: config.interval(),
            config,
            sink: None,
        }
    }

    /// Attach the sink batches are delivered to.
    ///
    /// Optional: without one, every successful sample is logged as an error
    /// and dropped.
    pub fn sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Override the tick period taken from the config.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Create the GitHub client and spawn the polling task.
    ///
    /// Must be called from within a tokio runtime. Fails only when the HTTP
    /// client cannot be built.
    pub fn start(self) -> Result<TaskHandle, FetchError> {
        let client = GithubRateLimitClient::new(&self.config)?;
        Ok(self.start_with_source(client))
    }

    /// Spawn the polling task around a caller-supplied source.
    pub fn start_with_source<S: RateLimitSource>(self, source: S) -> TaskHandle {
        let poller = RateLimitPoller {
            config: self.config,
            interval: self.interval,
            source,
            sink: self.sink,
        };
        TaskHandle::spawn(move |stop| poller.run(stop))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
