pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod pdata;
pub mod ratelimit;
pub mod sink;
pub mod webhook;

pub use error::{ConfigError, FetchError, ReceiverError, SinkError};
pub use lifecycle::TaskHandle;
pub use pdata::{LogBatch, MetricBatch};
pub use sink::{LogsSink, MetricsSink};
