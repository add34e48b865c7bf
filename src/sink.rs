//! Consumer interfaces for finished batches, plus a few concrete sinks.
//!
//! Sinks are shared call-only across the poller task and every webhook
//! request task, so implementations must be `Send + Sync` and take `&self`.

use std::io::Write;
use std::sync::Mutex;

use crate::error::SinkError;
use crate::pdata::{LogBatch, MetricBatch};

/// Accepts metric batches emitted by the rate-limit poller.
pub trait MetricsSink: Send + Sync + std::fmt::Debug {
    fn consume_metrics(&self, batch: MetricBatch) -> Result<(), SinkError>;
}

/// Accepts log batches produced by the webhook transducer.
pub trait LogsSink: Send + Sync + std::fmt::Debug {
    fn consume_logs(&self, batch: LogBatch) -> Result<(), SinkError>;
}

// ---------------------------------------------------------------------------
// NopSink
// ---------------------------------------------------------------------------

/// Accepts and discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopSink;

impl MetricsSink for NopSink {
    fn consume_metrics(&self, _batch: MetricBatch) -> Result<(), SinkError> {
        Ok(())
    }
}

impl LogsSink for NopSink {
    fn consume_logs(&self, _batch: LogBatch) -> Result<(), SinkError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// Keeps every delivered batch in memory. Can be switched to reject
/// deliveries to exercise failure paths.
#[derive(Debug, Default)]
pub struct MemorySink {
    metrics: Mutex<Vec<MetricBatch>>,
    logs: Mutex<Vec<LogBatch>>,
    reject: Mutex<Option<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that fails every delivery with `reason`.
    pub fn rejecting(reason: impl Into<String>) -> Self {
        let sink = Self::default();
        sink.set_reject(Some(reason.into()));
        sink
    }

    pub fn set_reject(&self, reason: Option<String>) {
        if let Ok(mut r) = self.reject.lock() {
            *r = reason;
        }
    }

    pub fn metrics(&self) -> Vec<MetricBatch> {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn logs(&self) -> Vec<LogBatch> {
        self.logs.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn check_reject(&self) -> Result<(), SinkError> {
        match self.reject.lock().ok().and_then(|r| r.clone()) {
            Some(reason) => Err(SinkError::Rejected(reason)),
            None => Ok(()),
        }
    }
}

impl MetricsSink for MemorySink {
    fn consume_metrics(&self, batch: MetricBatch) -> Result<(), SinkError> {
        self.check_reject()?;
        self.metrics
            .lock()
            .map_err(|_| SinkError::Rejected("metrics store poisoned".into()))?
            .push(batch);
        Ok(())
    }
}

impl LogsSink for MemorySink {
    fn consume_logs(&self, batch: LogBatch) -> Result<(), SinkError> {
        self.check_reject()?;
        self.logs
            .lock()
            .map_err(|_| SinkError::Rejected("logs store poisoned".into()))?
            .push(batch);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonLinesSink
// ---------------------------------------------------------------------------

/// Writes each batch as one JSON object per line.
///
/// Each delivery serializes, writes and flushes synchronously under a mutex,
/// blocking the calling task until the line is out. Suited to low-volume
/// output such as the binary's stdout; high-rate pipelines need a buffering
/// sink in front of the writer.
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl JsonLinesSink<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_line<T: serde::Serialize>(&self, kind: &str, batch: &T) -> Result<(), SinkError> {
        #[derive(serde::Serialize)]
        struct Envelope<'a, T> {
            signal: &'a str,
            #[serde(flatten)]
            batch: &'a T,
        }

        let line = serde_json::to_string(&Envelope { signal: kind, batch })
            .map_err(|e| SinkError::Rejected(e.to_string()))?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| SinkError::Io("writer poisoned".into()))?;
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> std::fmt::Debug for JsonLinesSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink").finish_non_exhaustive()
    }
}

impl<W: Write + Send> MetricsSink for JsonLinesSink<W> {
    fn consume_metrics(&self, batch: MetricBatch) -> Result<(), SinkError> {
        self.write_line("metrics", &batch)
    }
}

impl<W: Write + Send> LogsSink for JsonLinesSink<W> {
    fn consume_logs(&self, batch: LogBatch) -> Result<(), SinkError> {
        self.write_line("logs", &batch)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
