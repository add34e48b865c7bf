//! Crate-level error types.
//!
//! | Enum            | Raised by                          | Handling                         |
//! |-----------------|------------------------------------|----------------------------------|
//! | [`ConfigError`] | config validation at startup       | fatal, reported to the operator  |
//! | [`FetchError`]  | one poll cycle's remote fetch      | logged, cycle skipped            |
//! | [`SinkError`]   | delivering a finished batch        | logged / mapped to HTTP status   |
//! | [`ReceiverError`] | loading config, binding listeners | returned from `main`            |

use thiserror::Error;

/// A configuration value is missing or malformed.
///
/// One variant per field so operators (and tests) can tell failures apart
/// without string matching.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("GitHub token is required")]
    MissingToken,
    #[error("name of token is required")]
    MissingName,
    #[error("GitHub target is required")]
    MissingTarget,
    #[error("\"endpoint\" must be in the form of <scheme>://<hostname>[:<port>], got {0:?}")]
    InvalidEndpoint(String),
    #[error("\"scrape_interval\" must be a positive number of seconds")]
    InvalidScrapeInterval,
    #[error("\"{field}\" is invalid: {detail}")]
    InvalidField { field: &'static str, detail: String },
    #[error("no receivers configured; add a [github_rate_limit] or [webhook] section")]
    NoReceivers,
}

/// Errors that can occur while sampling the remote rate-limit endpoint.
///
/// Each variant carries enough context to diagnose the failure without
/// needing to inspect the originating error directly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The remote server replied with a non-2xx HTTP status code.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },
    /// Response body could not be parsed as the expected JSON structure.
    #[error("JSON parse error on field '{field}': {detail}")]
    Json { field: String, detail: String },
    /// A TCP-level connection could not be established.
    #[error("Connection failed to {url}: {detail}")]
    Connect { url: String, detail: String },
    /// The HTTP client itself could not be constructed.
    #[error("failed to build HTTP client: {detail}")]
    Client { detail: String },
}

/// A sink refused or failed to accept a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("sink rejected batch: {0}")]
    Rejected(String),
    #[error("sink write failed: {0}")]
    Io(String),
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Io(e.to_string())
    }
}

/// Top-level error for loading configuration and starting receivers.
#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
