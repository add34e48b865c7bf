//! TOML configuration for both receivers.
//!
//! ```toml
//! log_level = "info"
//!
//! [github_rate_limit]
//! token = "ghp_..."
//! name = "ci-bot"
//! target = "my-org"
//! # endpoint = "https://api.github.com/rate_limit"
//! # scrape_interval = 60
//!
//! [webhook]
//! endpoint = "127.0.0.1:8080"
//! path = "/events"
//! # max_line_bytes = 65536
//! attribute_naming = "flat"
//! ```
//!
//! Raw sections deserialize leniently; `validate` turns each into the
//! immutable settings its receiver runs with, failing on the first bad field.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ConfigError, ReceiverError};
use crate::webhook::transducer::AttributeNaming;

pub const DEFAULT_ENDPOINT: &str = "https://api.github.com/rate_limit";
pub const DEFAULT_SCRAPE_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_WEBHOOK_ENDPOINT: &str = "127.0.0.1:8080";
pub const DEFAULT_WEBHOOK_PATH: &str = "/events";
pub const DEFAULT_HEALTH_PATH: &str = "/health_check";
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_MAX_HEADER_BYTES: usize = 16 * 1024;
pub const DEFAULT_MAX_LINE_BYTES: usize = 64 * 1024;
pub const DEFAULT_RECEIVER_ID: &str = "webhookevent";

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: Option<String>,
    pub github_rate_limit: Option<RateLimitConfig>,
    pub webhook: Option<WebhookConfig>,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self, ReceiverError> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ReceiverError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Check that at least one receiver is configured and every present
    /// section is valid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.github_rate_limit.is_none() && self.webhook.is_none() {
            return Err(ConfigError::NoReceivers);
        }
        if let Some(rl) = &self.github_rate_limit {
            rl.validate()?;
        }
        if let Some(wh) = &self.webhook {
            wh.validate()?;
        }
        Ok(())
    }

    /// Filter directive for the tracing subscriber: the top-level level, else
    /// the rate-limit section's, else `info`.
    pub fn effective_log_level(&self) -> &str {
        self.log_level
            .as_deref()
            .or_else(|| self.github_rate_limit.as_ref().map(|c| c.log_level.as_str()))
            .unwrap_or("info")
    }
}

// ---------------------------------------------------------------------------
// GitHub rate limit
// ---------------------------------------------------------------------------

/// Raw `[github_rate_limit]` section.
#[derive(Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    pub endpoint: String,
    pub token: String,
    pub name: String,
    pub target: String,
    pub log_level: String,
    pub scrape_interval: Option<u64>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: String::new(),
            name: String::new(),
            target: String::new(),
            log_level: "error".to_string(),
            scrape_interval: None,
        }
    }
}

impl std::fmt::Debug for RateLimitConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &redact(&self.token))
            .field("name", &self.name)
            .field("target", &self.target)
            .field("log_level", &self.log_level)
            .field("scrape_interval", &self.scrape_interval)
            .finish()
    }
}

impl RateLimitConfig {
    /// Validate and apply defaults.
    ///
    /// An empty `endpoint` becomes [`DEFAULT_ENDPOINT`]; an unset
    /// `scrape_interval` becomes [`DEFAULT_SCRAPE_INTERVAL_SECS`]. Nothing
    /// else is defaulted.
    pub fn validate(&self) -> Result<PollerConfig, ConfigError> {
        if self.token.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        let endpoint = if self.endpoint.is_empty() {
            DEFAULT_ENDPOINT.to_string()
        } else {
            check_endpoint(&self.endpoint)?;
            self.endpoint.clone()
        };
        if self.name.is_empty() {
            return Err(ConfigError::MissingName);
        }
        if self.target.is_empty() {
            return Err(ConfigError::MissingTarget);
        }
        let secs = match self.scrape_interval {
            None => DEFAULT_SCRAPE_INTERVAL_SECS,
            Some(0) => return Err(ConfigError::InvalidScrapeInterval),
            Some(s) => s,
        };

        Ok(PollerConfig {
            endpoint,
            token: self.token.clone(),
            name: self.name.clone(),
            target: self.target.clone(),
            interval: Duration::from_secs(secs),
        })
    }
}

fn check_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    let invalid = || ConfigError::InvalidEndpoint(endpoint.to_string());
    let url = reqwest::Url::parse(endpoint).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(invalid());
    }
    Ok(())
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "<redacted>"
    }
}

/// Validated rate-limit poller settings. Immutable once built.
#[derive(Clone, PartialEq, Eq)]
pub struct PollerConfig {
    endpoint: String,
    token: String,
    name: String,
    target: String,
    interval: Duration,
}

impl PollerConfig {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value of the `name` label on every data point.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Value of the `target` label on every data point.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl std::fmt::Debug for PollerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollerConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &redact(&self.token))
            .field("name", &self.name)
            .field("target", &self.target)
            .field("interval", &self.interval)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

/// Raw `[webhook]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebhookConfig {
    /// Listen address, `host:port`.
    pub endpoint: String,
    pub path: String,
    pub health_path: String,
    pub read_timeout_ms: u64,
    pub max_header_bytes: usize,
    /// Longest accepted body line, excluding the `\n`.
    pub max_line_bytes: usize,
    /// Value of the scope's `source` attribute.
    pub receiver_id: String,
    pub attribute_naming: AttributeNaming,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_WEBHOOK_ENDPOINT.to_string(),
            path: DEFAULT_WEBHOOK_PATH.to_string(),
            health_path: DEFAULT_HEALTH_PATH.to_string(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
            receiver_id: DEFAULT_RECEIVER_ID.to_string(),
            attribute_naming: AttributeNaming::default(),
        }
    }
}

impl WebhookConfig {
    pub fn validate(&self) -> Result<WebhookSettings, ConfigError> {
        let addr: SocketAddr = self.endpoint.parse().map_err(|e: std::net::AddrParseError| {
            ConfigError::InvalidField {
                field: "endpoint",
                detail: e.to_string(),
            }
        })?;
        check_path("path", &self.path)?;
        check_path("health_path", &self.health_path)?;
        if self.path == self.health_path {
            return Err(ConfigError::InvalidField {
                field: "health_path",
                detail: "must differ from \"path\"".into(),
            });
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::InvalidField {
                field: "read_timeout_ms",
                detail: "must be positive".into(),
            });
        }
        if self.max_header_bytes < 64 {
            return Err(ConfigError::InvalidField {
                field: "max_header_bytes",
                detail: "must be at least 64".into(),
            });
        }
        if self.max_line_bytes == 0 {
            return Err(ConfigError::InvalidField {
                field: "max_line_bytes",
                detail: "must be positive".into(),
            });
        }
        if self.receiver_id.is_empty() {
            return Err(ConfigError::InvalidField {
                field: "receiver_id",
                detail: "must not be empty".into(),
            });
        }

        Ok(WebhookSettings {
            addr,
            path: self.path.clone(),
            health_path: self.health_path.clone(),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            max_header_bytes: self.max_header_bytes,
            max_line_bytes: self.max_line_bytes,
            receiver_id: self.receiver_id.clone(),
            attribute_naming: self.attribute_naming,
        })
    }
}

fn check_path(field: &'static str, path: &str) -> Result<(), ConfigError> {
    if !path.starts_with('/') {
        return Err(ConfigError::InvalidField {
            field,
            detail: format!("{path:?} must start with '/'"),
        });
    }
    Ok(())
}

/// Validated webhook server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookSettings {
    pub addr: SocketAddr,
    pub path: String,
    pub health_path: String,
    pub read_timeout: Duration,
    pub max_header_bytes: usize,
    pub max_line_bytes: usize,
    pub receiver_id: String,
    pub attribute_naming: AttributeNaming,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
