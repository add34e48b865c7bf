//! HTTP client for GitHub's `rate_limit` endpoint.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::PollerConfig;
use crate::error::FetchError;

/// GitHub REST API version pinned in every request.
pub const GITHUB_API_VERSION: &str = "2022-11-28";

const USER_AGENT: &str = concat!("telemetry-receivers/", env!("CARGO_PKG_VERSION"));

// --- GitHub API types (mirror what `/rate_limit` returns) ---

/// One quota bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rate {
    pub limit: u64,
    pub remaining: u64,
    #[serde(default)]
    pub reset: u64,
    #[serde(default)]
    pub used: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateResources {
    pub core: Rate,
}

/// Body of `GET /rate_limit`.
///
/// `rate` is GitHub's deprecated alias for `resources.core`; either is enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<RateResources>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate: Option<Rate>,
}

impl RateLimits {
    /// The core REST quota, preferring `resources.core`.
    pub fn core(&self) -> Option<&Rate> {
        self.resources.as_ref().map(|r| &r.core).or(self.rate.as_ref())
    }
}

/// Parse a `/rate_limit` body and extract the remaining core quota.
pub fn parse_remaining(body: &[u8]) -> Result<u64, FetchError> {
    let limits: RateLimits = serde_json::from_slice(body).map_err(|e| FetchError::Json {
        field: "body".into(),
        detail: e.to_string(),
    })?;
    limits
        .core()
        .map(|core| core.remaining)
        .ok_or_else(|| FetchError::Json {
            field: "resources.core".into(),
            detail: "neither `resources.core` nor `rate` present".into(),
        })
}

// ---------------------------------------------------------------------------
// Source seam
// ---------------------------------------------------------------------------

/// Something that can be sampled for a single numeric reading.
///
/// The poller owns exactly one source for its whole lifetime.
pub trait RateLimitSource: Send + Sync + 'static {
    fn sample(&self) -> impl Future<Output = Result<f64, FetchError>> + Send;
}

/// Samples the remaining core quota from GitHub.
pub struct GithubRateLimitClient {
    endpoint: String,
    token: String,
    client: reqwest::Client,
}

impl GithubRateLimitClient {
    /// Build a client with a 3 s connect timeout and 10 s request timeout.
    pub fn new(config: &PollerConfig) -> Result<Self, FetchError> {
        Self::with_timeouts(config, Duration::from_secs(3), Duration::from_secs(10))
    }

    pub fn with_timeouts(
        config: &PollerConfig,
        connect: Duration,
        request: Duration,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect)
            .timeout(request)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Client {
                detail: e.to_string(),
            })?;

        Ok(Self {
            endpoint: config.endpoint().to_string(),
            token: config.token().to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Fetch the current rate-limit document.
    ///
    /// # Returns
    /// - `Ok(remaining)` on a 2xx response with a parseable body.
    /// - `Err(FetchError::Connect)` when the request could not be sent.
    /// - `Err(FetchError::Http)` when the server replies with a non-2xx code.
    /// - `Err(FetchError::Json)` when the body cannot be parsed.
    pub async fn fetch_remaining(&self) -> Result<u64, FetchError> {
        let url = &self.endpoint;
        let resp = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION)
            .send()
            .await
            .map_err(|e| FetchError::Connect {
                url: url.clone(),
                detail: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(FetchError::Http {
                status: resp.status().as_u16(),
                url: url.clone(),
            });
        }

        let bytes = resp.bytes().await.map_err(|e| FetchError::Json {
            field: "body".into(),
            detail: e.to_string(),
        })?;

        parse_remaining(&bytes)
    }
}

impl std::fmt::Debug for GithubRateLimitClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubRateLimitClient")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl RateLimitSource for GithubRateLimitClient {
    async fn sample(&self) -> Result<f64, FetchError> {
        self.fetch_remaining().await.map(|r| r as f64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
