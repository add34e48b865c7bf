//! # Request → log batch conversion
//!
//! ## Responsibility
//! Turn one inbound request into a [`LogBatch`]:
//!
//! | Source                   | Destination                          |
//! |--------------------------|--------------------------------------|
//! | query parameters         | resource attributes (first value)    |
//! | header fields            | resource attributes (first value)    |
//! | receiver id / type       | scope attributes `source`, `receiver`|
//! | each body line           | one log record, body verbatim        |
//!
//! ## Guarantees
//! - Records keep body line order; each is stamped when its line is read.
//! - Query parameters whose first value is empty are omitted.
//! - Header names are canonicalized (`x-request-id` → `X-Request-Id`).
//! - With [`AttributeNaming::Flat`] a header overwrites a query parameter of
//!   the same name.
//! - Lines are split on bytes; invalid UTF-8 only affects its own line, which
//!   is decoded lossily.
//! - A read error, including a line longer than the configured cap, ends
//!   conversion; the records read so far are kept and the error is returned
//!   alongside them.

use std::collections::HashSet;
use std::io;

use serde::Deserialize;
use tokio::io::AsyncRead;
use tokio_stream::{Stream, StreamExt};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};

use crate::pdata::{now_unix_nanos, InstrumentationScope, LogBatch, LogRecord, Resource};

pub const SCOPE_NAME: &str = "otlp/webhookevent";
/// Value of the scope's `receiver` attribute.
pub const RECEIVER_TYPE: &str = "webhookevent";

const QUERY_PREFIX: &str = "query.";
const HEADER_PREFIX: &str = "header.";

/// How request metadata keys are laid out in the resource attributes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeNaming {
    /// One namespace: `param1`, `Content-Type`. Headers win on collision.
    #[default]
    Flat,
    /// Separate namespaces: `query.param1`, `header.Content-Type`.
    Prefixed,
}

impl AttributeNaming {
    fn query_key(self, name: &str) -> String {
        match self {
            AttributeNaming::Flat => name.to_string(),
            AttributeNaming::Prefixed => format!("{QUERY_PREFIX}{name}"),
        }
    }

    fn header_key(self, canonical: &str) -> String {
        match self {
            AttributeNaming::Flat => canonical.to_string(),
            AttributeNaming::Prefixed => format!("{HEADER_PREFIX}{canonical}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Request metadata
// ---------------------------------------------------------------------------

/// Query parameters and headers of one request, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMetadata {
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
}

impl RequestMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata from a request target such as `/events?param1=hello`.
    pub fn from_target(target: &str) -> Self {
        let query = target.split_once('?').map_or("", |(_, q)| q);
        Self {
            query: parse_query(query),
            headers: Vec::new(),
        }
    }

    pub fn with_query(mut self, raw_query: &str) -> Self {
        self.query.extend(parse_query(raw_query));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_header(name, value);
        self
    }

    pub fn push_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.push((name.into(), value.into()));
    }

    /// First value of every distinct query parameter, in first-seen order.
    pub fn query_params(&self) -> Vec<(&str, &str)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (name, value) in &self.query {
            if seen.insert(name.as_str()) {
                out.push((name.as_str(), value.as_str()));
            }
        }
        out
    }

    /// First value of every distinct header, keyed by canonical name.
    pub fn header_fields(&self) -> Vec<(String, &str)> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (name, value) in &self.headers {
            let canonical = canonical_header_key(name);
            if seen.insert(canonical.clone()) {
                out.push((canonical, value.as_str()));
            }
        }
        out
    }
}

/// Percent-decoding for URL query components. `+` decodes to a space;
/// malformed escapes are kept literally.
pub fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() && is_hex_pair(&bytes[i + 1..i + 3]) => {
                out.push((hex_val(bytes[i + 1]) << 4) | hex_val(bytes[i + 2]));
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_hex_pair(pair: &[u8]) -> bool {
    pair.len() == 2 && pair.iter().all(u8::is_ascii_hexdigit)
}

fn hex_val(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

/// Parse a raw query string into decoded `(key, value)` pairs, keeping order
/// and duplicates. Empty segments (`a=1&&b=2`) are skipped.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, val) = pair.split_once('=').unwrap_or((pair, ""));
            (url_decode(key), url_decode(val))
        })
        .collect()
}

/// Canonical MIME header form: first letter and letters after `-` upper
/// case, the rest lower case. Names with characters outside the HTTP token
/// set are returned unchanged.
pub fn canonical_header_key(name: &str) -> String {
    if !name.bytes().all(is_token_byte) {
        return name.to_string();
    }
    let mut upper = true;
    name.chars()
        .map(|c| {
            let mapped = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            mapped
        })
        .collect()
}

fn is_token_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

// ---------------------------------------------------------------------------
// Conversion
// ---------------------------------------------------------------------------

/// Identity of the receiver instance stamped on every batch's scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeContext {
    /// Receiver instance id, e.g. `webhookevent` or `webhookevent/github`.
    pub receiver_id: String,
    /// Build version of the receiver.
    pub version: String,
}

impl ScopeContext {
    pub fn new(receiver_id: impl Into<String>) -> Self {
        Self {
            receiver_id: receiver_id.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    fn scope(&self) -> InstrumentationScope {
        let mut scope = InstrumentationScope::new(SCOPE_NAME, self.version.clone());
        scope.attributes.put_str("source", self.receiver_id.clone());
        scope.attributes.put_str("receiver", RECEIVER_TYPE);
        scope
    }
}

/// Outcome of [`convert`].
#[derive(Debug)]
pub struct Converted {
    pub logs: LogBatch,
    pub record_count: usize,
    /// Set when reading the body failed; `logs` then holds the records read
    /// before the failure.
    pub read_error: Option<io::Error>,
}

/// Resource whose attributes are the request's metadata.
pub fn metadata_resource(metadata: &RequestMetadata, naming: AttributeNaming) -> Resource {
    let mut resource = Resource::default();
    for (name, value) in metadata.query_params() {
        if !value.is_empty() {
            resource.attributes.put_str(naming.query_key(name), value);
        }
    }
    for (canonical, value) in metadata.header_fields() {
        resource.attributes.put_str(naming.header_key(&canonical), value);
    }
    resource
}

/// Convert a body line stream plus request metadata into one [`LogBatch`].
///
/// Lines are pulled one at a time; the body is never buffered as a whole.
pub async fn convert<S>(
    lines: S,
    metadata: &RequestMetadata,
    scope: &ScopeContext,
    naming: AttributeNaming,
) -> Converted
where
    S: Stream<Item = io::Result<String>>,
{
    let mut logs = LogBatch {
        resource: metadata_resource(metadata, naming),
        scope: scope.scope(),
        records: Vec::new(),
    };

    tokio::pin!(lines);
    let mut read_error = None;
    while let Some(next) = lines.next().await {
        match next {
            Ok(line) => logs.records.push(LogRecord {
                observed_time_unix_nano: now_unix_nanos(),
                body: line,
            }),
            Err(e) => {
                read_error = Some(e);
                break;
            }
        }
    }

    let record_count = logs.records.len();
    Converted {
        logs,
        record_count,
        read_error,
    }
}

/// Lazy line stream over a reader.
///
/// Splits on `\n` and strips a trailing `\r`. Each line is decoded as lossy
/// UTF-8. A line longer than `max_line_bytes` ends the stream with an
/// `InvalidData` error.
pub fn body_lines<R: AsyncRead>(
    reader: R,
    max_line_bytes: usize,
) -> impl Stream<Item = io::Result<String>> {
    let codec = AnyDelimiterCodec::new_with_max_length(vec![b'\n'], Vec::new(), max_line_bytes);
    FramedRead::new(reader, codec).map(|chunk| -> io::Result<String> {
        let chunk = chunk.map_err(line_error)?;
        let line = chunk.strip_suffix(b"\r").unwrap_or(&chunk[..]);
        Ok(String::from_utf8_lossy(line).into_owned())
    })
}

fn line_error(e: AnyDelimiterCodecError) -> io::Error {
    match e {
        AnyDelimiterCodecError::Io(e) => e,
        AnyDelimiterCodecError::MaxChunkLengthExceeded => {
            io::Error::new(io::ErrorKind::InvalidData, "line exceeds max_line_bytes")
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
