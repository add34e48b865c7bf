//! Minimal HTTP/1.1 front end for the transducer.
//!
//! One request per connection. The request head is parsed with `httparse`;
//! the body is handed to [`convert`] as a lazy line stream bounded by
//! `Content-Length`, so it is never buffered whole.
//!
//! | Request                               | Response                      |
//! |---------------------------------------|-------------------------------|
//! | `POST <path>`, delivered              | 200                           |
//! | `POST <path>`, body read failed       | 400, nothing delivered        |
//! | `POST <path>`, line over the cap      | 413, nothing delivered        |
//! | head or body not read in time         | 408                           |
//! | `POST <path>` with `Transfer-Encoding`| 411                           |
//! | sink rejected the batch               | 503                           |
//! | `GET <health_path>`                   | 200 `{}`                      |
//! | other method on `<path>`              | 405                           |
//! | anything else                         | 404                           |

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::transducer::{body_lines, convert, RequestMetadata, ScopeContext};
use crate::config::WebhookSettings;
use crate::lifecycle::{StopSignal, TaskHandle};
use crate::sink::LogsSink;

const MAX_HEADERS: usize = 64;

/// Pause after a failed `accept` before trying again.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(250);

/// Headers that describe the connection rather than the event source.
const SKIPPED_HEADERS: &[&str] = &["host"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    RequestTimeout,
    LengthRequired,
    PayloadTooLarge,
    HeaderFieldsTooLarge,
    ServiceUnavailable,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::RequestTimeout => 408,
            Status::LengthRequired => 411,
            Status::PayloadTooLarge => 413,
            Status::HeaderFieldsTooLarge => 431,
            Status::ServiceUnavailable => 503,
        }
    }

    fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::RequestTimeout => "Request Timeout",
            Status::LengthRequired => "Length Required",
            Status::PayloadTooLarge => "Payload Too Large",
            Status::HeaderFieldsTooLarge => "Request Header Fields Too Large",
            Status::ServiceUnavailable => "Service Unavailable",
        }
    }
}

// ---------------------------------------------------------------------------
// Request head
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum HeadError {
    /// Peer closed before sending a complete head.
    Closed,
    TooLarge,
    Malformed(String),
    Io(io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Head {
    method: String,
    target: String,
    headers: Vec<(String, String)>,
    /// Bytes of the buffer taken up by the head.
    len: usize,
}

impl Head {
    fn path(&self) -> &str {
        self.target.split_once('?').map_or(self.target.as_str(), |(p, _)| p)
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn content_length(&self) -> Result<u64, Status> {
        if self.header("transfer-encoding").is_some() {
            return Err(Status::LengthRequired);
        }
        match self.header("content-length") {
            None => Ok(0),
            Some(v) => v.trim().parse().map_err(|_| Status::BadRequest),
        }
    }

    fn metadata(&self) -> RequestMetadata {
        let mut md = RequestMetadata::from_target(&self.target);
        for (name, value) in &self.headers {
            if !SKIPPED_HEADERS.iter().any(|s| name.eq_ignore_ascii_case(s)) {
                md.push_header(name.clone(), value.clone());
            }
        }
        md
    }
}

async fn read_head<R: AsyncRead + Unpin>(
    rd: &mut R,
    buf: &mut Vec<u8>,
    max_bytes: usize,
) -> Result<Head, HeadError> {
    let mut chunk = [0u8; 1024];
    loop {
        let n = rd.read(&mut chunk).await.map_err(HeadError::Io)?;
        if n == 0 {
            return Err(HeadError::Closed);
        }
        buf.extend_from_slice(&chunk[..n]);

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        match req.parse(&buf[..]) {
            Ok(httparse::Status::Complete(len)) => {
                return Ok(Head {
                    method: req.method.unwrap_or_default().to_string(),
                    target: req.path.unwrap_or("/").to_string(),
                    headers: req
                        .headers
                        .iter()
                        .map(|h| {
                            (
                                h.name.to_string(),
                                String::from_utf8_lossy(h.value).into_owned(),
                            )
                        })
                        .collect(),
                    len,
                });
            }
            Ok(httparse::Status::Partial) => {
                if buf.len() >= max_bytes {
                    return Err(HeadError::TooLarge);
                }
            }
            Err(httparse::Error::TooManyHeaders) => return Err(HeadError::TooLarge),
            Err(e) => return Err(HeadError::Malformed(e.to_string())),
        }
    }
}

async fn respond<W: AsyncWrite + Unpin>(
    wr: &mut W,
    status: Status,
    body: serde_json::Value,
) -> io::Result<()> {
    let body = body.to_string();
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status.code(),
        status.reason(),
        body.len(),
        body,
    );
    wr.write_all(response.as_bytes()).await?;
    wr.shutdown().await
}

async fn respond_error<W: AsyncWrite + Unpin>(
    wr: &mut W,
    status: Status,
    detail: &str,
) -> io::Result<()> {
    respond(wr, status, json!({ "error": detail })).await
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

struct Shared {
    settings: WebhookSettings,
    scope: ScopeContext,
    sink: Arc<dyn LogsSink>,
}

/// Listens for webhook events and delivers one log batch per request.
pub struct WebhookServer {
    listener: TcpListener,
    shared: Arc<Shared>,
}

impl WebhookServer {
    /// Bind the listen address from `settings`.
    pub async fn bind(settings: WebhookSettings, sink: Arc<dyn LogsSink>) -> io::Result<Self> {
        let listener = TcpListener::bind(settings.addr).await?;
        let scope = ScopeContext::new(settings.receiver_id.clone());
        Ok(Self {
            listener,
            shared: Arc::new(Shared {
                settings,
                scope,
                sink,
            }),
        })
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawn the accept loop.
    pub fn start(self) -> TaskHandle {
        TaskHandle::spawn(move |stop| self.run(stop))
    }

    async fn run(self, mut stop: StopSignal) {
        info!(
            addr = ?self.listener.local_addr().ok(),
            path = %self.shared.settings.path,
            "Starting webhook event receiver"
        );

        loop {
            let accepted = tokio::select! {
                biased;
                _ = stop.stopped() => break,
                a = self.listener.accept() => a,
            };

            match accepted {
                Ok((stream, peer)) => {
                    let shared = Arc::clone(&self.shared);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, shared).await {
                            debug!(error = %e, %peer, "webhook connection error");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "failed to accept webhook connection");
                    if !pause_after_accept_error(&mut stop).await {
                        break;
                    }
                }
            }
        }

        info!("Shutting down webhook event receiver");
    }
}

/// Wait out [`ACCEPT_ERROR_BACKOFF`]. Returns `false` if stop was requested
/// meanwhile.
async fn pause_after_accept_error(stop: &mut StopSignal) -> bool {
    tokio::select! {
        biased;
        _ = stop.stopped() => false,
        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => true,
    }
}

async fn handle_connection(mut stream: TcpStream, shared: Arc<Shared>) -> io::Result<()> {
    let settings = &shared.settings;
    let (mut rd, mut wr) = stream.split();

    let mut buf = Vec::with_capacity(1024);
    let head = match timeout(
        settings.read_timeout,
        read_head(&mut rd, &mut buf, settings.max_header_bytes),
    )
    .await
    {
        Ok(Ok(head)) => head,
        Ok(Err(HeadError::Closed)) => return Ok(()),
        Ok(Err(HeadError::Io(e))) => return Err(e),
        Ok(Err(HeadError::TooLarge)) => {
            return respond_error(&mut wr, Status::HeaderFieldsTooLarge, "request head too large")
                .await
        }
        Ok(Err(HeadError::Malformed(detail))) => {
            return respond_error(&mut wr, Status::BadRequest, &detail).await
        }
        Err(_) => {
            return respond_error(&mut wr, Status::RequestTimeout, "request head timed out").await
        }
    };

    let path = head.path();
    if path == settings.health_path && head.method == "GET" {
        return respond(&mut wr, Status::Ok, json!({})).await;
    }
    if path != settings.path {
        return respond_error(&mut wr, Status::NotFound, "not found").await;
    }
    if head.method != "POST" {
        return respond_error(&mut wr, Status::MethodNotAllowed, "only POST is accepted").await;
    }

    let content_length = match head.content_length() {
        Ok(n) => n,
        Err(Status::LengthRequired) => {
            return respond_error(&mut wr, Status::LengthRequired, "Content-Length is required")
                .await
        }
        Err(status) => return respond_error(&mut wr, status, "invalid Content-Length").await,
    };

    let metadata = head.metadata();
    let leftover = &buf[head.len..];
    let body = leftover.chain(&mut rd).take(content_length);

    let converted = match timeout(
        settings.read_timeout,
        convert(
            body_lines(body, settings.max_line_bytes),
            &metadata,
            &shared.scope,
            settings.attribute_naming,
        ),
    )
    .await
    {
        Ok(c) => c,
        Err(_) => {
            warn!(path = %path, "webhook body read timed out");
            return respond_error(&mut wr, Status::RequestTimeout, "body read timed out").await;
        }
    };

    if let Some(e) = converted.read_error {
        warn!(
            error = %e,
            records_read = converted.record_count,
            "failed to read webhook body"
        );
        let status = if e.kind() == io::ErrorKind::InvalidData {
            Status::PayloadTooLarge
        } else {
            Status::BadRequest
        };
        return respond_error(&mut wr, status, &e.to_string()).await;
    }

    let record_count = converted.record_count;
    if record_count > 0 {
        if let Err(e) = shared.sink.consume_logs(converted.logs) {
            warn!(error = %e, record_count, "failed to deliver webhook logs");
            return respond_error(&mut wr, Status::ServiceUnavailable, &e.to_string()).await;
        }
    }

    debug!(record_count, "webhook event accepted");
    respond(&mut wr, Status::Ok, json!({ "records": record_count })).await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(raw: &'static [u8]) -> Result<Head, HeadError> {
        let mut rd = raw;
        let mut buf = Vec::new();
        read_head(&mut rd, &mut buf, 1024).await
    }

    #[tokio::test]
    async fn parses_request_line_and_headers() {
        let head = parse(b"POST /events?a=1 HTTP/1.1\r\nHost: x\r\nX-Id: 7\r\n\r\nbody")
            .await
            .unwrap();
        assert_eq!(head.method, "POST");
        assert_eq!(head.target, "/events?a=1");
        assert_eq!(head.path(), "/events");
        assert_eq!(head.header("x-id"), Some("7"));
        assert_eq!(head.len, b"POST /events?a=1 HTTP/1.1\r\nHost: x\r\nX-Id: 7\r\n\r\n".len());
    }

    #[tokio::test]
    async fn partial_head_then_eof_is_closed() {
        assert!(matches!(
            parse(b"POST /events HTTP/1.1\r\nHost:").await,
            Err(HeadError::Closed)
        ));
    }

    #[tokio::test]
    async fn garbage_head_is_malformed() {
        assert!(matches!(
            parse(b"\x01\x02 nonsense\r\n\r\n").await,
            Err(HeadError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn oversized_head_is_rejected() {
        let mut raw = b"GET / HTTP/1.1\r\n".to_vec();
        raw.extend(std::iter::repeat(b'a').take(4096));
        let mut rd = &raw[..];
        let mut buf = Vec::new();
        assert!(matches!(
            read_head(&mut rd, &mut buf, 1024).await,
            Err(HeadError::TooLarge)
        ));
    }

    #[tokio::test]
    async fn metadata_skips_host_header() {
        let head = parse(b"POST /e?q=1 HTTP/1.1\r\nHost: x\r\nx-a: b\r\n\r\n")
            .await
            .unwrap();
        let md = head.metadata();
        assert_eq!(md.header_fields(), vec![("X-A".to_string(), "b")]);
    }

    #[tokio::test]
    async fn transfer_encoding_requires_length() {
        let head = parse(b"POST /e HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(head.content_length(), Err(Status::LengthRequired));
    }

    #[tokio::test]
    async fn bad_content_length_is_bad_request() {
        let head = parse(b"POST /e HTTP/1.1\r\nContent-Length: lots\r\n\r\n")
            .await
            .unwrap();
        assert_eq!(head.content_length(), Err(Status::BadRequest));
    }

    #[tokio::test]
    async fn missing_content_length_means_empty_body() {
        let head = parse(b"POST /e HTTP/1.1\r\n\r\n").await.unwrap();
        assert_eq!(head.content_length(), Ok(0));
    }

    #[tokio::test(start_paused = true)]
    async fn accept_error_pause_waits_out_backoff() {
        let (_tx, mut stop) = crate::lifecycle::stop_channel();
        let started = tokio::time::Instant::now();
        assert!(pause_after_accept_error(&mut stop).await);
        assert!(started.elapsed() >= ACCEPT_ERROR_BACKOFF);
    }

    #[tokio::test(start_paused = true)]
    async fn accept_error_pause_ends_on_stop() {
        let (tx, mut stop) = crate::lifecycle::stop_channel();
        tx.send_replace(true);
        let started = tokio::time::Instant::now();
        assert!(!pause_after_accept_error(&mut stop).await);
        assert!(started.elapsed() < ACCEPT_ERROR_BACKOFF);
    }

    #[test]
    fn status_codes() {
        assert_eq!(Status::Ok.code(), 200);
        assert_eq!(Status::LengthRequired.code(), 411);
        assert_eq!(Status::PayloadTooLarge.code(), 413);
        assert_eq!(Status::HeaderFieldsTooLarge.code(), 431);
        assert_eq!(Status::ServiceUnavailable.code(), 503);
    }
}
