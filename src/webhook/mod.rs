//! # Webhook event receiver
//!
//! Accepts `POST` requests and turns every body line into one log record,
//! with the request's query parameters and headers attached as resource
//! attributes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let server = WebhookServer::bind(raw.validate()?, Arc::clone(&sink)).await?;
//! let handle = server.start();
//! // ...
//! handle.shutdown().await;
//! ```

pub mod server;
pub mod transducer;

pub use server::WebhookServer;
pub use transducer::{
    body_lines, canonical_header_key, convert, AttributeNaming, Converted, RequestMetadata,
    ScopeContext,
};
