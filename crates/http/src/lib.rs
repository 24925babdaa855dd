//! A flow-controlled HTTP response delivery engine.
//!
//! This crate turns an in-memory response description (status, ordered
//! headers, body chunks) into a correctly ordered, backpressure-gated
//! byte stream for an abstract transport. It deliberately owns *only*
//! that: wire parsing, connection management and TLS belong to the
//! transport layer feeding it.
//!
//! # Core pieces
//!
//! - [`response`]: the state machine. Handlers drive a [`response::ResponseWriter`]
//!   (status, headers, `append_body`, `push`, `complete`); the transport
//!   pulls through [`response::ResponseOutput`] (head first, then body
//!   chunks one demand at a time, as an `http_body::Body`).
//! - [`filter`]: priority-grouped interceptors applied once at head
//!   emission and once per body flush.
//! - [`handler`]: the async [`handler::Handler`] trait plus the chain
//!   mechanics behind `ResponseWriter::next`.
//! - [`protocol`]: ordered header storage, the frozen response head,
//!   parsed-request info and error types.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use http::{Method, Request, StatusCode};
//! use sluice_http::filter::FilterChain;
//! use sluice_http::protocol::RequestInfo;
//! use sluice_http::response::response_channel;
//!
//! # async fn run() {
//! tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();
//!
//! let request: Arc<RequestInfo> =
//!     Arc::new(Request::builder().method(Method::GET).uri("/").body(()).unwrap().into());
//! let (writer, output) = response_channel(request, Arc::new(FilterChain::empty()));
//!
//! // handler side
//! tokio::spawn(async move {
//!     writer.set_status(StatusCode::OK);
//!     writer.set_header(http::header::CONTENT_TYPE, "text/plain");
//!     writer.append_body("hello");
//!     writer.push().await;
//!     writer.complete().await;
//! });
//!
//! // transport side
//! let (head, _body) = output.head().await.unwrap();
//! assert_eq!(head.status(), StatusCode::OK);
//! # }
//! ```
//!
//! The single invariant everything hangs off: at most one transport
//! demand is outstanding at a time, so a slow consumer never causes
//! unbounded buffering and the producer never blocks a thread.

pub mod filter;
pub mod handler;
pub mod protocol;
pub mod response;
