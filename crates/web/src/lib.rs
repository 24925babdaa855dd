//! Static file serving and routing on top of [`sluice_http`].
//!
//! [`sluice_http`] owns the response state machine; this crate puts a
//! small web layer over it:
//!
//! - [`route`]: the [`route::RouteDispatcher`] seam plus a radix-tree
//!   [`route::Router`].
//! - [`dispatch`]: [`dispatch::run_request`], which wires one request to
//!   its handler chain (or the not-found fallback) and hands the
//!   transport the response output.
//! - [`static_files`]: [`static_files::StaticFileHandler`], chunked and
//!   backpressure-gated file delivery with `ETag` revalidation and
//!   single byte-range support.
//! - [`range`]: `Range` header parsing.
//!
//! ```no_run
//! use std::sync::Arc;
//! use sluice_http::filter::FilterChain;
//! use sluice_web::{run_request, Router, StaticFileHandler};
//!
//! # async fn run(request: sluice_http::protocol::RequestInfo) {
//! let router = Router::builder().route("/{*path}", StaticFileHandler::new("/srv/www")).build();
//! let output = run_request(request, &router, Arc::new(FilterChain::empty()));
//! let (head, _body) = output.head().await.unwrap();
//! # let _ = head;
//! # }
//! ```

pub mod dispatch;
pub mod range;
pub mod route;
pub mod static_files;

pub use dispatch::run_request;
pub use range::{parse_range, ByteRange};
pub use route::{RouteDispatcher, Router, RouterBuilder};
pub use static_files::{ServeError, StaticFileHandler, CHUNK_SIZE};
