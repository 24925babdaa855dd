//! Parsed-request wrapper handed to the engine by the transport.
//!
//! Wire parsing is owned by the transport layer; the engine only consumes
//! an already parsed request. This wraps `http::Request<()>` the way the
//! rest of the crate expects it, plus the path helpers the dispatcher and
//! the static file handler need.

use http::request::Parts;
use http::{HeaderMap, Method, Request, Uri, Version};

/// An already parsed request as seen by the response engine.
#[derive(Debug)]
pub struct RequestInfo {
    inner: Request<()>,
}

impl RequestInfo {
    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn uri(&self) -> &Uri {
        self.inner.uri()
    }

    pub fn version(&self) -> Version {
        self.inner.version()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// The raw request path, including any trailing slash.
    pub fn path(&self) -> &str {
        self.inner.uri().path()
    }

    /// Non-empty path segments, in order.
    pub fn path_segments(&self) -> impl Iterator<Item = &str> {
        self.path().split('/').filter(|segment| !segment.is_empty())
    }
}

impl AsRef<Request<()>> for RequestInfo {
    fn as_ref(&self) -> &Request<()> {
        &self.inner
    }
}

impl From<Parts> for RequestInfo {
    #[inline]
    fn from(parts: Parts) -> Self {
        Self { inner: Request::from_parts(parts, ()) }
    }
}

impl From<Request<()>> for RequestInfo {
    #[inline]
    fn from(inner: Request<()>) -> Self {
        Self { inner }
    }
}
