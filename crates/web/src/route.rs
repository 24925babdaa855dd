//! Request-path to handler-chain resolution.
//!
//! [`RouteDispatcher`] is the seam between connection plumbing and
//! request handling: given a path it yields the ordered handler chain
//! that should run, or nothing. [`Router`] is the stock implementation
//! on top of a radix-tree path matcher; registering several handlers on
//! one pattern chains them in registration order, with each handler
//! deciding whether to call the next.

use std::fmt;
use std::sync::Arc;

use tracing::error;

use sluice_http::handler::Handler;
use sluice_http::protocol::RequestInfo;

/// Resolves a request to the handler chain that should produce its
/// response. Returning `None` leaves the response to the caller's
/// not-found fallback.
pub trait RouteDispatcher: Send + Sync {
    fn find_handlers(&self, path: &str, request: &RequestInfo) -> Option<Vec<Arc<dyn Handler>>>;
}

/// A path-pattern router. Patterns use `{name}` for a single segment and
/// `{*rest}` for a trailing catch-all.
pub struct Router {
    inner: matchit::Router<Vec<Arc<dyn Handler>>>,
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder { routes: Vec::new() }
    }
}

impl RouteDispatcher for Router {
    fn find_handlers(&self, path: &str, _request: &RequestInfo) -> Option<Vec<Arc<dyn Handler>>> {
        self.inner.at(path).ok().map(|matched| matched.value.clone())
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router").finish_non_exhaustive()
    }
}

#[derive(Default)]
pub struct RouterBuilder {
    routes: Vec<(String, Arc<dyn Handler>)>,
}

impl RouterBuilder {
    /// Registers a handler for a pattern. Repeating a pattern appends to
    /// its chain instead of replacing it.
    pub fn route(mut self, pattern: impl Into<String>, handler: impl Handler + 'static) -> Self {
        self.routes.push((pattern.into(), Arc::new(handler)));
        self
    }

    pub fn route_arc(mut self, pattern: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.routes.push((pattern.into(), handler));
        self
    }

    /// Builds the router. A pattern the matcher rejects is logged and
    /// skipped rather than failing the whole build.
    pub fn build(self) -> Router {
        let mut grouped: Vec<(String, Vec<Arc<dyn Handler>>)> = Vec::new();
        for (pattern, handler) in self.routes {
            match grouped.iter_mut().find(|(existing, _)| *existing == pattern) {
                Some((_, chain)) => chain.push(handler),
                None => grouped.push((pattern, vec![handler])),
            }
        }

        let mut inner = matchit::Router::new();
        for (pattern, chain) in grouped {
            if let Err(e) = inner.insert(pattern.clone(), chain) {
                error!(pattern = %pattern, "skipping unregistrable route: {}", e);
            }
        }
        Router { inner }
    }
}

impl fmt::Debug for RouterBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouterBuilder").field("routes", &self.routes.len()).finish()
    }
}
