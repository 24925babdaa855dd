use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::protocol::RequestInfo;
use crate::response::ResponseWriter;

/// A unit of request processing driven by the response state machine.
///
/// A handler either finishes the response (`complete`/`close`) or hands
/// it to the next handler in the chain with [`ResponseWriter::next`].
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, request: Arc<RequestInfo>, response: ResponseWriter);
}

pub struct HandlerFn<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(Arc<RequestInfo>, ResponseWriter) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    async fn handle(&self, request: Arc<RequestInfo>, response: ResponseWriter) {
        (self.f)(request, response).await
    }
}

/// Wraps an async function as a [`Handler`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(Arc<RequestInfo>, ResponseWriter) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send,
{
    HandlerFn { f }
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HandlerFn")
    }
}
