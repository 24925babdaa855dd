//! Per-request glue between routing and the response engine.

use std::sync::Arc;

use http::StatusCode;
use tracing::debug;

use sluice_http::filter::FilterChain;
use sluice_http::protocol::RequestInfo;
use sluice_http::response::{response_channel, ResponseOutput};

use crate::route::RouteDispatcher;

/// Starts processing one request and returns the transport's half of the
/// response.
///
/// The matched handler chain (or the not-found fallback) runs on its own
/// task; the caller awaits the returned output for the head and then
/// pulls body chunks at its own pace. Dropping the output mid-stream
/// aborts the producer.
pub fn run_request<D>(
    request: RequestInfo,
    dispatcher: &D,
    filters: Arc<FilterChain>,
) -> ResponseOutput
where
    D: RouteDispatcher + ?Sized,
{
    let request = Arc::new(request);
    let (writer, output) = response_channel(Arc::clone(&request), filters);

    match dispatcher.find_handlers(request.path(), &request) {
        Some(handlers) if !handlers.is_empty() => {
            writer.set_handlers(handlers);
            tokio::spawn(async move { writer.next().await });
        }
        _ => {
            debug!(path = request.path(), "no route matched");
            tokio::spawn(async move {
                writer.set_status(StatusCode::NOT_FOUND);
                writer.append_body(format!("The file {} was not found.", request.path()));
                writer.complete().await;
            });
        }
    }

    output
}
