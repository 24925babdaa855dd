use std::fmt;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use http::{HeaderName, HeaderValue, StatusCode};

use crate::handler::Handler;
use crate::response::{lock, Machine, ResponseState};

/// The producer half of a response: the handle handlers and filters
/// drive the state machine through.
///
/// Cloning is cheap; all clones share one response. Status and header
/// mutation only take effect before the head is emitted, body bytes only
/// before completion; afterwards they are defined no-ops.
#[derive(Clone)]
pub struct ResponseWriter {
    machine: Arc<Mutex<Machine>>,
}

impl ResponseWriter {
    pub(crate) fn new(machine: Arc<Mutex<Machine>>) -> Self {
        Self { machine }
    }

    pub fn state(&self) -> ResponseState {
        lock(&self.machine).state()
    }

    pub fn is_completed(&self) -> bool {
        lock(&self.machine).is_completed()
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.machine).is_closed()
    }

    pub fn set_status(&self, status: StatusCode) {
        lock(&self.machine).assembly_mut().set_status(status);
    }

    /// Appends a header entry, keeping earlier entries for the same name.
    pub fn add_header<K, V>(&self, name: K, value: V)
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        lock(&self.machine).assembly_mut().add_header(name, value);
    }

    /// Replaces all entries for `name` with a single value.
    pub fn set_header<K, V>(&self, name: K, value: V)
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        lock(&self.machine).assembly_mut().set_header(name, value);
    }

    /// The first value currently stored for `name`.
    pub fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        lock(&self.machine).assembly().header(name).cloned()
    }

    /// Enqueues body bytes. If the transport already has a demand parked
    /// the bytes flush immediately; otherwise they wait for the next
    /// [`push`](Self::push).
    pub fn append_body(&self, bytes: impl Into<Bytes>) {
        lock(&self.machine).append_body(bytes.into());
    }

    /// Signals the transport that output is ready and waits for the
    /// flush to be accepted.
    ///
    /// The first push emits the head: head-phase filters run once and
    /// the header table freezes. Returns `true` when the transport
    /// accepted, `false` when it aborted or the response is closed;
    /// streaming producers must stop on `false`.
    pub async fn push(&self) -> bool {
        let accepted = lock(&self.machine).register_push();
        accepted.await.unwrap_or(false)
    }

    /// Hands the request to the next handler in the chain, or completes
    /// the response when no handlers remain.
    pub async fn next(&self) {
        let next = lock(&self.machine).take_next_handler();
        match next {
            Some((handler, request)) => handler.handle(request, self.clone()).await,
            None => self.complete().await,
        }
    }

    /// Marks the response complete and pushes end-of-stream through to
    /// the transport. Idempotent.
    pub async fn complete(&self) {
        {
            let mut machine = lock(&self.machine);
            if machine.is_completed() {
                return;
            }
            machine.mark_completed();
        }
        // the final push lets the transport observe end-of-stream; its
        // outcome no longer matters, teardown follows either way
        let _ = self.push().await;
        self.close();
    }

    /// Tears the response down. Releases a parked push with `false`,
    /// resolves a parked transport demand with end-of-stream and drops
    /// the remaining handler chain. Idempotent.
    pub fn close(&self) {
        lock(&self.machine).close();
    }

    /// Installs the remaining handler chain driven by [`next`](Self::next).
    pub fn set_handlers(&self, handlers: Vec<Arc<dyn Handler>>) {
        lock(&self.machine).set_handlers(handlers);
    }
}

impl fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseWriter").field("machine", &*lock(&self.machine)).finish()
    }
}
