//! The flow-controlled response delivery state machine.
//!
//! A response travels through a pull protocol between two halves:
//!
//! - the **producer half** ([`ResponseWriter`]), held by handlers, which
//!   assembles status, headers and body bytes and signals each flush
//!   with [`ResponseWriter::push`];
//! - the **consumer half** ([`ResponseOutput`] / [`OutputBody`]), held by
//!   the transport, which pulls the head first and then body chunks one
//!   demand at a time.
//!
//! The transport never receives bytes it has not asked for, and the
//! producer never blocks a thread waiting for it: coordination happens
//! through at most one parked transport demand and at most one parked
//! push acknowledgement, both plain oneshot channels. The head is always
//! fully emitted, with head-phase filters applied and the header table
//! frozen, before any body byte is accepted; body-phase filters run once
//! per flush.
//!
//! State progression:
//!
//! ```text
//! AwaitingHead -> AwaitingDemand -> Streaming <-> AwaitingDemand
//!                                      |
//!                                      v
//!                                  Completed -> Closed
//! ```
//!
//! `Completed` and `Closed` absorb further writes. `Closed` is also where
//! every teardown path converges: completion after the transport has seen
//! end-of-stream, transport abort, and explicit [`ResponseWriter::close`].

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use futures::channel::oneshot;
use tracing::{debug, warn};

use crate::filter::FilterChain;
use crate::handler::Handler;
use crate::protocol::{RequestInfo, ResponseHead};

mod parts;
pub use parts::ResponseParts;

mod writer;
pub use writer::ResponseWriter;

mod output;
pub use output::{OutputBody, ResponseOutput};

/// Creates the two halves of a response for one in-flight request.
///
/// The response-side [`FilterChain`] runs inside the machine: head-phase
/// filters once at head emission, body-phase filters once per flush.
pub fn response_channel(request: Arc<RequestInfo>, filters: Arc<FilterChain>) -> (ResponseWriter, ResponseOutput) {
    let (head_tx, head_rx) = oneshot::channel();
    let machine = Arc::new(Mutex::new(Machine::new(request, filters, head_tx)));
    (ResponseWriter::new(Arc::clone(&machine)), ResponseOutput::new(machine, head_rx))
}

/// Where a response stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseState {
    /// No head emitted yet; headers and status are still mutable.
    AwaitingHead,
    /// Head emitted (or a flush finished) and no transport demand pending.
    AwaitingDemand,
    /// The last demand was answered with body bytes.
    Streaming,
    /// The producer finished; end-of-stream is due to the transport.
    Completed,
    /// Terminal. All teardown paths converge here.
    Closed,
}

/// What the machine answers to a single transport demand.
pub(crate) enum Demanded {
    Chunk(Bytes),
    End,
    /// Nothing to deliver yet; resolves when the producer flushes.
    Parked(oneshot::Receiver<Option<Bytes>>),
}

/// The shared core both halves operate on, always under the lock.
pub(crate) struct Machine {
    state: ResponseState,
    assembly: ResponseParts,
    head_tx: Option<oneshot::Sender<ResponseHead>>,
    pending_demand: Option<oneshot::Sender<Option<Bytes>>>,
    push_waiter: Option<oneshot::Sender<bool>>,
    completed: bool,
    closed: bool,
    filters: Arc<FilterChain>,
    handlers: VecDeque<Arc<dyn Handler>>,
    request: Option<Arc<RequestInfo>>,
}

pub(crate) fn lock(machine: &Mutex<Machine>) -> MutexGuard<'_, Machine> {
    machine.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

impl Machine {
    fn new(request: Arc<RequestInfo>, filters: Arc<FilterChain>, head_tx: oneshot::Sender<ResponseHead>) -> Self {
        Self {
            state: ResponseState::AwaitingHead,
            assembly: ResponseParts::new(),
            head_tx: Some(head_tx),
            pending_demand: None,
            push_waiter: None,
            completed: false,
            closed: false,
            filters,
            handlers: VecDeque::new(),
            request: Some(request),
        }
    }

    pub(crate) fn state(&self) -> ResponseState {
        self.state
    }

    pub(crate) fn is_completed(&self) -> bool {
        self.completed
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn assembly_mut(&mut self) -> &mut ResponseParts {
        &mut self.assembly
    }

    pub(crate) fn assembly(&self) -> &ResponseParts {
        &self.assembly
    }

    pub(crate) fn set_handlers(&mut self, handlers: Vec<Arc<dyn Handler>>) {
        self.handlers = handlers.into();
    }

    pub(crate) fn take_next_handler(&mut self) -> Option<(Arc<dyn Handler>, Arc<RequestInfo>)> {
        let request = self.request.clone()?;
        let handler = self.handlers.pop_front()?;
        Some((handler, request))
    }

    /// Registers a producer push and returns its acceptance receiver.
    ///
    /// The first push triggers head emission; later ones feed a parked
    /// transport demand if there is one. The receiver resolves `true`
    /// when the transport accepted the flush and `false` on teardown.
    pub(crate) fn register_push(&mut self) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();
        if self.closed {
            drop(tx);
            return rx;
        }
        if let Some(previous) = self.push_waiter.replace(tx) {
            warn!("overlapping push signals, releasing the earlier one");
            let _ = previous.send(false);
        }
        if self.head_tx.is_some() {
            self.emit_head();
        } else if self.pending_demand.is_some() {
            self.satisfy_parked_demand();
        }
        rx
    }

    /// Buffers body bytes; flushes straight through when the transport
    /// already has a demand parked.
    pub(crate) fn append_body(&mut self, bytes: Bytes) {
        if self.completed || self.closed {
            warn!("ignoring body bytes appended after completion");
            return;
        }
        self.assembly.append_body(&bytes);
        if self.pending_demand.is_some() {
            self.flush_to_parked_demand();
        }
    }

    pub(crate) fn mark_completed(&mut self) {
        self.completed = true;
        if self.state != ResponseState::Closed {
            self.state = ResponseState::Completed;
        }
    }

    /// Answers one transport demand. Never called with a demand already
    /// parked: the consumer half holds at most one in flight.
    pub(crate) fn demand(&mut self) -> Demanded {
        debug_assert!(self.head_tx.is_none(), "body demanded before head emission");
        debug_assert!(self.pending_demand.is_none(), "a body demand is already outstanding");

        if let Some(push) = self.push_waiter.take() {
            self.run_body_filters();
            if self.assembly.has_buffered_body() {
                let chunk = self.assembly.take_body();
                self.state = ResponseState::Streaming;
                let _ = push.send(true);
                return Demanded::Chunk(chunk);
            }
            if self.completed {
                let _ = push.send(true);
                return Demanded::End;
            }
            // push carried no data; acknowledge it and wait for the next one
            let (tx, rx) = oneshot::channel();
            self.pending_demand = Some(tx);
            self.state = ResponseState::AwaitingDemand;
            let _ = push.send(true);
            return Demanded::Parked(rx);
        }

        if self.completed || self.closed {
            if self.assembly.has_buffered_body() {
                self.run_body_filters();
                if self.assembly.has_buffered_body() {
                    let chunk = self.assembly.take_body();
                    return Demanded::Chunk(chunk);
                }
            }
            return Demanded::End;
        }

        let (tx, rx) = oneshot::channel();
        self.pending_demand = Some(tx);
        self.state = ResponseState::AwaitingDemand;
        Demanded::Parked(rx)
    }

    /// Idempotent teardown; the one guaranteed release point.
    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.completed = true;
        self.state = ResponseState::Closed;
        if let Some(push) = self.push_waiter.take() {
            let _ = push.send(false);
        }
        if let Some(demand) = self.pending_demand.take() {
            let _ = demand.send(None);
        }
        self.head_tx = None;
        self.handlers.clear();
        self.request = None;
        self.assembly.clear_body();
    }

    fn emit_head(&mut self) {
        let Some(tx) = self.head_tx.take() else { return };
        let filters = Arc::clone(&self.filters);
        filters.run_head(&mut self.assembly);
        let head = self.assembly.freeze_head();
        self.state = ResponseState::AwaitingDemand;
        if tx.send(head).is_err() {
            debug!("transport dropped before head delivery");
            self.close();
        }
    }

    fn satisfy_parked_demand(&mut self) {
        let Some(push) = self.push_waiter.take() else { return };
        self.run_body_filters();
        if self.assembly.has_buffered_body() {
            if let Some(demand) = self.pending_demand.take() {
                let chunk = self.assembly.take_body();
                self.state = ResponseState::Streaming;
                if demand.send(Some(chunk)).is_err() {
                    debug!("transport dropped a parked demand");
                    let _ = push.send(false);
                    self.close();
                    return;
                }
            }
            let _ = push.send(true);
        } else if self.completed {
            if let Some(demand) = self.pending_demand.take() {
                let _ = demand.send(None);
            }
            let _ = push.send(true);
        } else {
            // push with nothing to flush: acknowledge and keep the demand parked
            let _ = push.send(true);
        }
    }

    fn flush_to_parked_demand(&mut self) {
        self.run_body_filters();
        if !self.assembly.has_buffered_body() {
            // a body filter swallowed the flush; keep the demand parked
            return;
        }
        if let Some(demand) = self.pending_demand.take() {
            let chunk = self.assembly.take_body();
            self.state = ResponseState::Streaming;
            if demand.send(Some(chunk)).is_err() {
                debug!("transport dropped a parked demand");
                self.close();
            }
        }
    }

    fn run_body_filters(&mut self) {
        let filters = Arc::clone(&self.filters);
        filters.run_body(&mut self.assembly);
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("state", &self.state)
            .field("completed", &self.completed)
            .field("closed", &self.closed)
            .field("buffered", &self.assembly.body().len())
            .field("remaining_handlers", &self.handlers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{body_filter_fn, head_filter_fn, FilterAction, FilterChain, FilterPriority, ResponseFilter};
    use crate::handler::handler_fn;
    use http::{header, Method, Request, StatusCode};
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn request() -> Arc<RequestInfo> {
        Arc::new(Request::builder().method(Method::GET).uri("/test").body(()).unwrap().into())
    }

    fn channel() -> (ResponseWriter, ResponseOutput) {
        response_channel(request(), Arc::new(FilterChain::empty()))
    }

    #[tokio::test]
    async fn head_is_emitted_on_first_push_and_then_frozen() {
        let (writer, output) = channel();

        let producer = tokio::spawn({
            let writer = writer.clone();
            async move {
                writer.set_status(StatusCode::CREATED);
                writer.set_header(header::CONTENT_TYPE, "text/plain");
                writer.append_body("hello");
                assert!(writer.push().await);
                // past head emission: silently ignored
                writer.set_header(header::CONTENT_TYPE, "text/html");
                writer.complete().await;
            }
        });

        let (head, body) = output.head().await.unwrap();
        assert_eq!(head.status(), StatusCode::CREATED);
        assert_eq!(head.headers().get(&header::CONTENT_TYPE).unwrap(), "text/plain");

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"hello");

        producer.await.unwrap();
        assert_eq!(writer.state(), ResponseState::Closed);
    }

    #[tokio::test]
    async fn body_bytes_arrive_in_append_order() {
        let (writer, output) = channel();

        let producer = tokio::spawn({
            let writer = writer.clone();
            async move {
                writer.append_body("one");
                assert!(writer.push().await);
                writer.append_body("two");
                writer.append_body("three");
                assert!(writer.push().await);
                writer.complete().await;
            }
        });

        let (_, body) = output.head().await.unwrap();
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"onetwothree");
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn completing_without_body_yields_quiet_end_of_stream() {
        let (writer, output) = channel();

        let producer = tokio::spawn({
            let writer = writer.clone();
            async move {
                writer.set_status(StatusCode::NO_CONTENT);
                writer.complete().await;
            }
        });

        let (head, body) = output.head().await.unwrap();
        assert_eq!(head.status(), StatusCode::NO_CONTENT);
        let collected = body.collect().await.unwrap().to_bytes();
        assert!(collected.is_empty());
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn append_flushes_straight_into_a_parked_demand() {
        let (writer, output) = channel();

        let producer = tokio::spawn({
            let writer = writer.clone();
            async move {
                // empty push: emits the head, leaves the transport waiting
                assert!(writer.push().await);
                writer.append_body("late");
                assert!(writer.push().await);
                writer.complete().await;
            }
        });

        let (_, body) = output.head().await.unwrap();
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"late");
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn head_filters_run_once_and_can_rewrite_the_head() {
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = {
            let calls = Arc::clone(&calls);
            FilterChain::from_registrations(vec![(
                Arc::new(head_filter_fn(move |parts| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    parts.set_header(header::SERVER, "sluice");
                    FilterAction::Continue
                })) as Arc<dyn ResponseFilter>,
                FilterPriority::High,
            )])
        };
        let (writer, output) = response_channel(request(), Arc::new(chain));

        let producer = tokio::spawn({
            let writer = writer.clone();
            async move {
                writer.append_body("x");
                assert!(writer.push().await);
                writer.complete().await;
            }
        });

        let (head, body) = output.head().await.unwrap();
        assert_eq!(head.headers().get(&header::SERVER).unwrap(), "sluice");
        let _ = body.collect().await.unwrap();
        producer.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn body_filters_run_per_flush_and_can_rewrite_bytes() {
        let chain = FilterChain::from_registrations(vec![(
            Arc::new(body_filter_fn(|parts| {
                let upper = parts.body().to_ascii_uppercase();
                parts.replace_body(upper);
                FilterAction::Continue
            })) as Arc<dyn ResponseFilter>,
            FilterPriority::Medium,
        )]);
        let (writer, output) = response_channel(request(), Arc::new(chain));

        let producer = tokio::spawn({
            let writer = writer.clone();
            async move {
                writer.append_body("ab");
                assert!(writer.push().await);
                writer.append_body("cd");
                assert!(writer.push().await);
                writer.complete().await;
            }
        });

        let (_, body) = output.head().await.unwrap();
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"ABCD");
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn transport_abort_resolves_push_with_false() {
        let (writer, output) = channel();

        let producer = tokio::spawn({
            let writer = writer.clone();
            async move {
                writer.append_body("first");
                assert!(writer.push().await);
                writer.append_body("second");
                // transport dropped after the first chunk
                assert!(!writer.push().await);
                assert!(writer.is_closed());
            }
        });

        let (_, mut body) = output.head().await.unwrap();
        let frame = body.frame().await.unwrap().unwrap();
        assert_eq!(frame.into_data().unwrap(), Bytes::from_static(b"first"));
        drop(body);

        producer.await.unwrap();
    }

    #[tokio::test]
    async fn dropping_the_output_before_head_aborts_the_response() {
        let (writer, output) = channel();
        drop(output);

        assert!(!writer.push().await);
        assert!(writer.is_closed());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_head_resolves_aborted() {
        let (writer, output) = channel();
        writer.close();
        writer.close();

        let err = output.head().await.unwrap_err();
        assert!(matches!(err, crate::protocol::ProtocolError::Aborted));
    }

    #[tokio::test]
    async fn body_bytes_after_complete_are_ignored() {
        let (writer, output) = channel();

        let producer = tokio::spawn({
            let writer = writer.clone();
            async move {
                writer.append_body("kept");
                writer.complete().await;
                writer.append_body("dropped");
                writer.complete().await; // idempotent
            }
        });

        let (_, body) = output.head().await.unwrap();
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"kept");
        producer.await.unwrap();
    }

    #[tokio::test]
    async fn handler_chain_advances_through_next_and_completes_at_the_end() {
        let (writer, output) = channel();

        writer.set_handlers(vec![
            Arc::new(handler_fn(|_request, response: ResponseWriter| async move {
                response.set_header(header::SERVER, "sluice");
                response.next().await;
            })),
            Arc::new(handler_fn(|_request, response: ResponseWriter| async move {
                response.append_body("from the second handler");
                // fall off the end of the chain: next() completes for us
                response.next().await;
            })),
        ]);

        let driver = tokio::spawn({
            let writer = writer.clone();
            async move { writer.next().await }
        });

        let (head, body) = output.head().await.unwrap();
        assert_eq!(head.headers().get(&header::SERVER).unwrap(), "sluice");
        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"from the second handler");

        driver.await.unwrap();
        assert_eq!(writer.state(), ResponseState::Closed);
    }

    #[tokio::test]
    async fn empty_handler_chain_completes_immediately() {
        let (writer, output) = channel();

        let driver = tokio::spawn({
            let writer = writer.clone();
            async move { writer.next().await }
        });

        let (head, body) = output.head().await.unwrap();
        assert_eq!(head.status(), StatusCode::OK);
        assert!(body.collect().await.unwrap().to_bytes().is_empty());
        driver.await.unwrap();
    }
}
