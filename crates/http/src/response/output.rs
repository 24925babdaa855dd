use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::channel::oneshot;
use futures::FutureExt;
use http_body::{Body, Frame, SizeHint};

use crate::protocol::{ProtocolError, ResponseHead};
use crate::response::{lock, Demanded, Machine};

/// The consumer half of a response, held by the transport.
///
/// The head must be pulled first; the body handle only exists afterwards,
/// so "body byte before head" is unrepresentable. Dropping either handle
/// before end-of-stream is the transport abort: any parked producer push
/// resolves `false` and the machine closes.
pub struct ResponseOutput {
    machine: Arc<Mutex<Machine>>,
    head_rx: Option<oneshot::Receiver<ResponseHead>>,
}

impl ResponseOutput {
    pub(crate) fn new(machine: Arc<Mutex<Machine>>, head_rx: oneshot::Receiver<ResponseHead>) -> Self {
        Self { machine, head_rx: Some(head_rx) }
    }

    /// Waits for head emission (the producer's first push) and returns
    /// the frozen head together with the body pull handle.
    pub async fn head(mut self) -> Result<(ResponseHead, OutputBody), ProtocolError> {
        let Some(head_rx) = self.head_rx.take() else {
            return Err(ProtocolError::channel_closed("head already taken"));
        };
        match head_rx.await {
            Ok(head) => {
                let remaining = head.content_length();
                Ok((head, OutputBody { machine: Arc::clone(&self.machine), pending: None, finished: false, remaining }))
            }
            Err(_) => Err(ProtocolError::Aborted),
        }
    }
}

impl Drop for ResponseOutput {
    fn drop(&mut self) {
        // abandoned before the head was taken: abort the response
        if self.head_rx.is_some() {
            lock(&self.machine).close();
        }
    }
}

impl fmt::Debug for ResponseOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseOutput").field("head_taken", &self.head_rx.is_none()).finish()
    }
}

/// Body chunks pulled one demand at a time, in `append_body` order.
///
/// Implements [`http_body::Body`]; each `poll_frame` issues exactly one
/// demand to the machine and parks at most one receiver, so a second
/// concurrent demand cannot exist.
pub struct OutputBody {
    machine: Arc<Mutex<Machine>>,
    pending: Option<oneshot::Receiver<Option<Bytes>>>,
    finished: bool,
    remaining: Option<u64>,
}

impl OutputBody {
    fn note_delivered(&mut self, len: usize) {
        if let Some(remaining) = &mut self.remaining {
            *remaining = remaining.saturating_sub(len as u64);
        }
    }
}

impl Body for OutputBody {
    type Data = Bytes;
    type Error = ProtocolError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = self.get_mut();
        loop {
            if this.finished {
                return Poll::Ready(None);
            }

            if let Some(parked) = this.pending.as_mut() {
                return match parked.poll_unpin(cx) {
                    Poll::Ready(Ok(Some(bytes))) => {
                        this.pending = None;
                        this.note_delivered(bytes.len());
                        Poll::Ready(Some(Ok(Frame::data(bytes))))
                    }
                    Poll::Ready(Ok(None)) => {
                        this.pending = None;
                        this.finished = true;
                        Poll::Ready(None)
                    }
                    // the machine went away without resolving: quiet end
                    Poll::Ready(Err(_)) => {
                        this.pending = None;
                        this.finished = true;
                        Poll::Ready(None)
                    }
                    Poll::Pending => Poll::Pending,
                };
            }

            let demanded = lock(&this.machine).demand();
            match demanded {
                Demanded::Chunk(bytes) => {
                    this.note_delivered(bytes.len());
                    return Poll::Ready(Some(Ok(Frame::data(bytes))));
                }
                Demanded::End => {
                    this.finished = true;
                    return Poll::Ready(None);
                }
                Demanded::Parked(receiver) => {
                    this.pending = Some(receiver);
                }
            }
        }
    }

    fn is_end_stream(&self) -> bool {
        self.finished
    }

    fn size_hint(&self) -> SizeHint {
        match self.remaining {
            Some(remaining) => SizeHint::with_exact(remaining),
            None => SizeHint::new(),
        }
    }
}

impl Drop for OutputBody {
    fn drop(&mut self) {
        // close is idempotent: a no-op after clean completion, the abort
        // path otherwise
        lock(&self.machine).close();
    }
}

impl fmt::Debug for OutputBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputBody")
            .field("finished", &self.finished)
            .field("demand_parked", &self.pending.is_some())
            .finish()
    }
}
