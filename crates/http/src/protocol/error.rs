use thiserror::Error;

/// Errors surfaced by the response delivery engine.
///
/// The engine resolves almost everything locally: handler-side failures
/// become terminal responses, and a transport abort is a normal
/// cancellation path rather than an error. What remains are genuine
/// breakdowns of the channel between the two halves of a response.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The transport tore the response down before the head was delivered.
    #[error("transport aborted the response")]
    Aborted,

    #[error("response channel closed: {reason}")]
    ChannelClosed { reason: String },
}

impl ProtocolError {
    pub fn channel_closed<S: ToString>(reason: S) -> Self {
        Self::ChannelClosed { reason: reason.to_string() }
    }
}
