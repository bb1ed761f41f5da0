use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use followermaze_core::UserId;

/// An encoded, CRLF-terminated line shared by every target of one dispatch
pub type Line = Arc<str>;

/// Why a line did not reach a client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("Client {0} delivery queue is full")]
    Full(UserId),

    #[error("Client {0} connection is closed")]
    Closed(UserId),
}

/// Outbound side of a client connection.
///
/// `write` must not block: dispatch runs on the single drain task, so a
/// stalled sink would delay every other client.
#[cfg_attr(test, mockall::automock)]
pub trait ClientSink: Send + Sync {
    fn id(&self) -> UserId;

    fn write(&self, line: Line) -> Result<(), SinkError>;
}

/// Sink backed by a bounded queue drained by the connection's writer task
#[derive(Debug, Clone)]
pub struct ChannelSink {
    user_id: UserId,
    sender: mpsc::Sender<Line>,
}

impl ChannelSink {
    /// Create a sink and the receiver its writer task drains
    #[must_use]
    pub fn new(user_id: UserId, capacity: usize) -> (Self, mpsc::Receiver<Line>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { user_id, sender }, receiver)
    }
}

impl ClientSink for ChannelSink {
    fn id(&self) -> UserId {
        self.user_id
    }

    fn write(&self, line: Line) -> Result<(), SinkError> {
        self.sender.try_send(line).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => SinkError::Full(self.user_id),
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed(self.user_id),
        })
    }
}
