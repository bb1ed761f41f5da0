use async_trait::async_trait;
use futures::StreamExt;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;

use followermaze_core::protocol::{DecodeError, FrameError, MessageCodec};
use followermaze_core::Message;

/// Why the event source did not yield a message
#[derive(Debug, Error)]
pub enum IngestError {
    /// The record was malformed, not UTF-8 or over-long; the stream can continue
    #[error("Malformed record: {0}")]
    Malformed(#[from] DecodeError),

    #[error("Event source closed")]
    Closed,

    #[error("Event source IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    /// Whether the source is unusable after this error
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Malformed(_))
    }
}

impl From<FrameError> for IngestError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => Self::Io(e),
            FrameError::LineTooLong { max } => Self::Malformed(DecodeError::TooLong { max }),
        }
    }
}

/// Yields decoded messages in arrival order
#[async_trait]
pub trait EventSource: Send {
    async fn wait_message(&mut self) -> Result<Message, IngestError>;
}

/// Event source reading newline-delimited records from a byte stream
pub struct LineSource<R> {
    frames: FramedRead<R, MessageCodec>,
}

impl<R: AsyncRead + Unpin + Send> LineSource<R> {
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self::with_codec(reader, MessageCodec::new())
    }

    #[must_use]
    pub fn with_codec(reader: R, codec: MessageCodec) -> Self {
        Self {
            frames: FramedRead::new(reader, codec),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> EventSource for LineSource<R> {
    async fn wait_message(&mut self) -> Result<Message, IngestError> {
        match self.frames.next().await {
            Some(Ok(Ok(message))) => Ok(message),
            Some(Ok(Err(err))) => Err(IngestError::Malformed(err)),
            Some(Err(err)) => Err(err.into()),
            None => Err(IngestError::Closed),
        }
    }
}

/// Event source fed from an in-process channel
pub struct ChannelSource {
    receiver: mpsc::Receiver<Result<Message, DecodeError>>,
}

impl ChannelSource {
    /// Create a source and the sender that feeds it. Dropping every sender
    /// closes the source.
    #[must_use]
    pub fn new(capacity: usize) -> (mpsc::Sender<Result<Message, DecodeError>>, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (sender, Self { receiver })
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn wait_message(&mut self) -> Result<Message, IngestError> {
        match self.receiver.recv().await {
            Some(Ok(message)) => Ok(message),
            Some(Err(err)) => Err(IngestError::Malformed(err)),
            None => Err(IngestError::Closed),
        }
    }
}
