use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, info, warn};

use followermaze_core::protocol::FrameError;
use followermaze_core::{Error, Result, UserId};

use crate::hub::MessageHub;
use crate::sink::{ChannelSink, Line};

type Inbound = FramedRead<tokio::net::tcp::OwnedReadHalf, LinesCodec>;

/// Accepts user client connections and drives one task per connection
pub struct ClientServer {
    listener: TcpListener,
    hub: MessageHub,
}

impl ClientServer {
    #[must_use]
    pub const fn new(listener: TcpListener, hub: MessageHub) -> Self {
        Self { listener, hub }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` flips
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(address = ?self.listener.local_addr().ok(), "Client listener started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let hub = self.hub.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            if let Err(e) = serve_client(stream, hub, shutdown).await {
                                info!(peer = %peer, error = %e, "Client connection ended");
                            }
                        });
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to accept client connection");
                    }
                },
            }
        }
        info!("Client listener stopped");
    }
}

/// Run one client connection from handshake to disconnect
async fn serve_client(stream: TcpStream, hub: MessageHub, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let max_line_length = hub.config().max_line_length;
    let (read_half, write_half) = stream.into_split();
    let mut inbound = FramedRead::new(read_half, LinesCodec::new_with_max_length(max_line_length));

    let user_id = handshake(&mut inbound).await?;
    let (sink, mut queue) = ChannelSink::new(user_id, hub.config().client_queue_depth);
    hub.register_client(Arc::new(sink))?;

    let result = pump(&mut queue, write_half, &mut inbound, &mut shutdown).await;
    // Only reached after a successful registration, so this cannot evict
    // another connection holding the same id
    hub.unregister_client(user_id);
    debug!(user_id = %user_id, "Client connection closed");
    result
}

/// Read the first line and parse it as the client's user id
async fn handshake(inbound: &mut Inbound) -> Result<UserId> {
    match inbound.next().await {
        Some(Ok(line)) => line
            .trim()
            .parse::<UserId>()
            .map_err(|e| Error::Handshake(format!("invalid user id {:?}: {e}", line.trim()))),
        Some(Err(e)) => Err(Error::Handshake(e.to_string())),
        None => Err(Error::Handshake("connection closed before handshake".to_string())),
    }
}

/// Copy queued lines to the socket until the peer leaves or shutdown
async fn pump<W>(
    queue: &mut mpsc::Receiver<Line>,
    writer: W,
    inbound: &mut Inbound,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut writer = BufWriter::new(writer);
    loop {
        tokio::select! {
            line = queue.recv() => {
                let Some(line) = line else { return Ok(()) };
                writer.write_all(line.as_bytes()).await?;
                // Batch whatever else is already queued into one flush
                while let Ok(line) = queue.try_recv() {
                    writer.write_all(line.as_bytes()).await?;
                }
                writer.flush().await?;
            }
            frame = inbound.next() => match frame {
                None => return Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(inbound_error(e, inbound.decoder().max_length())),
            },
            _ = shutdown.changed() => {
                writer.flush().await?;
                return Ok(());
            }
        }
    }
}

fn inbound_error(err: LinesCodecError, max: usize) -> Error {
    match err {
        LinesCodecError::Io(e) => Error::Io(e),
        LinesCodecError::MaxLineLengthExceeded => Error::Frame(FrameError::LineTooLong { max }),
    }
}
