use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{error, info, warn};

use followermaze_core::protocol::MessageCodec;

use crate::hub::MessageHub;
use crate::sequencer::SourceEnd;
use crate::source::LineSource;

/// Accepts event source connections; at most one is served at a time
pub struct EventSourceServer {
    listener: TcpListener,
    hub: MessageHub,
}

impl EventSourceServer {
    #[must_use]
    pub const fn new(listener: TcpListener, hub: MessageHub) -> Self {
        Self { listener, hub }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` flips, then stop the active session
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(address = ?self.listener.local_addr().ok(), "Event source listener started");
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.offer(stream, peer),
                    Err(e) => {
                        warn!(error = %e, "Failed to accept event source connection");
                    }
                },
            }
        }
        self.hub.shutdown();
        info!("Event source listener stopped");
    }

    fn offer(&self, stream: TcpStream, peer: SocketAddr) {
        let codec = MessageCodec::with_max_length(self.hub.config().max_line_length);
        let source = LineSource::with_codec(stream, codec);

        // A rejected source is dropped here, which closes the socket
        let handle = match self.hub.register_event_source(source) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Event source connection rejected");
                return;
            }
        };

        info!(peer = %peer, session = handle.session_id(), "Event source connected");
        tokio::spawn(async move {
            match handle.wait().await {
                Ok(SourceEnd::Failed(e)) => {
                    warn!(peer = %peer, error = %e, "Event source session failed");
                }
                Ok(end) => {
                    info!(peer = %peer, end = ?end, "Event source disconnected");
                }
                Err(e) => {
                    error!(peer = %peer, error = %e, "Event source task panicked");
                }
            }
        });
    }
}
