use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use followermaze_core::config::HubConfig;
use followermaze_core::metrics::delivery::SOURCE_SESSIONS;
use followermaze_core::{Error, Result, UserId};

use crate::client_registry::ClientRegistry;
use crate::dispatcher::Dispatcher;
use crate::follower_graph::FollowerGraph;
use crate::sequencer::{Sequencer, SourceEnd};
use crate::sink::ClientSink;
use crate::source::EventSource;

struct SourceSlot {
    session: u64,
    cancel: CancellationToken,
}

/// Handle to a running event source session
pub struct SourceHandle {
    session: u64,
    cancel: CancellationToken,
    task: JoinHandle<SourceEnd>,
}

impl SourceHandle {
    #[must_use]
    pub const fn session_id(&self) -> u64 {
        self.session
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the drain loop to stop
    pub async fn wait(self) -> std::result::Result<SourceEnd, JoinError> {
        self.task.await
    }
}

/// Owns the shared follower graph and client registry, and drives at most
/// one event source session at a time.
#[derive(Clone)]
pub struct MessageHub {
    graph: FollowerGraph,
    registry: ClientRegistry,
    source: Arc<Mutex<Option<SourceSlot>>>,
    next_session: Arc<AtomicU64>,
    config: HubConfig,
}

impl MessageHub {
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self {
            graph: FollowerGraph::new(),
            registry: ClientRegistry::new(),
            source: Arc::new(Mutex::new(None)),
            next_session: Arc::new(AtomicU64::new(1)),
            config,
        }
    }

    #[must_use]
    pub const fn config(&self) -> &HubConfig {
        &self.config
    }

    #[must_use]
    pub const fn graph(&self) -> &FollowerGraph {
        &self.graph
    }

    #[must_use]
    pub const fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Make `sink` eligible for delivery under its own id
    pub fn register_client(&self, sink: Arc<dyn ClientSink>) -> Result<()> {
        let user_id = sink.id();
        if self.registry.register(user_id, sink) {
            Ok(())
        } else {
            Err(Error::ClientAlreadyRegistered(user_id))
        }
    }

    pub fn unregister_client(&self, user_id: UserId) -> bool {
        self.registry.unregister(user_id)
    }

    #[must_use]
    pub fn has_event_source(&self) -> bool {
        self.source.lock().is_some()
    }

    /// Start a drain loop over `source`.
    ///
    /// Fails if another session is still registered. Each session begins
    /// with a fresh cursor and an empty buffer; the follower graph and the
    /// client registry carry over.
    pub fn register_event_source<S>(&self, source: S) -> Result<SourceHandle>
    where
        S: EventSource + 'static,
    {
        let mut slot = self.source.lock();
        if slot.is_some() {
            warn!("Rejected event source registration, a session is already active");
            return Err(Error::SourceAlreadyRegistered);
        }

        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        *slot = Some(SourceSlot {
            session,
            cancel: cancel.clone(),
        });
        drop(slot);

        SOURCE_SESSIONS.inc();
        info!(session, "Event source registered");

        let dispatcher = Dispatcher::new(self.graph.clone(), self.registry.clone());
        let slot = Arc::clone(&self.source);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let mut source = source;
            let mut sequencer = Sequencer::new(dispatcher);
            let end = sequencer.drain(&mut source, &task_cancel).await;
            release_slot(&slot, session);
            info!(session, stats = ?sequencer.stats(), "Event source session ended");
            end
        });

        Ok(SourceHandle {
            session,
            cancel,
            task,
        })
    }

    /// Ask the session behind `handle` to stop.
    ///
    /// The slot stays occupied until the drain task has returned, so a new
    /// source cannot register while the old one may still dispatch. Use
    /// [`SourceHandle::wait`] to observe the release. Returns false if that
    /// session was no longer registered.
    pub fn unregister_event_source(&self, handle: &SourceHandle) -> bool {
        handle.cancel.cancel();
        let active = self
            .source
            .lock()
            .as_ref()
            .is_some_and(|current| current.session == handle.session);
        if active {
            info!(session = handle.session, "Event source unregistering");
        }
        active
    }

    /// Cancel whatever session is active; its drain task frees the slot
    pub fn shutdown(&self) {
        if let Some(slot) = self.source.lock().as_ref() {
            slot.cancel.cancel();
            info!(session = slot.session, "Event source stopping for shutdown");
        }
    }
}

fn release_slot(slot: &Mutex<Option<SourceSlot>>, session: u64) -> bool {
    let mut guard = slot.lock();
    match guard.as_ref() {
        Some(current) if current.session == session => {
            *guard = None;
            true
        }
        _ => false,
    }
}
