use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use followermaze_core::metrics::delivery::CONNECTED_CLIENTS;
use followermaze_core::UserId;

use crate::sink::ClientSink;

/// Live client connections, at most one per user id
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<DashMap<UserId, Arc<dyn ClientSink>>>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink` under `user_id`.
    ///
    /// Returns false and leaves the registry untouched if the id is taken.
    pub fn register(&self, user_id: UserId, sink: Arc<dyn ClientSink>) -> bool {
        match self.clients.entry(user_id) {
            Entry::Occupied(_) => {
                warn!(user_id = %user_id, "Rejected duplicate client registration");
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(sink);
                CONNECTED_CLIENTS.inc();
                info!(
                    user_id = %user_id,
                    total_clients = self.clients.len(),
                    "Client registered"
                );
                true
            }
        }
    }

    /// Remove the client if present. Returns false if it was not registered.
    pub fn unregister(&self, user_id: UserId) -> bool {
        if self.clients.remove(&user_id).is_some() {
            CONNECTED_CLIENTS.dec();
            info!(
                user_id = %user_id,
                total_clients = self.clients.len(),
                "Client unregistered"
            );
            true
        } else {
            debug!(user_id = %user_id, "Attempted to unregister unknown client");
            false
        }
    }

    #[must_use]
    pub fn lookup(&self, user_id: UserId) -> Option<Arc<dyn ClientSink>> {
        self.clients.get(&user_id).map(|sink| Arc::clone(sink.value()))
    }

    #[must_use]
    pub fn contains(&self, user_id: UserId) -> bool {
        self.clients.contains_key(&user_id)
    }

    /// Snapshot of every registered sink. Shard locks are released before
    /// this returns, so callers may write to the sinks freely.
    #[must_use]
    pub fn sinks(&self) -> Vec<Arc<dyn ClientSink>> {
        self.clients
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    #[must_use]
    pub fn client_ids(&self) -> Vec<UserId> {
        self.clients.iter().map(|entry| *entry.key()).collect()
    }

    /// Get the number of registered clients
    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
