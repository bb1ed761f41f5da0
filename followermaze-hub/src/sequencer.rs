//! Restores sequence order over an out-of-order event feed
//!
//! Records are released to the [`Dispatcher`] strictly in ascending sequence
//! order starting at [`SeqId::FIRST`], with no gaps and no repeats. A record
//! that arrives early waits in `pending` until every predecessor has been
//! released. A missing sequence number stalls release indefinitely.
//!
//! The sequencer is owned by exactly one task, so its state is not shared.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use followermaze_core::metrics::sequencer::{
    DUPLICATE_MESSAGES, MALFORMED_MESSAGES, MESSAGES_DISPATCHED, MESSAGES_RECEIVED,
    PENDING_MESSAGES, STALE_MESSAGES,
};
use followermaze_core::{Message, SeqId};

use crate::dispatcher::Dispatcher;
use crate::source::{EventSource, IngestError};

/// What happened to an admitted record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The record was next in line. Carries how many records were released,
    /// counting the record itself and any buffered successors.
    Released(usize),
    /// Held until its predecessors arrive
    Buffered,
    /// Already released earlier; dropped
    Stale,
    /// Same sequence number already waiting; the later record is dropped
    Duplicate,
}

/// Per-session counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequencerStats {
    pub received: u64,
    pub dispatched: u64,
    pub stale: u64,
    pub duplicates: u64,
    pub malformed: u64,
    pub pending: usize,
}

/// Why a drain loop stopped
#[derive(Debug)]
pub enum SourceEnd {
    /// The feed reached end of stream
    Closed,
    /// The session was unregistered
    Cancelled,
    /// The feed failed and cannot continue
    Failed(IngestError),
}

pub struct Sequencer {
    next_expected: SeqId,
    pending: BTreeMap<SeqId, Message>,
    dispatcher: Dispatcher,
    stats: SequencerStats,
}

impl Sequencer {
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            next_expected: SeqId::FIRST,
            pending: BTreeMap::new(),
            dispatcher,
            stats: SequencerStats::default(),
        }
    }

    /// The sequence number that will be released next
    #[must_use]
    pub const fn next_expected(&self) -> SeqId {
        self.next_expected
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub const fn stats(&self) -> SequencerStats {
        self.stats
    }

    /// Accept one decoded record and release whatever became contiguous
    pub fn admit(&mut self, message: Message) -> Admission {
        self.stats.received += 1;
        MESSAGES_RECEIVED.inc();

        let seq = message.seq();
        let admission = if seq < self.next_expected {
            self.stats.stale += 1;
            STALE_MESSAGES.inc();
            warn!(
                seq = %seq,
                next_expected = %self.next_expected,
                kind = %message.kind(),
                "Dropping record with already dispatched sequence number"
            );
            Admission::Stale
        } else if seq > self.next_expected {
            match self.pending.entry(seq) {
                Entry::Vacant(entry) => {
                    entry.insert(message);
                    trace!(
                        seq = %seq,
                        next_expected = %self.next_expected,
                        pending = self.pending.len(),
                        "Buffered out-of-order record"
                    );
                    Admission::Buffered
                }
                Entry::Occupied(_) => {
                    self.stats.duplicates += 1;
                    DUPLICATE_MESSAGES.inc();
                    warn!(seq = %seq, "Dropping record with sequence number already buffered");
                    Admission::Duplicate
                }
            }
        } else {
            self.release(&message);
            let mut released = 1;
            while let Some(next) = self.pending.remove(&self.next_expected) {
                self.release(&next);
                released += 1;
            }
            if released > 1 {
                debug!(
                    released,
                    next_expected = %self.next_expected,
                    pending = self.pending.len(),
                    "Released buffered records"
                );
            }
            Admission::Released(released)
        };

        self.sync_pending();
        admission
    }

    fn release(&mut self, message: &Message) {
        let delivered = self.dispatcher.dispatch(message);
        trace!(
            seq = %message.seq(),
            kind = %message.kind(),
            delivered,
            "Dispatched record"
        );
        self.next_expected = self.next_expected.next();
        self.stats.dispatched += 1;
        MESSAGES_DISPATCHED.inc();
    }

    fn sync_pending(&mut self) {
        self.stats.pending = self.pending.len();
        PENDING_MESSAGES.set(i64::try_from(self.pending.len()).unwrap_or(i64::MAX));
    }

    /// Feed every record from `source` through [`Self::admit`] until the
    /// source ends, fails, or `cancel` fires.
    ///
    /// Malformed records are counted and skipped.
    pub async fn drain<S>(&mut self, source: &mut S, cancel: &CancellationToken) -> SourceEnd
    where
        S: EventSource + ?Sized,
    {
        loop {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(next_expected = %self.next_expected, "Event source session cancelled");
                    return SourceEnd::Cancelled;
                }
                result = source.wait_message() => result,
            };

            match result {
                Ok(message) => {
                    self.admit(message);
                }
                Err(IngestError::Closed) => {
                    info!(
                        next_expected = %self.next_expected,
                        pending = self.pending.len(),
                        "Event source closed"
                    );
                    return SourceEnd::Closed;
                }
                Err(err) if err.is_terminal() => {
                    error!(error = %err, "Event source failed");
                    return SourceEnd::Failed(err);
                }
                Err(err) => {
                    self.stats.malformed += 1;
                    MALFORMED_MESSAGES.inc();
                    warn!(error = %err, "Skipping malformed record");
                }
            }
        }
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        // Held records die with the session
        if !self.pending.is_empty() {
            PENDING_MESSAGES.set(0);
        }
    }
}
