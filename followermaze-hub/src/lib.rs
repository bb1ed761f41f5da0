//! Resequencing and fan-out of follower events
//!
//! The [`MessageHub`] owns the follower graph and the client registry. An
//! event source session feeds a [`Sequencer`], which releases records in
//! sequence order to the [`Dispatcher`].

pub mod client_registry;
pub mod dispatcher;
pub mod follower_graph;
pub mod hub;
pub mod net;
pub mod sequencer;
pub mod sink;
pub mod source;

pub use client_registry::ClientRegistry;
pub use dispatcher::Dispatcher;
pub use follower_graph::FollowerGraph;
pub use hub::{MessageHub, SourceHandle};
pub use net::{ClientServer, EventSourceServer};
pub use sequencer::{Admission, Sequencer, SequencerStats, SourceEnd};
pub use sink::{ChannelSink, ClientSink, Line, SinkError};
pub use source::{ChannelSource, EventSource, IngestError, LineSource};
