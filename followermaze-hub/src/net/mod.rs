//! TCP front ends for clients and the event source

pub mod client;
pub mod source;

pub use client::ClientServer;
pub use source::EventSourceServer;
