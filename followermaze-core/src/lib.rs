pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod protocol;

pub use config::Config;
pub use error::{Error, Result};
pub use models::{Message, MessageKind, SeqId, UserId};
