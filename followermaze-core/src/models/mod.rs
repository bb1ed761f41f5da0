pub mod id;
pub mod message;

pub use id::{SeqId, UserId};
pub use message::{Message, MessageKind};
