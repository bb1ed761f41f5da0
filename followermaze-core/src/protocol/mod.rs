pub mod codec;
pub mod framing;

pub use codec::{build, decode, encode, DecodeError, DELIMITER, LINE_TERMINATOR};
pub use framing::{FrameError, MessageCodec, DEFAULT_MAX_LINE_LENGTH};
