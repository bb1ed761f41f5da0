//! `tokio-util` codec for streams of event records
//!
//! Frames are split on `\n` in the raw bytes, with an optional `\r` before
//! it. Each frame decodes to a `Result<Message, DecodeError>`, so a record
//! that is malformed, not UTF-8 or over-long is an item and the stream
//! carries on with the next line. Only I/O failures end the stream.

use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

use super::codec::{decode, encode, DecodeError};
use crate::models::Message;

/// Default upper bound on a single record, in bytes
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

/// Stream-level failures; the stream cannot continue after one of these
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised by line readers that cannot skip an over-long line
    #[error("Line exceeds {max} bytes")]
    LineTooLong { max: usize },
}

/// Line-oriented codec producing decoded messages
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_length: usize,
    // Offset already scanned for `\n` in the current frame
    next_index: usize,
    // Inside an over-long line that has been reported but not yet skipped
    discarding: bool,
}

impl MessageCodec {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    #[must_use]
    pub const fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }

    #[must_use]
    pub const fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_frame(frame: &[u8]) -> Result<Message, DecodeError> {
    let frame = frame.strip_suffix(b"\r").unwrap_or(frame);
    match std::str::from_utf8(frame) {
        Ok(line) => decode(line),
        Err(_) => Err(DecodeError::InvalidEncoding),
    }
}

impl Decoder for MessageCodec {
    type Item = Result<Message, DecodeError>;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let read_to = src.len().min(self.max_length.saturating_add(1));
            let newline = src[self.next_index..read_to]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.next_index + offset);

            match (self.discarding, newline) {
                (true, Some(end)) => {
                    src.advance(end + 1);
                    self.discarding = false;
                    self.next_index = 0;
                }
                (true, None) => {
                    src.advance(read_to);
                    self.next_index = 0;
                    if src.is_empty() {
                        return Ok(None);
                    }
                }
                (false, Some(end)) => {
                    self.next_index = 0;
                    let frame = src.split_to(end + 1);
                    return Ok(Some(decode_frame(&frame[..end])));
                }
                (false, None) if src.len() > self.max_length => {
                    self.discarding = true;
                    return Ok(Some(Err(DecodeError::TooLong { max: self.max_length })));
                }
                (false, None) => {
                    self.next_index = read_to;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(src)? {
            return Ok(Some(item));
        }
        self.next_index = 0;
        if self.discarding {
            self.discarding = false;
            src.clear();
            return Ok(None);
        }
        let frame = src.split();
        match frame.strip_suffix(b"\r").unwrap_or(&frame) {
            // A bare terminator at EOF is not a record
            [] => Ok(None),
            rest => Ok(Some(decode_frame(rest))),
        }
    }
}

impl Encoder<&Message> for MessageCodec {
    type Error = FrameError;

    fn encode(&mut self, item: &Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let line = encode(item);
        dst.reserve(line.len());
        dst.put_slice(line.as_bytes());
        Ok(())
    }
}
