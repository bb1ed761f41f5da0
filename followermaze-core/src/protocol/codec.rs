//! Text wire format for activity events
//!
//! A record is `<seq>|<tag>[|<arg>...]` terminated by CRLF, e.g.
//! `666|F|60|50\r\n`. Inbound records terminated by a bare LF are accepted;
//! outbound records always end in CRLF.

use std::str::FromStr;
use thiserror::Error;

use crate::models::{Message, MessageKind, SeqId, UserId};

/// Field separator
pub const DELIMITER: char = '|';

/// Record terminator written on every encoded message
pub const LINE_TERMINATOR: &str = "\r\n";

/// Reasons a record fails to decode
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Malformed message: expected at least 2 fields, found {found}")]
    MissingFields { found: usize },

    #[error("Malformed message: invalid sequence number {0:?}")]
    InvalidSequence(String),

    #[error("Malformed message: unknown message kind {0:?}")]
    UnknownKind(String),

    #[error("Malformed message: invalid user id {0:?}")]
    InvalidUserId(String),

    #[error("Malformed message: {kind} takes {expected} argument(s), found {found}")]
    ArityMismatch {
        kind: MessageKind,
        expected: usize,
        found: usize,
    },

    #[error("Malformed message: record is not valid UTF-8")]
    InvalidEncoding,

    #[error("Malformed message: record exceeds {max} bytes")]
    TooLong { max: usize },
}

/// Decode one record. A trailing line terminator is ignored.
pub fn decode(line: &str) -> Result<Message, DecodeError> {
    let line = strip_terminator(line);
    let fields: Vec<&str> = line.split(DELIMITER).collect();
    if fields.len() < 2 {
        return Err(DecodeError::MissingFields { found: fields.len() });
    }

    let seq = fields[0]
        .parse::<SeqId>()
        .map_err(|_| DecodeError::InvalidSequence(fields[0].to_string()))?;

    let kind = MessageKind::from_tag(fields[1])
        .ok_or_else(|| DecodeError::UnknownKind(fields[1].to_string()))?;

    let args = fields[2..]
        .iter()
        .map(|arg| {
            arg.parse::<UserId>()
                .map_err(|_| DecodeError::InvalidUserId((*arg).to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    build(seq, kind, &args)
}

/// Assemble a message from its parts, checking the arity for `kind`
pub fn build(seq: SeqId, kind: MessageKind, args: &[UserId]) -> Result<Message, DecodeError> {
    let message = match (kind, args) {
        (MessageKind::Follow, &[from, to]) => Message::Follow { seq, from, to },
        (MessageKind::Unfollow, &[from, to]) => Message::Unfollow { seq, from, to },
        (MessageKind::PrivateMessage, &[from, to]) => Message::PrivateMessage { seq, from, to },
        (MessageKind::StatusUpdate, &[from]) => Message::StatusUpdate { seq, from },
        (MessageKind::Broadcast, &[]) => Message::Broadcast { seq },
        _ => {
            return Err(DecodeError::ArityMismatch {
                kind,
                expected: kind.arity(),
                found: args.len(),
            })
        }
    };
    Ok(message)
}

/// Encode a message as one CRLF-terminated record
#[must_use]
pub fn encode(message: &Message) -> String {
    let mut line = format!("{}{}{}", message.seq(), DELIMITER, message.kind().tag());
    for arg in message.args() {
        line.push(DELIMITER);
        line.push_str(&arg.to_string());
    }
    line.push_str(LINE_TERMINATOR);
    line
}

fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

impl FromStr for Message {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode(s)
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(strip_terminator(&encode(self)))
    }
}
