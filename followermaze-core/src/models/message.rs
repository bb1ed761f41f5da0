use super::id::{SeqId, UserId};

/// Kind of an activity event, with its single-character wire tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Follow,
    Unfollow,
    Broadcast,
    PrivateMessage,
    StatusUpdate,
}

impl MessageKind {
    pub const ALL: [Self; 5] = [
        Self::Follow,
        Self::Unfollow,
        Self::Broadcast,
        Self::PrivateMessage,
        Self::StatusUpdate,
    ];

    /// Wire tag for this kind
    #[must_use]
    pub const fn tag(self) -> char {
        match self {
            Self::Follow => 'F',
            Self::Unfollow => 'U',
            Self::Broadcast => 'B',
            Self::PrivateMessage => 'P',
            Self::StatusUpdate => 'S',
        }
    }

    /// Look up a kind by its wire tag
    #[must_use]
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "F" => Some(Self::Follow),
            "U" => Some(Self::Unfollow),
            "B" => Some(Self::Broadcast),
            "P" => Some(Self::PrivateMessage),
            "S" => Some(Self::StatusUpdate),
            _ => None,
        }
    }

    /// Number of user-id arguments carried by this kind
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::Broadcast => 0,
            Self::StatusUpdate => 1,
            Self::Follow | Self::Unfollow | Self::PrivateMessage => 2,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Follow => "follow",
            Self::Unfollow => "unfollow",
            Self::Broadcast => "broadcast",
            Self::PrivateMessage => "private_message",
            Self::StatusUpdate => "status_update",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single activity event from the event source.
///
/// The payload shape is fixed by the variant, so a message can never carry
/// the wrong number of user ids for its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// `from` starts following `to`
    Follow { seq: SeqId, from: UserId, to: UserId },

    /// `from` stops following `to`
    Unfollow { seq: SeqId, from: UserId, to: UserId },

    /// Sent to every connected client
    Broadcast { seq: SeqId },

    /// Sent from `from` to `to` only
    PrivateMessage { seq: SeqId, from: UserId, to: UserId },

    /// Sent to every current follower of `from`
    StatusUpdate { seq: SeqId, from: UserId },
}

impl Message {
    #[must_use]
    pub const fn seq(&self) -> SeqId {
        match self {
            Self::Follow { seq, .. }
            | Self::Unfollow { seq, .. }
            | Self::Broadcast { seq }
            | Self::PrivateMessage { seq, .. }
            | Self::StatusUpdate { seq, .. } => *seq,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::Follow { .. } => MessageKind::Follow,
            Self::Unfollow { .. } => MessageKind::Unfollow,
            Self::Broadcast { .. } => MessageKind::Broadcast,
            Self::PrivateMessage { .. } => MessageKind::PrivateMessage,
            Self::StatusUpdate { .. } => MessageKind::StatusUpdate,
        }
    }

    #[must_use]
    pub const fn from_user(&self) -> Option<UserId> {
        match self {
            Self::Follow { from, .. }
            | Self::Unfollow { from, .. }
            | Self::PrivateMessage { from, .. }
            | Self::StatusUpdate { from, .. } => Some(*from),
            Self::Broadcast { .. } => None,
        }
    }

    #[must_use]
    pub const fn to_user(&self) -> Option<UserId> {
        match self {
            Self::Follow { to, .. } | Self::Unfollow { to, .. } | Self::PrivateMessage { to, .. } => {
                Some(*to)
            }
            Self::Broadcast { .. } | Self::StatusUpdate { .. } => None,
        }
    }

    /// User-id arguments in wire order (`from` first, then `to`)
    #[must_use]
    pub fn args(&self) -> Vec<UserId> {
        self.from_user().into_iter().chain(self.to_user()).collect()
    }
}
