use std::num::ParseIntError;
use std::str::FromStr;

/// User ID type (decimal identifier sent by clients during the handshake)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(pub u64);

impl UserId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for UserId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}

/// Sequence number assigned by the event source; defines the total order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqId(pub u64);

impl SeqId {
    /// First sequence number a fresh event source session expects
    pub const FIRST: Self = Self(1);

    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// The sequence number immediately after this one
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl Default for SeqId {
    fn default() -> Self {
        Self::FIRST
    }
}

impl std::fmt::Display for SeqId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SeqId {
    fn from(seq: u64) -> Self {
        Self(seq)
    }
}

impl FromStr for SeqId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_parse() {
        assert_eq!("42".parse::<UserId>().unwrap(), UserId(42));
        assert!("-1".parse::<UserId>().is_err());
        assert!("abc".parse::<UserId>().is_err());
    }

    #[test]
    fn test_seq_id_next() {
        assert_eq!(SeqId::default(), SeqId(1));
        assert_eq!(SeqId(7).next(), SeqId(8));
        assert_eq!(SeqId(u64::MAX).next(), SeqId(u64::MAX));
    }
}
