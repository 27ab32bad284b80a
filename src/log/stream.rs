//! Stream identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hasher;
use twox_hash::XxHash64;
use uuid::Uuid;

/// A 128-bit identifier naming one logical sub-sequence of the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(Uuid);

impl StreamId {
    /// Create a new random stream id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Build a stream id from raw big-endian bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Derive a stable stream id from a human-readable name.
    ///
    /// Two callers naming the same stream get the same id, which is how
    /// objects opened by name on different clients find each other.
    pub fn from_name(name: &str) -> Self {
        let hash = |seed: u64| {
            let mut hasher = XxHash64::with_seed(seed);
            hasher.write(name.as_bytes());
            hasher.finish()
        };
        Self(Uuid::from_u64_pair(hash(0), hash(1)))
    }

    /// Parse from the canonical hyphenated form.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// The underlying UUID.
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for StreamId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
