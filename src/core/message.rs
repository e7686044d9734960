//! Message entries exchanged between peers and handlers.

use bytes::Bytes;
use std::fmt;

/// Identifier used to route an entry to its handler chain
pub type MessageId = u32;

/// One logical message: a routing id plus uninterpreted payload bytes.
///
/// Entries are values; cloning is cheap because `Bytes` is reference counted,
/// and nothing mutates an entry after construction.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Entry {
    pub id: MessageId,
    pub data: Bytes,
}

impl Entry {
    pub fn new(id: MessageId, data: impl Into<Bytes>) -> Self {
        Self {
            id,
            data: data.into(),
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entry")
            .field("id", &self.id)
            .field("len", &self.data.len())
            .finish()
    }
}
