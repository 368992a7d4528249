use std::fmt;

/// Identifier of a composite node inside one key's flattened subtree.
///
/// Ids are handed out by a counter that restarts at zero for every flatten call,
/// so the same id appears under many keys. Lookups must always be scoped to a key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(u32); // u32 is plenty for the composites of a single value.

impl LocalId {
    /// Creates a new LocalId.
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    /// Converts a stored column value. Negative or oversized ids are rejected.
    pub fn from_raw(raw: i64) -> Option<Self> {
        u32::try_from(raw).ok().map(Self)
    }

    /// Returns the raw numeric value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Debug for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalId({})", self.0)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
