use std::fmt;

/// A dense handle for one node of the decoded object graph.
/// Indexes the snapshot's arena directly, so per-analysis state can live in
/// flat arrays instead of hash sets keyed by raw object ids.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32); // u32 is sufficient for 4 billion heap objects per snapshot.

impl NodeId {
    /// Creates a new NodeId.
    /// Restricted to the crate so handles always come from a snapshot's arena.
    pub(crate) fn new(index: u32) -> Self {
        Self(index)
    }

    /// The arena slot this handle points at.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the raw numeric value.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
