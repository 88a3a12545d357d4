//! Edge enumeration and first-discovery bookkeeping.
//!
//! [`outgoing_edges`] materializes one node's references on demand; nothing
//! here caches, so traversals decide their own memory footprint. The edge
//! order is deterministic: declared field order (own class first, then
//! ancestors), static fields in declaration order, array slots by index.

use crate::error::{HeapscopeError, Result};
use crate::format::RootKind;
use crate::graph::NodeId;
use crate::snapshot::{ArrayView, HeapObject, Snapshot};

/// How one object refers to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceVia<'s> {
    /// Through a named instance field.
    Field {
        /// Field name.
        name: &'s str,
        /// Class node declaring the field.
        declared_in: NodeId,
    },
    /// Through a named static field of a class.
    StaticField {
        /// Field name.
        name: &'s str,
        /// Class node declaring the field.
        declared_in: NodeId,
    },
    /// Through an object-array slot.
    Element {
        /// Zero-based slot index.
        index: u32,
    },
}

/// One outgoing reference edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutEdge<'s> {
    /// The reference forming the edge.
    pub via: ReferenceVia<'s>,
    /// The referenced node.
    pub target: NodeId,
}

/// Why a node was first discovered during a traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance<'s> {
    /// Seeded directly from a GC root of this kind.
    Root(RootKind),
    /// Reached over an edge from an earlier node.
    Edge {
        /// The holder the edge left from.
        parent: NodeId,
        /// The reference forming the edge.
        via: ReferenceVia<'s>,
    },
}

/// Materializes the outgoing reference edges of `node`.
///
/// Null references are dropped. A non-null reference to an id the dump never
/// defined fails with [`HeapscopeError::DanglingReference`].
pub fn outgoing_edges<'s>(snapshot: &'s Snapshot, node: NodeId) -> Result<Vec<OutEdge<'s>>> {
    let mut edges = Vec::new();
    match snapshot.node(node) {
        HeapObject::Class(def) => {
            for field in &def.static_fields {
                if let Some(target_id) = field.value.reference() {
                    let target = snapshot
                        .node_id(target_id)
                        .ok_or(HeapscopeError::DanglingReference(target_id))?;
                    edges.push(OutEdge {
                        via: ReferenceVia::StaticField {
                            name: snapshot.string(field.name_id).unwrap_or("<unknown>"),
                            declared_in: node,
                        },
                        target,
                    });
                }
            }
        }
        HeapObject::Instance(instance) => {
            let instance = *instance;
            for field in snapshot.fields(&instance)? {
                if let Some(target_id) = field.value.reference() {
                    let target = snapshot
                        .node_id(target_id)
                        .ok_or(HeapscopeError::DanglingReference(target_id))?;
                    edges.push(OutEdge {
                        via: ReferenceVia::Field {
                            name: field.name,
                            declared_in: field.declared_in,
                        },
                        target,
                    });
                }
            }
        }
        HeapObject::Array(array) => {
            let array = *array;
            if let ArrayView::Objects(ids) = snapshot.elements(&array)? {
                for (index, id) in ids.into_iter().enumerate() {
                    if id == 0 {
                        continue;
                    }
                    let target = snapshot
                        .node_id(id)
                        .ok_or(HeapscopeError::DanglingReference(id))?;
                    edges.push(OutEdge {
                        via: ReferenceVia::Element {
                            index: index as u32,
                        },
                        target,
                    });
                }
            }
        }
    }
    Ok(edges)
}

/// First-discovery state for a breadth-first pass.
///
/// Each node records at most one provenance, taken at the moment it is first
/// reached, so walking provenance backwards from any discovered node yields
/// exactly one chain back to a root.
#[derive(Debug)]
pub struct Discovery<'s> {
    discovered: Vec<bool>,
    provenance: Vec<Option<Provenance<'s>>>,
}

impl<'s> Discovery<'s> {
    /// Fresh state for a graph of `node_count` nodes, all undiscovered.
    pub fn new(node_count: usize) -> Self {
        Self {
            discovered: vec![false; node_count],
            provenance: vec![None; node_count],
        }
    }

    /// Marks `node` discovered through `provenance`.
    ///
    /// Returns true on first discovery. Later calls leave the recorded
    /// provenance untouched and return false.
    pub fn discover(&mut self, node: NodeId, provenance: Provenance<'s>) -> bool {
        if self.discovered[node.index()] {
            return false;
        }
        self.discovered[node.index()] = true;
        self.provenance[node.index()] = Some(provenance);
        true
    }

    /// Whether `node` has been discovered.
    pub fn is_discovered(&self, node: NodeId) -> bool {
        self.discovered[node.index()]
    }

    /// The provenance recorded at first discovery, if any.
    pub fn provenance(&self, node: NodeId) -> Option<&Provenance<'s>> {
        self.provenance[node.index()].as_ref()
    }
}
