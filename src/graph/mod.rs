//! The object reference graph.
//!
//! Nodes live in the snapshot's arena and are addressed by [`NodeId`]
//! handles. This module layers traversal on top of the arena: on-demand
//! edge enumeration in [`walk`] and a deterministic topological ranking of
//! the reachable graph in [`order`].

/// Defines the `NodeId` handle type.
mod id;
/// Topological ranking of the reachable graph.
pub mod order;
/// Edge enumeration and discovery bookkeeping.
pub mod walk;

pub use id::NodeId;
pub use order::{topological_order, TopologicalOrder};
pub use walk::{outgoing_edges, Discovery, OutEdge, Provenance, ReferenceVia};
