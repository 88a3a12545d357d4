//! Shortest retaining-path search.
//!
//! A breadth-first pass from the recorded GC roots finds a minimum-hop
//! retaining path to a target node while honoring a reference exclusion
//! policy. Roots seed the queue in record order and edges expand in
//! declaration order, so among equally short candidates the same path wins
//! on every run over the same dump.

use std::collections::VecDeque;

use tracing::debug;

use crate::error::{HeapscopeError, Result};
use crate::exclusions::{ExcludedRefs, ExclusionMode};
use crate::format::RootKind;
use crate::graph::{outgoing_edges, Discovery, NodeId, OutEdge, Provenance, ReferenceVia};
use crate::snapshot::Snapshot;

/// A retaining path from a GC root to the leak.
#[derive(Debug, Clone)]
pub struct LeakPath<'s> {
    /// Kind of the root anchoring the path.
    pub root_kind: RootKind,
    /// True when the root object itself matched a class-wide exclusion.
    pub root_excluded: bool,
    /// Path nodes, root first, leak last. Never empty.
    pub nodes: Vec<NodeId>,
    /// The reference taking each node to the next; one shorter than `nodes`.
    pub vias: Vec<ReferenceVia<'s>>,
}

/// Outcome of a retaining-path search.
#[derive(Debug, Clone)]
pub enum PathOutcome<'s> {
    /// A retaining path survived the exclusion policy.
    Found(LeakPath<'s>),
    /// Every path from the roots is pruned or absent.
    NotFound,
}

impl<'s> PathOutcome<'s> {
    /// The path, when one was found.
    pub fn found(&self) -> Option<&LeakPath<'s>> {
        match self {
            Self::Found(path) => Some(path),
            Self::NotFound => None,
        }
    }
}

/// Breadth-first retaining-path finder over one exclusion policy.
///
/// The finder carries no per-search state; one instance can serve any number
/// of searches over any number of snapshots.
#[derive(Debug, Clone, Default)]
pub struct PathFinder {
    excluded: ExcludedRefs,
}

impl PathFinder {
    /// A finder honoring `excluded`.
    pub fn new(excluded: ExcludedRefs) -> Self {
        Self { excluded }
    }

    /// A finder with [`ExcludedRefs::runtime_defaults`] applied.
    pub fn with_defaults() -> Self {
        Self::new(ExcludedRefs::runtime_defaults())
    }

    /// Finds a minimum-hop retaining path from any GC root to `leak`.
    ///
    /// Returns [`PathOutcome::NotFound`] when the node is unreachable or
    /// every path to it is pruned by the policy. A dangling reference met
    /// while expanding the frontier fails the search.
    pub fn find<'s>(&self, snapshot: &'s Snapshot, leak: NodeId) -> Result<PathOutcome<'s>> {
        let mut discovery = Discovery::new(snapshot.node_count());
        let mut queue = VecDeque::new();

        for root in snapshot.gc_roots() {
            let Some(node) = snapshot.node_id(root.object_id) else {
                debug!(
                    "root 0x{:x} not present in the dump; skipping",
                    root.object_id
                );
                continue;
            };
            if discovery.discover(node, Provenance::Root(root.kind)) {
                queue.push_back(node);
            }
        }

        while let Some(node) = queue.pop_front() {
            if node == leak {
                let path = self.reconstruct(snapshot, &discovery, leak)?;
                debug!(
                    hops = path.vias.len(),
                    root_kind = %path.root_kind,
                    excluded_root = path.root_excluded,
                    "retaining path found"
                );
                return Ok(PathOutcome::Found(path));
            }
            for edge in outgoing_edges(snapshot, node)? {
                if discovery.is_discovered(edge.target) {
                    continue;
                }
                if self.is_excluded(snapshot, node, &edge, leak) {
                    continue;
                }
                if discovery.discover(
                    edge.target,
                    Provenance::Edge {
                        parent: node,
                        via: edge.via,
                    },
                ) {
                    queue.push_back(edge.target);
                }
            }
        }

        debug!("no retaining path to {leak} survived the exclusion policy");
        Ok(PathOutcome::NotFound)
    }

    /// Whether the policy prunes `edge` out of `holder`.
    ///
    /// Field rules are consulted against the holder's whole class chain
    /// first, most-derived class first, then class-wide rules over the same
    /// chain. An `UnlessLeaking` match keeps the edge alive when it lands
    /// directly on the leak.
    fn is_excluded(
        &self,
        snapshot: &Snapshot,
        holder: NodeId,
        edge: &OutEdge<'_>,
        leak: NodeId,
    ) -> bool {
        let field = match edge.via {
            ReferenceVia::Field { name, .. } | ReferenceVia::StaticField { name, .. } => Some(name),
            ReferenceVia::Element { .. } => None,
        };
        let mode = self.edge_rule(snapshot, holder, field);
        match mode {
            Some(ExclusionMode::Always) => true,
            Some(ExclusionMode::UnlessLeaking) => edge.target != leak,
            None => false,
        }
    }

    fn edge_rule(
        &self,
        snapshot: &Snapshot,
        holder: NodeId,
        field: Option<&str>,
    ) -> Option<ExclusionMode> {
        if let Some(field) = field {
            for cls in snapshot.class_chain(holder) {
                if let Some(name) = snapshot.class_name(cls) {
                    if let Some(mode) = self.excluded.field_rule(name, field) {
                        return Some(mode);
                    }
                }
            }
        }
        self.class_rule_for(snapshot, holder)
    }

    fn class_rule_for(&self, snapshot: &Snapshot, node: NodeId) -> Option<ExclusionMode> {
        for cls in snapshot.class_chain(node) {
            if let Some(name) = snapshot.class_name(cls) {
                if let Some(mode) = self.excluded.class_rule(name) {
                    return Some(mode);
                }
            }
        }
        None
    }

    /// Walks provenance backwards from the leak and flips it into a
    /// root-first path.
    fn reconstruct<'s>(
        &self,
        snapshot: &Snapshot,
        discovery: &Discovery<'s>,
        leak: NodeId,
    ) -> Result<LeakPath<'s>> {
        let mut nodes = vec![leak];
        let mut vias = Vec::new();
        let mut current = leak;
        let root_kind = loop {
            match discovery.provenance(current) {
                Some(Provenance::Root(kind)) => break *kind,
                Some(Provenance::Edge { parent, via }) => {
                    vias.push(*via);
                    nodes.push(*parent);
                    current = *parent;
                }
                None => {
                    return Err(HeapscopeError::Internal(
                        "path reconstruction reached a node with no recorded provenance".into(),
                    ));
                }
            }
        };
        nodes.reverse();
        vias.reverse();

        // The root stays on the path even when excluded; consumers decide
        // whether an excluded-root chain counts as a leak.
        let root = nodes[0];
        let root_excluded = match self.class_rule_for(snapshot, root) {
            Some(ExclusionMode::Always) => true,
            Some(ExclusionMode::UnlessLeaking) => root != leak,
            None => false,
        };

        Ok(LeakPath {
            root_kind,
            root_excluded,
            nodes,
            vias,
        })
    }
}
