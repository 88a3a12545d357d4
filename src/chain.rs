//! Owned, renderable retaining chains.
//!
//! A [`LeakPath`] borrows names out of the snapshot it was found in; a
//! [`LeakChain`] copies everything it needs into owned labels, so reports
//! outlive the snapshot and serialize cleanly.

use std::fmt;

use serde::Serialize;

use crate::error::{HeapscopeError, Result};
use crate::format::RootKind;
use crate::graph::{NodeId, ReferenceVia};
use crate::search::LeakPath;
use crate::snapshot::Snapshot;

/// A labelled chain node: raw dump id plus display description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeLabel {
    /// Raw object id from the dump.
    pub object_id: u64,
    /// Display form, e.g. `com.example.Cache@0x12f`.
    pub description: String,
}

impl fmt::Display for NodeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// The reference one chain hop is held through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HeldVia {
    /// An instance field, by name.
    Field(String),
    /// A static field, by name.
    StaticField(String),
    /// An object-array slot, by index.
    Element(u32),
}

/// One hop of a rendered chain: holder, reference, held object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainEntry {
    /// The object holding the reference.
    pub holder: NodeLabel,
    /// The reference itself.
    pub reference: HeldVia,
    /// The object being held.
    pub object: NodeLabel,
}

/// A fully rendered retaining chain, self-contained and serializable.
#[derive(Debug, Clone, Serialize)]
pub struct LeakChain {
    /// Kind of the anchoring GC root.
    pub root_kind: RootKind,
    /// True when the root matched a class-wide exclusion.
    pub root_excluded: bool,
    /// The root object's label.
    pub root: NodeLabel,
    /// The hops from the root down to the leak.
    pub entries: Vec<ChainEntry>,
}

impl LeakChain {
    /// Renders `path` into an owned chain using `snapshot` for labels.
    pub fn build(snapshot: &Snapshot, path: &LeakPath<'_>) -> Result<Self> {
        let Some(&root_node) = path.nodes.first() else {
            return Err(HeapscopeError::Internal(
                "retaining path has no nodes".into(),
            ));
        };
        let label = |node: NodeId| NodeLabel {
            object_id: snapshot.node(node).object_id(),
            description: snapshot.describe(node),
        };
        let mut entries = Vec::with_capacity(path.vias.len());
        for (i, via) in path.vias.iter().enumerate() {
            let reference = match via {
                ReferenceVia::Field { name, .. } => HeldVia::Field((*name).to_string()),
                ReferenceVia::StaticField { name, .. } => HeldVia::StaticField((*name).to_string()),
                ReferenceVia::Element { index } => HeldVia::Element(*index),
            };
            entries.push(ChainEntry {
                holder: label(path.nodes[i]),
                reference,
                object: label(path.nodes[i + 1]),
            });
        }
        Ok(LeakChain {
            root_kind: path.root_kind,
            root_excluded: path.root_excluded,
            root: label(root_node),
            entries,
        })
    }

    /// Whether this chain indicts a real leak.
    ///
    /// A chain anchored at an excluded root is kept around for inspection
    /// but reports as not leaking.
    pub fn is_leak(&self) -> bool {
        !self.root_excluded
    }

    /// Number of hops from the root to the leak.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the leak is itself a GC root.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The leaking object's label.
    pub fn leak(&self) -> &NodeLabel {
        self.entries
            .last()
            .map(|entry| &entry.object)
            .unwrap_or(&self.root)
    }
}

impl fmt::Display for LeakChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GC ROOT ({}): {}", self.root_kind, self.root)?;
        if self.root_excluded {
            write!(f, " [excluded root]")?;
        }
        if self.entries.is_empty() {
            write!(f, " (leaking)")?;
        }
        writeln!(f)?;

        let last = self.entries.len().saturating_sub(1);
        for (i, entry) in self.entries.iter().enumerate() {
            let connector = if i == last { "└── " } else { "├── " };
            let reference = match &entry.reference {
                HeldVia::Field(name) => format!(".{name}"),
                HeldVia::StaticField(name) => format!(".{name} (static)"),
                HeldVia::Element(index) => format!("[{index}]"),
            };
            write!(
                f,
                "{connector}{}{} -> {}",
                entry.holder, reference, entry.object
            )?;
            if i == last {
                write!(f, " (leaking)")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
