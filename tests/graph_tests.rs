#![allow(missing_docs)]

mod common;

use common::DumpBuilder;
use heapscope::format;
use heapscope::graph::{
    outgoing_edges, topological_order, Discovery, OutEdge, Provenance, ReferenceVia,
};
use heapscope::{FieldType, NodeId, RootKind, Snapshot};

/// Dump with every edge shape: a static field out of `Registry`, `next`
/// fields between two `Holder` instances, and an `Object[]` with a null gap.
fn edges_fixture() -> Vec<u8> {
    let mut b = DumpBuilder::new();
    b.string(1, "java.lang.Object")
        .string(2, "com.example.Holder")
        .string(3, "com.example.Registry")
        .string(4, "java.lang.Object[]")
        .string(10, "next")
        .string(11, "cache")
        .load_class(1, 0x100, 1)
        .load_class(2, 0x200, 2)
        .load_class(3, 0x250, 3)
        .load_class(4, 0x150, 4)
        .class_dump(0x100, 0, 0, &[], &[])
        .class_dump(0x200, 0x100, 8, &[], &[(10, FieldType::Object as u8)])
        .class_dump(0x250, 0x100, 0, &[(11, 0x300)], &[])
        .class_dump(0x150, 0x100, 0, &[], &[]);
    let first = b.refs(&[0x301]);
    let second = b.refs(&[0]);
    b.instance_dump(0x300, 0x200, 0, &first)
        .instance_dump(0x301, 0x200, 0, &second)
        .object_array_dump(0x400, 0x150, &[0x300, 0, 0x301])
        .root(format::SUB_ROOT_STICKY_CLASS, 0x250);
    b.build()
}

/// Dump with a linear chain `a -> b -> c` rooted at `a`, plus an
/// unreachable `d`.
fn chain_fixture() -> Vec<u8> {
    let mut b = DumpBuilder::new();
    b.string(1, "com.example.Node")
        .string(10, "next")
        .load_class(1, 0x100, 1)
        .class_dump(0x100, 0, 8, &[], &[(10, FieldType::Object as u8)]);
    let to_b = b.refs(&[0x301]);
    let to_c = b.refs(&[0x302]);
    let null_ref = b.refs(&[0]);
    b.instance_dump(0x300, 0x100, 0, &to_b)
        .instance_dump(0x301, 0x100, 0, &to_c)
        .instance_dump(0x302, 0x100, 0, &null_ref)
        .instance_dump(0x303, 0x100, 0, &null_ref)
        .root(format::SUB_ROOT_UNKNOWN, 0x300);
    b.build()
}

fn node(snapshot: &Snapshot, object_id: u64) -> NodeId {
    snapshot
        .node_id(object_id)
        .unwrap_or_else(|| panic!("no node for 0x{object_id:x}"))
}

// --- TESTS ---

/// Edge enumeration covers fields, statics, and array slots, skips nulls,
/// and reports each reference's declaring class.
#[test]
fn test_outgoing_edge_enumeration() -> heapscope::Result<()> {
    let snapshot = Snapshot::from_bytes(edges_fixture())?;
    let holder_class = snapshot.find_class("com.example.Holder").expect("Holder");
    let registry = snapshot.find_class("com.example.Registry").expect("Registry");
    let a = node(&snapshot, 0x300);
    let b = node(&snapshot, 0x301);
    let array = node(&snapshot, 0x400);

    assert_eq!(
        outgoing_edges(&snapshot, registry)?,
        vec![OutEdge {
            via: ReferenceVia::StaticField {
                name: "cache",
                declared_in: registry,
            },
            target: a,
        }]
    );

    assert_eq!(
        outgoing_edges(&snapshot, a)?,
        vec![OutEdge {
            via: ReferenceVia::Field {
                name: "next",
                declared_in: holder_class,
            },
            target: b,
        }]
    );

    // A null field produces no edge.
    assert!(outgoing_edges(&snapshot, b)?.is_empty());

    assert_eq!(
        outgoing_edges(&snapshot, array)?,
        vec![
            OutEdge {
                via: ReferenceVia::Element { index: 0 },
                target: a,
            },
            OutEdge {
                via: ReferenceVia::Element { index: 2 },
                target: b,
            },
        ]
    );
    Ok(())
}

/// Repeated enumeration is pure: same edges, same handles.
#[test]
fn test_edge_enumeration_is_idempotent() -> heapscope::Result<()> {
    let snapshot = Snapshot::from_bytes(edges_fixture())?;
    let a = node(&snapshot, 0x300);
    assert_eq!(outgoing_edges(&snapshot, a)?, outgoing_edges(&snapshot, a)?);
    assert_eq!(snapshot.node_id(0x300), snapshot.node_id(0x300));
    Ok(())
}

/// Discovery keeps the first provenance and rejects rediscovery.
#[test]
fn test_discovery_keeps_first_provenance() -> heapscope::Result<()> {
    let snapshot = Snapshot::from_bytes(chain_fixture())?;
    let a = node(&snapshot, 0x300);
    let b = node(&snapshot, 0x301);

    let mut discovery = Discovery::new(snapshot.node_count());
    assert!(!discovery.is_discovered(a));
    assert!(discovery.discover(a, Provenance::Root(RootKind::Unknown)));
    assert!(discovery.is_discovered(a));

    let late = Provenance::Edge {
        parent: b,
        via: ReferenceVia::Element { index: 0 },
    };
    assert!(!discovery.discover(a, late));
    assert!(matches!(
        discovery.provenance(a),
        Some(Provenance::Root(RootKind::Unknown))
    ));
    assert!(discovery.provenance(b).is_none());
    Ok(())
}

/// Ranks along a linear chain ascend from the root; unreachable nodes and
/// the rank-0 origin slot stay unassigned.
#[test]
fn test_topological_order_chain() -> heapscope::Result<()> {
    let snapshot = Snapshot::from_bytes(chain_fixture())?;
    let order = topological_order(&snapshot)?;

    let a = node(&snapshot, 0x300);
    let b = node(&snapshot, 0x301);
    let c = node(&snapshot, 0x302);
    let d = node(&snapshot, 0x303);

    assert_eq!(order.rank(a), Some(1));
    assert_eq!(order.rank(b), Some(2));
    assert_eq!(order.rank(c), Some(3));
    assert_eq!(order.rank(d), None);
    assert_eq!(order.ranked_count(), 3);

    // Rank 0 is reserved for the synthetic origin.
    for i in [a, b, c] {
        assert!(order.rank(i) > Some(heapscope::TopologicalOrder::SUPER_ROOT_RANK));
    }
    Ok(())
}

/// Every non-back edge satisfies `rank(holder) < rank(target)`, including
/// across a diamond where one node is shared by two paths.
#[test]
fn test_topological_order_diamond() -> heapscope::Result<()> {
    let mut builder = DumpBuilder::new();
    builder
        .string(1, "com.example.Pair")
        .string(10, "left")
        .string(11, "right")
        .load_class(1, 0x100, 1)
        .class_dump(
            0x100,
            0,
            16,
            &[],
            &[
                (10, FieldType::Object as u8),
                (11, FieldType::Object as u8),
            ],
        );
    let top = builder.refs(&[0x301, 0x302]);
    let left = builder.refs(&[0x303, 0]);
    let right = builder.refs(&[0x303, 0]);
    let bottom = builder.refs(&[0, 0]);
    builder
        .instance_dump(0x300, 0x100, 0, &top)
        .instance_dump(0x301, 0x100, 0, &left)
        .instance_dump(0x302, 0x100, 0, &right)
        .instance_dump(0x303, 0x100, 0, &bottom)
        .root(format::SUB_ROOT_UNKNOWN, 0x300);
    let snapshot = Snapshot::from_bytes(builder.build())?;
    let order = topological_order(&snapshot)?;

    assert_eq!(order.ranked_count(), 4);
    for object_id in [0x300u64, 0x301, 0x302, 0x303] {
        let holder = node(&snapshot, object_id);
        let holder_rank = order.rank(holder).expect("reachable");
        for edge in outgoing_edges(&snapshot, holder)? {
            let target_rank = order.rank(edge.target).expect("reachable");
            assert!(
                holder_rank < target_rank,
                "edge 0x{object_id:x}: {holder_rank} !< {target_rank}"
            );
        }
    }
    Ok(())
}

/// A reference cycle still terminates and ranks every reachable node once.
#[test]
fn test_topological_order_cycle_terminates() -> heapscope::Result<()> {
    let mut b = DumpBuilder::new();
    b.string(1, "com.example.Node")
        .string(10, "next")
        .load_class(1, 0x100, 1)
        .class_dump(0x100, 0, 8, &[], &[(10, FieldType::Object as u8)]);
    let to_b = b.refs(&[0x301]);
    let back_to_a = b.refs(&[0x300]);
    b.instance_dump(0x300, 0x100, 0, &to_b)
        .instance_dump(0x301, 0x100, 0, &back_to_a)
        .root(format::SUB_ROOT_UNKNOWN, 0x300);
    let snapshot = Snapshot::from_bytes(b.build())?;

    let order = topological_order(&snapshot)?;
    let a = node(&snapshot, 0x300);
    let b = node(&snapshot, 0x301);
    assert_eq!(order.rank(a), Some(1));
    assert_eq!(order.rank(b), Some(2));
    assert_eq!(order.ranked_count(), 2);
    Ok(())
}

/// A root whose id never appears in the dump is skipped, not fatal.
#[test]
fn test_dangling_root_skipped() -> heapscope::Result<()> {
    let mut b = DumpBuilder::new();
    b.string(1, "com.example.Node")
        .load_class(1, 0x100, 1)
        .class_dump(0x100, 0, 0, &[], &[]);
    b.instance_dump(0x300, 0x100, 0, &[])
        .root(format::SUB_ROOT_UNKNOWN, 0x9999)
        .root(format::SUB_ROOT_UNKNOWN, 0x300);
    let snapshot = Snapshot::from_bytes(b.build())?;

    let order = topological_order(&snapshot)?;
    assert_eq!(order.ranked_count(), 1);
    assert_eq!(order.rank(node(&snapshot, 0x300)), Some(1));
    Ok(())
}

/// Static-field edges participate in traversal from a sticky-class root.
#[test]
fn test_static_edges_rank_from_class_root() -> heapscope::Result<()> {
    let snapshot = Snapshot::from_bytes(edges_fixture())?;
    let order = topological_order(&snapshot)?;

    let registry = snapshot.find_class("com.example.Registry").expect("Registry");
    let a = node(&snapshot, 0x300);
    let b = node(&snapshot, 0x301);

    let registry_rank = order.rank(registry).expect("class ranked");
    let a_rank = order.rank(a).expect("holder ranked");
    let b_rank = order.rank(b).expect("holder ranked");
    assert!(registry_rank < a_rank);
    assert!(a_rank < b_rank);

    // The array is unreachable from the only root.
    assert_eq!(order.rank(node(&snapshot, 0x400)), None);
    Ok(())
}
