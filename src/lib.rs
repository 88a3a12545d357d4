//! # Heapscope
//!
//! A heap-dump analysis engine that decodes binary dump files into a
//! queryable object graph and finds the retaining paths that keep leaked
//! objects alive.
//!
//! ## Overview
//!
//! Heapscope never loads a heap into memory to analyze it. The dump file is
//! memory-mapped and decoded in a single forward pass that keeps only
//! metadata: class definitions, strings, stack traces, GC roots, and a
//! skeleton per object that remembers where its payload lives. Everything
//! else is materialized lazily at query time. This architectural split keeps
//! a multi-gigabyte dump analyzable in a fraction of its size:
//!
//! ### Key Features
//!
//! *   **Single-Pass Decoding:** One forward scan builds the entire graph
//!     index. Truncated or malformed input fails the decode; there is no
//!     such thing as a partial snapshot.
//! *   **Lazy Materialization:** Instance fields and array elements are
//!     decoded on demand, straight out of the mapped file, and never cached.
//!     Repeated reads are pure.
//! *   **Zero-Copy Primitive Access:** Primitive array payloads are exposed
//!     as typed views over the mapped bytes without copying.
//! *   **Deterministic Leak Search:** A breadth-first pass from the GC roots
//!     finds a minimum-hop retaining path, and the same dump always yields
//!     the same path.
//! *   **Exclusion Policies:** Weak-reference and finalizer edges the
//!     runtime clears on its own are pruned by a configurable,
//!     serializable rule set.
//! *   **Topological Ranking:** The reachable graph can be ranked in
//!     reverse postorder, ready for dominator-style retained-size work.
//! *   **Owned Reports:** Retaining chains render into self-contained,
//!     serializable values that outlive the snapshot.
//!
//! ## Architecture
//!
//! ### The Snapshot Model
//!
//! Decoding splits every dump into two tiers:
//! - Full metadata: strings, class definitions with their field layouts,
//!   stack frames and traces, and the GC root list
//! - Skeletons: one compact record per instance or array holding its class,
//!   its allocation trace serial, and the offset and size of its payload
//!
//! Queries that need payload bytes open a cursor over the mapped file at the
//! recorded offset and decode just that object. The snapshot itself is
//! immutable after decoding, so any number of analyses can share it.
//!
//! ### File Format
//!
//! The physical layout is a header followed by tagged records:
//!
//! ```text
//! [Version String] [Id Size: u32] [Timestamp: u64] [Record] [Record] ...
//! ```
//!
//! Each record is self-describing:
//!
//! ```text
//! [Tag: u8] [Ticks: u32] [Length: u32] [Payload]
//! ```
//!
//! Heap-dump records hold a stream of sub-records that carry no individual
//! length, which is why an unknown sub-record tag is fatal while an unknown
//! top-level record is simply skipped.
//!
//! ## Core Concepts
//!
//! ### `Snapshot`
//!
//! The [`Snapshot`] is the central structure: an arena of graph nodes
//! addressed by [`NodeId`] handles, plus every lookup table the queries
//! need. It owns the mapped file and hands out borrowed views into it.
//!
//! ### `PathFinder`
//!
//! The [`PathFinder`] runs the breadth-first leak search. It holds only the
//! exclusion policy, so one finder serves any number of searches over any
//! number of snapshots.
//!
//! ### `ExcludedRefs`
//!
//! The [`ExcludedRefs`] policy names references that must not count as
//! retaining edges, per field or per class.
//! [`ExcludedRefs::runtime_defaults`] mirrors what a tracing collector
//! clears on its own, which restricts the search to strong edges.
//!
//! ### `LeakChain`
//!
//! The [`LeakChain`] is the rendered result: an owned root-to-leak chain
//! with display labels, ready to print or serialize.
//!
//! ## Usage Patterns
//!
//! ### Finding a Retaining Chain
//!
//! ```rust,ignore
//! use heapscope::{LeakChain, PathFinder, Snapshot};
//!
//! let snapshot = Snapshot::open("app.hprof")?;
//! let suspect = snapshot
//!     .find_class("com.example.MainActivity")
//!     .expect("class not present in dump");
//!
//! let finder = PathFinder::with_defaults();
//! for instance in snapshot.instances_of(suspect) {
//!     if let Some(path) = finder.find(&snapshot, instance)?.found() {
//!         let chain = LeakChain::build(&snapshot, path)?;
//!         if chain.is_leak() {
//!             println!("{chain}");
//!         }
//!     }
//! }
//! ```
//!
//! ### Heap Statistics
//!
//! ```rust,ignore
//! let snapshot = Snapshot::from_bytes(bytes)?;
//! let stats = snapshot.stats();
//! println!("{} instances across {} classes", stats.instances, stats.classes);
//!
//! for entry in snapshot.class_histogram().iter().take(20) {
//!     println!("{:>12}  {:>8}  {}", entry.shallow_bytes, entry.instances, entry.name);
//! }
//! ```
//!
//! ## Performance Considerations
//!
//! - **Decode Time:** Proportional to dump size, one sequential pass
//! - **Memory Usage:** Metadata only; payloads stay in the mapped file
//! - **Search Time:** Bounded by the reachable graph, not the dump size
//! - **Determinism:** No hashing order or thread scheduling leaks into
//!   results
//!
//! ### Safety and Error Handling
//!
//! * **Encapsulated Unsafe:** `unsafe` appears exactly once, at the
//!   memory-map call in the `source` module.
//! * **No Panics:** No `unwrap()` or `panic!()` in the library (enforced by
//!   clippy lints). Arena access documents its single invariant.
//! * **Comprehensive Errors:** All failures surface as a
//!   [`HeapscopeError`], including dangling references met mid-search.
//! * **Strict Input Handling:** Every read is bounds-checked against the
//!   mapped file; a lying record length is an error, never an overrun.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod chain;
pub mod error;
pub mod exclusions;
pub mod format;
pub mod graph;
pub mod search;
pub mod snapshot;
pub mod source;

// Private modules
mod decoder;

// --- RE-EXPORTS ---

pub use chain::LeakChain;
pub use error::{HeapscopeError, Result};
pub use exclusions::{ExcludedRefs, ExclusionMode};
pub use format::{FieldType, IdSize, RootKind};
pub use graph::{topological_order, NodeId, TopologicalOrder};
pub use search::{PathFinder, PathOutcome};
pub use snapshot::Snapshot;
