//! Centralized error handling for Heapscope.
//!
//! This module provides an error handling system that strictly avoids panics,
//! ensuring that every failure condition is propagated through the `Result` type.
//!
//! ## Design Philosophy
//!
//! 1. **No Panics:** All error conditions are represented as `Result` values. The library
//!    enforces this through `#![deny(clippy::panic)]` and `#![deny(clippy::unwrap_used)]`.
//!
//! 2. **No Partial Snapshots:** Any corruption detected while decoding aborts the whole
//!    decode; a half-built class table would make every downstream lookup unsound.
//!
//! 3. **Failure Domains Stay Separate:** File corruption ([`HeapscopeError::Format`]),
//!    query-time lookup misses ([`HeapscopeError::FieldNotFound`]) and analysis-time
//!    graph inconsistencies ([`HeapscopeError::DanglingReference`]) are distinct
//!    variants, because callers react to them differently.
//!
//! 4. **Cloneable Errors:** [`HeapscopeError`] is `Clone`, allowing errors to be shared
//!    across threads or stored for later inspection. I/O errors are wrapped in `Arc`
//!    to keep cloning cheap.
//!
//! ## Usage Patterns
//!
//! ### Basic Error Handling
//!
//! ```rust
//! use heapscope::{HeapscopeError, Snapshot};
//!
//! match Snapshot::from_bytes(vec![0u8; 4]) {
//!     Err(HeapscopeError::Format(msg)) => println!("rejected dump: {msg}"),
//!     Err(e) => println!("other error: {e}"),
//!     Ok(_) => println!("decoded"),
//! }
//! ```
//!
//! ### Error Propagation with `?`
//!
//! ```rust
//! use heapscope::Snapshot;
//!
//! fn open_snapshot(bytes: Vec<u8>) -> heapscope::Result<Snapshot> {
//!     let snapshot = Snapshot::from_bytes(bytes)?;
//!     Ok(snapshot)
//! }
//! # assert!(open_snapshot(vec![]).is_err());
//! ```

use std::fmt;
use std::io;
use std::sync::Arc;

/// A specialized `Result` type for Heapscope operations.
///
/// Equivalent to `std::result::Result<T, HeapscopeError>` and used throughout
/// the library.
///
/// ## Examples
///
/// ```rust
/// use heapscope::Result;
///
/// fn hop_count() -> Result<usize> {
///     Ok(3)
/// }
/// ```
pub type Result<T> = std::result::Result<T, HeapscopeError>;

/// The master error enum covering all failure domains in Heapscope.
///
/// ## Variants
///
/// - **Io:** Low-level I/O failures while opening or mapping a dump file
/// - **Format:** The dump is truncated, corrupt, or structurally invalid
/// - **FieldNotFound:** A by-name field lookup missed the class's inherited chain
/// - **DanglingReference:** A reference id resolved to no object during analysis
/// - **Internal:** Logic errors in the library (should not occur in production)
///
/// `Format` is always fatal for the decode that produced it: no partial snapshot
/// is ever returned. `FieldNotFound` and `DanglingReference` are local to the
/// query or analysis that raised them; the snapshot itself remains usable.
#[derive(Debug, Clone)]
pub enum HeapscopeError {
    /// Low-level I/O failure (file not found, permissions, mapping failure, etc.).
    ///
    /// The underlying `io::Error` is wrapped in an `Arc` to make the error `Clone`.
    Io(Arc<io::Error>),

    /// The dump does not conform to the heap-dump binary format.
    ///
    /// Raised for a missing or malformed header, an unsupported reference-id
    /// width, a truncated or overrunning record, an unknown heap sub-record
    /// tag, an instance referencing an unknown class id, or a superclass
    /// chain that never terminates. The string describes the violation.
    Format(String),

    /// A by-name field lookup found no such field on the class or any ancestor.
    ///
    /// This is a usage error local to the query, not dump corruption.
    FieldNotFound {
        /// Display name of the class the lookup started from.
        class: String,
        /// The field name that was requested.
        field: String,
    },

    /// A reference id encountered mid-analysis resolved to no object in the dump.
    ///
    /// This indicates the dump is internally inconsistent. It is deliberately
    /// distinct from the benign "no leak path found" outcome: callers should
    /// surface it, never fold it into "no leak".
    DanglingReference(u64),

    /// Logic error in the analysis engine itself.
    ///
    /// This should not occur in production. If you encounter it, please report
    /// it with a minimal reproduction case.
    Internal(String),
}

impl fmt::Display for HeapscopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O Error: {e}"),
            Self::Format(s) => write!(f, "Format Error: {s}"),
            Self::FieldNotFound { class, field } => {
                write!(f, "Field Lookup Error: no field `{field}` on {class} or its ancestors")
            }
            Self::DanglingReference(id) => {
                write!(f, "Analysis Error: reference to unknown object id 0x{id:x}")
            }
            Self::Internal(s) => write!(f, "Internal Logic Error: {s}"),
        }
    }
}

impl std::error::Error for HeapscopeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for HeapscopeError {
    fn from(err: io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}
