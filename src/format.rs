//! Defines the binary layout of managed-runtime heap dumps.
//!
//! # Dump Layout
//! A dump is a header followed by a flat stream of tagged records:
//!
//! File: `[Header] [Record 0] [Record 1] ... [Record N]`
//!
//! ## Header
//! `[version string, NUL-terminated] [u32 reference-id width] [u64 timestamp ms]`
//!
//! The version string begins with `JAVA PROFILE`. The id width declares the
//! byte size of every object-reference field in the stream (4 or 8); it is a
//! property of the capturing runtime, never a constant of this decoder.
//!
//! ## Record Anatomy
//! `[u8 tag] [u32 relative timestamp] [u32 payload length] [payload]`
//!
//! Heap-dump records (tags 0x0C / 0x1C) contain a run of sub-records, each
//! introduced by a single tag byte and *not* individually length-prefixed;
//! the enclosing record's length bounds the run. All integers are big-endian.

use crate::error::{HeapscopeError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every valid header's version string starts with this signature.
pub const HEADER_SIGNATURE: &[u8] = b"JAVA PROFILE";

/// Upper bound on the header version string, signature and NUL included.
pub const MAX_VERSION_STRING: usize = 64;

// --- TOP-LEVEL RECORD TAGS ---

/// String table entry: `[id] [utf-8 bytes]`.
pub const TAG_STRING: u8 = 0x01;
/// Class load: `[u32 serial] [id class] [u32 trace serial] [id name string]`.
pub const TAG_LOAD_CLASS: u8 = 0x02;
/// Class unload; carries no information this engine needs.
pub const TAG_UNLOAD_CLASS: u8 = 0x03;
/// Stack frame: `[id frame] [id method] [id signature] [id source] [u32 class serial] [u32 line]`.
pub const TAG_STACK_FRAME: u8 = 0x04;
/// Stack trace: `[u32 serial] [u32 thread serial] [u32 count] [id frame]*`.
pub const TAG_STACK_TRACE: u8 = 0x05;
/// Single-blob heap dump containing sub-records.
pub const TAG_HEAP_DUMP: u8 = 0x0C;
/// One segment of a segmented heap dump; same sub-record layout as `TAG_HEAP_DUMP`.
pub const TAG_HEAP_DUMP_SEGMENT: u8 = 0x1C;
/// Terminates the heap-dump section.
pub const TAG_HEAP_DUMP_END: u8 = 0x2C;

// --- HEAP SUB-RECORD TAGS ---

/// Root of unknown provenance: `[id]`.
pub const SUB_ROOT_UNKNOWN: u8 = 0xFF;
/// JNI global root: `[id] [id jni ref]`.
pub const SUB_ROOT_JNI_GLOBAL: u8 = 0x01;
/// JNI local root: `[id] [u32 thread serial] [u32 frame index]`.
pub const SUB_ROOT_JNI_LOCAL: u8 = 0x02;
/// Java stack frame root: `[id] [u32 thread serial] [u32 frame index]`.
pub const SUB_ROOT_JAVA_FRAME: u8 = 0x03;
/// Native stack root: `[id] [u32 thread serial]`.
pub const SUB_ROOT_NATIVE_STACK: u8 = 0x04;
/// Sticky class root: `[id]`.
pub const SUB_ROOT_STICKY_CLASS: u8 = 0x05;
/// Thread block root: `[id] [u32 thread serial]`.
pub const SUB_ROOT_THREAD_BLOCK: u8 = 0x06;
/// Busy monitor root: `[id]`.
pub const SUB_ROOT_MONITOR_USED: u8 = 0x07;
/// Thread object root: `[id] [u32 thread serial] [u32 trace serial]`.
pub const SUB_ROOT_THREAD_OBJECT: u8 = 0x08;
/// Interned string root: `[id]`.
pub const SUB_ROOT_INTERNED_STRING: u8 = 0x89;
/// Object awaiting finalization: `[id]`.
pub const SUB_ROOT_FINALIZING: u8 = 0x8A;
/// Debugger-held root: `[id]`.
pub const SUB_ROOT_DEBUGGER: u8 = 0x8B;
/// Reference-cleanup root: `[id]`.
pub const SUB_ROOT_REFERENCE_CLEANUP: u8 = 0x8C;
/// VM-internal root: `[id]`.
pub const SUB_ROOT_VM_INTERNAL: u8 = 0x8D;
/// JNI monitor root: `[id] [u32 thread serial] [u32 frame index]`.
pub const SUB_ROOT_JNI_MONITOR: u8 = 0x8E;
/// Unreachable object the runtime dumped anyway: `[id]`.
pub const SUB_ROOT_UNREACHABLE: u8 = 0x90;
/// Class definition sub-record.
pub const SUB_CLASS_DUMP: u8 = 0x20;
/// Ordinary object sub-record.
pub const SUB_INSTANCE_DUMP: u8 = 0x21;
/// Object array sub-record.
pub const SUB_OBJECT_ARRAY_DUMP: u8 = 0x22;
/// Primitive array sub-record.
pub const SUB_PRIMITIVE_ARRAY_DUMP: u8 = 0x23;
/// Primitive array whose payload the runtime elided.
pub const SUB_PRIMITIVE_ARRAY_NODATA: u8 = 0xC3;

/// Reference-id width declared by the dump header.
///
/// Every `id` field in the stream, and every reference-typed value, is this
/// many bytes wide. The decoder threads it explicitly through all reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSize {
    /// 32-bit object references.
    Four,
    /// 64-bit object references.
    Eight,
}

impl IdSize {
    /// Validates the raw header value. Any width other than 4 or 8 is fatal.
    pub fn from_header(value: u32) -> Result<Self> {
        match value {
            4 => Ok(Self::Four),
            8 => Ok(Self::Eight),
            other => Err(HeapscopeError::Format(format!(
                "Unsupported reference-id width: {other}"
            ))),
        }
    }

    /// Width of one reference id in bytes.
    pub fn bytes(self) -> usize {
        match self {
            Self::Four => 4,
            Self::Eight => 8,
        }
    }
}

/// Field and array-element type tags as stored in the dump.
///
/// `Object` marks a reference; everything else is a primitive with a fixed
/// byte width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum FieldType {
    /// A reference; width follows the header-declared [`IdSize`].
    Object = 2,
    /// 1-byte boolean.
    Boolean = 4,
    /// 2-byte UTF-16 code unit.
    Char = 5,
    /// 4-byte IEEE float.
    Float = 6,
    /// 8-byte IEEE double.
    Double = 7,
    /// 1-byte signed integer.
    Byte = 8,
    /// 2-byte signed integer.
    Short = 9,
    /// 4-byte signed integer.
    Int = 10,
    /// 8-byte signed integer.
    Long = 11,
}

/// Lookup table indexed directly by the on-disk tag value.
/// Tags 0, 1 and 3 are unassigned by the format.
const TYPE_BY_TAG: [Option<FieldType>; 12] = [
    None,
    None,
    Some(FieldType::Object),
    None,
    Some(FieldType::Boolean),
    Some(FieldType::Char),
    Some(FieldType::Float),
    Some(FieldType::Double),
    Some(FieldType::Byte),
    Some(FieldType::Short),
    Some(FieldType::Int),
    Some(FieldType::Long),
];

impl FieldType {
    /// Range-validated decoding of a raw type tag.
    pub fn from_tag(tag: u8) -> Result<Self> {
        TYPE_BY_TAG
            .get(tag as usize)
            .copied()
            .flatten()
            .ok_or_else(|| HeapscopeError::Format(format!("Unknown field type tag: {tag}")))
    }

    /// Byte width of one value of this type under the given id width.
    pub fn width(self, id_size: IdSize) -> usize {
        match self {
            Self::Object => id_size.bytes(),
            Self::Boolean | Self::Byte => 1,
            Self::Char | Self::Short => 2,
            Self::Float | Self::Int => 4,
            Self::Double | Self::Long => 8,
        }
    }

    /// True for reference-typed values.
    pub fn is_reference(self) -> bool {
        matches!(self, Self::Object)
    }

    /// Synthesized class name for arrays of this element type.
    pub fn array_name(self) -> &'static str {
        match self {
            Self::Object => "java.lang.Object[]",
            Self::Boolean => "boolean[]",
            Self::Char => "char[]",
            Self::Float => "float[]",
            Self::Double => "double[]",
            Self::Byte => "byte[]",
            Self::Short => "short[]",
            Self::Int => "int[]",
            Self::Long => "long[]",
        }
    }
}

/// The kind of anchor a GC root represents.
///
/// Kinds are diagnostic only; every kind anchors reachability identically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RootKind {
    /// Provenance unknown to the runtime.
    Unknown,
    /// JNI global reference.
    JniGlobal,
    /// JNI local reference in an active native frame.
    JniLocal,
    /// Local variable or operand in a Java frame.
    JavaFrame,
    /// Native stack slot.
    NativeStack,
    /// Class pinned by the runtime.
    StickyClass,
    /// Object a thread is blocked on.
    ThreadBlock,
    /// Monitor currently in use.
    MonitorUsed,
    /// A live thread object.
    ThreadObject,
    /// Interned string.
    InternedString,
    /// Object queued for finalization.
    Finalizing,
    /// Held by an attached debugger.
    Debugger,
    /// Pending reference cleanup.
    ReferenceCleanup,
    /// Internal VM bookkeeping.
    VmInternal,
    /// JNI monitor.
    JniMonitor,
    /// Dumped despite being unreachable.
    Unreachable,
}

impl RootKind {
    /// Human-readable label used by chain rendering.
    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::JniGlobal => "JNI global",
            Self::JniLocal => "JNI local",
            Self::JavaFrame => "java frame",
            Self::NativeStack => "native stack",
            Self::StickyClass => "sticky class",
            Self::ThreadBlock => "thread block",
            Self::MonitorUsed => "monitor used",
            Self::ThreadObject => "thread object",
            Self::InternedString => "interned string",
            Self::Finalizing => "finalizing",
            Self::Debugger => "debugger",
            Self::ReferenceCleanup => "reference cleanup",
            Self::VmInternal => "VM internal",
            Self::JniMonitor => "JNI monitor",
            Self::Unreachable => "unreachable",
        }
    }
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
