//! The decoded object graph and its query surface.
//!
//! A [`Snapshot`] is built exactly once per opened dump and is immutable
//! afterwards: an arena of [`HeapObject`] nodes (classes, instances, arrays),
//! an identity index from raw object ids to arena handles, the string table,
//! allocation stack traces and the GC root list.
//!
//! ## Lazy Materialization
//!
//! Instance and array payloads are *not* decoded while building the snapshot;
//! their skeletons remember only a byte offset and size. [`Snapshot::fields`]
//! and [`Snapshot::elements`] decode on demand, reading through the byte
//! source the snapshot keeps open. Materialization is pure: repeated calls
//! return structurally equal values, and a reference id always resolves to
//! the same arena node.
//!
//! ## Sharing
//!
//! All queries take `&self` and every materialization call creates its own
//! cursor, so independent analyses may share one snapshot across threads;
//! per-run traversal state lives outside the snapshot entirely.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::path::Path;

use serde::Serialize;
use twox_hash::XxHash64;

use crate::decoder;
use crate::error::{HeapscopeError, Result};
use crate::format::{FieldType, IdSize, RootKind};
use crate::graph::NodeId;
use crate::source::{ByteSource, SourceCursor};

/// Identity-keyed map from raw dump ids to values.
/// Keys are opaque runtime addresses, so a fast primitive hasher is safe.
pub(crate) type IdMap<V> = HashMap<u64, V, BuildHasherDefault<XxHash64>>;

/// Map keyed by the u32 serial numbers some record kinds use instead of ids.
pub(crate) type SerialMap<V> = HashMap<u32, V, BuildHasherDefault<XxHash64>>;

/// One instance-field declaration: name (string-table id) plus type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDecl {
    /// String-table id of the field name.
    pub name_id: u64,
    /// Declared type of the field.
    pub field_type: FieldType,
}

/// A static field with its value, decoded eagerly at class-parse time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticField {
    /// String-table id of the field name.
    pub name_id: u64,
    /// The stored value.
    pub value: FieldValue,
}

/// A single materialized field or array-element value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    /// A reference by raw object id; 0 means null.
    Object(u64),
    /// Boolean primitive.
    Boolean(bool),
    /// UTF-16 code unit primitive.
    Char(u16),
    /// 32-bit float primitive.
    Float(f32),
    /// 64-bit float primitive.
    Double(f64),
    /// 8-bit integer primitive.
    Byte(i8),
    /// 16-bit integer primitive.
    Short(i16),
    /// 32-bit integer primitive.
    Int(i32),
    /// 64-bit integer primitive.
    Long(i64),
}

impl FieldValue {
    /// The target id when this value is a non-null reference.
    pub fn reference(&self) -> Option<u64> {
        match self {
            Self::Object(id) if *id != 0 => Some(*id),
            _ => None,
        }
    }
}

/// Class metadata decoded from a class-dump sub-record. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct ClassDefinition {
    /// The class object's own id.
    pub object_id: u64,
    /// Superclass id; 0 terminates the chain.
    pub super_id: u64,
    /// String-table id of the class name (0 when no class-load record named it).
    pub name_id: u64,
    /// Declared byte size of one instance's field payload.
    pub instance_size: u32,
    /// Static fields with their values.
    pub static_fields: Vec<StaticField>,
    /// Instance-field declarations, in payload order.
    pub instance_fields: Vec<FieldDecl>,
    /// Allocation stack-trace serial (0 when absent).
    pub trace_serial: u32,
}

/// Skeleton of an ordinary object: its class plus where the payload lives.
#[derive(Debug, Clone, Copy)]
pub struct ClassInstance {
    /// This object's id.
    pub object_id: u64,
    /// Id of the owning class.
    pub class_id: u64,
    /// Absolute offset of the field payload in the dump.
    pub fields_offset: u64,
    /// Declared payload size in bytes.
    pub fields_size: u32,
    /// Allocation stack-trace serial (0 when absent).
    pub trace_serial: u32,
}

/// Skeleton of an array: element type plus where the payload lives.
#[derive(Debug, Clone, Copy)]
pub struct ArrayInstance {
    /// This object's id.
    pub object_id: u64,
    /// Array class id for object arrays; 0 for primitive arrays.
    pub class_id: u64,
    /// Element type; [`FieldType::Object`] marks an object array.
    pub element_type: FieldType,
    /// Number of elements.
    pub length: u32,
    /// Absolute offset of the element payload in the dump.
    pub payload_offset: u64,
    /// Allocation stack-trace serial (0 when absent).
    pub trace_serial: u32,
}

/// A node in the decoded graph.
#[derive(Debug, Clone)]
pub enum HeapObject {
    /// A class definition (classes are objects too; sticky-class roots anchor them).
    Class(ClassDefinition),
    /// An ordinary object.
    Instance(ClassInstance),
    /// An object or primitive array.
    Array(ArrayInstance),
}

impl HeapObject {
    /// The raw dump id of this object.
    pub fn object_id(&self) -> u64 {
        match self {
            Self::Class(c) => c.object_id,
            Self::Instance(i) => i.object_id,
            Self::Array(a) => a.object_id,
        }
    }

    /// Allocation stack-trace serial (0 when absent).
    pub fn trace_serial(&self) -> u32 {
        match self {
            Self::Class(c) => c.trace_serial,
            Self::Instance(i) => i.trace_serial,
            Self::Array(a) => a.trace_serial,
        }
    }
}

/// A GC root: the anchored object id plus the root kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RootObj {
    /// Id of the anchored object.
    pub object_id: u64,
    /// What kind of anchor holds it.
    pub kind: RootKind,
}

/// One frame of an allocation stack trace.
#[derive(Debug, Clone)]
pub struct StackFrame {
    /// This frame's id.
    pub frame_id: u64,
    /// String-table id of the method name.
    pub method_id: u64,
    /// String-table id of the method signature.
    pub signature_id: u64,
    /// String-table id of the source file name.
    pub source_id: u64,
    /// Class-load serial of the declaring class.
    pub class_serial: u32,
    /// Line number; negative values are runtime sentinels (native, compiled).
    pub line: i32,
}

/// An allocation stack trace: ordered frame ids.
#[derive(Debug, Clone)]
pub struct StackTrace {
    /// This trace's serial number.
    pub serial: u32,
    /// Serial of the allocating thread.
    pub thread_serial: u32,
    /// Frames, outermost last.
    pub frame_ids: Vec<u64>,
}

/// A stack frame with its names resolved against the string table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameView<'s> {
    /// Declaring class name.
    pub class_name: &'s str,
    /// Method name.
    pub method: &'s str,
    /// Source file name.
    pub source: &'s str,
    /// Line number as recorded.
    pub line: i32,
}

/// One materialized instance field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field<'s> {
    /// Field name from the string table.
    pub name: &'s str,
    /// The class node that declares this field.
    pub declared_in: NodeId,
    /// The decoded value.
    pub value: FieldValue,
}

/// Materialized array content.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayView<'s> {
    /// Object-array elements as raw reference ids (0 means null).
    Objects(Vec<u64>),
    /// Primitive-array payload as a typed raw view.
    Primitive(PrimitiveSlice<'s>),
}

/// A contiguous raw view over a primitive array's payload.
///
/// Elements are sliced by index on demand; nothing is boxed per element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrimitiveSlice<'s> {
    element_type: FieldType,
    data: &'s [u8],
}

impl<'s> PrimitiveSlice<'s> {
    /// The element type of the backing array.
    pub fn element_type(&self) -> FieldType {
        self.element_type
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        // Primitive widths never depend on the id size.
        self.data.len() / self.element_type.width(IdSize::Four)
    }

    /// True when the array holds no elements.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The untyped payload bytes.
    pub fn as_bytes(&self) -> &'s [u8] {
        self.data
    }

    /// Decodes the element at `index`, or `None` past the end.
    pub fn get(&self, index: usize) -> Option<FieldValue> {
        let width = self.element_type.width(IdSize::Four);
        let start = index.checked_mul(width)?;
        let bytes = self.data.get(start..start + width)?;
        let wide = bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        Some(match self.element_type {
            // Object arrays never take this path.
            FieldType::Object => FieldValue::Object(wide),
            FieldType::Boolean => FieldValue::Boolean(wide != 0),
            FieldType::Char => FieldValue::Char(wide as u16),
            FieldType::Float => FieldValue::Float(f32::from_bits(wide as u32)),
            FieldType::Double => FieldValue::Double(f64::from_bits(wide)),
            FieldType::Byte => FieldValue::Byte(wide as u8 as i8),
            FieldType::Short => FieldValue::Short(wide as u16 as i16),
            FieldType::Int => FieldValue::Int(wide as u32 as i32),
            FieldType::Long => FieldValue::Long(wide as i64),
        })
    }
}

/// Summary counts for a decoded snapshot, for report statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeapStats {
    /// Number of class definitions.
    pub classes: usize,
    /// Number of ordinary instances.
    pub instances: usize,
    /// Number of arrays.
    pub arrays: usize,
    /// Number of recorded GC roots.
    pub gc_roots: usize,
    /// Number of string-table entries.
    pub strings: usize,
    /// Summed declared payload bytes across instances and arrays.
    pub payload_bytes: u64,
}

/// Per-class instance statistics, for report histograms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassCount {
    /// Class display name.
    pub name: String,
    /// Direct instances (arrays of the class included).
    pub instances: usize,
    /// Summed declared payload bytes of those instances.
    pub shallow_bytes: u64,
}

/// A fully decoded heap dump.
pub struct Snapshot {
    pub(crate) source: ByteSource,
    pub(crate) id_size: IdSize,
    pub(crate) timestamp_ms: u64,
    pub(crate) strings: IdMap<Box<str>>,
    pub(crate) frames: IdMap<StackFrame>,
    pub(crate) traces: SerialMap<StackTrace>,
    pub(crate) class_serials: SerialMap<u64>,
    pub(crate) roots: Vec<RootObj>,
    pub(crate) nodes: Vec<HeapObject>,
    pub(crate) index: IdMap<NodeId>,
    pub(crate) classes_by_name: HashMap<Box<str>, NodeId>,
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("id_size", &self.id_size)
            .field("nodes", &self.nodes.len())
            .field("roots", &self.roots.len())
            .field("strings", &self.strings.len())
            .finish_non_exhaustive()
    }
}

impl Snapshot {
    /// Memory-maps and decodes a dump file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        decoder::decode(ByteSource::open(path)?)
    }

    /// Decodes a dump held in memory.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        decoder::decode(ByteSource::from_bytes(bytes))
    }

    /// The reference-id width the dump was captured with.
    pub fn id_size(&self) -> IdSize {
        self.id_size
    }

    /// Capture timestamp from the dump header, milliseconds since the epoch.
    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }

    /// Number of nodes in the graph (classes, instances and arrays).
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The node behind a handle.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not issued by this snapshot's arena.
    pub fn node(&self, id: NodeId) -> &HeapObject {
        self.nodes
            .get(id.index())
            .expect("Snapshot invariant violated: NodeId out of arena bounds")
    }

    /// Resolves a raw object id to its arena handle.
    pub fn node_id(&self, object_id: u64) -> Option<NodeId> {
        self.index.get(&object_id).copied()
    }

    /// Resolves a raw object id directly to its node.
    pub fn object(&self, object_id: u64) -> Option<&HeapObject> {
        self.node_id(object_id).map(|id| self.node(id))
    }

    /// The recorded GC roots, in record order.
    pub fn gc_roots(&self) -> &[RootObj] {
        &self.roots
    }

    /// Looks up a string-table entry.
    pub fn string(&self, id: u64) -> Option<&str> {
        self.strings.get(&id).map(|s| s.as_ref())
    }

    /// Finds a class definition node by fully-qualified name.
    ///
    /// When several loaders defined the same name, the first definition in
    /// record order wins.
    pub fn find_class(&self, name: &str) -> Option<NodeId> {
        self.classes_by_name.get(name).copied()
    }

    /// Downcasts a node to its class definition.
    pub fn class(&self, node: NodeId) -> Option<&ClassDefinition> {
        match self.node(node) {
            HeapObject::Class(c) => Some(c),
            _ => None,
        }
    }

    /// The resolved name of a class node.
    pub fn class_name(&self, node: NodeId) -> Option<&str> {
        self.class(node).and_then(|c| self.string(c.name_id))
    }

    /// The superclass node of a class node, if any.
    pub fn superclass(&self, class: NodeId) -> Option<NodeId> {
        match self.class(class) {
            Some(c) if c.super_id != 0 => self.node_id(c.super_id),
            _ => None,
        }
    }

    /// Iterates the class chain relevant to `node`, most-derived first.
    ///
    /// For an instance or object array this starts at its class; for a class
    /// node it starts at the node itself. Primitive arrays yield nothing.
    pub fn class_chain(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let first = match self.node(node) {
            HeapObject::Class(_) => Some(node),
            HeapObject::Instance(i) => self.node_id(i.class_id),
            HeapObject::Array(a) if a.class_id != 0 => self.node_id(a.class_id),
            HeapObject::Array(_) => None,
        };
        std::iter::successors(first, move |&cls| self.superclass(cls))
    }

    /// All direct instances of a class, in arena order.
    ///
    /// Arrays whose array class is `class` are included; subclass instances
    /// are not.
    pub fn instances_of(&self, class: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let class_oid = self.node(class).object_id();
        self.nodes.iter().enumerate().filter_map(move |(i, n)| {
            let matches = match n {
                HeapObject::Instance(ci) => ci.class_id == class_oid,
                HeapObject::Array(a) => a.class_id == class_oid,
                HeapObject::Class(_) => false,
            };
            matches.then(|| NodeId::new(i as u32))
        })
    }

    /// Materializes an instance's fields, walking the superclass chain.
    ///
    /// Fields appear in payload order: the instance's own class first, then
    /// each ancestor. Pure and idempotent.
    pub fn fields(&self, instance: &ClassInstance) -> Result<Vec<Field<'_>>> {
        let mut out = Vec::new();
        let mut cursor = self.source.cursor_at(instance.fields_offset);
        let payload_end = instance.fields_offset + u64::from(instance.fields_size);

        let mut class_node = self.node_id(instance.class_id);
        while let Some(cls) = class_node {
            let Some(def) = self.class(cls) else { break };
            for decl in &def.instance_fields {
                let width = decl.field_type.width(self.id_size) as u64;
                if cursor.position() + width > payload_end {
                    return Err(HeapscopeError::Format(format!(
                        "Field payload of instance 0x{:x} overruns its declared {} bytes",
                        instance.object_id, instance.fields_size
                    )));
                }
                let value = read_value(&mut cursor, decl.field_type, self.id_size)?;
                out.push(Field {
                    name: self.string(decl.name_id).unwrap_or("<unknown>"),
                    declared_in: cls,
                    value,
                });
            }
            class_node = self.superclass(cls);
        }
        Ok(out)
    }

    /// Looks up one field by name across the inherited chain.
    ///
    /// Fails with [`HeapscopeError::FieldNotFound`] when no class in the
    /// chain declares the name.
    pub fn field(&self, instance: &ClassInstance, name: &str) -> Result<FieldValue> {
        for field in self.fields(instance)? {
            if field.name == name {
                return Ok(field.value);
            }
        }
        Err(HeapscopeError::FieldNotFound {
            class: self.class_display(instance.class_id).to_string(),
            field: name.to_string(),
        })
    }

    /// Materializes an array's elements.
    ///
    /// Object arrays decode to raw reference ids; primitive arrays return a
    /// zero-copy typed view. Pure and idempotent.
    pub fn elements(&self, array: &ArrayInstance) -> Result<ArrayView<'_>> {
        if array.element_type.is_reference() {
            let mut cursor = self.source.cursor_at(array.payload_offset);
            let mut ids = Vec::with_capacity(array.length as usize);
            for _ in 0..array.length {
                ids.push(cursor.read_id(self.id_size)?);
            }
            Ok(ArrayView::Objects(ids))
        } else {
            let width = array.element_type.width(self.id_size);
            let len = (array.length as usize).checked_mul(width).ok_or_else(|| {
                HeapscopeError::Format("Array payload length overflows address space".into())
            })?;
            let data = self.source.slice(array.payload_offset, len)?;
            Ok(ArrayView::Primitive(PrimitiveSlice {
                element_type: array.element_type,
                data,
            }))
        }
    }

    /// The allocation stack trace recorded for a node, if any.
    pub fn allocation_trace(&self, node: NodeId) -> Option<&StackTrace> {
        let serial = self.node(node).trace_serial();
        if serial == 0 {
            return None;
        }
        self.traces.get(&serial)
    }

    /// Resolves a trace's frames against the string table and class-load
    /// records. Frames that cannot be resolved are reported with
    /// `<unknown>` placeholders rather than dropped.
    pub fn frames_of(&self, trace: &StackTrace) -> Vec<FrameView<'_>> {
        trace
            .frame_ids
            .iter()
            .map(|frame_id| {
                let Some(frame) = self.frames.get(frame_id) else {
                    return FrameView {
                        class_name: "<unknown>",
                        method: "<unknown>",
                        source: "<unknown>",
                        line: 0,
                    };
                };
                let class_name = self
                    .class_serials
                    .get(&frame.class_serial)
                    .and_then(|class_id| self.node_id(*class_id))
                    .and_then(|cls| self.class_name(cls))
                    .unwrap_or("<unknown>");
                FrameView {
                    class_name,
                    method: self.string(frame.method_id).unwrap_or("<unknown>"),
                    source: self.string(frame.source_id).unwrap_or("<unknown>"),
                    line: frame.line,
                }
            })
            .collect()
    }

    /// Display name for the class with raw id `class_id`.
    pub(crate) fn class_display(&self, class_id: u64) -> &str {
        self.node_id(class_id)
            .and_then(|cls| self.class_name(cls))
            .unwrap_or("<unknown class>")
    }

    /// Human-readable one-line description of a node, used by chain rendering.
    pub fn describe(&self, node: NodeId) -> String {
        match self.node(node) {
            HeapObject::Class(c) => {
                format!("class {}", self.class_display(c.object_id))
            }
            HeapObject::Instance(i) => {
                format!("{}@0x{:x}", self.class_display(i.class_id), i.object_id)
            }
            HeapObject::Array(a) => {
                let name = if a.class_id != 0 {
                    self.class_display(a.class_id)
                } else {
                    a.element_type.array_name()
                };
                format!("{}@0x{:x}", name, a.object_id)
            }
        }
    }

    /// Summary counts for the decoded dump.
    pub fn stats(&self) -> HeapStats {
        let mut stats = HeapStats {
            classes: 0,
            instances: 0,
            arrays: 0,
            gc_roots: self.roots.len(),
            strings: self.strings.len(),
            payload_bytes: 0,
        };
        for node in &self.nodes {
            match node {
                HeapObject::Class(_) => stats.classes += 1,
                HeapObject::Instance(i) => {
                    stats.instances += 1;
                    stats.payload_bytes += u64::from(i.fields_size);
                }
                HeapObject::Array(a) => {
                    stats.arrays += 1;
                    stats.payload_bytes +=
                        (a.length as u64) * a.element_type.width(self.id_size) as u64;
                }
            }
        }
        stats
    }

    /// Per-class instance counts and shallow sizes, largest first.
    ///
    /// Ties break by name so the output is stable across runs.
    pub fn class_histogram(&self) -> Vec<ClassCount> {
        let mut by_name: HashMap<&str, (usize, u64)> = HashMap::new();
        for node in &self.nodes {
            let (name, bytes) = match node {
                HeapObject::Instance(i) => {
                    (self.class_display(i.class_id), u64::from(i.fields_size))
                }
                HeapObject::Array(a) => {
                    let name = if a.class_id != 0 {
                        self.class_display(a.class_id)
                    } else {
                        a.element_type.array_name()
                    };
                    let bytes = (a.length as u64) * a.element_type.width(self.id_size) as u64;
                    (name, bytes)
                }
                HeapObject::Class(_) => continue,
            };
            let entry = by_name.entry(name).or_insert((0, 0));
            entry.0 += 1;
            entry.1 += bytes;
        }
        let mut counts: Vec<ClassCount> = by_name
            .into_iter()
            .map(|(name, (instances, shallow_bytes))| ClassCount {
                name: name.to_string(),
                instances,
                shallow_bytes,
            })
            .collect();
        counts.sort_by(|a, b| {
            b.shallow_bytes
                .cmp(&a.shallow_bytes)
                .then_with(|| a.name.cmp(&b.name))
        });
        counts
    }
}

/// Decodes one value of `field_type` at the cursor.
pub(crate) fn read_value(
    cursor: &mut SourceCursor<'_>,
    field_type: FieldType,
    id_size: IdSize,
) -> Result<FieldValue> {
    Ok(match field_type {
        FieldType::Object => FieldValue::Object(cursor.read_id(id_size)?),
        FieldType::Boolean => FieldValue::Boolean(cursor.read_u8()? != 0),
        FieldType::Char => FieldValue::Char(cursor.read_u16()?),
        FieldType::Float => FieldValue::Float(f32::from_bits(cursor.read_u32()?)),
        FieldType::Double => FieldValue::Double(f64::from_bits(cursor.read_u64()?)),
        FieldType::Byte => FieldValue::Byte(cursor.read_u8()? as i8),
        FieldType::Short => FieldValue::Short(cursor.read_u16()? as i16),
        FieldType::Int => FieldValue::Int(cursor.read_u32()? as i32),
        FieldType::Long => FieldValue::Long(cursor.read_u64()? as i64),
    })
}
