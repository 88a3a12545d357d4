//! Streaming dump decoder.
//!
//! A single forward pass over the byte source builds the metadata tables
//! (strings, class definitions, stack frames and traces, GC roots) while
//! instances and arrays are recorded as skeletons that remember only where
//! their payload lives. A post-pass then resolves class names and checks the
//! structural invariants the query layer relies on.
//!
//! Truncation anywhere is fatal: a dump that ends mid-record produces an
//! error, never a partial snapshot. Unrecognized top-level records are
//! skipped by their declared length; unrecognized heap sub-records abort the
//! decode because sub-records carry no length to resynchronize with.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::{debug, trace};

use crate::error::{HeapscopeError, Result};
use crate::format::{self, FieldType, IdSize, RootKind, HEADER_SIGNATURE, MAX_VERSION_STRING};
use crate::graph::NodeId;
use crate::snapshot::{
    read_value, ArrayInstance, ClassDefinition, ClassInstance, FieldDecl, HeapObject, IdMap,
    RootObj, SerialMap, Snapshot, StackFrame, StackTrace, StaticField,
};
use crate::source::{ByteSource, SourceCursor};

/// Decodes a complete dump and hands ownership of the source to the snapshot.
pub(crate) fn decode(source: ByteSource) -> Result<Snapshot> {
    let Decoder {
        id_size,
        timestamp_ms,
        strings,
        class_name_ids,
        class_serials,
        frames,
        traces,
        roots,
        mut nodes,
        index,
        ..
    } = Decoder::parse(&source)?;

    // A class-load record may arrive after the class dump it names, so names
    // are resolved only once the full pass is done.
    for node in &mut nodes {
        if let HeapObject::Class(def) = node {
            if let Some(name_id) = class_name_ids.get(&def.object_id) {
                def.name_id = *name_id;
            }
        }
    }

    let mut classes_by_name: HashMap<Box<str>, NodeId> = HashMap::new();
    for (i, node) in nodes.iter().enumerate() {
        if let HeapObject::Class(def) = node {
            if let Some(name) = strings.get(&def.name_id) {
                // First definition in record order wins for lookups by name.
                classes_by_name
                    .entry(name.clone())
                    .or_insert_with(|| NodeId::new(i as u32));
            }
        }
    }

    validate(&nodes, &index)?;

    let snapshot = Snapshot {
        source,
        id_size,
        timestamp_ms,
        strings,
        frames,
        traces,
        class_serials,
        roots,
        nodes,
        index,
        classes_by_name,
    };
    let stats = snapshot.stats();
    debug!(
        classes = stats.classes,
        instances = stats.instances,
        arrays = stats.arrays,
        gc_roots = stats.gc_roots,
        strings = stats.strings,
        "decoded heap dump"
    );
    Ok(snapshot)
}

struct Decoder<'d> {
    cursor: SourceCursor<'d>,
    id_size: IdSize,
    timestamp_ms: u64,
    strings: IdMap<Box<str>>,
    class_name_ids: IdMap<u64>,
    class_serials: SerialMap<u64>,
    frames: IdMap<StackFrame>,
    traces: SerialMap<StackTrace>,
    roots: Vec<RootObj>,
    nodes: Vec<HeapObject>,
    index: IdMap<NodeId>,
}

impl<'d> Decoder<'d> {
    fn parse(source: &'d ByteSource) -> Result<Self> {
        let mut decoder = Decoder {
            cursor: source.cursor(),
            // Replaced by the header before any id is read.
            id_size: IdSize::Four,
            timestamp_ms: 0,
            strings: IdMap::default(),
            class_name_ids: IdMap::default(),
            class_serials: SerialMap::default(),
            frames: IdMap::default(),
            traces: SerialMap::default(),
            roots: Vec::new(),
            nodes: Vec::new(),
            index: IdMap::default(),
        };
        decoder.parse_header()?;
        decoder.parse_records()?;
        Ok(decoder)
    }

    // --- HEADER AND TOP-LEVEL RECORDS ---

    fn parse_header(&mut self) -> Result<()> {
        let version = self.cursor.read_nul_terminated(MAX_VERSION_STRING)?;
        if !version.starts_with(HEADER_SIGNATURE) {
            return Err(HeapscopeError::Format(
                "Missing heap-dump header signature".into(),
            ));
        }
        self.id_size = IdSize::from_header(self.cursor.read_u32()?)?;
        self.timestamp_ms = self.cursor.read_u64()?;
        trace!(
            id_bytes = self.id_size.bytes(),
            timestamp_ms = self.timestamp_ms,
            "dump header"
        );
        Ok(())
    }

    fn parse_records(&mut self) -> Result<()> {
        while self.cursor.remaining() > 0 {
            let tag = self.cursor.read_u8()?;
            let _ticks = self.cursor.read_u32()?;
            let length = self.cursor.read_u32()?;
            let start = self.cursor.position();
            match tag {
                format::TAG_STRING => self.parse_string(length)?,
                format::TAG_LOAD_CLASS => self.parse_load_class()?,
                format::TAG_UNLOAD_CLASS => self.cursor.skip(length as usize)?,
                format::TAG_STACK_FRAME => self.parse_stack_frame()?,
                format::TAG_STACK_TRACE => self.parse_stack_trace()?,
                format::TAG_HEAP_DUMP | format::TAG_HEAP_DUMP_SEGMENT => {
                    self.parse_heap_records(length)?;
                }
                format::TAG_HEAP_DUMP_END => self.cursor.skip(length as usize)?,
                other => {
                    trace!(tag = other, length, "skipping unrecognized record");
                    self.cursor.skip(length as usize)?;
                }
            }
            let consumed = self.cursor.position() - start;
            if consumed != u64::from(length) {
                return Err(HeapscopeError::Format(format!(
                    "Record 0x{tag:02X} declared {length} bytes but decoding consumed {consumed}"
                )));
            }
        }
        Ok(())
    }

    fn parse_string(&mut self, length: u32) -> Result<()> {
        let id_bytes = self.id_size.bytes();
        let Some(text_len) = (length as usize).checked_sub(id_bytes) else {
            return Err(HeapscopeError::Format(format!(
                "String record of {length} bytes cannot hold a {id_bytes}-byte id"
            )));
        };
        let id = self.cursor.read_id(self.id_size)?;
        let bytes = self.cursor.read_bytes(text_len)?;
        self.strings
            .insert(id, String::from_utf8_lossy(bytes).into());
        Ok(())
    }

    fn parse_load_class(&mut self) -> Result<()> {
        let serial = self.cursor.read_u32()?;
        let class_id = self.cursor.read_id(self.id_size)?;
        let _trace_serial = self.cursor.read_u32()?;
        let name_id = self.cursor.read_id(self.id_size)?;
        self.class_name_ids.insert(class_id, name_id);
        self.class_serials.insert(serial, class_id);
        Ok(())
    }

    fn parse_stack_frame(&mut self) -> Result<()> {
        let frame_id = self.cursor.read_id(self.id_size)?;
        let method_id = self.cursor.read_id(self.id_size)?;
        let signature_id = self.cursor.read_id(self.id_size)?;
        let source_id = self.cursor.read_id(self.id_size)?;
        let class_serial = self.cursor.read_u32()?;
        let line = self.cursor.read_u32()? as i32;
        self.frames.insert(
            frame_id,
            StackFrame {
                frame_id,
                method_id,
                signature_id,
                source_id,
                class_serial,
                line,
            },
        );
        Ok(())
    }

    fn parse_stack_trace(&mut self) -> Result<()> {
        let serial = self.cursor.read_u32()?;
        let thread_serial = self.cursor.read_u32()?;
        let count = self.cursor.read_u32()? as usize;
        // Cap pre-allocation by the bytes actually left in the dump.
        let id_bytes = self.id_size.bytes();
        let mut frame_ids = Vec::with_capacity(count.min(self.cursor.remaining() / id_bytes));
        for _ in 0..count {
            frame_ids.push(self.cursor.read_id(self.id_size)?);
        }
        self.traces.insert(
            serial,
            StackTrace {
                serial,
                thread_serial,
                frame_ids,
            },
        );
        Ok(())
    }

    // --- HEAP SUB-RECORDS ---

    fn parse_heap_records(&mut self, length: u32) -> Result<()> {
        let end = self.cursor.position() + u64::from(length);
        while self.cursor.position() < end {
            let sub = self.cursor.read_u8()?;
            match sub {
                format::SUB_ROOT_UNKNOWN => self.parse_root(RootKind::Unknown, 0, 0)?,
                format::SUB_ROOT_JNI_GLOBAL => self.parse_root(RootKind::JniGlobal, 1, 0)?,
                format::SUB_ROOT_JNI_LOCAL => self.parse_root(RootKind::JniLocal, 0, 2)?,
                format::SUB_ROOT_JAVA_FRAME => self.parse_root(RootKind::JavaFrame, 0, 2)?,
                format::SUB_ROOT_NATIVE_STACK => self.parse_root(RootKind::NativeStack, 0, 1)?,
                format::SUB_ROOT_STICKY_CLASS => self.parse_root(RootKind::StickyClass, 0, 0)?,
                format::SUB_ROOT_THREAD_BLOCK => self.parse_root(RootKind::ThreadBlock, 0, 1)?,
                format::SUB_ROOT_MONITOR_USED => self.parse_root(RootKind::MonitorUsed, 0, 0)?,
                format::SUB_ROOT_THREAD_OBJECT => self.parse_root(RootKind::ThreadObject, 0, 2)?,
                format::SUB_ROOT_INTERNED_STRING => {
                    self.parse_root(RootKind::InternedString, 0, 0)?;
                }
                format::SUB_ROOT_FINALIZING => self.parse_root(RootKind::Finalizing, 0, 0)?,
                format::SUB_ROOT_DEBUGGER => self.parse_root(RootKind::Debugger, 0, 0)?,
                format::SUB_ROOT_REFERENCE_CLEANUP => {
                    self.parse_root(RootKind::ReferenceCleanup, 0, 0)?;
                }
                format::SUB_ROOT_VM_INTERNAL => self.parse_root(RootKind::VmInternal, 0, 0)?,
                format::SUB_ROOT_JNI_MONITOR => self.parse_root(RootKind::JniMonitor, 0, 2)?,
                format::SUB_ROOT_UNREACHABLE => self.parse_root(RootKind::Unreachable, 0, 0)?,
                format::SUB_CLASS_DUMP => self.parse_class_dump()?,
                format::SUB_INSTANCE_DUMP => self.parse_instance_dump()?,
                format::SUB_OBJECT_ARRAY_DUMP => self.parse_object_array_dump()?,
                format::SUB_PRIMITIVE_ARRAY_DUMP => self.parse_primitive_array_dump(false)?,
                format::SUB_PRIMITIVE_ARRAY_NODATA => self.parse_primitive_array_dump(true)?,
                other => {
                    // Sub-records carry no length, so an unknown tag leaves
                    // no way to find the next record boundary.
                    return Err(HeapscopeError::Format(format!(
                        "Unknown heap sub-record tag 0x{other:02X}; cannot resynchronize"
                    )));
                }
            }
        }
        if self.cursor.position() != end {
            return Err(HeapscopeError::Format(
                "Heap segment content overruns its declared length".into(),
            ));
        }
        Ok(())
    }

    /// Parses one root entry. Kinds differ only in trailing context words:
    /// `extra_ids` id-width values and `extra_u32s` serial words, all dropped.
    fn parse_root(&mut self, kind: RootKind, extra_ids: usize, extra_u32s: usize) -> Result<()> {
        let object_id = self.cursor.read_id(self.id_size)?;
        for _ in 0..extra_ids {
            self.cursor.read_id(self.id_size)?;
        }
        for _ in 0..extra_u32s {
            self.cursor.read_u32()?;
        }
        if object_id == 0 {
            // Cleared JNI globals show up as null roots in real dumps.
            trace!(kind = %kind, "dropping null root entry");
            return Ok(());
        }
        self.roots.push(RootObj { object_id, kind });
        Ok(())
    }

    fn parse_class_dump(&mut self) -> Result<()> {
        let object_id = self.cursor.read_id(self.id_size)?;
        let trace_serial = self.cursor.read_u32()?;
        let super_id = self.cursor.read_id(self.id_size)?;
        // Loader, signers, protection domain and two reserved slots.
        for _ in 0..5 {
            self.cursor.read_id(self.id_size)?;
        }
        let instance_size = self.cursor.read_u32()?;

        let constant_count = self.cursor.read_u16()?;
        for _ in 0..constant_count {
            self.cursor.read_u16()?;
            let kind = FieldType::from_tag(self.cursor.read_u8()?)?;
            self.cursor.skip(kind.width(self.id_size))?;
        }

        let static_count = self.cursor.read_u16()?;
        let mut static_fields = Vec::with_capacity(static_count as usize);
        for _ in 0..static_count {
            let name_id = self.cursor.read_id(self.id_size)?;
            let kind = FieldType::from_tag(self.cursor.read_u8()?)?;
            let value = read_value(&mut self.cursor, kind, self.id_size)?;
            static_fields.push(StaticField { name_id, value });
        }

        let field_count = self.cursor.read_u16()?;
        let mut instance_fields = Vec::with_capacity(field_count as usize);
        for _ in 0..field_count {
            let name_id = self.cursor.read_id(self.id_size)?;
            let field_type = FieldType::from_tag(self.cursor.read_u8()?)?;
            instance_fields.push(FieldDecl {
                name_id,
                field_type,
            });
        }

        self.insert_node(HeapObject::Class(ClassDefinition {
            object_id,
            super_id,
            // Resolved from class-load records once the pass is done.
            name_id: 0,
            instance_size,
            static_fields,
            instance_fields,
            trace_serial,
        }))
    }

    fn parse_instance_dump(&mut self) -> Result<()> {
        let object_id = self.cursor.read_id(self.id_size)?;
        let trace_serial = self.cursor.read_u32()?;
        let class_id = self.cursor.read_id(self.id_size)?;
        let fields_size = self.cursor.read_u32()?;
        let fields_offset = self.cursor.position();
        self.cursor.skip(fields_size as usize)?;
        self.insert_node(HeapObject::Instance(ClassInstance {
            object_id,
            class_id,
            fields_offset,
            fields_size,
            trace_serial,
        }))
    }

    fn parse_object_array_dump(&mut self) -> Result<()> {
        let object_id = self.cursor.read_id(self.id_size)?;
        let trace_serial = self.cursor.read_u32()?;
        let length = self.cursor.read_u32()?;
        let class_id = self.cursor.read_id(self.id_size)?;
        let payload_offset = self.cursor.position();
        let payload_len = (length as usize)
            .checked_mul(self.id_size.bytes())
            .ok_or_else(|| {
                HeapscopeError::Format("Array payload length overflows address space".into())
            })?;
        self.cursor.skip(payload_len)?;
        self.insert_node(HeapObject::Array(ArrayInstance {
            object_id,
            class_id,
            element_type: FieldType::Object,
            length,
            payload_offset,
            trace_serial,
        }))
    }

    fn parse_primitive_array_dump(&mut self, nodata: bool) -> Result<()> {
        let object_id = self.cursor.read_id(self.id_size)?;
        let trace_serial = self.cursor.read_u32()?;
        let length = self.cursor.read_u32()?;
        let element_type = FieldType::from_tag(self.cursor.read_u8()?)?;
        if element_type.is_reference() {
            return Err(HeapscopeError::Format(format!(
                "Primitive array 0x{object_id:x} declares a reference element type"
            )));
        }
        let payload_offset = self.cursor.position();
        let length = if nodata {
            // The compact Android form records the count but ships no
            // payload; expose it as an empty array of the declared type.
            0
        } else {
            let payload_len = (length as usize)
                .checked_mul(element_type.width(self.id_size))
                .ok_or_else(|| {
                    HeapscopeError::Format("Array payload length overflows address space".into())
                })?;
            self.cursor.skip(payload_len)?;
            length
        };
        self.insert_node(HeapObject::Array(ArrayInstance {
            object_id,
            class_id: 0,
            element_type,
            length,
            payload_offset,
            trace_serial,
        }))
    }

    /// Registers a node, keeping handles stable when an id is redefined.
    ///
    /// Later records for an id already seen overwrite the node in place, so
    /// any `NodeId` handed out earlier keeps pointing at that object.
    fn insert_node(&mut self, node: HeapObject) -> Result<()> {
        let object_id = node.object_id();
        match self.index.entry(object_id) {
            Entry::Occupied(slot) => {
                debug!("object 0x{object_id:x} redefined; keeping the newest record");
                self.nodes[slot.get().index()] = node;
            }
            Entry::Vacant(slot) => {
                let raw = u32::try_from(self.nodes.len()).map_err(|_| {
                    HeapscopeError::Format(
                        "Dump holds more objects than the graph can index".into(),
                    )
                })?;
                slot.insert(NodeId::new(raw));
                self.nodes.push(node);
            }
        }
        Ok(())
    }
}

// --- POST-PASS VALIDATION ---

fn class_definition<'n>(
    nodes: &'n [HeapObject],
    index: &IdMap<NodeId>,
    class_id: u64,
) -> Option<&'n ClassDefinition> {
    match index.get(&class_id).map(|id| &nodes[id.index()]) {
        Some(HeapObject::Class(def)) => Some(def),
        _ => None,
    }
}

/// Verifies the invariants materialization assumes: every instance and object
/// array resolves to a class definition, and no superclass chain cycles.
fn validate(nodes: &[HeapObject], index: &IdMap<NodeId>) -> Result<()> {
    for node in nodes {
        match node {
            HeapObject::Instance(ci) => {
                if class_definition(nodes, index, ci.class_id).is_none() {
                    return Err(HeapscopeError::Format(format!(
                        "Instance 0x{:x} references unknown class id 0x{:x}",
                        ci.object_id, ci.class_id
                    )));
                }
            }
            HeapObject::Array(a) if a.class_id != 0 => {
                if class_definition(nodes, index, a.class_id).is_none() {
                    return Err(HeapscopeError::Format(format!(
                        "Array 0x{:x} references unknown class id 0x{:x}",
                        a.object_id, a.class_id
                    )));
                }
            }
            HeapObject::Class(def) => {
                let mut hops = 0usize;
                let mut current = def.super_id;
                while current != 0 {
                    hops += 1;
                    if hops > nodes.len() {
                        return Err(HeapscopeError::Format(format!(
                            "Superclass chain starting at 0x{:x} does not terminate",
                            def.object_id
                        )));
                    }
                    match class_definition(nodes, index, current) {
                        Some(sup) => current = sup.super_id,
                        // An absent superclass simply ends the chain.
                        None => break,
                    }
                }
            }
            HeapObject::Array(_) => {}
        }
    }
    Ok(())
}
