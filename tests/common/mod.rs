//! Shared fixture: builds syntactically valid heap dumps in memory.

#![allow(dead_code)]

use heapscope::format;
use heapscope::FieldType;

/// Capture timestamp every built dump carries in its header.
pub const TIMESTAMP: u64 = 1_700_000_000_000;

/// Assembles a binary dump record by record.
///
/// Top-level records are emitted in call order; heap sub-records accumulate
/// separately and are flushed as a single heap-dump segment at the end.
pub struct DumpBuilder {
    id_size: u32,
    records: Vec<u8>,
    heap: Vec<u8>,
}

impl DumpBuilder {
    pub fn new() -> Self {
        Self::with_id_size(8)
    }

    pub fn with_id_size(id_size: u32) -> Self {
        DumpBuilder {
            id_size,
            records: Vec::new(),
            heap: Vec::new(),
        }
    }

    fn push_u16(buf: &mut Vec<u8>, value: u16) {
        buf.extend_from_slice(&value.to_be_bytes());
    }

    fn push_u32(buf: &mut Vec<u8>, value: u32) {
        buf.extend_from_slice(&value.to_be_bytes());
    }

    fn push_u64(buf: &mut Vec<u8>, value: u64) {
        buf.extend_from_slice(&value.to_be_bytes());
    }

    fn push_id(&self, buf: &mut Vec<u8>, id: u64) {
        if self.id_size == 4 {
            Self::push_u32(buf, id as u32);
        } else {
            Self::push_u64(buf, id);
        }
    }

    fn heap_id(&mut self, id: u64) {
        if self.id_size == 4 {
            Self::push_u32(&mut self.heap, id as u32);
        } else {
            Self::push_u64(&mut self.heap, id);
        }
    }

    /// Encodes reference ids at the builder's id width, for instance payloads.
    pub fn refs(&self, ids: &[u64]) -> Vec<u8> {
        let mut buf = Vec::new();
        for &id in ids {
            self.push_id(&mut buf, id);
        }
        buf
    }

    // --- TOP-LEVEL RECORDS ---

    /// Appends a raw record with the given tag; the length field is derived.
    pub fn record(&mut self, tag: u8, payload: &[u8]) -> &mut Self {
        self.records.push(tag);
        Self::push_u32(&mut self.records, 0);
        Self::push_u32(&mut self.records, payload.len() as u32);
        self.records.extend_from_slice(payload);
        self
    }

    pub fn string(&mut self, id: u64, text: &str) -> &mut Self {
        let mut payload = Vec::new();
        self.push_id(&mut payload, id);
        payload.extend_from_slice(text.as_bytes());
        self.record(format::TAG_STRING, &payload)
    }

    pub fn load_class(&mut self, serial: u32, class_id: u64, name_id: u64) -> &mut Self {
        let mut payload = Vec::new();
        Self::push_u32(&mut payload, serial);
        self.push_id(&mut payload, class_id);
        Self::push_u32(&mut payload, 0);
        self.push_id(&mut payload, name_id);
        self.record(format::TAG_LOAD_CLASS, &payload)
    }

    pub fn stack_frame(
        &mut self,
        frame_id: u64,
        method_id: u64,
        source_id: u64,
        class_serial: u32,
        line: i32,
    ) -> &mut Self {
        let mut payload = Vec::new();
        self.push_id(&mut payload, frame_id);
        self.push_id(&mut payload, method_id);
        self.push_id(&mut payload, 0);
        self.push_id(&mut payload, source_id);
        Self::push_u32(&mut payload, class_serial);
        Self::push_u32(&mut payload, line as u32);
        self.record(format::TAG_STACK_FRAME, &payload)
    }

    pub fn stack_trace(&mut self, serial: u32, thread_serial: u32, frame_ids: &[u64]) -> &mut Self {
        let mut payload = Vec::new();
        Self::push_u32(&mut payload, serial);
        Self::push_u32(&mut payload, thread_serial);
        Self::push_u32(&mut payload, frame_ids.len() as u32);
        for &frame_id in frame_ids {
            self.push_id(&mut payload, frame_id);
        }
        self.record(format::TAG_STACK_TRACE, &payload)
    }

    // --- HEAP SUB-RECORDS ---

    /// Appends raw bytes to the heap segment, for malformed-input tests.
    pub fn heap_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.heap.extend_from_slice(bytes);
        self
    }

    /// Adds a root whose sub-record carries no trailing context words.
    pub fn root(&mut self, sub_tag: u8, id: u64) -> &mut Self {
        self.heap.push(sub_tag);
        self.heap_id(id);
        self
    }

    pub fn root_jni_global(&mut self, id: u64, ref_id: u64) -> &mut Self {
        self.heap.push(format::SUB_ROOT_JNI_GLOBAL);
        self.heap_id(id);
        self.heap_id(ref_id);
        self
    }

    pub fn root_thread_object(&mut self, id: u64, thread_serial: u32, stack_serial: u32) -> &mut Self {
        self.heap.push(format::SUB_ROOT_THREAD_OBJECT);
        self.heap_id(id);
        Self::push_u32(&mut self.heap, thread_serial);
        Self::push_u32(&mut self.heap, stack_serial);
        self
    }

    pub fn root_java_frame(&mut self, id: u64, thread_serial: u32, frame_no: u32) -> &mut Self {
        self.heap.push(format::SUB_ROOT_JAVA_FRAME);
        self.heap_id(id);
        Self::push_u32(&mut self.heap, thread_serial);
        Self::push_u32(&mut self.heap, frame_no);
        self
    }

    /// Adds a class dump. Statics are `(name string id, target object id)`
    /// reference pairs; field declarations are `(name string id, type tag)`.
    pub fn class_dump(
        &mut self,
        id: u64,
        super_id: u64,
        instance_size: u32,
        static_refs: &[(u64, u64)],
        field_decls: &[(u64, u8)],
    ) -> &mut Self {
        self.heap.push(format::SUB_CLASS_DUMP);
        self.heap_id(id);
        Self::push_u32(&mut self.heap, 0);
        self.heap_id(super_id);
        // Loader, signers, protection domain and two reserved slots.
        for _ in 0..5 {
            self.heap_id(0);
        }
        Self::push_u32(&mut self.heap, instance_size);
        Self::push_u16(&mut self.heap, 0);
        Self::push_u16(&mut self.heap, static_refs.len() as u16);
        for &(name_id, target) in static_refs {
            self.heap_id(name_id);
            self.heap.push(FieldType::Object as u8);
            self.heap_id(target);
        }
        Self::push_u16(&mut self.heap, field_decls.len() as u16);
        for &(name_id, type_tag) in field_decls {
            self.heap_id(name_id);
            self.heap.push(type_tag);
        }
        self
    }

    pub fn instance_dump(
        &mut self,
        id: u64,
        class_id: u64,
        trace_serial: u32,
        field_bytes: &[u8],
    ) -> &mut Self {
        self.heap.push(format::SUB_INSTANCE_DUMP);
        self.heap_id(id);
        Self::push_u32(&mut self.heap, trace_serial);
        self.heap_id(class_id);
        Self::push_u32(&mut self.heap, field_bytes.len() as u32);
        self.heap.extend_from_slice(field_bytes);
        self
    }

    pub fn object_array_dump(&mut self, id: u64, class_id: u64, elements: &[u64]) -> &mut Self {
        self.heap.push(format::SUB_OBJECT_ARRAY_DUMP);
        self.heap_id(id);
        Self::push_u32(&mut self.heap, 0);
        Self::push_u32(&mut self.heap, elements.len() as u32);
        self.heap_id(class_id);
        for &element in elements {
            self.heap_id(element);
        }
        self
    }

    /// Adds a primitive array; `payload` is the pre-encoded big-endian data.
    pub fn primitive_array_dump(
        &mut self,
        id: u64,
        type_tag: u8,
        count: u32,
        payload: &[u8],
    ) -> &mut Self {
        self.heap.push(format::SUB_PRIMITIVE_ARRAY_DUMP);
        self.heap_id(id);
        Self::push_u32(&mut self.heap, 0);
        Self::push_u32(&mut self.heap, count);
        self.heap.push(type_tag);
        self.heap.extend_from_slice(payload);
        self
    }

    /// Adds the compact no-payload primitive array form.
    pub fn primitive_array_nodata(&mut self, id: u64, type_tag: u8, count: u32) -> &mut Self {
        self.heap.push(format::SUB_PRIMITIVE_ARRAY_NODATA);
        self.heap_id(id);
        Self::push_u32(&mut self.heap, 0);
        Self::push_u32(&mut self.heap, count);
        self.heap.push(type_tag);
        self
    }

    // --- ASSEMBLY ---

    pub fn build(self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"JAVA PROFILE 1.0.3\0");
        Self::push_u32(&mut out, self.id_size);
        Self::push_u64(&mut out, TIMESTAMP);
        out.extend_from_slice(&self.records);
        if !self.heap.is_empty() {
            out.push(format::TAG_HEAP_DUMP_SEGMENT);
            Self::push_u32(&mut out, 0);
            Self::push_u32(&mut out, self.heap.len() as u32);
            out.extend_from_slice(&self.heap);
            out.push(format::TAG_HEAP_DUMP_END);
            Self::push_u32(&mut out, 0);
            Self::push_u32(&mut out, 0);
        }
        out
    }
}
