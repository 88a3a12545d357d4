//! The random-access byte source backing a decoded snapshot.
//!
//! Handles memory-mapping the dump file (or wrapping an in-memory buffer)
//! and hands out independent bounds-checked cursors for sequential reads.
//! Lazy field materialization pulls from here for the whole lifetime of a
//! snapshot, so the source stays open as long as the snapshot does.

use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use crate::error::{HeapscopeError, Result};
use crate::format::IdSize;

/// Backing storage for an open dump.
///
/// Cloning is cheap (the underlying buffer is shared); every clone reads the
/// same bytes. Cursors from different clones or threads never interfere, as
/// each cursor owns its position.
#[derive(Debug, Clone)]
pub struct ByteSource {
    data: SourceData,
}

#[derive(Debug, Clone)]
enum SourceData {
    Mapped(Arc<Mmap>),
    Memory(Arc<Vec<u8>>),
}

impl ByteSource {
    /// Memory-maps a dump file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size == 0 {
            return Err(HeapscopeError::Format("Empty dump file".into()));
        }

        // Safety: Mmap is fundamentally unsafe as external processes could modify the file.
        // We assume exclusive access or accept the risk for performance (standard practice).
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };

        Ok(Self {
            data: SourceData::Mapped(Arc::new(mmap)),
        })
    }

    /// Wraps an in-memory dump, e.g. one received over a socket or built by a test.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            data: SourceData::Memory(Arc::new(bytes)),
        }
    }

    /// Total size of the dump in bytes.
    pub fn len(&self) -> u64 {
        self.as_slice().len() as u64
    }

    /// True when the dump holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    fn as_slice(&self) -> &[u8] {
        match &self.data {
            SourceData::Mapped(m) => m,
            SourceData::Memory(v) => v,
        }
    }

    /// Borrowed view of a sub-range, for zero-copy array payloads.
    pub fn slice(&self, offset: u64, len: usize) -> Result<&[u8]> {
        let data = self.as_slice();
        let start = offset as usize;
        let end = start
            .checked_add(len)
            .ok_or_else(|| HeapscopeError::Format("Slice length overflows address space".into()))?;
        data.get(start..end).ok_or_else(|| {
            HeapscopeError::Format(format!(
                "Read of {len} bytes at offset {offset} exceeds dump bounds ({} bytes)",
                data.len()
            ))
        })
    }

    /// A cursor positioned at the start of the dump.
    pub fn cursor(&self) -> SourceCursor<'_> {
        self.cursor_at(0)
    }

    /// An independent cursor positioned at `offset`.
    ///
    /// Positioning never fails; the first out-of-bounds read does.
    pub fn cursor_at(&self, offset: u64) -> SourceCursor<'_> {
        SourceCursor {
            data: self.as_slice(),
            pos: offset as usize,
        }
    }
}

/// A bounds-checked reading position over a [`ByteSource`].
///
/// All multi-byte reads are big-endian, matching the dump format. A cursor is
/// a plain value: clone it freely, but give each reader its own instead of
/// sharing one across threads.
#[derive(Debug, Clone)]
pub struct SourceCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> SourceCursor<'a> {
    /// Current absolute offset.
    pub fn position(&self) -> u64 {
        self.pos as u64
    }

    /// Moves the cursor to an absolute offset.
    pub fn seek(&mut self, offset: u64) {
        self.pos = offset as usize;
    }

    /// Bytes between the cursor and the end of the source.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Consumes exactly `n` bytes, failing on truncation.
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or_else(|| {
            HeapscopeError::Format("Read length overflows address space".into())
        })?;
        let bytes = self.data.get(self.pos..end).ok_or_else(|| {
            HeapscopeError::Format(format!(
                "Truncated read: {n} bytes at offset {} exceed dump bounds ({} bytes)",
                self.pos,
                self.data.len()
            ))
        })?;
        self.pos = end;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Reads a big-endian u16.
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.read_array::<2>()?))
    }

    /// Reads a big-endian u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.read_array::<4>()?))
    }

    /// Reads a big-endian u64.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.read_array::<8>()?))
    }

    /// Reads one reference id at the header-declared width, widened to u64.
    pub fn read_id(&mut self, id_size: IdSize) -> Result<u64> {
        match id_size {
            IdSize::Four => Ok(u64::from(self.read_u32()?)),
            IdSize::Eight => self.read_u64(),
        }
    }

    /// Borrows the next `len` bytes without copying.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    /// Copies the next `buf.len()` bytes into a caller-supplied buffer.
    ///
    /// Lets callers decoding many array payloads reuse one allocation.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let bytes = self.take(buf.len())?;
        buf.copy_from_slice(bytes);
        Ok(())
    }

    /// Advances past `n` bytes, failing if that would cross the end.
    ///
    /// Skipping is how truncated payloads are caught without reading them.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    /// Reads a NUL-terminated byte run of at most `max` bytes (NUL consumed,
    /// not returned).
    pub fn read_nul_terminated(&mut self, max: usize) -> Result<&'a [u8]> {
        let window_end = self.pos.saturating_add(max).min(self.data.len());
        let window = self.data.get(self.pos..window_end).unwrap_or(&[]);
        match window.iter().position(|&b| b == 0) {
            Some(idx) => {
                let bytes = self.take(idx)?;
                self.skip(1)?;
                Ok(bytes)
            }
            None => Err(HeapscopeError::Format(
                "Unterminated string in dump header".into(),
            )),
        }
    }
}
