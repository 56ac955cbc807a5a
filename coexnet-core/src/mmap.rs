//! Memory-mapped file access for random reads of finished matrix files.

use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

use crate::{CoexError, Result};

/// A read-only memory-mapped file.
pub struct MappedFile {
    _file: File,
    mmap: Mmap,
}

impl MappedFile {
    /// Open and memory-map a file.
    ///
    /// # Safety
    ///
    /// The caller must ensure that the file is not truncated by another
    /// process while the mapping is active. Matrix files are append-only and
    /// readers open them after the writer has flushed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            CoexError::Io(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        // SAFETY: We hold the File open for the lifetime of the mapping.
        let mmap = unsafe { Mmap::map(&file) }?;
        Ok(Self { _file: file, mmap })
    }

    /// The mapped bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    /// A bounds-checked view of `len` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        self.mmap.get(offset..end)
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Whether the mapped region is empty.
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl AsRef<[u8]> for MappedFile {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
