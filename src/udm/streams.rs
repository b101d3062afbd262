//! Backing buffer of a loaded document.
//!
//! Supports both memory-mapped files and owned buffers (decompressed payloads,
//! documents read from a content stream). Lazy array views keep an `Arc` to
//! the streams and read their payload on demand.

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::Mmap;

use crate::util::{Error, Result};

/// Input bytes of one document.
pub struct IStreams {
    inner: StreamsInner,
    /// Number of payload reads served (tree construction excluded).
    reads: AtomicU64,
}

enum StreamsInner {
    /// Memory-mapped file (preferred for large files)
    Mmap(Mmap),
    /// Owned bytes
    Memory(Vec<u8>),
}

impl IStreams {
    /// Open a file, memory-mapping it when the `mmap` feature is on.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_opts(path, cfg!(feature = "mmap"))
    }

    /// Open a file with optional memory mapping.
    pub fn open_opts(path: impl AsRef<Path>, use_mmap: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(path.display().to_string())
            } else {
                Error::Io(e)
            }
        })?;

        let size = file.metadata()?.len();
        let inner = if use_mmap && size > 0 {
            // Safety: the map is read-only and owned by this value
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MmapFailed(e.to_string()))?;
            StreamsInner::Mmap(mmap)
        } else {
            StreamsInner::Memory(std::fs::read(path)?)
        };

        Ok(Self::with_inner(inner))
    }

    /// Wrap an owned buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::with_inner(StreamsInner::Memory(bytes))
    }

    fn with_inner(inner: StreamsInner) -> Self {
        Self {
            inner,
            reads: AtomicU64::new(0),
        }
    }

    /// Check if the buffer is memory-mapped.
    #[inline]
    pub fn is_mapped(&self) -> bool {
        matches!(self.inner, StreamsInner::Mmap(_))
    }

    /// Get the total size.
    #[inline]
    pub fn size(&self) -> u64 {
        self.as_slice().len() as u64
    }

    /// Whole buffer, used by tree construction.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        match &self.inner {
            StreamsInner::Mmap(mmap) => mmap,
            StreamsInner::Memory(bytes) => bytes,
        }
    }

    /// Borrow `len` bytes at `pos`, counting the access.
    pub fn slice(&self, pos: u64, len: usize) -> Result<&[u8]> {
        let size = self.size();
        let end = pos.checked_add(len as u64).filter(|&end| end <= size).ok_or(Error::OutOfBounds {
            pos,
            len: len as u64,
            size,
        })?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(&self.as_slice()[pos as usize..end as usize])
    }

    /// Read bytes at a specific position.
    pub fn read_bytes(&self, pos: u64, len: usize) -> Result<Vec<u8>> {
        self.slice(pos, len).map(<[u8]>::to_vec)
    }

    /// How many payload reads were served so far.
    #[inline]
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for IStreams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IStreams")
            .field("mapped", &self.is_mapped())
            .field("size", &self.size())
            .field("reads", &self.read_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_counts_reads() {
        let streams = IStreams::from_bytes(vec![1, 2, 3, 4]);
        assert_eq!(streams.read_count(), 0);
        assert_eq!(streams.slice(1, 2).unwrap(), &[2, 3]);
        assert_eq!(streams.read_bytes(0, 4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(streams.read_count(), 2);
    }

    #[test]
    fn test_out_of_bounds() {
        let streams = IStreams::from_bytes(vec![0; 4]);
        assert!(matches!(streams.slice(3, 2), Err(Error::OutOfBounds { pos: 3, len: 2, size: 4 })));
        assert!(matches!(streams.slice(u64::MAX, 1), Err(Error::OutOfBounds { .. })));
        assert_eq!(streams.read_count(), 0);
    }

    #[test]
    fn test_open_missing_file() {
        let err = IStreams::open("/definitely/not/here.pmdl_b").unwrap_err();
        assert!(err.is_not_found());
    }
}
