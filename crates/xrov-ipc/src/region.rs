//! File-backed shared mapping for one overlay connection.

use crate::buffer::IpcBuffer;
use crate::header::HEADER_SIZE;
use crate::IpcError;
use memmap2::MmapMut;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use xrov_config::log_ipc_debug;

/// One process's mapping of a connection's shared memory.
///
/// Each call to [`SharedRegion::create_or_open`] creates an independent
/// mapping, so two regions over the same file generally live at different
/// base addresses, exactly like two processes mapping the same section.
pub struct SharedRegion {
    mmap: MmapMut,
    path: PathBuf,
}

impl SharedRegion {
    /// Create the backing file if needed, size it to at least `size`, and map it.
    pub fn create_or_open(path: &Path, size: usize) -> Result<Self, IpcError> {
        if size < HEADER_SIZE {
            return Err(IpcError::RegionTooSmall(size));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let metadata = file.metadata()?;
        if (metadata.len() as usize) < size {
            file.set_len(size as u64)?;
            log_ipc_debug!("Sized shared region", size = size as u64);
        }

        let mmap = unsafe { MmapMut::map_mut(&file)? };

        Ok(Self {
            mmap,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    /// Address of the mapping in this process.
    pub fn base(&self) -> u64 {
        self.mmap.as_ptr() as u64
    }

    /// Arena view over the whole mapping.
    pub fn buffer(&mut self) -> IpcBuffer<'_> {
        IpcBuffer::new(&mut self.mmap[..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_two_mappings_share_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conn.shm");
        let mut a = SharedRegion::create_or_open(&path, 8192).unwrap();
        let mut b = SharedRegion::create_or_open(&path, 8192).unwrap();

        a.buffer().write_u64(64, 42).unwrap();
        assert_eq!(b.buffer().read_u64(64).unwrap(), 42);
        assert_eq!(a.len(), 8192);
    }

    #[test]
    fn test_too_small_region_is_rejected() {
        let dir = tempdir().unwrap();
        let err = SharedRegion::create_or_open(&dir.path().join("tiny"), 64);
        assert!(matches!(err, Err(IpcError::RegionTooSmall(64))));
    }
}
