#![forbid(unsafe_code)]
//! Block access layer.
//!
//! Provides the `Medium` trait the engine addresses a volume through, plus
//! two concrete media: an in-memory buffer and a host file. A medium is a
//! linear byte-addressable store; the engine computes every offset itself
//! and never relies on a shared cursor.

use hfs_error::{HfsError, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Capabilities a medium exposes. The engine refuses to start on a medium
/// missing any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediumAccess {
    pub read: bool,
    pub write: bool,
    pub reset: bool,
}

impl MediumAccess {
    pub const FULL: Self = Self {
        read: true,
        write: true,
        reset: true,
    };

    pub const READ_ONLY: Self = Self {
        read: true,
        write: false,
        reset: false,
    };
}

impl Default for MediumAccess {
    fn default() -> Self {
        Self::FULL
    }
}

/// Byte-addressed backing store (pread/pwrite semantics).
pub trait Medium: Send + Sync {
    /// Read exactly `buf.len()` bytes from `offset` into `buf`.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write all bytes in `buf` at `offset`, growing the medium if needed.
    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()>;

    /// Discard all contents (truncate to empty).
    fn reset(&self) -> Result<()>;

    /// Flush pending writes to stable storage.
    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn access(&self) -> MediumAccess {
        MediumAccess::FULL
    }
}

impl<M: Medium + ?Sized> Medium for Box<M> {
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact_at(offset, buf)
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        (**self).write_all_at(offset, buf)
    }

    fn reset(&self) -> Result<()> {
        (**self).reset()
    }

    fn sync(&self) -> Result<()> {
        (**self).sync()
    }

    fn access(&self) -> MediumAccess {
        (**self).access()
    }
}

impl<M: Medium + ?Sized> Medium for &M {
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        (**self).read_exact_at(offset, buf)
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        (**self).write_all_at(offset, buf)
    }

    fn reset(&self) -> Result<()> {
        (**self).reset()
    }

    fn sync(&self) -> Result<()> {
        (**self).sync()
    }

    fn access(&self) -> MediumAccess {
        (**self).access()
    }
}

fn range_end(offset: u64, len: usize) -> Result<u64> {
    let len = u64::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length overflows u64"))?;
    offset
        .checked_add(len)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "range overflows u64").into())
}

fn denied(op: &str) -> HfsError {
    HfsError::Io(io::Error::new(
        io::ErrorKind::PermissionDenied,
        format!("{op} not permitted on this medium"),
    ))
}

/// Medium kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemMedium {
    bytes: Mutex<Vec<u8>>,
    access: MediumAccess,
}

impl MemMedium {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Mutex::new(bytes),
            access: MediumAccess::FULL,
        }
    }

    /// Restrict the advertised capabilities. Operations outside them fail
    /// with a permission error.
    #[must_use]
    pub fn with_access(mut self, access: MediumAccess) -> Self {
        self.access = access;
        self
    }

    #[must_use]
    pub fn len_bytes(&self) -> u64 {
        u64::try_from(self.bytes.lock().len()).unwrap_or(u64::MAX)
    }

    /// Copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.lock().clone()
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.bytes.into_inner()
    }
}

impl Medium for MemMedium {
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        if !self.access.read {
            return Err(denied("read"));
        }
        let end = range_end(offset, buf.len())?;
        let bytes = self.bytes.lock();
        let (Ok(start), Ok(end)) = (usize::try_from(offset), usize::try_from(end)) else {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        };
        let Some(src) = bytes.get(start..end) else {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "read out of bounds: offset={offset} len={} medium_len={}",
                    buf.len(),
                    bytes.len()
                ),
            )
            .into());
        };
        buf.copy_from_slice(src);
        Ok(())
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        if !self.access.write {
            return Err(denied("write"));
        }
        let end = range_end(offset, buf.len())?;
        let (Ok(start), Ok(end)) = (usize::try_from(offset), usize::try_from(end)) else {
            return Err(
                io::Error::new(io::ErrorKind::InvalidInput, "offset exceeds address space").into(),
            );
        };
        let mut bytes = self.bytes.lock();
        if end > bytes.len() {
            bytes.resize(end, 0);
        }
        bytes[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        if !self.access.reset {
            return Err(denied("reset"));
        }
        self.bytes.lock().clear();
        Ok(())
    }

    fn access(&self) -> MediumAccess {
        self.access
    }
}

/// File-backed medium using positional I/O.
///
/// Uses `std::os::unix::fs::FileExt`, so no seek position is shared between
/// calls. The path is kept for the lifetime of the medium so `reset` can
/// report which image it truncated.
#[derive(Debug, Clone)]
pub struct FileMedium {
    file: Arc<File>,
    path: PathBuf,
    writable: bool,
}

impl FileMedium {
    /// Open an existing image read-write, falling back to read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (file, writable) = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map(|file| (file, true))
            .or_else(|_| {
                OpenOptions::new()
                    .read(true)
                    .open(path)
                    .map(|file| (file, false))
            })?;
        Ok(Self {
            file: Arc::new(file),
            path: path.to_path_buf(),
            writable,
        })
    }

    /// Open or create an image read-write without truncating it.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self {
            file: Arc::new(file),
            path: path.to_path_buf(),
            writable: true,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len_bytes(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

impl Medium for FileMedium {
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        range_end(offset, buf.len())?;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(denied("write"));
        }
        range_end(offset, buf.len())?;
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    fn reset(&self) -> Result<()> {
        if !self.writable {
            return Err(denied("reset"));
        }
        self.file.set_len(0)?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    fn access(&self) -> MediumAccess {
        if self.writable {
            MediumAccess::FULL
        } else {
            MediumAccess::READ_ONLY
        }
    }
}
