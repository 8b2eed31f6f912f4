//! In-memory exclusive file locks.

use crate::HfsObject;
use hfs_block::Medium;
use hfs_error::{HfsError, Result};
use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroU64;
use tracing::debug;

/// Opaque handle to a locked directory entry.
///
/// Wraps the entry index plus one, so a handle is never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FileHandle(NonZeroU64);

impl FileHandle {
    /// Rebuild a handle from its raw value; `None` for zero.
    #[must_use]
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    fn from_index(index: usize) -> Option<Self> {
        u64::try_from(index)
            .ok()
            .and_then(|i| i.checked_add(1))
            .and_then(Self::new)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Directory entry index this handle refers to.
    #[must_use]
    pub fn index(self) -> usize {
        usize::try_from(self.0.get() - 1).unwrap_or(usize::MAX)
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Set of entry indices currently held.
#[derive(Debug, Default)]
pub(crate) struct LockTable {
    held: BTreeSet<usize>,
}

impl LockTable {
    /// `false` when already held.
    pub(crate) fn acquire(&mut self, index: usize) -> bool {
        self.held.insert(index)
    }

    /// `false` when not held.
    pub(crate) fn release(&mut self, index: usize) -> bool {
        self.held.remove(&index)
    }

    pub(crate) fn contains(&self, index: usize) -> bool {
        self.held.contains(&index)
    }

    /// Drop every held index for which `keep` is false.
    pub(crate) fn retain(&mut self, mut keep: impl FnMut(usize) -> bool) {
        self.held.retain(|&index| keep(index));
    }

    pub(crate) fn len(&self) -> usize {
        self.held.len()
    }
}

impl<M: Medium> HfsObject<M> {
    /// Lock the live entry matching `name`/`extension`.
    ///
    /// Returns `None` when no live entry matches or the entry is already
    /// locked.
    pub fn lock_file(&mut self, name: &[u8], extension: &[u8]) -> Option<FileHandle> {
        let index = self.find(name, extension)?;
        let handle = FileHandle::from_index(index)?;
        if !self.locks.acquire(index) {
            debug!(index, "lock refused, entry already held");
            return None;
        }
        debug!(index, "entry locked");
        Some(handle)
    }

    /// Release a held handle. Releasing a handle that is not held fails
    /// with `FileNotLocked`.
    pub fn unlock_file(&mut self, handle: FileHandle) -> Result<()> {
        if !self.locks.release(handle.index()) {
            return Err(HfsError::FileNotLocked);
        }
        debug!(index = handle.index(), "entry unlocked");
        Ok(())
    }

    #[must_use]
    pub fn is_locked(&self, handle: FileHandle) -> bool {
        self.locks.contains(handle.index())
    }

    /// Number of handles currently held.
    #[must_use]
    pub fn locked_count(&self) -> usize {
        self.locks.len()
    }

    /// Entry index behind a held handle.
    pub(crate) fn held_index(&self, handle: FileHandle) -> Result<usize> {
        let index = handle.index();
        if self.locks.contains(index) && index < self.entries.len() {
            Ok(index)
        } else {
            Err(HfsError::FileNotLocked)
        }
    }
}
