#![forbid(unsafe_code)]
//! HyperFS public API facade.
//!
//! Re-exports the engine from `hfs-core` together with the media, codec
//! and error types a caller needs to drive it. The CLI depends on this
//! crate only.

pub use hfs_block::{FileMedium, MemMedium, Medium, MediumAccess};
pub use hfs_core::*;
pub use hfs_error::{HfsError, Result};
pub use hfs_ondisk::{FileAttributes, HfsHeader, PresenceTag, VolumeAttributes};
pub use hfs_types::{AuthLevel, ByteOrder, ClusterIndex, PackedDate};
