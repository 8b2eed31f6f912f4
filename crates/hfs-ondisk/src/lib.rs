#![forbid(unsafe_code)]
//! On-disk format codec for HyperFS volumes.
//!
//! Pure encoding crate with no I/O. Turns byte slices into the header,
//! directory slot and attribute types and back, honouring the volume byte
//! order declared by the header's direction marker.

pub mod attr;
pub mod dir;
pub mod header;

pub use attr::{FileAttributes, VolumeAttributes};
pub use dir::{
    ChainEntry, DirSlot, PresenceTag, Rfe, encode_dir_cluster, entries_per_cluster,
    slots_per_cluster,
};
pub use header::{HfsHeader, encode_long_name, parse_long_name};
