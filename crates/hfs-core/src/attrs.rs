//! Per-file and volume attribute accessors.
//!
//! File accessors require a held handle. Setters only change memory;
//! persist with `write_rfe_chain` (files) or `write_header` (volume).

use crate::{FileHandle, HfsObject, VolumeInfo, check_long_name};
use hfs_block::Medium;
use hfs_error::Result;
use hfs_ondisk::{FileAttributes, Rfe};
use hfs_types::{AuthLevel, ClusterIndex, PackedDate, pad_field, trim_nul_padded};

impl<M: Medium> HfsObject<M> {
    fn held_entry(&self, handle: FileHandle) -> Result<&Rfe> {
        let index = self.held_index(handle)?;
        Ok(&self.entries[index])
    }

    fn held_entry_mut(&mut self, handle: FileHandle) -> Result<&mut Rfe> {
        let index = self.held_index(handle)?;
        Ok(&mut self.entries[index])
    }

    // ── Files ────────────────────────────────────────────────────────────

    pub fn f_can_read(&self, handle: FileHandle, auth: AuthLevel) -> Result<bool> {
        Ok(self.held_entry(handle)?.attributes.can_read(auth))
    }

    pub fn f_can_write(&self, handle: FileHandle, auth: AuthLevel) -> Result<bool> {
        Ok(self.held_entry(handle)?.attributes.can_write(auth))
    }

    pub fn f_can_execute(&self, handle: FileHandle, auth: AuthLevel) -> Result<bool> {
        Ok(self.held_entry(handle)?.attributes.can_execute(auth))
    }

    pub fn f_is_hidden(&self, handle: FileHandle) -> Result<bool> {
        Ok(self.held_entry(handle)?.attributes.is_hidden())
    }

    /// Set with the presence tag's directory bit. Nested directories are
    /// not supported; the flag is informational.
    pub fn f_is_directory(&self, handle: FileHandle) -> Result<bool> {
        Ok(self.held_entry(handle)?.is_directory())
    }

    pub fn f_attributes(&self, handle: FileHandle) -> Result<FileAttributes> {
        Ok(self.held_entry(handle)?.attributes)
    }

    pub fn f_creation_date(&self, handle: FileHandle) -> Result<PackedDate> {
        Ok(self.held_entry(handle)?.created)
    }

    pub fn f_modification_date(&self, handle: FileHandle) -> Result<PackedDate> {
        Ok(self.held_entry(handle)?.modified)
    }

    pub fn f_get_owner(&self, handle: FileHandle) -> Result<u8> {
        Ok(self.held_entry(handle)?.owner_id)
    }

    /// Name and extension, NUL padding stripped.
    pub fn f_get_name(&self, handle: FileHandle) -> Result<(String, String)> {
        Ok(self.held_entry(handle)?.name_parts())
    }

    /// Data clusters owned by the file.
    pub fn f_cluster_count(&self, handle: FileHandle) -> Result<u64> {
        Ok(self.held_entry(handle)?.cluster_count)
    }

    pub fn f_first_cluster(&self, handle: FileHandle) -> Result<ClusterIndex> {
        Ok(self.held_entry(handle)?.first_cluster)
    }

    pub fn f_set_read(&mut self, handle: FileHandle, auth: AuthLevel, on: bool) -> Result<()> {
        self.held_entry_mut(handle)?.attributes.set_read(auth, on);
        Ok(())
    }

    pub fn f_set_write(&mut self, handle: FileHandle, auth: AuthLevel, on: bool) -> Result<()> {
        self.held_entry_mut(handle)?.attributes.set_write(auth, on);
        Ok(())
    }

    pub fn f_set_execute(&mut self, handle: FileHandle, auth: AuthLevel, on: bool) -> Result<()> {
        self.held_entry_mut(handle)?.attributes.set_execute(auth, on);
        Ok(())
    }

    pub fn f_set_hidden(&mut self, handle: FileHandle, on: bool) -> Result<()> {
        self.held_entry_mut(handle)?.attributes.set_hidden(on);
        Ok(())
    }

    pub fn f_set_owner(&mut self, handle: FileHandle, owner_id: u8) -> Result<()> {
        self.held_entry_mut(handle)?.owner_id = owner_id;
        Ok(())
    }

    /// Truncate or zero-pad to the 12-byte name and 4-byte extension.
    pub fn f_set_name(&mut self, handle: FileHandle, name: &[u8], extension: &[u8]) -> Result<()> {
        let entry = self.held_entry_mut(handle)?;
        entry.name = pad_field(name);
        entry.extension = pad_field(extension);
        Ok(())
    }

    pub fn f_set_modification_date(&mut self, handle: FileHandle, date: PackedDate) -> Result<()> {
        self.held_entry_mut(handle)?.modified = date;
        Ok(())
    }

    // ── Volume ───────────────────────────────────────────────────────────

    #[must_use]
    pub fn vol_creation_date(&self) -> PackedDate {
        self.header.creation_date
    }

    /// Total bytes addressed by the volume.
    #[must_use]
    pub fn vol_size(&self) -> u64 {
        self.header.clusters.saturating_mul(self.header.cluster_size)
    }

    /// Bytes still allocatable.
    #[must_use]
    pub fn vol_free(&self) -> u64 {
        self.header
            .clusters_available
            .saturating_mul(self.header.cluster_size)
    }

    #[must_use]
    pub fn vol_get_name(&self) -> String {
        self.header.name_str()
    }

    pub fn vol_set_name(&mut self, name: &[u8]) {
        self.header.name = pad_field(name);
    }

    #[must_use]
    pub fn vol_long_name(&self) -> Option<String> {
        self.long_name
            .as_deref()
            .map(|name| String::from_utf8_lossy(name).into_owned())
    }

    /// Replace or clear the long name; keeps the long-name attribute bit
    /// in step.
    pub fn vol_set_long_name(&mut self, name: Option<&[u8]>) -> Result<()> {
        let name = name.filter(|name| !name.is_empty());
        if let Some(name) = name {
            check_long_name(name, self.header.cluster_size)?;
        }
        self.long_name = name.map(<[u8]>::to_vec);
        self.header.attributes.set_long_name(self.long_name.is_some());
        Ok(())
    }

    #[must_use]
    pub fn vol_get_version(&self) -> u8 {
        self.header.attributes.version()
    }

    #[must_use]
    pub fn vol_can_read(&self, auth: AuthLevel) -> bool {
        self.header.attributes.can_read(auth)
    }

    #[must_use]
    pub fn vol_can_write(&self, auth: AuthLevel) -> bool {
        self.header.attributes.can_write(auth)
    }

    #[must_use]
    pub fn vol_is_hidden(&self) -> bool {
        self.header.attributes.is_hidden()
    }

    pub fn vol_set_read(&mut self, auth: AuthLevel, on: bool) {
        self.header.attributes.set_read(auth, on);
    }

    pub fn vol_set_write(&mut self, auth: AuthLevel, on: bool) {
        self.header.attributes.set_write(auth, on);
    }

    pub fn vol_set_hidden(&mut self, on: bool) {
        self.header.attributes.set_hidden(on);
    }

    #[must_use]
    pub fn vol_get_owner(&self) -> u8 {
        self.header.owner_id
    }

    pub fn vol_set_owner(&mut self, owner_id: u8) {
        self.header.owner_id = owner_id;
    }

    #[must_use]
    pub fn vol_signature(&self) -> u32 {
        self.header.signature
    }

    #[must_use]
    pub fn vol_boot_signature(&self) -> [u8; 2] {
        self.header.boot_signature
    }

    #[must_use]
    pub fn is_bootable(&self) -> bool {
        self.header.is_bootable()
    }

    /// Signature is `NORD`, or neither user nor root may read.
    #[must_use]
    pub fn is_read_disabled(&self) -> bool {
        self.header.is_nord() || self.header.attributes.is_unreadable()
    }

    #[must_use]
    pub fn volume_info(&self) -> VolumeInfo {
        VolumeInfo {
            name: trim_nul_padded(&self.header.name),
            long_name: self.vol_long_name(),
            signature: self.header.signature,
            byte_order: self.header.byte_order,
            version: self.vol_get_version(),
            attributes: self.header.attributes,
            owner_id: self.header.owner_id,
            created: self.header.creation_date,
            cluster_size: self.header.cluster_size,
            clusters: self.header.clusters,
            clusters_available: self.header.clusters_available,
            next_alloc: self.header.next_alloc,
            size_bytes: self.vol_size(),
            boot_signature: self.header.boot_signature,
            bootable: self.is_bootable(),
            read_disabled: self.is_read_disabled(),
            entries: self.entries.iter().filter(|entry| entry.is_live()).count(),
            directory_clusters: self.dir_clusters.len(),
        }
    }

    /// Snapshot of a locked entry.
    pub fn f_info(&self, handle: FileHandle) -> Result<crate::EntryInfo> {
        let index = self.held_index(handle)?;
        Ok(self.entry_info(index, &self.entries[index]))
    }
}
