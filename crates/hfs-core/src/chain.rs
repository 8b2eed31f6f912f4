//! Directory chain: loading, persisting and growing the RFE sequence.
//!
//! The root directory starts at cluster 1. Each directory cluster ends in a
//! chain record; records link the clusters in order and the last one holds
//! [`ClusterIndex::END`]. A cluster may instead end the chain with an entry
//! flagged is-last and no chain record.

use crate::{EntryInfo, FileHandle, HfsObject, parse_error_to_hfs};
use hfs_block::Medium;
use hfs_error::{HfsError, Result};
use hfs_ondisk::dir::OFF_PRESENCE;
use hfs_ondisk::{
    DirSlot, FileAttributes, Rfe, encode_dir_cluster, entries_per_cluster, slots_per_cluster,
};
use hfs_types::{ClusterIndex, PackedDate, ParseError, RFE_SIZE, ROOT_DIR_CLUSTER};
use tracing::debug;

impl<M: Medium> HfsObject<M> {
    /// Walk the directory chain from the root cluster and replace the
    /// in-memory listing.
    ///
    /// On any error the previous listing is kept. Locks survive a
    /// successful load; only locks on entries that are gone or no longer
    /// live are dropped.
    pub fn read_rfe_chain(&mut self) -> Result<()> {
        let slots = slots_per_cluster(self.header.cluster_size);
        let order = self.header.byte_order;
        let mut entries = Vec::new();
        let mut clusters = Vec::new();
        let mut terminal_seen = false;
        let mut current = ROOT_DIR_CLUSTER;

        loop {
            if clusters.len() as u64 >= self.header.clusters {
                return Err(HfsError::RfeNoEnd {
                    cluster: current.0,
                    detail: format!("more than {} directory hops", self.header.clusters),
                });
            }
            clusters.push(current);
            let raw = self.read_cluster(current)?;

            let mut next = None;
            for (slot_index, slot) in raw.chunks_exact(RFE_SIZE).take(slots).enumerate() {
                match DirSlot::parse_from_bytes(slot, order) {
                    Ok(DirSlot::Free) => {}
                    Ok(DirSlot::Entry(rfe)) => {
                        if !terminal_seen {
                            terminal_seen = rfe.is_last;
                            entries.push(rfe);
                        }
                    }
                    Ok(DirSlot::Chain(record)) => {
                        next = Some(record.next);
                        break;
                    }
                    Err(err) => return Err(slot_error(&err, current, slot_index, slot)),
                }
            }

            match next {
                Some(ClusterIndex::END) => break,
                None if terminal_seen => break,
                None => {
                    return Err(HfsError::RfeNoEnd {
                        cluster: current.0,
                        detail: "cluster has no chain record and no last entry".into(),
                    });
                }
                Some(link) if !self.is_allocated(link) => {
                    return Err(HfsError::RfeNoEnd {
                        cluster: current.0,
                        detail: format!("chain link to unallocated cluster {link}"),
                    });
                }
                Some(link) => current = link,
            }
        }

        debug!(
            entries = entries.len(),
            clusters = clusters.len(),
            "directory chain loaded"
        );
        self.entries = entries;
        self.dir_clusters = clusters;
        self.chain_loaded = true;
        let before = self.locks.len();
        let live = &self.entries;
        self.locks
            .retain(|index| live.get(index).is_some_and(Rfe::is_live));
        if self.locks.len() != before {
            debug!(
                dropped = before - self.locks.len(),
                "locks on vanished entries released"
            );
        }
        Ok(())
    }

    /// Re-encode the in-memory listing across the known chain clusters.
    ///
    /// Only the final entry is flagged is-last; unused slots are written
    /// free. The chain is neither grown nor shrunk, so a listing larger
    /// than its capacity fails with `DataNoSpace` before any write.
    pub fn write_rfe_chain(&mut self) -> Result<()> {
        self.ensure_chain_loaded()?;
        let per_cluster = entries_per_cluster(self.header.cluster_size);
        let capacity = per_cluster.saturating_mul(self.dir_clusters.len());
        if self.entries.len() > capacity {
            return Err(HfsError::DataNoSpace);
        }

        let last = self.entries.len().checked_sub(1);
        for (index, entry) in self.entries.iter_mut().enumerate() {
            entry.is_last = Some(index) == last;
        }

        // Tail first, so no record ever links to a cluster not yet written.
        for position in (0..self.dir_clusters.len()).rev() {
            let start = (position * per_cluster).min(self.entries.len());
            let end = (start + per_cluster).min(self.entries.len());
            let next = self
                .dir_clusters
                .get(position + 1)
                .copied()
                .unwrap_or(ClusterIndex::END);
            let cluster = self.dir_clusters[position];
            let bytes = encode_dir_cluster(
                self.header.cluster_size,
                &self.entries[start..end],
                next,
                self.header.byte_order,
            )
            .map_err(|e| parse_error_to_hfs(&e, cluster.0))?;
            self.write_cluster(cluster, &bytes)?;
        }
        self.medium.sync()?;
        debug!(
            entries = self.entries.len(),
            clusters = self.dir_clusters.len(),
            "directory chain written"
        );
        Ok(())
    }

    /// Append a live, empty file entry and persist header and chain.
    ///
    /// Grows the chain by one cluster when it is full. Returns the new
    /// entry's index.
    pub fn add_file(
        &mut self,
        name: &[u8],
        extension: &[u8],
        attributes: FileAttributes,
        owner_id: u8,
    ) -> Result<usize> {
        self.ensure_chain_loaded()?;
        let capacity = entries_per_cluster(self.header.cluster_size)
            .saturating_mul(self.dir_clusters.len());
        if self.entries.len() >= capacity {
            let cluster = self.allocate_cluster()?;
            self.dir_clusters.push(cluster);
            debug!(cluster = cluster.0, "directory chain extended");
        }

        let index = self.entries.len();
        self.entries.push(Rfe::new_file(
            name,
            extension,
            attributes,
            owner_id,
            PackedDate::today(),
        ));
        self.write_header()?;
        self.write_rfe_chain()?;
        debug!(index, name = %self.entries[index].display_name(), "file added");
        Ok(index)
    }

    /// Mark a locked entry deleted, release its lock and persist the chain.
    ///
    /// The slot stays occupied so other handles keep their indices. Data
    /// clusters are not returned to the allocator.
    pub fn delete_file(&mut self, handle: FileHandle) -> Result<()> {
        let index = self.held_index(handle)?;
        let entry = &mut self.entries[index];
        entry.presence = entry.presence.deleted();
        self.locks.release(index);
        self.write_rfe_chain()?;
        debug!(index, "file deleted");
        Ok(())
    }

    /// Index of the live entry matching `name`/`extension` after on-disk
    /// truncation.
    #[must_use]
    pub fn find(&self, name: &[u8], extension: &[u8]) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| entry.is_live() && entry.matches(name, extension))
    }

    /// Live entries in chain order; hidden ones only when asked.
    #[must_use]
    pub fn list(&self, include_hidden: bool) -> Vec<EntryInfo> {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_live())
            .filter(|(_, entry)| include_hidden || !entry.attributes.is_hidden())
            .map(|(index, entry)| self.entry_info(index, entry))
            .collect()
    }

    /// Number of entries in the listing, deleted ones included.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Directory clusters in chain order.
    #[must_use]
    pub fn directory_clusters(&self) -> &[ClusterIndex] {
        &self.dir_clusters
    }

    pub(crate) fn entry_info(&self, index: usize, entry: &Rfe) -> EntryInfo {
        let (name, extension) = entry.name_parts();
        EntryInfo {
            index,
            name,
            extension,
            display_name: entry.display_name(),
            attributes: entry.attributes,
            directory: entry.is_directory(),
            hidden: entry.attributes.is_hidden(),
            cluster_count: entry.cluster_count,
            allocated_bytes: entry.cluster_count.saturating_mul(self.payload_size()),
            first_cluster: entry.first_cluster,
            created: entry.created,
            modified: entry.modified,
            owner_id: entry.owner_id,
            locked: self.locks.contains(index),
        }
    }

    fn ensure_chain_loaded(&mut self) -> Result<()> {
        if self.chain_loaded {
            Ok(())
        } else {
            self.read_rfe_chain()
        }
    }
}

fn slot_error(err: &ParseError, cluster: ClusterIndex, slot_index: usize, slot: &[u8]) -> HfsError {
    match err {
        ParseError::InvalidField {
            field: "presence", ..
        } => HfsError::InvalidPresenceSegment {
            cluster: cluster.0,
            slot: slot_index,
            tag: slot.get(OFF_PRESENCE).copied().unwrap_or_default(),
        },
        other => parse_error_to_hfs(other, cluster.0),
    }
}
