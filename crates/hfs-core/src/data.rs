//! File payload I/O through chained data clusters.
//!
//! A data cluster carries `cluster_size - 8` payload bytes followed by the
//! index of the next cluster in the file (or `END`). A file's payload
//! stream is the concatenation of its clusters' payloads; transfers address
//! it by byte position and may touch at most two adjacent clusters.

use crate::{FileHandle, HfsObject};
use hfs_block::Medium;
use hfs_error::{HfsError, Result};
use hfs_types::{ClusterIndex, DATA_POINTER_RESERVE, PackedDate};
use tracing::{debug, trace};

/// Validated placement of one transfer.
#[derive(Debug, Clone, Copy)]
struct Span {
    index: usize,
    /// File cluster (0-based) holding the first byte.
    first: u64,
    /// File cluster holding the last byte; `first` or `first + 1`.
    last: u64,
    /// Offset of the first byte inside cluster `first`.
    offset: u64,
}

impl<M: Medium> HfsObject<M> {
    /// Write `buf` at byte `position` of a locked file.
    ///
    /// `depth` is the highest file cluster index the transfer may reach.
    /// With `extend`, one cluster is appended to the file (and header and
    /// chain persisted) before the write, so the transfer may reach one
    /// cluster past the current allocation. All checks run before any I/O.
    pub fn write_buff(
        &mut self,
        handle: FileHandle,
        buf: &[u8],
        position: u64,
        depth: u64,
        extend: bool,
    ) -> Result<usize> {
        let Some(span) = self.plan_transfer(handle, buf.len(), position, depth, extend)? else {
            return Ok(0);
        };
        if extend {
            self.extend_file(span.index)?;
        }

        let payload = self.payload_size();
        let mut cluster = self.file_cluster(span.index, span.first)?;
        let head = payload_len(buf.len()).min(payload - span.offset);
        let (first_part, rest) = buf.split_at(to_usize(head));
        let offset = self.cluster_offset(cluster)? + span.offset;
        self.write_at(offset, first_part)?;
        if !rest.is_empty() {
            cluster = self.next_data_cluster(cluster)?;
            let offset = self.cluster_offset(cluster)?;
            self.write_at(offset, rest)?;
        }

        self.entries[span.index].modified = PackedDate::today();
        trace!(
            index = span.index,
            position,
            len = buf.len(),
            clusters = span.last - span.first + 1,
            "payload written"
        );
        Ok(buf.len())
    }

    /// Read `buf.len()` bytes at byte `position` of a locked file.
    ///
    /// `depth` bounds the highest file cluster index the read may reach.
    pub fn read_buff(
        &mut self,
        handle: FileHandle,
        buf: &mut [u8],
        position: u64,
        depth: u64,
    ) -> Result<usize> {
        let Some(span) = self.plan_transfer(handle, buf.len(), position, depth, false)? else {
            return Ok(0);
        };

        let payload = self.payload_size();
        let mut cluster = self.file_cluster(span.index, span.first)?;
        let head = payload_len(buf.len()).min(payload - span.offset);
        let len = buf.len();
        let (first_part, rest) = buf.split_at_mut(to_usize(head));
        let offset = self.cluster_offset(cluster)? + span.offset;
        self.read_at(offset, first_part)?;
        if !rest.is_empty() {
            cluster = self.next_data_cluster(cluster)?;
            let offset = self.cluster_offset(cluster)?;
            self.read_at(offset, rest)?;
        }

        trace!(index = span.index, position, len, "payload read");
        Ok(len)
    }

    /// Parameter checks shared by both directions, in order: lock, buffer
    /// size, depth, allocation range, free space. `None` for an empty
    /// transfer.
    fn plan_transfer(
        &self,
        handle: FileHandle,
        len: usize,
        position: u64,
        depth: u64,
        extend: bool,
    ) -> Result<Option<Span>> {
        let index = self.held_index(handle)?;
        let payload = self.payload_size();
        let len = payload_len(len);
        if len > payload {
            return Err(HfsError::BufferTooLarge { len, max: payload });
        }
        if len == 0 {
            return Ok(None);
        }

        let end = position
            .checked_add(len - 1)
            .ok_or(HfsError::DepthTooLarge {
                needed: u64::MAX,
                depth,
            })?;
        let first = position / payload;
        let last = end / payload;
        if last > depth {
            return Err(HfsError::DepthTooLarge {
                needed: last,
                depth,
            });
        }

        let allocated = self.entries[index].cluster_count;
        let reachable = allocated.saturating_add(u64::from(extend));
        if last >= reachable {
            return Err(HfsError::FileOutOfRange {
                index: last,
                allocated,
            });
        }
        if extend && self.header.clusters_available == 0 {
            return Err(HfsError::DataNoSpace);
        }

        Ok(Some(Span {
            index,
            first,
            last,
            offset: position % payload,
        }))
    }

    /// Append one zeroed cluster to the file's chain and persist the
    /// header and directory.
    ///
    /// The current tail is resolved before anything is allocated, so a
    /// corrupt chain leaves the counters and the medium as they were.
    fn extend_file(&mut self, index: usize) -> Result<()> {
        let count = self.entries[index].cluster_count;
        let tail_cluster = match count {
            0 => None,
            n => Some(self.file_cluster(index, n - 1)?),
        };
        let mut blank = vec![0_u8; self.cluster_len()?];
        let tail = blank.len() - to_usize(DATA_POINTER_RESERVE);
        self.header
            .byte_order
            .write_u64(&mut blank, tail, ClusterIndex::END.0)
            .map_err(|e| crate::parse_error_to_hfs(&e, self.header.next_alloc.0))?;

        let cluster = self.allocate_cluster()?;
        self.write_cluster(cluster, &blank)?;
        match tail_cluster {
            None => self.entries[index].first_cluster = cluster,
            Some(last) => self.set_next_pointer(last, cluster)?,
        }
        self.entries[index].cluster_count = count + 1;

        self.write_header()?;
        self.write_rfe_chain()?;
        debug!(index, cluster = cluster.0, clusters = count + 1, "file extended");
        Ok(())
    }

    /// Absolute cluster of file cluster `nth`, following at most `nth`
    /// links.
    fn file_cluster(&mut self, index: usize, nth: u64) -> Result<ClusterIndex> {
        let mut cluster = self.entries[index].first_cluster;
        if !self.is_allocated(cluster) {
            return Err(HfsError::Corruption {
                cluster: cluster.0,
                detail: format!("entry {index} points at unallocated data cluster"),
            });
        }
        for _ in 0..nth {
            cluster = self.next_data_cluster(cluster)?;
        }
        Ok(cluster)
    }

    /// Follow the tail pointer of a data cluster. `END` or an unallocated
    /// target is corruption here, since callers only walk inside the
    /// file's allocation.
    fn next_data_cluster(&mut self, cluster: ClusterIndex) -> Result<ClusterIndex> {
        let mut raw = [0_u8; DATA_POINTER_RESERVE as usize];
        let offset = self.pointer_offset(cluster)?;
        self.read_at(offset, &mut raw)?;
        let next = ClusterIndex(
            self.header
                .byte_order
                .read_u64(&raw, 0)
                .map_err(|e| crate::parse_error_to_hfs(&e, cluster.0))?,
        );
        if !self.is_allocated(next) {
            return Err(HfsError::Corruption {
                cluster: cluster.0,
                detail: format!("data chain link to {next}"),
            });
        }
        Ok(next)
    }

    fn set_next_pointer(&mut self, cluster: ClusterIndex, next: ClusterIndex) -> Result<()> {
        let mut raw = [0_u8; DATA_POINTER_RESERVE as usize];
        self.header
            .byte_order
            .write_u64(&mut raw, 0, next.0)
            .map_err(|e| crate::parse_error_to_hfs(&e, cluster.0))?;
        let offset = self.pointer_offset(cluster)?;
        self.write_at(offset, &raw)
    }

    fn pointer_offset(&self, cluster: ClusterIndex) -> Result<u64> {
        Ok(self.cluster_offset(cluster)? + self.payload_size())
    }
}

fn payload_len(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

/// Only called with values bounded by the cluster size, which fits `usize`.
fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}
