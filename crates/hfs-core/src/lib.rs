#![forbid(unsafe_code)]
//! HyperFS engine.
//!
//! [`HfsObject`] owns a [`Medium`] for the length of a session and provides
//! header validation and formatting, the directory chain (RFE chain), the
//! in-memory lock table, cluster-chained file data I/O, and the attribute
//! accessors. Every mutation is checked completely before the first byte is
//! written; persistence of attribute changes is explicit
//! ([`HfsObject::write_header`], [`HfsObject::write_rfe_chain`]).
//!
//! # Opening a volume
//!
//! ```no_run
//! use hfs_block::FileMedium;
//! use hfs_core::HfsObject;
//!
//! let medium = FileMedium::open("volume.hfs")?;
//! let mut volume = HfsObject::init(medium)?;
//! volume.parse()?;
//! for entry in volume.list(false) {
//!     println!("{}", entry.display_name);
//! }
//! # Ok::<(), hfs_error::HfsError>(())
//! ```

mod attrs;
mod chain;
mod data;
mod lock;

pub use lock::FileHandle;

use hfs_block::{Medium, MediumAccess};
use hfs_error::{HfsError, Result};
use hfs_ondisk::{
    FileAttributes, HfsHeader, Rfe, VolumeAttributes, encode_dir_cluster, encode_long_name,
    parse_long_name,
};
use hfs_types::{
    BLOCK_GRANULARITY, ByteOrder, ClusterIndex, DATA_POINTER_RESERVE,
    FIRST_ALLOCATABLE_CLUSTER, HEADER_RESERVED_SENTINEL, HEADER_SIZE, LONG_NAME_OFFSET,
    MAX_LONG_NAME_LEN, PackedDate, ParseError, ROOT_DIR_CLUSTER, SUPPORTED_VERSION, pad_field,
};
use lock::LockTable;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

/// Parameters for [`HfsObject::format`].
///
/// Deserializable so the CLI can load it from a JSON file. Missing fields
/// take their [`Default`] values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatOptions {
    /// Bytes per cluster, a positive multiple of 4096.
    pub cluster_size: u64,
    /// Total clusters including the header and root directory clusters.
    pub clusters: u64,
    pub signature: u32,
    /// Truncated to 12 bytes.
    pub name: String,
    pub attributes: VolumeAttributes,
    pub owner_id: u8,
    pub boot_sig_0: u8,
    pub boot_sig_1: u8,
    /// Stored after the header in cluster 0; at most 255 bytes.
    pub long_name: Option<String>,
    pub byte_order: ByteOrder,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            cluster_size: BLOCK_GRANULARITY,
            clusters: 16,
            signature: u32::from_be_bytes(*b"HFS0"),
            name: String::new(),
            attributes: VolumeAttributes::NORMAL,
            owner_id: 0,
            boot_sig_0: 0x55,
            boot_sig_1: 0xAA,
            long_name: None,
            byte_order: ByteOrder::Little,
        }
    }
}

impl FormatOptions {
    /// Neither user nor root could read the formatted volume.
    #[must_use]
    pub fn is_unreadable(&self) -> bool {
        self.attributes.is_unreadable()
    }

    fn long_name_bytes(&self) -> Option<&[u8]> {
        self.long_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .map(str::as_bytes)
    }

    /// Check every parameter without touching a medium.
    pub fn validate(&self) -> Result<()> {
        if self.boot_sig_0 == 0 || self.boot_sig_1 == 0 {
            return Err(HfsError::ZeroBootSignature);
        }
        check_cluster_size(self.cluster_size)?;
        if self.clusters < FIRST_ALLOCATABLE_CLUSTER.0 {
            return Err(HfsError::InvalidClusterInfo(format!(
                "{} clusters, need at least {}",
                self.clusters, FIRST_ALLOCATABLE_CLUSTER.0
            )));
        }
        if self.clusters.checked_mul(self.cluster_size).is_none() {
            return Err(HfsError::InvalidClusterInfo(
                "volume size overflows u64".into(),
            ));
        }
        if self.attributes.version() != SUPPORTED_VERSION {
            return Err(HfsError::UnsupportedVersion(self.attributes.version()));
        }
        if let Some(long_name) = self.long_name_bytes() {
            check_long_name(long_name, self.cluster_size)?;
        }
        Ok(())
    }
}

/// Snapshot of one directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub index: usize,
    pub name: String,
    pub extension: String,
    pub display_name: String,
    pub attributes: FileAttributes,
    pub directory: bool,
    pub hidden: bool,
    pub cluster_count: u64,
    /// Bytes reserved by the entry's data clusters (payload only).
    pub allocated_bytes: u64,
    pub first_cluster: ClusterIndex,
    pub created: PackedDate,
    pub modified: PackedDate,
    pub owner_id: u8,
    pub locked: bool,
}

/// Snapshot of the volume header plus derived values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub name: String,
    pub long_name: Option<String>,
    pub signature: u32,
    pub byte_order: ByteOrder,
    pub version: u8,
    pub attributes: VolumeAttributes,
    pub owner_id: u8,
    pub created: PackedDate,
    pub cluster_size: u64,
    pub clusters: u64,
    pub clusters_available: u64,
    pub next_alloc: ClusterIndex,
    pub size_bytes: u64,
    pub boot_signature: [u8; 2],
    pub bootable: bool,
    pub read_disabled: bool,
    pub entries: usize,
    pub directory_clusters: usize,
}

/// An open HyperFS volume.
pub struct HfsObject<M: Medium> {
    medium: M,
    header: HfsHeader,
    long_name: Option<Vec<u8>>,
    entries: Vec<Rfe>,
    dir_clusters: Vec<ClusterIndex>,
    chain_loaded: bool,
    locks: LockTable,
    position: u64,
}

impl<M: Medium> std::fmt::Debug for HfsObject<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfsObject")
            .field("header", &self.header)
            .field("entries", &self.entries.len())
            .field("dir_clusters", &self.dir_clusters)
            .field("locks", &self.locks)
            .field("position", &self.position)
            .finish_non_exhaustive()
    }
}

impl<M: Medium> HfsObject<M> {
    /// Validate the header of an existing volume.
    ///
    /// Checks the medium capabilities, then the direction marker, cluster
    /// accounting, format version and reserved sentinel, in that order. The
    /// directory is not loaded; call [`HfsObject::parse`] for that.
    pub fn init(medium: M) -> Result<Self> {
        check_bindings(medium.access())?;

        let mut raw = [0_u8; HEADER_SIZE];
        medium.read_exact_at(0, &mut raw)?;
        let header = validate_header(&raw)?;

        let mut volume = Self::from_parts(medium, header, None);
        volume.position = HEADER_SIZE as u64;
        if volume.header.attributes.has_long_name() {
            let mut blob = [0_u8; MAX_LONG_NAME_LEN + 1];
            volume.read_at(LONG_NAME_OFFSET as u64, &mut blob)?;
            let name = parse_long_name(&blob).map_err(|e| parse_error_to_hfs(&e, 0))?;
            volume.long_name = Some(name);
        }

        if volume.header.is_nord() {
            warn!(name = %volume.header.name_str(), "volume signature is NORD, reads disabled");
        }
        info!(
            name = %volume.header.name_str(),
            cluster_size = volume.header.cluster_size,
            clusters = volume.header.clusters,
            available = volume.header.clusters_available,
            byte_order = %volume.header.byte_order,
            "volume header validated"
        );
        Ok(volume)
    }

    /// Write a fresh volume: header cluster, optional long name, and an
    /// empty root directory cluster.
    ///
    /// Every parameter is validated before the medium is reset, so a
    /// rejected format leaves the medium untouched.
    pub fn format(medium: M, options: &FormatOptions) -> Result<Self> {
        options.validate()?;
        check_bindings(medium.access())?;
        if options.is_unreadable() {
            warn!(
                attributes = %options.attributes,
                "formatting a volume neither user nor root can read"
            );
        }

        let long_name = options.long_name_bytes().map(<[u8]>::to_vec);
        let mut attributes = options.attributes;
        attributes.set_long_name(long_name.is_some());

        let header = HfsHeader {
            signature: options.signature,
            byte_order: options.byte_order,
            next_alloc: FIRST_ALLOCATABLE_CLUSTER,
            cluster_size: options.cluster_size,
            clusters_available: options.clusters - FIRST_ALLOCATABLE_CLUSTER.0,
            name: pad_field(options.name.as_bytes()),
            attributes,
            creation_date: PackedDate::today(),
            owner_id: options.owner_id,
            reserved: HEADER_RESERVED_SENTINEL,
            clusters: options.clusters,
            boot_signature: [options.boot_sig_0, options.boot_sig_1],
        };

        medium.reset()?;
        let mut volume = Self::from_parts(medium, header, long_name);
        volume.write_header()?;
        let root = encode_dir_cluster(
            volume.header.cluster_size,
            &[],
            ClusterIndex::END,
            volume.header.byte_order,
        )
        .map_err(|e| parse_error_to_hfs(&e, ROOT_DIR_CLUSTER.0))?;
        volume.write_cluster(ROOT_DIR_CLUSTER, &root)?;
        volume.medium.sync()?;
        volume.dir_clusters = vec![ROOT_DIR_CLUSTER];
        volume.chain_loaded = true;

        info!(
            name = %volume.header.name_str(),
            cluster_size = volume.header.cluster_size,
            clusters = volume.header.clusters,
            byte_order = %volume.header.byte_order,
            "volume formatted"
        );
        Ok(volume)
    }

    fn from_parts(medium: M, header: HfsHeader, long_name: Option<Vec<u8>>) -> Self {
        Self {
            medium,
            header,
            long_name,
            entries: Vec::new(),
            dir_clusters: Vec::new(),
            chain_loaded: false,
            locks: LockTable::default(),
            position: 0,
        }
    }

    /// Load the directory. Equivalent to [`HfsObject::read_rfe_chain`].
    pub fn parse(&mut self) -> Result<()> {
        self.read_rfe_chain()
    }

    /// Persist the in-memory header and long-name blob.
    pub fn write_header(&mut self) -> Result<()> {
        let mut region = vec![0_u8; LONG_NAME_OFFSET + MAX_LONG_NAME_LEN + 1];
        self.header
            .encode_into(&mut region)
            .map_err(|e| parse_error_to_hfs(&e, 0))?;
        let blob = encode_long_name(self.long_name.as_deref().unwrap_or_default())
            .map_err(|e| parse_error_to_hfs(&e, 0))?;
        region.truncate(LONG_NAME_OFFSET);
        region.extend_from_slice(&blob);
        self.write_at(0, &region)?;
        trace!(
            next_alloc = self.header.next_alloc.0,
            available = self.header.clusters_available,
            "header written"
        );
        Ok(())
    }

    /// The parsed header.
    #[must_use]
    pub fn header(&self) -> &HfsHeader {
        &self.header
    }

    /// Medium offset just past the most recent transfer.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Bytes of file data stored per cluster.
    #[must_use]
    pub fn payload_size(&self) -> u64 {
        self.header.cluster_size - DATA_POINTER_RESERVE
    }

    /// Give the medium back, dropping all in-memory state and locks.
    pub fn into_medium(self) -> M {
        self.medium
    }

    // ── Medium access ────────────────────────────────────────────────────

    fn cluster_len(&self) -> Result<usize> {
        usize::try_from(self.header.cluster_size).map_err(|_| {
            HfsError::InvalidClusterInfo(format!(
                "cluster size {} exceeds the address space",
                self.header.cluster_size
            ))
        })
    }

    fn cluster_offset(&self, cluster: ClusterIndex) -> Result<u64> {
        cluster
            .byte_offset(self.header.cluster_size)
            .ok_or_else(|| HfsError::Corruption {
                cluster: cluster.0,
                detail: "cluster offset overflows u64".into(),
            })
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.medium.read_exact_at(offset, buf)?;
        self.position = offset + buf.len() as u64;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        self.medium.write_all_at(offset, buf)?;
        self.position = offset + buf.len() as u64;
        Ok(())
    }

    fn read_cluster(&mut self, cluster: ClusterIndex) -> Result<Vec<u8>> {
        let mut buf = vec![0_u8; self.cluster_len()?];
        let offset = self.cluster_offset(cluster)?;
        self.read_at(offset, &mut buf)?;
        trace!(cluster = cluster.0, "cluster read");
        Ok(buf)
    }

    fn write_cluster(&mut self, cluster: ClusterIndex, bytes: &[u8]) -> Result<()> {
        let offset = self.cluster_offset(cluster)?;
        self.write_at(offset, bytes)?;
        trace!(cluster = cluster.0, "cluster written");
        Ok(())
    }

    /// Take the next free cluster from the header counters. Memory only;
    /// the caller persists the header.
    fn allocate_cluster(&mut self) -> Result<ClusterIndex> {
        if self.header.clusters_available == 0 || self.header.next_alloc.0 >= self.header.clusters
        {
            return Err(HfsError::DataNoSpace);
        }
        let cluster = self.header.next_alloc;
        self.header.next_alloc = ClusterIndex(cluster.0 + 1);
        self.header.clusters_available -= 1;
        debug!(
            cluster = cluster.0,
            available = self.header.clusters_available,
            "cluster allocated"
        );
        Ok(cluster)
    }

    /// A cluster index some chain pointer may legally hold.
    fn is_allocated(&self, cluster: ClusterIndex) -> bool {
        cluster >= FIRST_ALLOCATABLE_CLUSTER && cluster < self.header.next_alloc
    }
}

fn check_bindings(access: MediumAccess) -> Result<()> {
    if !access.read {
        return Err(HfsError::ReadBindingMissing);
    }
    if !access.write {
        return Err(HfsError::WriteBindingMissing);
    }
    if !access.reset {
        return Err(HfsError::ResetBindingMissing);
    }
    Ok(())
}

fn check_cluster_size(cluster_size: u64) -> Result<()> {
    if cluster_size == 0 || cluster_size % BLOCK_GRANULARITY != 0 {
        return Err(HfsError::InvalidClusterInfo(format!(
            "cluster size {cluster_size} is not a positive multiple of {BLOCK_GRANULARITY}"
        )));
    }
    if usize::try_from(cluster_size).is_err() {
        return Err(HfsError::InvalidClusterInfo(format!(
            "cluster size {cluster_size} exceeds the address space"
        )));
    }
    Ok(())
}

fn check_long_name(name: &[u8], cluster_size: u64) -> Result<()> {
    if name.len() > MAX_LONG_NAME_LEN {
        return Err(HfsError::InvalidClusterInfo(format!(
            "long name is {} bytes, limit is {MAX_LONG_NAME_LEN}",
            name.len()
        )));
    }
    if (LONG_NAME_OFFSET + 1 + name.len()) as u64 > cluster_size {
        return Err(HfsError::InvalidClusterInfo(
            "long name does not fit in the header cluster".into(),
        ));
    }
    Ok(())
}

/// Header checks in the fixed order: direction, cluster info, version,
/// reserved sentinel.
fn validate_header(raw: &[u8; HEADER_SIZE]) -> Result<HfsHeader> {
    let header = HfsHeader::parse_from_bytes(raw).map_err(|e| match e {
        ParseError::InvalidField {
            field: "direction", ..
        } => HfsError::InvalidDirection([raw[4], raw[5]]),
        other => parse_error_to_hfs(&other, 0),
    })?;

    check_cluster_size(header.cluster_size)?;
    if header.clusters < FIRST_ALLOCATABLE_CLUSTER.0 {
        return Err(HfsError::InvalidClusterInfo(format!(
            "{} clusters, need at least {}",
            header.clusters, FIRST_ALLOCATABLE_CLUSTER.0
        )));
    }
    if header.next_alloc < FIRST_ALLOCATABLE_CLUSTER || header.next_alloc.0 > header.clusters {
        return Err(HfsError::InvalidClusterInfo(format!(
            "next cluster {} outside {}..={}",
            header.next_alloc, FIRST_ALLOCATABLE_CLUSTER.0, header.clusters
        )));
    }
    if header.next_alloc.0.checked_add(header.clusters_available) != Some(header.clusters) {
        return Err(HfsError::InvalidClusterInfo(format!(
            "next cluster {} + available {} != total {}",
            header.next_alloc, header.clusters_available, header.clusters
        )));
    }
    if header.volume_size().is_none() {
        return Err(HfsError::InvalidClusterInfo(
            "volume size overflows u64".into(),
        ));
    }

    let version = header.attributes.version();
    if version != SUPPORTED_VERSION {
        return Err(HfsError::UnsupportedVersion(version));
    }
    if !header.has_reserved_sentinel() {
        return Err(HfsError::NonSentinelReserved(header.reserved));
    }
    Ok(header)
}

/// Map a codec error found inside `cluster` onto the runtime error.
///
/// Direction and presence failures need the raw bytes for their variants
/// and are converted at their call sites.
fn parse_error_to_hfs(e: &ParseError, cluster: u64) -> HfsError {
    match e {
        ParseError::InvalidField { field, reason } if field.contains("cluster") => {
            HfsError::InvalidClusterInfo(format!("{field}: {reason}"))
        }
        ParseError::InvalidField { .. }
        | ParseError::InsufficientData { .. }
        | ParseError::IntegerConversion { .. } => HfsError::Corruption {
            cluster,
            detail: e.to_string(),
        },
    }
}
