#![forbid(unsafe_code)]
//! Directory cluster slots: reserved file entries (RFEs), chain records and
//! free slots.
//!
//! Every directory cluster is an array of 40-byte slots. The final slot is
//! always a chain record pointing at the next directory cluster or at
//! [`ClusterIndex::END`]. The presence tag at byte 17 tells the slot kinds
//! apart.

use crate::attr::FileAttributes;
use hfs_types::{
    ByteOrder, ClusterIndex, EXTENSION_LEN, NAME_LEN, PackedDate, ParseError, RFE_SIZE,
    ensure_slice, pad_field, read_fixed, trim_nul_padded, write_bytes,
};
use serde::{Deserialize, Serialize};
use std::fmt;

const OFF_NAME: usize = 0;
const OFF_EXTENSION: usize = 12;
const OFF_ATTRIBUTES: usize = 16;
/// Presence tag position, shared by every slot kind.
pub const OFF_PRESENCE: usize = 17;
const OFF_CLUSTER_COUNT: usize = 18;
const OFF_CREATED: usize = 26;
const OFF_MODIFIED: usize = 28;
const OFF_OWNER: usize = 30;
const OFF_IS_LAST: usize = 31;
const OFF_FIRST_CLUSTER: usize = 32;
const OFF_CHAIN_NEXT: usize = 0;

/// Number of 40-byte slots in a directory cluster.
#[must_use]
pub fn slots_per_cluster(cluster_size: u64) -> usize {
    usize::try_from(cluster_size / RFE_SIZE as u64).unwrap_or(usize::MAX)
}

/// Slots usable by entries; the last one is reserved for the chain record.
#[must_use]
pub fn entries_per_cluster(cluster_size: u64) -> usize {
    slots_per_cluster(cluster_size).saturating_sub(1)
}

/// Presence tag byte.
///
/// `bit7` directory, `bit6` clear, `bits5..1` fixed `11111`, `bit0` live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PresenceTag(pub u8);

impl PresenceTag {
    pub const FREE: Self = Self(0x00);
    pub const CHAIN: Self = Self(0x7F);
    pub const FILE: Self = Self(0x3F);
    pub const DELETED_FILE: Self = Self(0x3E);
    pub const DIRECTORY: Self = Self(0xBF);
    pub const DELETED_DIRECTORY: Self = Self(0xBE);

    const DIRECTORY_BIT: u8 = 0x80;
    const LIVE_BIT: u8 = 0x01;
    const ENTRY_PATTERN: u8 = 0x3E;
    const ENTRY_MASK: u8 = 0x7E;

    #[must_use]
    pub fn entry(directory: bool, live: bool) -> Self {
        let mut bits = Self::ENTRY_PATTERN;
        if directory {
            bits |= Self::DIRECTORY_BIT;
        }
        if live {
            bits |= Self::LIVE_BIT;
        }
        Self(bits)
    }

    #[must_use]
    pub fn is_free(self) -> bool {
        self == Self::FREE
    }

    #[must_use]
    pub fn is_chain(self) -> bool {
        self == Self::CHAIN
    }

    /// One of the four entry encodings.
    #[must_use]
    pub fn is_entry(self) -> bool {
        self.0 & Self::ENTRY_MASK == Self::ENTRY_PATTERN
    }

    #[must_use]
    pub fn is_valid(self) -> bool {
        self.is_free() || self.is_chain() || self.is_entry()
    }

    #[must_use]
    pub fn is_directory(self) -> bool {
        self.is_entry() && self.0 & Self::DIRECTORY_BIT != 0
    }

    #[must_use]
    pub fn is_live(self) -> bool {
        self.is_entry() && self.0 & Self::LIVE_BIT != 0
    }

    #[must_use]
    pub fn deleted(self) -> Self {
        Self(self.0 & !Self::LIVE_BIT)
    }
}

impl fmt::Display for PresenceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match *self {
            Self::FREE => "free",
            Self::CHAIN => "chain",
            Self::FILE => "file",
            Self::DELETED_FILE => "deleted file",
            Self::DIRECTORY => "directory",
            Self::DELETED_DIRECTORY => "deleted directory",
            _ => "invalid",
        };
        write!(f, "{kind} ({:#04x})", self.0)
    }
}

/// Reserved file entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rfe {
    pub name: [u8; NAME_LEN],
    pub extension: [u8; EXTENSION_LEN],
    pub attributes: FileAttributes,
    pub presence: PresenceTag,
    pub cluster_count: u64,
    pub created: PackedDate,
    pub modified: PackedDate,
    pub owner_id: u8,
    pub is_last: bool,
    pub first_cluster: ClusterIndex,
}

impl Rfe {
    /// Live file with no data clusters.
    #[must_use]
    pub fn new_file(
        name: &[u8],
        extension: &[u8],
        attributes: FileAttributes,
        owner_id: u8,
        date: PackedDate,
    ) -> Self {
        Self {
            name: pad_field(name),
            extension: pad_field(extension),
            attributes,
            presence: PresenceTag::FILE,
            cluster_count: 0,
            created: date,
            modified: date,
            owner_id,
            is_last: false,
            first_cluster: ClusterIndex::END,
        }
    }

    pub fn parse_from_bytes(slot: &[u8], order: ByteOrder) -> Result<Self, ParseError> {
        let slot = ensure_slice(slot, 0, RFE_SIZE)?;
        let presence = PresenceTag(slot[OFF_PRESENCE]);
        if !presence.is_entry() {
            return Err(ParseError::InvalidField {
                field: "presence",
                reason: "not a file entry tag",
            });
        }
        Ok(Self {
            name: read_fixed::<NAME_LEN>(slot, OFF_NAME)?,
            extension: read_fixed::<EXTENSION_LEN>(slot, OFF_EXTENSION)?,
            attributes: FileAttributes(slot[OFF_ATTRIBUTES]),
            presence,
            cluster_count: order.read_u64(slot, OFF_CLUSTER_COUNT)?,
            created: PackedDate(order.read_u16(slot, OFF_CREATED)?),
            modified: PackedDate(order.read_u16(slot, OFF_MODIFIED)?),
            owner_id: slot[OFF_OWNER],
            is_last: slot[OFF_IS_LAST] != 0,
            first_cluster: ClusterIndex(order.read_u64(slot, OFF_FIRST_CLUSTER)?),
        })
    }

    pub fn encode_into(&self, slot: &mut [u8], order: ByteOrder) -> Result<(), ParseError> {
        ensure_slice(slot, 0, RFE_SIZE)?;
        write_bytes(slot, OFF_NAME, &self.name)?;
        write_bytes(slot, OFF_EXTENSION, &self.extension)?;
        slot[OFF_ATTRIBUTES] = self.attributes.bits();
        slot[OFF_PRESENCE] = self.presence.0;
        order.write_u64(slot, OFF_CLUSTER_COUNT, self.cluster_count)?;
        order.write_u16(slot, OFF_CREATED, self.created.bits())?;
        order.write_u16(slot, OFF_MODIFIED, self.modified.bits())?;
        slot[OFF_OWNER] = self.owner_id;
        slot[OFF_IS_LAST] = u8::from(self.is_last);
        order.write_u64(slot, OFF_FIRST_CLUSTER, self.first_cluster.0)
    }

    pub fn to_bytes(&self, order: ByteOrder) -> Result<[u8; RFE_SIZE], ParseError> {
        let mut out = [0_u8; RFE_SIZE];
        self.encode_into(&mut out, order)?;
        Ok(out)
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.presence.is_live()
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        self.presence.is_directory()
    }

    /// Name and extension as stored, each trimmed at the first NUL.
    ///
    /// With the long-name attribute set the two fields form a single
    /// 16-byte name and the extension comes back empty.
    #[must_use]
    pub fn name_parts(&self) -> (String, String) {
        if self.attributes.has_long_name() {
            let mut joined = [0_u8; NAME_LEN + EXTENSION_LEN];
            joined[..NAME_LEN].copy_from_slice(&self.name);
            joined[NAME_LEN..].copy_from_slice(&self.extension);
            (trim_nul_padded(&joined), String::new())
        } else {
            (trim_nul_padded(&self.name), trim_nul_padded(&self.extension))
        }
    }

    /// `name.ext`, or just the name when there is no extension.
    #[must_use]
    pub fn display_name(&self) -> String {
        match self.name_parts() {
            (name, ext) if ext.is_empty() => name,
            (name, ext) => format!("{name}.{ext}"),
        }
    }

    /// Compare against a caller-supplied name/extension after the same
    /// truncation and padding the fields get on disk.
    #[must_use]
    pub fn matches(&self, name: &[u8], extension: &[u8]) -> bool {
        self.name == pad_field::<NAME_LEN>(name)
            && self.extension == pad_field::<EXTENSION_LEN>(extension)
    }
}

/// Chain record occupying the last slot of a directory cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainEntry {
    pub next: ClusterIndex,
}

impl ChainEntry {
    pub const TERMINAL: Self = Self {
        next: ClusterIndex::END,
    };

    pub fn parse_from_bytes(slot: &[u8], order: ByteOrder) -> Result<Self, ParseError> {
        let slot = ensure_slice(slot, 0, RFE_SIZE)?;
        if !PresenceTag(slot[OFF_PRESENCE]).is_chain() {
            return Err(ParseError::InvalidField {
                field: "presence",
                reason: "not a chain record tag",
            });
        }
        Ok(Self {
            next: ClusterIndex(order.read_u64(slot, OFF_CHAIN_NEXT)?),
        })
    }

    /// Encode into a slot; every byte other than the pointer and tag is
    /// zeroed.
    pub fn encode_into(&self, slot: &mut [u8], order: ByteOrder) -> Result<(), ParseError> {
        ensure_slice(slot, 0, RFE_SIZE)?;
        slot[..RFE_SIZE].fill(0);
        order.write_u64(slot, OFF_CHAIN_NEXT, self.next.0)?;
        slot[OFF_PRESENCE] = PresenceTag::CHAIN.0;
        Ok(())
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.next.is_end()
    }
}

/// One decoded directory slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirSlot {
    Free,
    Entry(Rfe),
    Chain(ChainEntry),
}

impl DirSlot {
    /// Decode a slot by its presence tag. Unknown tags fail with an
    /// `InvalidField { field: "presence", .. }` error.
    pub fn parse_from_bytes(slot: &[u8], order: ByteOrder) -> Result<Self, ParseError> {
        let tag = PresenceTag(ensure_slice(slot, 0, RFE_SIZE)?[OFF_PRESENCE]);
        if tag.is_free() {
            Ok(Self::Free)
        } else if tag.is_chain() {
            ChainEntry::parse_from_bytes(slot, order).map(Self::Chain)
        } else if tag.is_entry() {
            Rfe::parse_from_bytes(slot, order).map(Self::Entry)
        } else {
            Err(ParseError::InvalidField {
                field: "presence",
                reason: "unknown presence tag",
            })
        }
    }
}

/// Encode a whole directory cluster: `entries` from slot 0, free slots after
/// them, and the chain record in the final slot.
pub fn encode_dir_cluster(
    cluster_size: u64,
    entries: &[Rfe],
    next: ClusterIndex,
    order: ByteOrder,
) -> Result<Vec<u8>, ParseError> {
    let len = usize::try_from(cluster_size).map_err(|_| ParseError::IntegerConversion {
        field: "cluster_size",
    })?;
    let slots = slots_per_cluster(cluster_size);
    if slots < 2 || entries.len() >= slots {
        return Err(ParseError::InvalidField {
            field: "entries",
            reason: "do not fit in one directory cluster",
        });
    }
    let mut cluster = vec![0_u8; len];
    for (index, entry) in entries.iter().enumerate() {
        let start = index * RFE_SIZE;
        entry.encode_into(&mut cluster[start..start + RFE_SIZE], order)?;
    }
    let chain_start = (slots - 1) * RFE_SIZE;
    ChainEntry { next }.encode_into(&mut cluster[chain_start..chain_start + RFE_SIZE], order)?;
    Ok(cluster)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &[u8], ext: &[u8]) -> Rfe {
        Rfe::new_file(
            name,
            ext,
            FileAttributes::NORMAL,
            3,
            PackedDate::from_ymd(2026, 2, 14),
        )
    }

    #[test]
    fn presence_tag_classification() {
        for tag in [
            PresenceTag::FILE,
            PresenceTag::DELETED_FILE,
            PresenceTag::DIRECTORY,
            PresenceTag::DELETED_DIRECTORY,
        ] {
            assert!(tag.is_entry(), "{tag}");
            assert!(!tag.is_chain() && !tag.is_free());
        }
        assert!(PresenceTag::FILE.is_live());
        assert!(!PresenceTag::DELETED_FILE.is_live());
        assert!(PresenceTag::DIRECTORY.is_directory());
        assert_eq!(PresenceTag::FILE.deleted(), PresenceTag::DELETED_FILE);
        assert_eq!(PresenceTag::entry(true, true), PresenceTag::DIRECTORY);
        assert_eq!(PresenceTag::entry(false, false), PresenceTag::DELETED_FILE);

        let valid: Vec<u8> = (0..=u8::MAX)
            .filter(|b| PresenceTag(*b).is_valid())
            .collect();
        assert_eq!(valid, vec![0x00, 0x3E, 0x3F, 0x7F, 0xBE, 0xBF]);
    }

    #[test]
    fn rfe_layout_offsets() {
        let mut rfe = entry(b"report", b"txt");
        rfe.cluster_count = 2;
        rfe.first_cluster = ClusterIndex(5);
        rfe.is_last = true;
        let bytes = rfe.to_bytes(ByteOrder::Little).expect("encode");
        assert_eq!(&bytes[0..6], b"report");
        assert_eq!(&bytes[12..15], b"txt");
        assert_eq!(bytes[16], FileAttributes::NORMAL.bits());
        assert_eq!(bytes[17], 0x3F);
        assert_eq!(&bytes[18..26], &2_u64.to_le_bytes());
        assert_eq!(bytes[30], 3);
        assert_eq!(bytes[31], 1);
        assert_eq!(&bytes[32..40], &5_u64.to_le_bytes());

        let parsed = Rfe::parse_from_bytes(&bytes, ByteOrder::Little).expect("parse");
        assert_eq!(parsed, rfe);
    }

    #[test]
    fn rfe_big_endian_round_trip() {
        let rfe = entry(b"kernel", b"bin");
        let bytes = rfe.to_bytes(ByteOrder::Big).expect("encode");
        assert_eq!(&bytes[32..40], &[0xFF; 8]);
        assert_eq!(
            Rfe::parse_from_bytes(&bytes, ByteOrder::Big).expect("parse"),
            rfe
        );
    }

    #[test]
    fn names_truncate_and_match() {
        let rfe = entry(b"a_name_longer_than_twelve", b"jpeg2");
        assert_eq!(&rfe.name, b"a_name_longe");
        assert_eq!(&rfe.extension, b"jpeg");
        assert!(rfe.matches(b"a_name_longer_than_twelve", b"jpeg2"));
        assert!(rfe.matches(b"a_name_longe", b"jpeg"));
        assert!(!rfe.matches(b"a_name", b"jpeg"));
        assert_eq!(rfe.display_name(), "a_name_longe.jpeg");

        let bare = entry(b"README", b"");
        assert_eq!(bare.display_name(), "README");
    }

    #[test]
    fn long_name_joins_name_and_extension() {
        let mut rfe = entry(b"sixteen_byte", b"name");
        rfe.attributes = FileAttributes(rfe.attributes.bits() | FileAttributes::LONG_NAME);
        assert_eq!(
            rfe.name_parts(),
            ("sixteen_bytename".to_owned(), String::new())
        );
        assert_eq!(rfe.display_name(), "sixteen_bytename");
    }

    #[test]
    fn slot_dispatch() {
        let order = ByteOrder::Little;
        assert_eq!(
            DirSlot::parse_from_bytes(&[0_u8; RFE_SIZE], order).expect("free"),
            DirSlot::Free
        );

        let mut chain = [0_u8; RFE_SIZE];
        ChainEntry {
            next: ClusterIndex(9),
        }
        .encode_into(&mut chain, order)
        .expect("encode");
        assert_eq!(
            DirSlot::parse_from_bytes(&chain, order).expect("chain"),
            DirSlot::Chain(ChainEntry {
                next: ClusterIndex(9)
            })
        );

        let rfe = entry(b"x", b"y");
        let bytes = rfe.to_bytes(order).expect("encode");
        assert_eq!(
            DirSlot::parse_from_bytes(&bytes, order).expect("entry"),
            DirSlot::Entry(rfe)
        );

        let mut bad = [0_u8; RFE_SIZE];
        bad[OFF_PRESENCE] = 0x12;
        assert_eq!(
            DirSlot::parse_from_bytes(&bad, order),
            Err(ParseError::InvalidField {
                field: "presence",
                reason: "unknown presence tag",
            })
        );
    }

    #[test]
    fn empty_dir_cluster_layout() {
        let cluster =
            encode_dir_cluster(4096, &[], ClusterIndex::END, ByteOrder::Little).expect("encode");
        assert_eq!(cluster.len(), 4096);
        assert_eq!(slots_per_cluster(4096), 102);
        assert_eq!(entries_per_cluster(4096), 101);
        let chain_start = 101 * RFE_SIZE;
        assert!(cluster[..chain_start].iter().all(|b| *b == 0));
        assert_eq!(&cluster[chain_start..chain_start + 8], &[0xFF; 8]);
        assert_eq!(cluster[chain_start + OFF_PRESENCE], 0x7F);
        assert!(cluster[chain_start + RFE_SIZE..].iter().all(|b| *b == 0));
    }

    #[test]
    fn full_dir_cluster_is_rejected() {
        let entries = vec![entry(b"f", b""); 102];
        assert!(encode_dir_cluster(4096, &entries, ClusterIndex::END, ByteOrder::Little).is_err());
        let entries = vec![entry(b"f", b""); 101];
        assert!(encode_dir_cluster(4096, &entries, ClusterIndex::END, ByteOrder::Little).is_ok());
    }
}
