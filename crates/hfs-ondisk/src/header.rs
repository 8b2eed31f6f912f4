#![forbid(unsafe_code)]
//! Volume header (cluster 0) and the long-name blob that follows it.

use crate::attr::VolumeAttributes;
use hfs_types::{
    BOOTABLE_SIGNATURE, ByteOrder, ClusterIndex, HEADER_RESERVED_SENTINEL, HEADER_SIZE,
    MAX_LONG_NAME_LEN, NAME_LEN, NORD_SIGNATURE, PackedDate, ParseError, ensure_slice,
    read_fixed, trim_nul_padded, write_bytes,
};
use serde::{Deserialize, Serialize};

// Field offsets inside the 512-byte logical header.
const OFF_SIGNATURE: usize = 0;
const OFF_DIRECTION: usize = 4;
const OFF_NEXT_ALLOC: usize = 6;
const OFF_CLUSTER_SIZE: usize = 14;
const OFF_CLUSTERS_AVAILABLE: usize = 22;
const OFF_NAME: usize = 30;
const OFF_ATTRIBUTES: usize = 42;
const OFF_CREATION_DATE: usize = 43;
const OFF_OWNER: usize = 45;
const OFF_RESERVED: usize = 46;
const OFF_CLUSTERS: usize = 47;
/// Start of the zero padding region (455 bytes).
pub const OFF_PADDING: usize = 55;
const OFF_BOOT_SIGNATURE: usize = 510;

/// Parsed volume header.
///
/// Parsing only checks the direction marker, since every other field is
/// decoded relative to it. Semantic validation (cluster accounting, version,
/// reserved sentinel) belongs to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HfsHeader {
    pub signature: u32,
    pub byte_order: ByteOrder,
    pub next_alloc: ClusterIndex,
    pub cluster_size: u64,
    pub clusters_available: u64,
    pub name: [u8; NAME_LEN],
    pub attributes: VolumeAttributes,
    pub creation_date: PackedDate,
    pub owner_id: u8,
    pub reserved: u8,
    pub clusters: u64,
    pub boot_signature: [u8; 2],
}

impl HfsHeader {
    /// Parse the logical header from the first 512 bytes of `region`.
    pub fn parse_from_bytes(region: &[u8]) -> Result<Self, ParseError> {
        let region = ensure_slice(region, 0, HEADER_SIZE)?;

        let direction = read_fixed::<2>(region, OFF_DIRECTION)?;
        let byte_order = ByteOrder::detect(direction).ok_or(ParseError::InvalidField {
            field: "direction",
            reason: "marker is not 0x55AA in either byte order",
        })?;

        Ok(Self {
            signature: byte_order.read_u32(region, OFF_SIGNATURE)?,
            byte_order,
            next_alloc: ClusterIndex(byte_order.read_u64(region, OFF_NEXT_ALLOC)?),
            cluster_size: byte_order.read_u64(region, OFF_CLUSTER_SIZE)?,
            clusters_available: byte_order.read_u64(region, OFF_CLUSTERS_AVAILABLE)?,
            name: read_fixed::<NAME_LEN>(region, OFF_NAME)?,
            attributes: VolumeAttributes(region[OFF_ATTRIBUTES]),
            creation_date: PackedDate(byte_order.read_u16(region, OFF_CREATION_DATE)?),
            owner_id: region[OFF_OWNER],
            reserved: region[OFF_RESERVED],
            clusters: byte_order.read_u64(region, OFF_CLUSTERS)?,
            boot_signature: read_fixed::<2>(region, OFF_BOOT_SIGNATURE)?,
        })
    }

    /// Encode into the first 512 bytes of `out`. The padding region is
    /// zeroed; bytes past the logical header are left alone.
    pub fn encode_into(&self, out: &mut [u8]) -> Result<(), ParseError> {
        let order = self.byte_order;
        ensure_slice(out, 0, HEADER_SIZE)?;
        order.write_u32(out, OFF_SIGNATURE, self.signature)?;
        write_bytes(out, OFF_DIRECTION, &order.marker_bytes())?;
        order.write_u64(out, OFF_NEXT_ALLOC, self.next_alloc.0)?;
        order.write_u64(out, OFF_CLUSTER_SIZE, self.cluster_size)?;
        order.write_u64(out, OFF_CLUSTERS_AVAILABLE, self.clusters_available)?;
        write_bytes(out, OFF_NAME, &self.name)?;
        out[OFF_ATTRIBUTES] = self.attributes.bits();
        order.write_u16(out, OFF_CREATION_DATE, self.creation_date.bits())?;
        out[OFF_OWNER] = self.owner_id;
        out[OFF_RESERVED] = self.reserved;
        order.write_u64(out, OFF_CLUSTERS, self.clusters)?;
        out[OFF_PADDING..OFF_BOOT_SIGNATURE].fill(0);
        write_bytes(out, OFF_BOOT_SIGNATURE, &self.boot_signature)
    }

    pub fn to_bytes(&self) -> Result<[u8; HEADER_SIZE], ParseError> {
        let mut out = [0_u8; HEADER_SIZE];
        self.encode_into(&mut out)?;
        Ok(out)
    }

    #[must_use]
    pub fn name_str(&self) -> String {
        trim_nul_padded(&self.name)
    }

    /// Signature is the "do not mount" token.
    #[must_use]
    pub fn is_nord(&self) -> bool {
        self.signature == NORD_SIGNATURE
    }

    #[must_use]
    pub fn is_bootable(&self) -> bool {
        self.boot_signature == BOOTABLE_SIGNATURE
    }

    #[must_use]
    pub fn has_reserved_sentinel(&self) -> bool {
        self.reserved == HEADER_RESERVED_SENTINEL
    }

    /// Total volume size in bytes, `None` on overflow.
    #[must_use]
    pub fn volume_size(&self) -> Option<u64> {
        self.clusters.checked_mul(self.cluster_size)
    }
}

/// Decode the long-name blob `[len:1][bytes:len]` at the start of `blob`.
pub fn parse_long_name(blob: &[u8]) -> Result<Vec<u8>, ParseError> {
    let len = usize::from(ensure_slice(blob, 0, 1)?[0]);
    Ok(ensure_slice(blob, 1, len)?.to_vec())
}

/// Encode a long name as a length-prefixed blob.
pub fn encode_long_name(name: &[u8]) -> Result<Vec<u8>, ParseError> {
    if name.len() > MAX_LONG_NAME_LEN {
        return Err(ParseError::InvalidField {
            field: "long_name",
            reason: "longer than 255 bytes",
        });
    }
    let len = u8::try_from(name.len()).map_err(|_| ParseError::IntegerConversion {
        field: "long_name_len",
    })?;
    let mut blob = Vec::with_capacity(name.len() + 1);
    blob.push(len);
    blob.extend_from_slice(name);
    Ok(blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hfs_types::pad_field;

    fn sample(order: ByteOrder) -> HfsHeader {
        HfsHeader {
            signature: u32::from_be_bytes(*b"HFS0"),
            byte_order: order,
            next_alloc: ClusterIndex(2),
            cluster_size: 4096,
            clusters_available: 14,
            name: pad_field(b"scratch"),
            attributes: VolumeAttributes::NORMAL,
            creation_date: PackedDate::from_ymd(2025, 3, 9),
            owner_id: 7,
            reserved: HEADER_RESERVED_SENTINEL,
            clusters: 16,
            boot_signature: BOOTABLE_SIGNATURE,
        }
    }

    #[test]
    fn header_round_trips_in_both_orders() {
        for order in [ByteOrder::Little, ByteOrder::Big] {
            let header = sample(order);
            let bytes = header.to_bytes().expect("encode");
            let parsed = HfsHeader::parse_from_bytes(&bytes).expect("parse");
            assert_eq!(parsed, header);
            assert_eq!(parsed.name_str(), "scratch");
            assert!(parsed.is_bootable());
            assert!(!parsed.is_nord());
        }
    }

    #[test]
    fn header_field_offsets() {
        let bytes = sample(ByteOrder::Little).to_bytes().expect("encode");
        assert_eq!(&bytes[4..6], &[0xAA, 0x55]);
        assert_eq!(&bytes[14..22], &4096_u64.to_le_bytes());
        assert_eq!(&bytes[30..37], b"scratch");
        assert_eq!(bytes[42], 0x78);
        assert_eq!(bytes[45], 7);
        assert_eq!(bytes[46], 0xFF);
        assert_eq!(&bytes[47..55], &16_u64.to_le_bytes());
        assert!(bytes[OFF_PADDING..510].iter().all(|b| *b == 0));
        assert_eq!(&bytes[510..], &[0x55, 0xAA]);

        let big = sample(ByteOrder::Big).to_bytes().expect("encode");
        assert_eq!(&big[4..6], &[0x55, 0xAA]);
        assert_eq!(&big[0..4], b"HFS0");
        assert_eq!(&big[14..22], &4096_u64.to_be_bytes());
    }

    #[test]
    fn bad_direction_is_rejected() {
        let mut bytes = sample(ByteOrder::Little).to_bytes().expect("encode");
        bytes[4] = 0x12;
        bytes[5] = 0x34;
        assert_eq!(
            HfsHeader::parse_from_bytes(&bytes),
            Err(ParseError::InvalidField {
                field: "direction",
                reason: "marker is not 0x55AA in either byte order",
            })
        );
    }

    #[test]
    fn short_region_is_rejected() {
        let err = HfsHeader::parse_from_bytes(&[0_u8; 100]).expect_err("short");
        assert!(matches!(err, ParseError::InsufficientData { needed: 512, .. }));
    }

    #[test]
    fn nord_signature_reads_in_volume_order() {
        let mut header = sample(ByteOrder::Big);
        header.signature = NORD_SIGNATURE;
        let bytes = header.to_bytes().expect("encode");
        assert_eq!(&bytes[0..4], b"NORD");
        assert!(HfsHeader::parse_from_bytes(&bytes).expect("parse").is_nord());
    }

    #[test]
    fn long_name_blob() {
        let blob = encode_long_name(b"a rather long volume label").expect("encode");
        assert_eq!(blob[0], 26);
        assert_eq!(
            parse_long_name(&blob).expect("parse"),
            b"a rather long volume label"
        );
        assert!(parse_long_name(&[0]).expect("empty").is_empty());
        assert!(encode_long_name(&[b'x'; 256]).is_err());
        assert!(matches!(
            parse_long_name(&[5, b'a']),
            Err(ParseError::InsufficientData { .. })
        ));
    }
}
