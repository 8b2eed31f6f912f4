#![forbid(unsafe_code)]
//! Shared vocabulary for the HyperFS image format.
//!
//! Constants describing the on-disk geometry, unit-carrying newtypes,
//! the byte-order aware field readers/writers used by `hfs-ondisk`, and the
//! packed 16-bit date representation.

use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Size of the logical header at the start of cluster 0.
pub const HEADER_SIZE: usize = 512;
/// Size of one directory slot (RFE or chain record).
pub const RFE_SIZE: usize = 40;
/// Cluster sizes must be a positive multiple of this granularity.
pub const BLOCK_GRANULARITY: u64 = 4096;
/// Bytes at the tail of every data cluster holding the next-cluster pointer.
pub const DATA_POINTER_RESERVE: u64 = 8;
/// Offset (inside cluster 0) of the long volume name blob `[len:1][bytes:len]`.
pub const LONG_NAME_OFFSET: usize = HEADER_SIZE;
/// The blob length is a single byte.
pub const MAX_LONG_NAME_LEN: usize = u8::MAX as usize;

pub const NAME_LEN: usize = 12;
pub const EXTENSION_LEN: usize = 4;

/// Root directory chain always starts here; cluster 0 is the header.
pub const ROOT_DIR_CLUSTER: ClusterIndex = ClusterIndex(1);
/// First cluster handed out by the allocator after formatting.
pub const FIRST_ALLOCATABLE_CLUSTER: ClusterIndex = ClusterIndex(2);

/// `0x55AA` written in the volume byte order.
pub const DIRECTION_MARKER: u16 = 0x55AA;
/// Reserved header byte value for format version 0.
pub const HEADER_RESERVED_SENTINEL: u8 = 0xFF;
/// Only format version understood by this build.
pub const SUPPORTED_VERSION: u8 = 0;
/// Signature meaning "do not mount" (e.g. a boot-only drive).
pub const NORD_SIGNATURE: u32 = u32::from_be_bytes(*b"NORD");
/// Boot signature bytes of a bootable volume.
pub const BOOTABLE_SIGNATURE: [u8; 2] = [0x55, 0xAA];
/// Year encoded as offset zero in a [`PackedDate`].
pub const DATE_EPOCH_YEAR: u16 = 2024;

/// Absolute cluster number on the medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClusterIndex(pub u64);

impl ClusterIndex {
    /// Pointer value terminating a directory or data chain.
    pub const END: Self = Self(u64::MAX);

    #[must_use]
    pub fn is_end(self) -> bool {
        self == Self::END
    }

    /// Byte offset of this cluster, `None` on overflow.
    #[must_use]
    pub fn byte_offset(self, cluster_size: u64) -> Option<u64> {
        self.0.checked_mul(cluster_size)
    }
}

impl fmt::Display for ClusterIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_end() {
            f.write_str("END")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Authorization level used by the permission accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthLevel {
    User,
    /// Root or the owning user.
    Root,
}

/// Byte order of every multi-byte field on a volume, declared by the
/// header's direction marker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

impl ByteOrder {
    /// Direction marker bytes as they appear on disk for this order.
    #[must_use]
    pub fn marker_bytes(self) -> [u8; 2] {
        match self {
            Self::Little => DIRECTION_MARKER.to_le_bytes(),
            Self::Big => DIRECTION_MARKER.to_be_bytes(),
        }
    }

    /// Detect the byte order from the two direction bytes, `None` when the
    /// pair is not the canonical marker in either orientation.
    #[must_use]
    pub fn detect(bytes: [u8; 2]) -> Option<Self> {
        if bytes == Self::Little.marker_bytes() {
            Some(Self::Little)
        } else if bytes == Self::Big.marker_bytes() {
            Some(Self::Big)
        } else {
            None
        }
    }

    pub fn read_u16(self, data: &[u8], offset: usize) -> Result<u16, ParseError> {
        let bytes = read_fixed::<2>(data, offset)?;
        Ok(match self {
            Self::Little => u16::from_le_bytes(bytes),
            Self::Big => u16::from_be_bytes(bytes),
        })
    }

    pub fn read_u32(self, data: &[u8], offset: usize) -> Result<u32, ParseError> {
        let bytes = read_fixed::<4>(data, offset)?;
        Ok(match self {
            Self::Little => u32::from_le_bytes(bytes),
            Self::Big => u32::from_be_bytes(bytes),
        })
    }

    pub fn read_u64(self, data: &[u8], offset: usize) -> Result<u64, ParseError> {
        let bytes = read_fixed::<8>(data, offset)?;
        Ok(match self {
            Self::Little => u64::from_le_bytes(bytes),
            Self::Big => u64::from_be_bytes(bytes),
        })
    }

    pub fn write_u16(self, data: &mut [u8], offset: usize, value: u16) -> Result<(), ParseError> {
        let bytes = match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        };
        write_bytes(data, offset, &bytes)
    }

    pub fn write_u32(self, data: &mut [u8], offset: usize, value: u32) -> Result<(), ParseError> {
        let bytes = match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        };
        write_bytes(data, offset, &bytes)
    }

    pub fn write_u64(self, data: &mut [u8], offset: usize, value: u64) -> Result<(), ParseError> {
        let bytes = match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        };
        write_bytes(data, offset, &bytes)
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Little => f.write_str("little-endian"),
            Self::Big => f.write_str("big-endian"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("integer conversion failed: {field}")]
    IntegerConversion { field: &'static str },
}

#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ParseError> {
    let bytes = ensure_slice(data, offset, N)?;
    let mut out = [0_u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

#[inline]
pub fn write_bytes(data: &mut [u8], offset: usize, bytes: &[u8]) -> Result<(), ParseError> {
    let available = data.len();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };
    let Some(dst) = data.get_mut(offset..end) else {
        return Err(ParseError::InsufficientData {
            needed: bytes.len(),
            offset,
            actual: available.saturating_sub(offset),
        });
    };
    dst.copy_from_slice(bytes);
    Ok(())
}

/// Copy `src` into a fixed-width field, truncating or zero-padding.
#[must_use]
pub fn pad_field<const N: usize>(src: &[u8]) -> [u8; N] {
    let mut out = [0_u8; N];
    let len = src.len().min(N);
    out[..len].copy_from_slice(&src[..len]);
    out
}

#[must_use]
pub fn trim_nul_padded(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_owned()
}

/// 16-bit packed calendar date.
///
/// Bits 15–9 hold the year offset from [`DATE_EPOCH_YEAR`], bits 8–5 the
/// month and bits 4–0 the day. Decoding is pure bit extraction; no calendar
/// validation is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackedDate(pub u16);

impl PackedDate {
    const YEAR_SHIFT: u16 = 9;
    const MONTH_SHIFT: u16 = 5;
    const YEAR_MASK: u16 = 0x7F;
    const MONTH_MASK: u16 = 0x0F;
    const DAY_MASK: u16 = 0x1F;

    /// Years before the epoch clamp to the epoch, years past the 7-bit range
    /// clamp to the last representable year. Month and day are masked.
    #[must_use]
    pub fn from_ymd(year: u16, month: u8, day: u8) -> Self {
        let year_off = year.saturating_sub(DATE_EPOCH_YEAR).min(Self::YEAR_MASK);
        let month = u16::from(month) & Self::MONTH_MASK;
        let day = u16::from(day) & Self::DAY_MASK;
        Self((year_off << Self::YEAR_SHIFT) | (month << Self::MONTH_SHIFT) | day)
    }

    /// Current local date.
    #[must_use]
    pub fn today() -> Self {
        let now = chrono::Local::now().date_naive();
        let year = u16::try_from(now.year()).unwrap_or(DATE_EPOCH_YEAR);
        let month = u8::try_from(now.month()).unwrap_or(1);
        let day = u8::try_from(now.day()).unwrap_or(1);
        Self::from_ymd(year, month, day)
    }

    #[must_use]
    pub fn year(self) -> u16 {
        DATE_EPOCH_YEAR + ((self.0 >> Self::YEAR_SHIFT) & Self::YEAR_MASK)
    }

    #[must_use]
    pub fn month(self) -> u8 {
        // Masked to 4 bits.
        ((self.0 >> Self::MONTH_SHIFT) & Self::MONTH_MASK) as u8
    }

    #[must_use]
    pub fn day(self) -> u8 {
        (self.0 & Self::DAY_MASK) as u8
    }

    #[must_use]
    pub fn bits(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PackedDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.year(), self.month(), self.day())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_byte_order_readers() {
        let bytes = [0x34_u8, 0x12, 0x78, 0x56, 0xEF, 0xCD, 0xAB, 0x90];
        assert_eq!(ByteOrder::Little.read_u16(&bytes, 0).expect("u16"), 0x1234);
        assert_eq!(ByteOrder::Big.read_u16(&bytes, 0).expect("u16"), 0x3412);
        assert_eq!(
            ByteOrder::Little.read_u32(&bytes, 4).expect("u32"),
            0x90AB_CDEF
        );
        assert_eq!(
            ByteOrder::Big.read_u64(&bytes, 0).expect("u64"),
            0x3412_7856_EFCD_AB90
        );
    }

    #[test]
    fn test_writers_reject_short_buffers() {
        let mut buf = [0_u8; 6];
        let err = ByteOrder::Little
            .write_u64(&mut buf, 0, 7)
            .expect_err("too short");
        assert_eq!(
            err,
            ParseError::InsufficientData {
                needed: 8,
                offset: 0,
                actual: 6
            }
        );
        ByteOrder::Big.write_u32(&mut buf, 2, 0x0102_0304).expect("fits");
        assert_eq!(buf, [0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_direction_marker_detection() {
        assert_eq!(ByteOrder::Little.marker_bytes(), [0xAA, 0x55]);
        assert_eq!(ByteOrder::Big.marker_bytes(), [0x55, 0xAA]);
        assert_eq!(ByteOrder::detect([0xAA, 0x55]), Some(ByteOrder::Little));
        assert_eq!(ByteOrder::detect([0x55, 0xAA]), Some(ByteOrder::Big));
        assert_eq!(ByteOrder::detect([0x55, 0x55]), None);
        assert_eq!(ByteOrder::detect([0, 0]), None);
    }

    #[test]
    fn test_pad_field_truncates_and_pads() {
        assert_eq!(pad_field::<4>(b"ab"), *b"ab\0\0");
        assert_eq!(pad_field::<4>(b"abcdef"), *b"abcd");
        assert_eq!(trim_nul_padded(b"hfs\0\0\0\0"), "hfs");
    }

    #[test]
    fn test_packed_date_layout() {
        // 2024/1/24 -> 0000000|0001|11000
        let date = PackedDate::from_ymd(2024, 1, 24);
        assert_eq!(date.bits(), 0b0000_0000_0011_1000);
        assert_eq!((date.year(), date.month(), date.day()), (2024, 1, 24));

        // 2027/5/20 -> 0000011|0101|10100
        let date = PackedDate::from_ymd(2027, 5, 20);
        assert_eq!(date.bits(), 0b0000_0110_1011_0100);
        assert_eq!(date.to_string(), "2027/5/20");
    }

    #[test]
    fn test_packed_date_clamps_year() {
        assert_eq!(PackedDate::from_ymd(1999, 3, 1).year(), 2024);
        assert_eq!(PackedDate::from_ymd(3000, 3, 1).year(), 2151);
    }

    #[test]
    fn test_cluster_index_end() {
        assert!(ClusterIndex::END.is_end());
        assert!(!ROOT_DIR_CLUSTER.is_end());
        assert_eq!(ClusterIndex(3).byte_offset(4096), Some(12_288));
        assert_eq!(ClusterIndex::END.byte_offset(4096), None);
        assert_eq!(ClusterIndex::END.to_string(), "END");
    }

    proptest! {
        #[test]
        fn packed_date_fields_are_independent(
            year in 2024_u16..=2151,
            month in 0_u8..16,
            day in 0_u8..32,
        ) {
            let date = PackedDate::from_ymd(year, month, day);
            prop_assert_eq!(date.year(), year);
            prop_assert_eq!(date.month(), month);
            prop_assert_eq!(date.day(), day);
        }
    }
}
