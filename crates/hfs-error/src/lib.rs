#![forbid(unsafe_code)]
//! Error types for HyperFS.
//!
//! # Error Taxonomy
//!
//! HyperFS uses a two-layer error model:
//!
//! | Layer | Type | Crate | Purpose |
//! |-------|------|-------|---------|
//! | Parsing | `ParseError` | `hfs-types` | Byte-layout violations detected by the codec |
//! | Runtime | `HfsError` | `hfs-error` (this crate) | Errors surfaced by the engine, media and CLI |
//!
//! `hfs-error` is independent of `hfs-types` and `hfs-ondisk` to avoid
//! cyclic dependencies. The conversion from `ParseError` to `HfsError` lives
//! in `hfs-core`, which inspects the failing field name:
//!
//! | ParseError field | HfsError variant |
//! |------------------|------------------|
//! | `direction` | `InvalidDirection` |
//! | `presence` | `InvalidPresenceSegment` |
//! | anything else | `Corruption { cluster, detail }` |
//!
//! ## Stable codes
//!
//! Every variant maps to exactly one negative integer and one short code via
//! [`HfsError::code`] and [`HfsError::short_code`]. Both mappings are
//! exhaustive (no wildcard arms), so a new variant does not compile until
//! its code is assigned. Codes are part of the CLI contract: the process
//! exits with them.
//!
//! | Code | Variant | Short |
//! |------|---------|-------|
//! | -1 | `WriteBindingMissing` | `NUL_WRF` |
//! | -2 | `ReadBindingMissing` | `NUL_RDF` |
//! | -3 | `ResetBindingMissing` | `NUL_RWF` |
//! | -4 | `InvalidDirection` | `HED_DIR` |
//! | -5 | `InvalidClusterInfo` | `HED_CIF` |
//! | -6 | `UnsupportedVersion` | `HED_VER` |
//! | -7 | `NonSentinelReserved` | `HED_RSF` |
//! | -8 | `ZeroBootSignature` | `HED_ZBS` |
//! | -9 | `InvalidPresenceSegment` | `RFE_PRS` |
//! | -10 | `RfeNoEnd` | `RFE_NED` |
//! | -11 | `DataNoSpace` | `DTA_NSP` |
//! | -12 | `FileNotLocked` | `FIL_NLK` |
//! | -13 | `BufferTooLarge` | `FIL_BTL` |
//! | -14 | `DepthTooLarge` | `FIL_DTL` |
//! | -15 | `FileOutOfRange` | `FIL_OOR` |
//! | -16 | `Corruption` | `DTA_COR` |
//! | -17 | `Io` | `MED_IOE` |

use thiserror::Error;

/// Unified error type for all HyperFS operations.
#[derive(Debug, Error)]
pub enum HfsError {
    /// The medium cannot be written.
    #[error("medium has no write capability")]
    WriteBindingMissing,

    /// The medium cannot be read.
    #[error("medium has no read capability")]
    ReadBindingMissing,

    /// The medium cannot be reset (truncated).
    #[error("medium has no reset capability")]
    ResetBindingMissing,

    /// Direction marker bytes are not `0x55AA` in either byte order.
    #[error("invalid direction marker: {0:02x?}")]
    InvalidDirection([u8; 2]),

    /// Cluster size/count/allocation counters are not self-consistent.
    #[error("invalid cluster info: {0}")]
    InvalidClusterInfo(String),

    /// Header declares a format version this build does not read.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),

    /// Reserved header byte is not `0xFF`.
    #[error("reserved header segment is {0:#04x}, expected 0xff")]
    NonSentinelReserved(u8),

    /// Both boot signature bytes are zero.
    #[error("boot signature bytes are both zero")]
    ZeroBootSignature,

    /// A directory slot carries a presence tag that is neither an entry nor
    /// a chain record.
    #[error("invalid presence tag {tag:#04x} at cluster {cluster} slot {slot}")]
    InvalidPresenceSegment { cluster: u64, slot: usize, tag: u8 },

    /// Directory chain never reaches a terminator.
    #[error("directory chain not terminated at cluster {cluster}: {detail}")]
    RfeNoEnd { cluster: u64, detail: String },

    /// No cluster left to allocate.
    #[error("no space left on volume")]
    DataNoSpace,

    /// Handle is not currently held.
    #[error("file is not locked by this handle")]
    FileNotLocked,

    /// Transfer exceeds the data payload of one cluster.
    #[error("buffer of {len} bytes exceeds the {max}-byte transfer limit")]
    BufferTooLarge { len: u64, max: u64 },

    /// Transfer needs more chain hops than the caller allowed.
    #[error("transfer needs {needed} chain hops but depth is {depth}")]
    DepthTooLarge { needed: u64, depth: u64 },

    /// Transfer reaches past the clusters the file owns.
    #[error("cluster {index} of file is past its {allocated} allocated clusters")]
    FileOutOfRange { index: u64, allocated: u64 },

    /// Structural damage found while following a chain.
    #[error("corrupt volume at cluster {cluster}: {detail}")]
    Corruption { cluster: u64, detail: String },

    /// Backing medium I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HfsError {
    /// Stable negative code for this error.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::WriteBindingMissing => -1,
            Self::ReadBindingMissing => -2,
            Self::ResetBindingMissing => -3,
            Self::InvalidDirection(_) => -4,
            Self::InvalidClusterInfo(_) => -5,
            Self::UnsupportedVersion(_) => -6,
            Self::NonSentinelReserved(_) => -7,
            Self::ZeroBootSignature => -8,
            Self::InvalidPresenceSegment { .. } => -9,
            Self::RfeNoEnd { .. } => -10,
            Self::DataNoSpace => -11,
            Self::FileNotLocked => -12,
            Self::BufferTooLarge { .. } => -13,
            Self::DepthTooLarge { .. } => -14,
            Self::FileOutOfRange { .. } => -15,
            Self::Corruption { .. } => -16,
            Self::Io(_) => -17,
        }
    }

    /// Machine-stable short code for logs.
    #[must_use]
    pub fn short_code(&self) -> &'static str {
        match self {
            Self::WriteBindingMissing => "NUL_WRF",
            Self::ReadBindingMissing => "NUL_RDF",
            Self::ResetBindingMissing => "NUL_RWF",
            Self::InvalidDirection(_) => "HED_DIR",
            Self::InvalidClusterInfo(_) => "HED_CIF",
            Self::UnsupportedVersion(_) => "HED_VER",
            Self::NonSentinelReserved(_) => "HED_RSF",
            Self::ZeroBootSignature => "HED_ZBS",
            Self::InvalidPresenceSegment { .. } => "RFE_PRS",
            Self::RfeNoEnd { .. } => "RFE_NED",
            Self::DataNoSpace => "DTA_NSP",
            Self::FileNotLocked => "FIL_NLK",
            Self::BufferTooLarge { .. } => "FIL_BTL",
            Self::DepthTooLarge { .. } => "FIL_DTL",
            Self::FileOutOfRange { .. } => "FIL_OOR",
            Self::Corruption { .. } => "DTA_COR",
            Self::Io(_) => "MED_IOE",
        }
    }

    /// Constant-style name, e.g. `ERR_FILE_NOT_LOCKED`.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::WriteBindingMissing => "ERR_WR_NO_DEF",
            Self::ReadBindingMissing => "ERR_RD_NO_DEF",
            Self::ResetBindingMissing => "ERR_RD_WR_NO_DEF",
            Self::InvalidDirection(_) => "ERR_HEADER_INVALID_DIRECTION",
            Self::InvalidClusterInfo(_) => "ERR_HEADER_INVALID_CLUSTER_INFO",
            Self::UnsupportedVersion(_) => "ERR_HEADER_UNSUPPORTED_VERSION",
            Self::NonSentinelReserved(_) => "ERR_HEADER_NON_FF_RESERVED_SEGMENT",
            Self::ZeroBootSignature => "ERR_HEADER_ZERO_BOOT_SIG",
            Self::InvalidPresenceSegment { .. } => "ERR_RFE_INVALID_PRESV_SEGMENT",
            Self::RfeNoEnd { .. } => "ERR_RFE_NO_END",
            Self::DataNoSpace => "ERR_DATA_NO_SPACE",
            Self::FileNotLocked => "ERR_FILE_NOT_LOCKED",
            Self::BufferTooLarge { .. } => "ERR_FILE_BUFFER_TOO_LARGE",
            Self::DepthTooLarge { .. } => "ERR_FILE_DEPTH_TOO_LARGE",
            Self::FileOutOfRange { .. } => "ERR_FILE_OUT_OF_RANGE",
            Self::Corruption { .. } => "ERR_DATA_CORRUPTION",
            Self::Io(_) => "ERR_MEDIUM_IO",
        }
    }
}

/// Result alias using `HfsError`.
pub type Result<T> = std::result::Result<T, HfsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn all_variants() -> Vec<HfsError> {
        vec![
            HfsError::WriteBindingMissing,
            HfsError::ReadBindingMissing,
            HfsError::ResetBindingMissing,
            HfsError::InvalidDirection([0, 0]),
            HfsError::InvalidClusterInfo("test".into()),
            HfsError::UnsupportedVersion(1),
            HfsError::NonSentinelReserved(0),
            HfsError::ZeroBootSignature,
            HfsError::InvalidPresenceSegment {
                cluster: 1,
                slot: 0,
                tag: 0x12,
            },
            HfsError::RfeNoEnd {
                cluster: 1,
                detail: "test".into(),
            },
            HfsError::DataNoSpace,
            HfsError::FileNotLocked,
            HfsError::BufferTooLarge { len: 9000, max: 4088 },
            HfsError::DepthTooLarge { needed: 2, depth: 1 },
            HfsError::FileOutOfRange {
                index: 3,
                allocated: 1,
            },
            HfsError::Corruption {
                cluster: 4,
                detail: "test".into(),
            },
            HfsError::Io(std::io::Error::other("test")),
        ]
    }

    #[test]
    fn codes_are_sequential_and_negative() {
        let codes: Vec<i32> = all_variants().iter().map(HfsError::code).collect();
        let expected: Vec<i32> = (1..=17).map(|n: i32| -n).collect();
        assert_eq!(codes, expected);
    }

    #[test]
    fn short_codes_are_unique() {
        let variants = all_variants();
        let shorts: HashSet<&str> = variants.iter().map(HfsError::short_code).collect();
        let names: HashSet<&str> = variants.iter().map(HfsError::name).collect();
        assert_eq!(shorts.len(), variants.len());
        assert_eq!(names.len(), variants.len());
        assert!(shorts.iter().all(|code| code.len() == 7));
    }

    #[test]
    fn reference_codes_keep_their_numbers() {
        assert_eq!(HfsError::ZeroBootSignature.code(), -8);
        assert_eq!(HfsError::ZeroBootSignature.short_code(), "HED_ZBS");
        assert_eq!(HfsError::FileNotLocked.code(), -12);
        assert_eq!(HfsError::FileNotLocked.name(), "ERR_FILE_NOT_LOCKED");
        assert_eq!(HfsError::DepthTooLarge { needed: 1, depth: 0 }.code(), -14);
    }

    #[test]
    fn display_formatting() {
        let err = HfsError::InvalidPresenceSegment {
            cluster: 1,
            slot: 3,
            tag: 0x12,
        };
        assert_eq!(
            err.to_string(),
            "invalid presence tag 0x12 at cluster 1 slot 3"
        );

        let reserved = HfsError::NonSentinelReserved(0);
        assert_eq!(
            reserved.to_string(),
            "reserved header segment is 0x00, expected 0xff"
        );

        let direction = HfsError::InvalidDirection([0x12, 0x34]);
        assert_eq!(direction.to_string(), "invalid direction marker: [12, 34]");

        let depth = HfsError::DepthTooLarge { needed: 2, depth: 0 };
        assert_eq!(
            depth.to_string(),
            "transfer needs 2 chain hops but depth is 0"
        );
    }
}
