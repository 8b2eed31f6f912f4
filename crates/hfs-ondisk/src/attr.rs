#![forbid(unsafe_code)]
//! Attribute bit models for the volume header and for file entries.
//!
//! The two bytes share names but not layouts: the header has no execute
//! bits and carries the 2-bit format version in its low bits.

use hfs_types::AuthLevel;
use serde::{Deserialize, Serialize};
use std::fmt;

fn describe_flags(bits: u8, known: &[(u8, &'static str)]) -> Vec<&'static str> {
    known
        .iter()
        .filter(|(bit, _)| bits & bit != 0)
        .map(|(_, name)| *name)
        .collect()
}

fn set_bit(bits: &mut u8, mask: u8, on: bool) {
    if on {
        *bits |= mask;
    } else {
        *bits &= !mask;
    }
}

/// Volume attribute byte (header offset 42).
///
/// `7 LN | 6 UR | 5 UW | 4 RR | 3 RW | 2 H | 1..0 version`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeAttributes(pub u8);

impl VolumeAttributes {
    pub const LONG_NAME: u8 = 0x80;
    pub const USER_READ: u8 = 0x40;
    pub const USER_WRITE: u8 = 0x20;
    pub const ROOT_READ: u8 = 0x10;
    pub const ROOT_WRITE: u8 = 0x08;
    pub const HIDDEN: u8 = 0x04;
    pub const VERSION_MASK: u8 = 0x03;

    /// Everyone may read and write, version 0.
    pub const NORMAL: Self = Self(0b0111_1000);

    const KNOWN: &[(u8, &'static str)] = &[
        (0x80, "LONG_NAME"),
        (0x40, "USER_READ"),
        (0x20, "USER_WRITE"),
        (0x10, "ROOT_READ"),
        (0x08, "ROOT_WRITE"),
        (0x04, "HIDDEN"),
    ];

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn version(self) -> u8 {
        self.0 & Self::VERSION_MASK
    }

    #[must_use]
    pub fn has_long_name(self) -> bool {
        self.0 & Self::LONG_NAME != 0
    }

    pub fn set_long_name(&mut self, on: bool) {
        set_bit(&mut self.0, Self::LONG_NAME, on);
    }

    #[must_use]
    pub fn can_read(self, auth: AuthLevel) -> bool {
        self.0 & Self::read_mask(auth) != 0
    }

    #[must_use]
    pub fn can_write(self, auth: AuthLevel) -> bool {
        self.0 & Self::write_mask(auth) != 0
    }

    pub fn set_read(&mut self, auth: AuthLevel, on: bool) {
        set_bit(&mut self.0, Self::read_mask(auth), on);
    }

    pub fn set_write(&mut self, auth: AuthLevel, on: bool) {
        set_bit(&mut self.0, Self::write_mask(auth), on);
    }

    #[must_use]
    pub fn is_hidden(self) -> bool {
        self.0 & Self::HIDDEN != 0
    }

    pub fn set_hidden(&mut self, on: bool) {
        set_bit(&mut self.0, Self::HIDDEN, on);
    }

    /// No authorization level may read the volume.
    #[must_use]
    pub fn is_unreadable(self) -> bool {
        self.0 & (Self::USER_READ | Self::ROOT_READ) == 0
    }

    #[must_use]
    pub fn describe(self) -> Vec<&'static str> {
        describe_flags(self.0, Self::KNOWN)
    }

    fn read_mask(auth: AuthLevel) -> u8 {
        match auth {
            AuthLevel::User => Self::USER_READ,
            AuthLevel::Root => Self::ROOT_READ,
        }
    }

    fn write_mask(auth: AuthLevel) -> u8 {
        match auth {
            AuthLevel::User => Self::USER_WRITE,
            AuthLevel::Root => Self::ROOT_WRITE,
        }
    }
}

impl fmt::Display for VolumeAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |on: bool, c: char| if on { c } else { '-' };
        write!(
            f,
            "{}{}{}{}{} v{}",
            flag(self.can_read(AuthLevel::User), 'r'),
            flag(self.can_write(AuthLevel::User), 'w'),
            flag(self.can_read(AuthLevel::Root), 'r'),
            flag(self.can_write(AuthLevel::Root), 'w'),
            flag(self.is_hidden(), 'h'),
            self.version()
        )
    }
}

/// File attribute byte (RFE offset 16).
///
/// `7 LN | 6 UR | 5 UW | 4 UX | 3 RR | 2 RW | 1 RX | 0 H`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileAttributes(pub u8);

impl FileAttributes {
    pub const LONG_NAME: u8 = 0x80;
    pub const USER_READ: u8 = 0x40;
    pub const USER_WRITE: u8 = 0x20;
    pub const USER_EXECUTE: u8 = 0x10;
    pub const ROOT_READ: u8 = 0x08;
    pub const ROOT_WRITE: u8 = 0x04;
    pub const ROOT_EXECUTE: u8 = 0x02;
    pub const HIDDEN: u8 = 0x01;

    /// Read/write for both levels, no execute.
    pub const NORMAL: Self = Self(0b0110_1100);

    const KNOWN: &[(u8, &'static str)] = &[
        (0x80, "LONG_NAME"),
        (0x40, "USER_READ"),
        (0x20, "USER_WRITE"),
        (0x10, "USER_EXECUTE"),
        (0x08, "ROOT_READ"),
        (0x04, "ROOT_WRITE"),
        (0x02, "ROOT_EXECUTE"),
        (0x01, "HIDDEN"),
    ];

    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Name and extension form one 16-byte name.
    #[must_use]
    pub fn has_long_name(self) -> bool {
        self.0 & Self::LONG_NAME != 0
    }

    #[must_use]
    pub fn can_read(self, auth: AuthLevel) -> bool {
        self.0 & Self::mask(auth, Self::USER_READ, Self::ROOT_READ) != 0
    }

    #[must_use]
    pub fn can_write(self, auth: AuthLevel) -> bool {
        self.0 & Self::mask(auth, Self::USER_WRITE, Self::ROOT_WRITE) != 0
    }

    #[must_use]
    pub fn can_execute(self, auth: AuthLevel) -> bool {
        self.0 & Self::mask(auth, Self::USER_EXECUTE, Self::ROOT_EXECUTE) != 0
    }

    pub fn set_read(&mut self, auth: AuthLevel, on: bool) {
        set_bit(
            &mut self.0,
            Self::mask(auth, Self::USER_READ, Self::ROOT_READ),
            on,
        );
    }

    pub fn set_write(&mut self, auth: AuthLevel, on: bool) {
        set_bit(
            &mut self.0,
            Self::mask(auth, Self::USER_WRITE, Self::ROOT_WRITE),
            on,
        );
    }

    pub fn set_execute(&mut self, auth: AuthLevel, on: bool) {
        set_bit(
            &mut self.0,
            Self::mask(auth, Self::USER_EXECUTE, Self::ROOT_EXECUTE),
            on,
        );
    }

    #[must_use]
    pub fn is_hidden(self) -> bool {
        self.0 & Self::HIDDEN != 0
    }

    pub fn set_hidden(&mut self, on: bool) {
        set_bit(&mut self.0, Self::HIDDEN, on);
    }

    #[must_use]
    pub fn describe(self) -> Vec<&'static str> {
        describe_flags(self.0, Self::KNOWN)
    }

    fn mask(auth: AuthLevel, user: u8, root: u8) -> u8 {
        match auth {
            AuthLevel::User => user,
            AuthLevel::Root => root,
        }
    }
}

impl fmt::Display for FileAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = |on: bool, c: char| if on { c } else { '-' };
        for auth in [AuthLevel::User, AuthLevel::Root] {
            write!(
                f,
                "{}{}{}",
                flag(self.can_read(auth), 'r'),
                flag(self.can_write(auth), 'w'),
                flag(self.can_execute(auth), 'x'),
            )?;
        }
        write!(f, "{}", flag(self.is_hidden(), 'h'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const LEVELS: [AuthLevel; 2] = [AuthLevel::User, AuthLevel::Root];

    #[test]
    fn file_permission_bits_do_not_overlap() {
        let masks = [
            FileAttributes::LONG_NAME,
            FileAttributes::USER_READ,
            FileAttributes::USER_WRITE,
            FileAttributes::USER_EXECUTE,
            FileAttributes::ROOT_READ,
            FileAttributes::ROOT_WRITE,
            FileAttributes::ROOT_EXECUTE,
            FileAttributes::HIDDEN,
        ];
        let combined = masks.iter().fold(0_u8, |acc, m| {
            assert_eq!(acc & m, 0, "mask {m:#04x} overlaps");
            acc | m
        });
        assert_eq!(combined, 0xFF);
    }

    #[test]
    fn root_read_and_root_execute_are_distinct() {
        let mut attrs = FileAttributes::default();
        attrs.set_read(AuthLevel::Root, true);
        assert!(attrs.can_read(AuthLevel::Root));
        assert!(!attrs.can_execute(AuthLevel::Root));
    }

    #[test]
    fn volume_reference_examples() {
        // Normal, user read-only, unreadable, unreadable+hidden.
        let normal = VolumeAttributes(0b0111_1000);
        assert!(normal.can_read(AuthLevel::User) && normal.can_write(AuthLevel::User));
        assert!(normal.can_read(AuthLevel::Root) && normal.can_write(AuthLevel::Root));
        assert_eq!(normal.version(), 0);

        let user_ro = VolumeAttributes(0b0101_1000);
        assert!(user_ro.can_read(AuthLevel::User));
        assert!(!user_ro.can_write(AuthLevel::User));

        let unreadable = VolumeAttributes(0b0001_1000);
        assert!(!unreadable.can_read(AuthLevel::User));
        assert!(unreadable.can_read(AuthLevel::Root));

        let hidden = VolumeAttributes(0b0001_1100);
        assert!(hidden.is_hidden());
        assert!(VolumeAttributes(0b0010_1000).is_unreadable());
    }

    #[test]
    fn display_and_describe() {
        assert_eq!(FileAttributes::NORMAL.to_string(), "rw-rw--");
        assert_eq!(FileAttributes(0xFF).to_string(), "rwxrwxh");
        assert_eq!(VolumeAttributes::NORMAL.to_string(), "rwrw- v0");
        assert_eq!(
            VolumeAttributes(0x84).describe(),
            vec!["LONG_NAME", "HIDDEN"]
        );
    }

    proptest! {
        #[test]
        fn file_setters_agree_with_getters(bits in any::<u8>(), on in any::<bool>()) {
            for auth in LEVELS {
                let mut attrs = FileAttributes(bits);
                attrs.set_read(auth, on);
                prop_assert_eq!(attrs.can_read(auth), on);
                prop_assert_eq!(attrs.0 & !FileAttributes::mask(auth, FileAttributes::USER_READ, FileAttributes::ROOT_READ),
                    bits & !FileAttributes::mask(auth, FileAttributes::USER_READ, FileAttributes::ROOT_READ));

                let mut attrs = FileAttributes(bits);
                attrs.set_write(auth, on);
                prop_assert_eq!(attrs.can_write(auth), on);
                prop_assert_eq!(attrs.can_read(auth), FileAttributes(bits).can_read(auth));

                let mut attrs = FileAttributes(bits);
                attrs.set_execute(auth, on);
                prop_assert_eq!(attrs.can_execute(auth), on);
                prop_assert_eq!(attrs.is_hidden(), FileAttributes(bits).is_hidden());
            }

            let mut attrs = FileAttributes(bits);
            attrs.set_hidden(on);
            prop_assert_eq!(attrs.is_hidden(), on);
            prop_assert_eq!(attrs.0 | FileAttributes::HIDDEN, bits | FileAttributes::HIDDEN);
        }

        #[test]
        fn volume_setters_agree_with_getters(bits in any::<u8>(), on in any::<bool>()) {
            for auth in LEVELS {
                let mut attrs = VolumeAttributes(bits);
                attrs.set_read(auth, on);
                prop_assert_eq!(attrs.can_read(auth), on);
                attrs.set_write(auth, on);
                prop_assert_eq!(attrs.can_write(auth), on);
                prop_assert_eq!(attrs.version(), VolumeAttributes(bits).version());
            }
            let mut attrs = VolumeAttributes(bits);
            attrs.set_hidden(on);
            prop_assert_eq!(attrs.is_hidden(), on);
            prop_assert_eq!(attrs.has_long_name(), VolumeAttributes(bits).has_long_name());
        }
    }
}
