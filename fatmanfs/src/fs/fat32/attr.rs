// SPDX-License-Identifier: MIT

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Fat32Attributes: u8 {
        const READ_ONLY = 0x01;
        const HIDDEN    = 0x02;
        const SYSTEM    = 0x04;
        const VOLUME_ID = 0x08;
        const DIRECTORY = 0x10;
        const ARCHIVE   = 0x20;
        const LFN       = Self::READ_ONLY.bits()
                        | Self::HIDDEN.bits()
                        | Self::SYSTEM.bits()
                        | Self::VOLUME_ID.bits();
    }
}

impl Fat32Attributes {
    /// Long-name records carry exactly the LFN combination in the low six bits.
    #[inline]
    pub fn is_long_name(raw: u8) -> bool {
        raw & 0x3F == Self::LFN.bits()
    }

    #[inline]
    pub fn is_volume_label(raw: u8) -> bool {
        !Self::is_long_name(raw) && raw & Self::VOLUME_ID.bits() != 0
    }

    #[inline]
    pub fn is_directory(raw: u8) -> bool {
        raw & Self::DIRECTORY.bits() != 0
    }

    /// Short `RHSDA` flag string for listings.
    pub fn flag_string(self) -> String {
        [
            (Self::READ_ONLY, 'R'),
            (Self::HIDDEN, 'H'),
            (Self::SYSTEM, 'S'),
            (Self::DIRECTORY, 'D'),
            (Self::ARCHIVE, 'A'),
        ]
        .iter()
        .map(|&(flag, c)| if self.contains(flag) { c } else { '-' })
        .collect()
    }
}
