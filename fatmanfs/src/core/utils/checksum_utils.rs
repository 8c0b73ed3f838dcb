// SPDX-License-Identifier: MIT

/// "Rotate right by one, then add" over `data`: the checksum a long-name
/// record stores for its paired 11-byte short name.
#[inline]
pub fn checksum_u8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &b| sum.rotate_right(1).wrapping_add(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_checksum() {
        assert_eq!(checksum_u8(b"HELLO   TXT"), 0xF1);
        assert_eq!(checksum_u8(b"A_VERY~1TXT"), 0x42);
        assert_eq!(checksum_u8(b"FOO        "), 0x88);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(checksum_u8(&[]), 0);
    }
}
