//! Little-endian integer and float decoding for the binary workbook formats.
//! Callers check slice lengths before decoding.

pub(crate) fn to_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

pub(crate) fn to_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub(crate) fn to_u64(bytes: &[u8]) -> u64 {
    let mut buffer = [0u8; 8];
    buffer.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buffer)
}

pub(crate) fn to_f64(bytes: &[u8]) -> f64 {
    f64::from_bits(to_u64(bytes))
}

pub(crate) fn to_usize(bytes: &[u8]) -> usize {
    to_u32(bytes) as usize
}

/// Splits a byte slice into consecutive 32-bit values; a trailing partial chunk is ignored.
pub(crate) fn to_usize_iter(bytes: &[u8]) -> impl Iterator<Item = usize> + '_ {
    bytes.chunks_exact(4).map(to_usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn little_endian_values() {
        assert_eq!(to_u16(&[0x34, 0x12]), 0x1234);
        assert_eq!(to_u32(&[0x78, 0x56, 0x34, 0x12]), 0x1234_5678);
        assert_eq!(to_u64(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]), 0xE11A_B1A1_E011_CFD0);
        assert_eq!(to_f64(&1.5f64.to_le_bytes()), 1.5);
    }

    #[test]
    fn sector_ids() {
        let bytes = [1, 0, 0, 0, 0xFE, 0xFF, 0xFF, 0xFF, 9];
        assert_eq!(to_usize_iter(&bytes).collect::<Vec<_>>(), vec![1, 0xFFFF_FFFE]);
    }
}
