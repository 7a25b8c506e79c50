//! Fixed-offset integer readers for device reports.
//!
//! All readers index `bytes` directly; callers check the report length first.

pub fn i16_le(bytes: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

pub fn i16_be(bytes: &[u8], offset: usize) -> i16 {
    i16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

/// Signed 24-bit little-endian, sign-extended from bit 23.
pub fn i24_le(bytes: &[u8], offset: usize) -> i32 {
    let raw = i32::from_le_bytes([0, bytes[offset], bytes[offset + 1], bytes[offset + 2]]);
    raw >> 8
}

pub fn i32_le(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

pub fn i32_be(bytes: &[u8], offset: usize) -> i32 {
    i32::from_be_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

pub fn u16_le(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

pub fn u32_le(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Unsigned 64-bit little-endian (low word + high word * 2^32).
pub fn u64_le(bytes: &[u8], offset: usize) -> u64 {
    let lo = u32_le(bytes, offset) as u64;
    let hi = u32_le(bytes, offset + 4) as u64;
    lo | (hi << 32)
}

/// Magnetometer axis encoding: the high byte's top bit is flipped before
/// the pair is read as a little-endian i16.
pub fn i16_folded(bytes: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([bytes[offset], bytes[offset + 1] ^ 0x80])
}
