//! CRC-32 name hashing for ARC0 lookup tables

/// Hash value stored in place of a real CRC of zero
pub const SENTINEL: u32 = 0xFFFF_FFFF;

/// Standard CRC-32 (IEEE 802.3, reflected) of `bytes`
pub fn compute(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

/// Table key for a directory or file name
///
/// Names are hashed from their UTF-8 bytes even though the name blob stores
/// them Shift_JIS encoded. A CRC of zero is remapped to [`SENTINEL`].
pub fn name_hash(name: &str) -> u32 {
    match compute(name.as_bytes()) {
        0 => SENTINEL,
        crc => crc,
    }
}
