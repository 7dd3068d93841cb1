//! MD5-derived bit source for deterministic choices.
//!
//! Existing target trees were named with exactly this bit layout; any change
//! here renames every previously obfuscated directory.

use md5::{Digest, Md5};

/// MD5 of the UTF-8 bytes of `text`, read as a big-endian 128-bit integer.
pub fn digest_int(text: &str) -> u128 {
    let digest = Md5::digest(text.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest);
    u128::from_be_bytes(bytes)
}

/// `value >> shift`, yielding zero once the shift passes the integer width.
pub fn bits(value: u128, shift: usize) -> u128 {
    u32::try_from(shift)
        .ok()
        .and_then(|s| value.checked_shr(s))
        .unwrap_or(0)
}
