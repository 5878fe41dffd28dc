//! Frame payload masking.
//!
//! Masking is a simple rolling XOR against a 4-byte key (RFC 6455 §5.3).
//! Kept as its own module, the way the teacher crate keeps `mask.rs`
//! separate from `frame.rs`, since both the read path (unmask) and the
//! write path (mask) call into it and it is a natural unit to bench/fuzz
//! on its own.

/// XORs `data` in place with `mask`, starting at rolling offset 0.
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}

/// Generates a fresh masking key from the supplied RNG. Clients must use a
/// new key per frame (spec §4.3); servers never mask.
pub fn generate_mask(rng: &mut impl rand::RngCore) -> [u8; 4] {
    let mut key = [0u8; 4];
    rng.fill_bytes(&mut key);
    key
}
