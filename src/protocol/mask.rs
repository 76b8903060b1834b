//! Payload masking (RFC 6455 Section 5.3).

/// XOR `data` in place with the 4-byte masking key.
///
/// Masking is an involution: applying the same key twice restores the input.
#[inline]
pub fn apply_mask(data: &mut [u8], mask: [u8; 4]) {
    let key = u32::from_ne_bytes(mask);
    let mut chunks = data.chunks_exact_mut(4);
    for chunk in &mut chunks {
        let word = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ key;
        chunk.copy_from_slice(&word.to_ne_bytes());
    }
    for (byte, k) in chunks.into_remainder().iter_mut().zip(mask) {
        *byte ^= k;
    }
}

/// Generates client masking keys.
///
/// Seeded from the OS RNG, then advanced with a cheap mixing function per
/// frame. Keys only need to be unpredictable to intermediaries, not secret.
#[derive(Debug, Clone)]
pub struct MaskGenerator {
    state: u32,
}

impl Default for MaskGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskGenerator {
    /// Seed a new generator.
    #[must_use]
    pub fn new() -> Self {
        let mut seed = [0u8; 4];
        let state = if getrandom::getrandom(&mut seed).is_ok() {
            u32::from_le_bytes(seed)
        } else {
            use std::time::{SystemTime, UNIX_EPOCH};
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.subsec_nanos() ^ d.as_secs() as u32)
                .unwrap_or(0x1234_5678)
        };
        Self { state }
    }

    /// Next masking key.
    pub fn next_mask(&mut self) -> [u8; 4] {
        self.state = self.state.wrapping_add(0x9E37_79B9);
        let mut x = self.state;
        x = (x ^ (x >> 16)).wrapping_mul(0x85EB_CA6B);
        x = (x ^ (x >> 13)).wrapping_mul(0xC2B2_AE35);
        (x ^ (x >> 16)).to_le_bytes()
    }
}
