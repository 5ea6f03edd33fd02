//! CRC32 Sealer (§4, component table row 2).
//!
//! Standard reflected Ethernet CRC-32 (IEEE 802.3): polynomial `0xEDB88320`,
//! seed and final XOR `0xFFFFFFFF`. A 256-entry table is precomputed once;
//! the base CRC of a telegram's 14 static header bytes is cached so that the
//! hot path only has to fold in the 2 dynamic bytes (TSref/toggle) at send
//! time, matching the original `SICE_UTIL.c` / `ulBaseCRC` caching scheme
//! named in spec §2.

const POLY: u32 = 0xEDB8_8320;

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Precomputed at compile time; no runtime initialization cost.
pub static CRC_TABLE: [u32; 256] = build_table();

/// Computes the Ethernet CRC-32 of `data` from a given running state.
fn update(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        let idx = ((crc ^ u32::from(byte)) & 0xFF) as usize;
        crc = (crc >> 8) ^ CRC_TABLE[idx];
    }
    crc
}

/// Computes the standalone CRC-32 of `data`, matching the testable property
/// `crc32(header_bytes_0..16) == frame.crc` in §8.
pub fn crc32(data: &[u8]) -> u32 {
    update(0xFFFF_FFFF, data) ^ 0xFFFF_FFFF
}

/// Caches the base CRC of a telegram's static header bytes so only the
/// dynamic tail needs to be re-folded in every cycle.
#[derive(Debug, Clone, Copy)]
pub struct CrcSealer {
    /// Running CRC state (pre-final-XOR) after processing the static bytes.
    base_state: u32,
}

impl CrcSealer {
    /// Seeds the sealer from the static (non-dynamic) prefix of the header.
    pub fn new(static_prefix: &[u8]) -> Self {
        Self {
            base_state: update(0xFFFF_FFFF, static_prefix),
        }
    }

    /// Seals the remaining dynamic bytes, returning the full header CRC.
    ///
    /// `dynamic_tail` is typically the 2 dynamic bytes of a cached header
    /// (e.g. TSref/toggle in MDT0's extended-function field); passing an
    /// empty slice returns the CRC of the static prefix alone.
    pub fn reseal_dynamic(&self, dynamic_tail: &[u8]) -> u32 {
        update(self.base_state, dynamic_tail) ^ 0xFFFF_FFFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // "123456789" -> 0xCBF43926 is the standard CRC-32/ISO-HDLC check value.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn sealer_matches_plain_crc32() {
        let header = [0u8; 16];
        let sealer = CrcSealer::new(&header[..14]);
        let sealed = sealer.reseal_dynamic(&header[14..]);
        assert_eq!(sealed, crc32(&header));
    }

    #[test]
    fn sealer_reacts_to_dynamic_change() {
        let mut header = [0u8; 16];
        let sealer = CrcSealer::new(&header[..14]);
        let crc_a = sealer.reseal_dynamic(&header[14..]);
        header[14] ^= 0xFF;
        let crc_b = sealer.reseal_dynamic(&header[14..]);
        assert_ne!(crc_a, crc_b);
        assert_eq!(crc_b, crc32(&header));
    }
}
