//! CRC16 over record headers and payloads.
//!
//! Polynomial 0x5935, register seeded to zero, MSB-first bit-serial
//! update. The trailing checksum field itself is never included.

const POLY: u16 = 0x5935;

/// Incremental CRC16 state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Crc16(u16);

impl Crc16 {
    pub const fn new() -> Self {
        Self(0)
    }

    pub fn update(&mut self, bytes: &[u8]) {
        let mut cur = self.0;
        for &b in bytes {
            let mut mask = 0x80u8;
            while mask > 0 {
                let mut bit = cur & 0x8000 != 0;
                if b & mask != 0 {
                    bit = !bit;
                }
                cur <<= 1;
                if bit {
                    cur ^= POLY;
                }
                mask >>= 1;
            }
        }
        self.0 = cur;
    }

    pub const fn finish(self) -> u16 {
        self.0
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot CRC16 of a byte slice.
pub fn crc16(bytes: &[u8]) -> u16 {
    let mut crc = Crc16::new();
    crc.update(bytes);
    crc.finish()
}

#[cfg(test)]
mod test {
    use super::{Crc16, crc16};

    #[test]
    fn incremental_matches_oneshot() {
        let data: Vec<u8> = (0..64u8).map(|i| i.wrapping_mul(37)).collect();
        let mut crc = Crc16::new();
        for chunk in data.chunks(3) {
            crc.update(chunk);
        }
        assert_eq!(crc.finish(), crc16(&data));
    }

    #[test]
    fn unseeded_register_ignores_leading_zeros_only() {
        // With a zero seed, all-zero input keeps the register at zero...
        assert_eq!(crc16(&[]), 0);
        assert_eq!(crc16(&[0, 0, 0, 0]), 0);
        // ...and any set bit leaves it.
        assert_ne!(crc16(&[0, 0, 0, 1]), 0);
    }

    #[test]
    fn single_bit_sensitivity() {
        let data = b"patchcord";
        let base = crc16(data);
        for i in 0..data.len() {
            for bit in 0..8 {
                let mut flipped = *data;
                flipped[i] ^= 1 << bit;
                assert_ne!(crc16(&flipped), base, "flip {i}/{bit} undetected");
            }
        }
    }
}
