//! Integrity trailer appended to outbound frames.
//!
//! The dongle firmware defines the trailer; its parameters are not derivable
//! from the report traffic alone, so the algorithm is selected at runtime.
//! `Integrity::None` sends frames unsealed.

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

/// Trailer algorithm applied over the 15 logical frame bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Integrity {
    /// No trailer.
    #[default]
    None,
    /// Parametric CRC-16 (Rocksoft model).
    Crc16 {
        poly: u16,
        init: u16,
        xor_out: u16,
        /// Reflect input bytes and the final register.
        #[serde(default)]
        reflect: bool,
        /// Emit the trailer most significant byte first.
        #[serde(default = "default_big_endian")]
        big_endian: bool,
    },
}

fn default_big_endian() -> bool {
    true
}

impl Integrity {
    /// Number of bytes this algorithm appends.
    pub fn trailer_len(&self) -> usize {
        match self {
            Integrity::None => 0,
            Integrity::Crc16 { .. } => 2,
        }
    }

    /// Append the trailer for `frame` to `out`.
    pub fn seal(&self, frame: &[u8], out: &mut Vec<u8>) {
        match *self {
            Integrity::None => {}
            Integrity::Crc16 {
                poly,
                init,
                xor_out,
                reflect,
                big_endian,
            } => {
                let crc = crc16(frame, poly, init, xor_out, reflect);
                // Writing into a Vec cannot fail.
                let _ = if big_endian {
                    out.write_u16::<BigEndian>(crc)
                } else {
                    out.write_u16::<LittleEndian>(crc)
                };
            }
        }
    }
}

fn crc16(data: &[u8], poly: u16, init: u16, xor_out: u16, reflect: bool) -> u16 {
    let mut crc = init;
    for &byte in data {
        let byte = if reflect { byte.reverse_bits() } else { byte };
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ poly;
            } else {
                crc <<= 1;
            }
        }
    }
    if reflect {
        crc = crc.reverse_bits();
    }
    crc ^ xor_out
}
