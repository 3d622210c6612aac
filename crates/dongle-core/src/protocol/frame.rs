//! Outbound command frames.
//!
//! Logical layout (15 bytes):
//!
//! ```text
//! [0]      magic (0xA5)
//! [1]      command code
//! [2..15]  arguments, zero padded
//! ```
//!
//! The wire form appends the configured integrity trailer.

use super::constants::{FRAME_LEN, MAGIC, MAX_ARGS};
use super::integrity::Integrity;

/// A sealed command frame ready for the OUT endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    bytes: Vec<u8>,
}

impl OutboundFrame {
    /// Build a frame for `command` with up to 13 argument bytes.
    ///
    /// Arguments beyond the frame capacity are not representable; callers
    /// check the length first (see [`OutboundFrame::fits`]).
    pub fn encode(command: u8, args: &[u8], integrity: &Integrity) -> Self {
        debug_assert!(Self::fits(args), "frame arguments exceed {MAX_ARGS} bytes");

        let mut logical = [0u8; FRAME_LEN];
        logical[0] = MAGIC;
        logical[1] = command;
        let n = args.len().min(MAX_ARGS);
        logical[2..2 + n].copy_from_slice(&args[..n]);

        let mut bytes = Vec::with_capacity(FRAME_LEN + integrity.trailer_len());
        bytes.extend_from_slice(&logical);
        integrity.seal(&logical, &mut bytes);
        Self { bytes }
    }

    /// Whether `args` fits in a single frame.
    pub fn fits(args: &[u8]) -> bool {
        args.len() <= MAX_ARGS
    }

    /// Command code carried by this frame.
    pub fn command(&self) -> u8 {
        self.bytes[1]
    }

    /// Argument bytes, including padding.
    pub fn args(&self) -> &[u8] {
        &self.bytes[2..FRAME_LEN]
    }

    /// Wire bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl AsRef<[u8]> for OutboundFrame {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_pads_arguments() {
        let frame = OutboundFrame::encode(33, &[3], &Integrity::None);
        let bytes = frame.as_bytes();
        assert_eq!(bytes.len(), FRAME_LEN);
        assert_eq!(bytes[0], MAGIC);
        assert_eq!(bytes[1], 33);
        assert_eq!(bytes[2], 3);
        assert!(bytes[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_encode_full_arguments() {
        let args: Vec<u8> = (1..=13).collect();
        let frame = OutboundFrame::encode(36, &args, &Integrity::None);
        assert_eq!(frame.command(), 36);
        assert_eq!(frame.args(), args.as_slice());
    }

    #[test]
    fn test_encode_appends_trailer_over_logical_bytes() {
        let integrity = Integrity::Crc16 {
            poly: 0x1021,
            init: 0xFFFF,
            xor_out: 0,
            reflect: false,
            big_endian: true,
        };
        let frame = OutboundFrame::encode(17, &[], &integrity);
        assert_eq!(frame.as_bytes().len(), FRAME_LEN + 2);

        let mut expected = Vec::new();
        integrity.seal(&frame.as_bytes()[..FRAME_LEN], &mut expected);
        assert_eq!(&frame.as_bytes()[FRAME_LEN..], expected.as_slice());
    }

    #[test]
    fn test_fits() {
        assert!(OutboundFrame::fits(&[0; 13]));
        assert!(!OutboundFrame::fits(&[0; 14]));
    }
}
