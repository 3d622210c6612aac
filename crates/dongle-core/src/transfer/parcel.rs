//! Splitting a configuration buffer into write parcels.
//!
//! Parcel 0 opens the write (`[config_id, parcel_count]` under the start
//! command); parcels `1..=n` carry the data as
//! `[config_id, index, payload...]` under the data command. Each parcel is a
//! complete sealed frame and is acknowledged by its index.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::message::ConfigChannel;
use crate::protocol::constants::{
    CMD_WRITE_CONFIG_DATA, CMD_WRITE_CONFIG_START, CMD_WRITE_LED_CONFIG_DATA,
    CMD_WRITE_LED_CONFIG_START, MAX_ARGS, PARCEL_PAYLOAD_LEN,
};
use crate::protocol::{Integrity, OutboundFrame};

/// Bytes of each data parcel spent on `[config_id, index]`.
const PARCEL_HEADER_LEN: usize = 2;

/// Write parcel layout for one channel.
///
/// The defaults mirror the acknowledgment codes the dongle answers with;
/// confirm them against captured traffic before writing to real hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParcelLayout {
    pub start_command: u8,
    pub data_command: u8,
    /// Data bytes per parcel, at most 11.
    pub payload_len: usize,
}

impl ParcelLayout {
    pub const fn standard() -> Self {
        Self {
            start_command: CMD_WRITE_CONFIG_START,
            data_command: CMD_WRITE_CONFIG_DATA,
            payload_len: PARCEL_PAYLOAD_LEN,
        }
    }

    pub const fn led() -> Self {
        Self {
            start_command: CMD_WRITE_LED_CONFIG_START,
            data_command: CMD_WRITE_LED_CONFIG_DATA,
            payload_len: PARCEL_PAYLOAD_LEN,
        }
    }

    pub const fn for_channel(channel: ConfigChannel) -> Self {
        match channel {
            ConfigChannel::Standard => Self::standard(),
            ConfigChannel::Led => Self::led(),
        }
    }

    /// Payload size actually used, clamped to the frame capacity.
    fn chunk_len(&self) -> usize {
        self.payload_len.clamp(1, MAX_ARGS - PARCEL_HEADER_LEN)
    }

    /// Largest buffer whose data parcel indexes still fit in one byte.
    pub fn max_data_len(&self) -> usize {
        usize::from(u8::MAX) * self.chunk_len()
    }

    /// Split `data` into sealed parcels, start parcel first.
    pub fn parcels(
        &self,
        data: &[u8],
        config_id: u8,
        integrity: &Integrity,
    ) -> Result<Vec<OutboundFrame>, ProtocolError> {
        let chunks: Vec<&[u8]> = data.chunks(self.chunk_len()).collect();
        let count = u8::try_from(chunks.len()).map_err(|_| ProtocolError::TooManyParcels {
            len: data.len(),
            max: self.max_data_len(),
        })?;

        let mut parcels = Vec::with_capacity(chunks.len() + 1);
        parcels.push(OutboundFrame::encode(
            self.start_command,
            &[config_id, count],
            integrity,
        ));

        let mut args = [0u8; MAX_ARGS];
        for (index, chunk) in (1..=count).zip(&chunks) {
            args.fill(0);
            args[0] = config_id;
            args[1] = index;
            args[PARCEL_HEADER_LEN..PARCEL_HEADER_LEN + chunk.len()].copy_from_slice(chunk);
            parcels.push(OutboundFrame::encode(self.data_command, &args, integrity));
        }
        Ok(parcels)
    }
}

impl Default for ParcelLayout {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::{CONFIG_LEN, FRAME_LEN, LED_CONFIG_LEN, MAGIC};

    #[test]
    fn test_standard_layout() {
        let data: Vec<u8> = (0..CONFIG_LEN as u8).collect();
        let parcels = ParcelLayout::standard().parcels(&data, 3, &Integrity::None).unwrap();

        // Start parcel plus ceil(52 / 11) data parcels.
        assert_eq!(parcels.len(), 6);

        let start = parcels[0].as_bytes();
        assert_eq!(start[0], MAGIC);
        assert_eq!(start[1], CMD_WRITE_CONFIG_START);
        assert_eq!(&start[2..4], &[3, 5]);

        let mut rebuilt = Vec::new();
        for (i, parcel) in parcels[1..].iter().enumerate() {
            let bytes = parcel.as_bytes();
            assert_eq!(bytes.len(), FRAME_LEN);
            assert_eq!(bytes[1], CMD_WRITE_CONFIG_DATA);
            assert_eq!(bytes[2], 3);
            assert_eq!(bytes[3] as usize, i + 1);
            rebuilt.extend_from_slice(&bytes[4..]);
        }
        rebuilt.truncate(CONFIG_LEN);
        assert_eq!(rebuilt, data);
        // Last parcel is zero padded.
        assert_eq!(&parcels[5].as_bytes()[4 + 8..], &[0, 0, 0]);
    }

    #[test]
    fn test_led_layout_uses_led_commands() {
        let data = vec![0x11; LED_CONFIG_LEN];
        let parcels = ParcelLayout::led().parcels(&data, 1, &Integrity::None).unwrap();
        assert_eq!(parcels.len(), 6);
        assert_eq!(parcels[0].command(), CMD_WRITE_LED_CONFIG_START);
        assert!(parcels[1..].iter().all(|p| p.command() == CMD_WRITE_LED_CONFIG_DATA));
    }

    #[test]
    fn test_payload_len_is_clamped() {
        let layout = ParcelLayout {
            payload_len: 64,
            ..ParcelLayout::standard()
        };
        let parcels = layout.parcels(&[1; 22], 0, &Integrity::None).unwrap();
        assert_eq!(parcels.len(), 3);

        let layout = ParcelLayout {
            payload_len: 4,
            ..ParcelLayout::standard()
        };
        let parcels = layout.parcels(&[1; 22], 0, &Integrity::None).unwrap();
        assert_eq!(parcels.len(), 7);
    }

    #[test]
    fn test_index_overflow_is_rejected() {
        let layout = ParcelLayout {
            payload_len: 1,
            ..ParcelLayout::standard()
        };
        assert_eq!(layout.max_data_len(), 255);

        let parcels = layout.parcels(&[7; 255], 0, &Integrity::None).unwrap();
        assert_eq!(parcels.len(), 256);
        assert_eq!(&parcels[0].as_bytes()[2..4], &[0, 255]);
        assert_eq!(parcels[255].as_bytes()[3], 255);

        assert!(matches!(
            layout.parcels(&[7; 256], 0, &Integrity::None),
            Err(ProtocolError::TooManyParcels { len: 256, max: 255 })
        ));
    }
}
