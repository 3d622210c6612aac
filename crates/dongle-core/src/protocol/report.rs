//! Inbound report decoding.
//!
//! A report is only interpreted when byte 14 carries the magic value; byte 15
//! selects the event and the payload starts at byte 16. Anything shorter
//! than the event needs is treated as non-matching.

use super::constants::*;
use crate::message::{ConfigChannel, DongleInfo, GamePadInfo};

/// Event decoded from a single inbound report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    GamePadInfo(GamePadInfo),
    DongleInfo(DongleInfo),
    /// Config id notice; carries nothing the host needs.
    ConfigIdNotice,
    /// One fragment of a configuration read.
    Parcel {
        channel: ConfigChannel,
        seq: u8,
        payload: [u8; PARCEL_PAYLOAD_LEN],
    },
    /// Acknowledgment of write parcel `index` (0 = write start).
    WriteAck { index: usize },
}

/// Decode a raw report. Returns `None` for anything not addressed to the host.
pub fn decode(report: &[u8]) -> Option<InboundEvent> {
    if report.len() <= REPORT_KIND_OFFSET || report[REPORT_MAGIC_OFFSET] != MAGIC {
        return None;
    }

    let payload = &report[REPORT_PAYLOAD_OFFSET..];
    match report[REPORT_KIND_OFFSET] {
        EVT_GAMEPAD_INFO => {
            let p = payload.get(..11)?;
            Some(InboundEvent::GamePadInfo(GamePadInfo {
                device_id: p[0],
                device_mac: [p[1], p[2], p[3], p[4]],
                firmware_low: p[5],
                firmware_high: p[6],
                battery: p[7],
                cpu_type: p[8],
                connection_type: p[9],
                motion_sensor_type: p[10],
            }))
        }
        EVT_DONGLE_INFO => {
            let p = payload.get(..2)?;
            Some(InboundEvent::DongleInfo(DongleInfo {
                firmware_low: p[0],
                firmware_high: p[1],
            }))
        }
        EVT_CONFIG_ID => Some(InboundEvent::ConfigIdNotice),
        EVT_CONFIG_PARCEL => parcel(ConfigChannel::Standard, payload),
        EVT_LED_CONFIG_PARCEL => parcel(ConfigChannel::Led, payload),
        EVT_CONFIG_WRITE_START | EVT_CONFIG_WRITE_START_ALT | EVT_LED_CONFIG_WRITE_START => {
            Some(InboundEvent::WriteAck { index: 0 })
        }
        EVT_CONFIG_PARCEL_ACK | EVT_LED_CONFIG_PARCEL_ACK => {
            let index = *payload.first()?;
            Some(InboundEvent::WriteAck {
                index: index as usize,
            })
        }
        _ => None,
    }
}

fn parcel(channel: ConfigChannel, payload: &[u8]) -> Option<InboundEvent> {
    let (&seq, rest) = payload.split_first()?;
    let data: [u8; PARCEL_PAYLOAD_LEN] = rest.get(..PARCEL_PAYLOAD_LEN)?.try_into().ok()?;
    Some(InboundEvent::Parcel {
        channel,
        seq,
        payload: data,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a report carrying `kind` and `payload` in the documented layout.
    pub(crate) fn report(kind: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = vec![0u8; 32];
        buf[REPORT_MAGIC_OFFSET] = MAGIC;
        buf[REPORT_KIND_OFFSET] = kind;
        buf[REPORT_PAYLOAD_OFFSET..REPORT_PAYLOAD_OFFSET + payload.len()]
            .copy_from_slice(payload);
        buf
    }

    #[test]
    fn test_short_or_unmagic_reports_never_match() {
        for len in 0..16 {
            let mut buf = vec![MAGIC; len];
            if len > REPORT_KIND_OFFSET {
                buf[REPORT_KIND_OFFSET] = EVT_DONGLE_INFO;
            }
            assert_eq!(decode(&buf), None, "len {len}");
        }

        let mut wrong_magic = report(EVT_DONGLE_INFO, &[1, 2]);
        wrong_magic[REPORT_MAGIC_OFFSET] = 0x5A;
        assert_eq!(decode(&wrong_magic), None);
    }

    #[test]
    fn test_truncated_payload_does_not_panic() {
        let mut buf = report(EVT_GAMEPAD_INFO, &[]);
        buf.truncate(20);
        assert_eq!(decode(&buf), None);

        let mut buf = report(EVT_CONFIG_PARCEL, &[0; 12]);
        buf.truncate(27);
        assert_eq!(decode(&buf), None);

        let mut buf = report(EVT_CONFIG_PARCEL_ACK, &[]);
        buf.truncate(16);
        assert_eq!(decode(&buf), None);
    }

    #[test]
    fn test_gamepad_info() {
        let buf = report(EVT_GAMEPAD_INFO, &[20, 1, 2, 3, 4, 7, 6, 90, 1, 2, 3]);
        let expected = GamePadInfo {
            device_id: 20,
            device_mac: [1, 2, 3, 4],
            firmware_low: 7,
            firmware_high: 6,
            battery: 90,
            cpu_type: 1,
            connection_type: 2,
            motion_sensor_type: 3,
        };
        assert_eq!(decode(&buf), Some(InboundEvent::GamePadInfo(expected)));
    }

    #[test]
    fn test_dongle_info() {
        let buf = report(EVT_DONGLE_INFO, &[5, 1]);
        assert_eq!(
            decode(&buf),
            Some(InboundEvent::DongleInfo(DongleInfo {
                firmware_low: 5,
                firmware_high: 1
            }))
        );
    }

    #[test]
    fn test_parcels_route_by_channel() {
        let mut payload = vec![3];
        payload.extend(10..21);
        let expected: [u8; 11] = core::array::from_fn(|i| 10 + i as u8);

        assert_eq!(
            decode(&report(EVT_CONFIG_PARCEL, &payload)),
            Some(InboundEvent::Parcel {
                channel: ConfigChannel::Standard,
                seq: 3,
                payload: expected
            })
        );
        assert_eq!(
            decode(&report(EVT_LED_CONFIG_PARCEL, &payload)),
            Some(InboundEvent::Parcel {
                channel: ConfigChannel::Led,
                seq: 3,
                payload: expected
            })
        );
    }

    #[test]
    fn test_write_acknowledgments() {
        for kind in [
            EVT_CONFIG_WRITE_START,
            EVT_CONFIG_WRITE_START_ALT,
            EVT_LED_CONFIG_WRITE_START,
        ] {
            assert_eq!(
                decode(&report(kind, &[9])),
                Some(InboundEvent::WriteAck { index: 0 })
            );
        }
        for kind in [EVT_CONFIG_PARCEL_ACK, EVT_LED_CONFIG_PARCEL_ACK] {
            assert_eq!(
                decode(&report(kind, &[4])),
                Some(InboundEvent::WriteAck { index: 4 })
            );
        }
    }

    #[test]
    fn test_config_id_and_unknown() {
        assert_eq!(
            decode(&report(EVT_CONFIG_ID, &[])),
            Some(InboundEvent::ConfigIdNotice)
        );
        assert_eq!(decode(&report(0x7F, &[1, 2, 3])), None);
    }
}
