//! Typed commands accepted by a session and messages it produces.

use std::fmt;

use crate::protocol::constants::{CONFIG_LEN, LED_CONFIG_LEN};

/// Logical configuration channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigChannel {
    /// Button mapping, deadzones, triggers.
    Standard,
    /// Lighting.
    Led,
}

impl ConfigChannel {
    /// Length of the logical buffer exchanged on this channel.
    pub const fn buffer_len(self) -> usize {
        match self {
            ConfigChannel::Standard => CONFIG_LEN,
            ConfigChannel::Led => LED_CONFIG_LEN,
        }
    }
}

impl fmt::Display for ConfigChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigChannel::Standard => write!(f, "config"),
            ConfigChannel::Led => write!(f, "led-config"),
        }
    }
}

/// Gamepad identity report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GamePadInfo {
    pub device_id: u8,
    pub device_mac: [u8; 4],
    pub firmware_low: u8,
    pub firmware_high: u8,
    pub battery: u8,
    pub cpu_type: u8,
    pub connection_type: u8,
    pub motion_sensor_type: u8,
}

/// Dongle firmware report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DongleInfo {
    pub firmware_low: u8,
    pub firmware_high: u8,
}

/// Format a firmware pair as `high.low`.
fn fmt_firmware(f: &mut fmt::Formatter<'_>, high: u8, low: u8) -> fmt::Result {
    write!(f, "{}.{}", high, low)
}

impl fmt::Display for GamePadInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.device_mac;
        write!(
            f,
            "gamepad id={} mac={:02X}:{:02X}:{:02X}:{:02X} battery={}% fw=",
            self.device_id, a, b, c, d, self.battery
        )?;
        fmt_firmware(f, self.firmware_high, self.firmware_low)
    }
}

impl fmt::Display for DongleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dongle fw=")?;
        fmt_firmware(f, self.firmware_high, self.firmware_low)
    }
}

/// Messages surfaced by the dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolMessage {
    GamePadInfo(GamePadInfo),
    DongleInfo(DongleInfo),
    ConfigReadComplete { data: Vec<u8> },
    LedConfigReadComplete { data: Vec<u8> },
}

impl ProtocolMessage {
    /// Completion message for a finished read on `channel`.
    pub fn read_complete(channel: ConfigChannel, data: Vec<u8>) -> Self {
        match channel {
            ConfigChannel::Standard => ProtocolMessage::ConfigReadComplete { data },
            ConfigChannel::Led => ProtocolMessage::LedConfigReadComplete { data },
        }
    }
}

impl fmt::Display for ProtocolMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolMessage::GamePadInfo(info) => fmt::Display::fmt(info, f),
            ProtocolMessage::DongleInfo(info) => fmt::Display::fmt(info, f),
            ProtocolMessage::ConfigReadComplete { data } => {
                write!(f, "config read complete ({} bytes)", data.len())
            }
            ProtocolMessage::LedConfigReadComplete { data } => {
                write!(f, "led config read complete ({} bytes)", data.len())
            }
        }
    }
}

/// Commands accepted by [`Session::send`](crate::session::Session::send).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolCommand {
    GetDongleVersion,
    GetDeviceInfo,
    ReadConfig { config_id: u8 },
    ReadLedConfig { config_id: u8 },
    SendConfig { data: Vec<u8>, config_id: u8 },
    SendLedConfig { data: Vec<u8>, config_id: u8 },
    /// Any known command code with explicit arguments.
    Raw { code: u8, args: Vec<u8> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_lengths() {
        assert_eq!(ConfigChannel::Standard.buffer_len(), 52);
        assert_eq!(ConfigChannel::Led.buffer_len(), 49);
    }

    #[test]
    fn test_read_complete_routes_by_channel() {
        assert_eq!(
            ProtocolMessage::read_complete(ConfigChannel::Led, vec![1]),
            ProtocolMessage::LedConfigReadComplete { data: vec![1] }
        );
    }

    #[test]
    fn test_display() {
        let info = GamePadInfo {
            device_id: 20,
            device_mac: [0xDE, 0xAD, 0xBE, 0xEF],
            firmware_low: 7,
            firmware_high: 6,
            battery: 80,
            cpu_type: 0,
            connection_type: 1,
            motion_sensor_type: 0,
        };
        assert_eq!(
            info.to_string(),
            "gamepad id=20 mac=DE:AD:BE:EF battery=80% fw=6.7"
        );
        let dongle = DongleInfo {
            firmware_low: 2,
            firmware_high: 1,
        };
        assert_eq!(ProtocolMessage::DongleInfo(dongle).to_string(), "dongle fw=1.2");
    }
}
