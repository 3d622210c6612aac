//! Session configuration.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::protocol::Integrity;
use crate::protocol::constants::*;
use crate::transfer::{ParcelLayout, RetryPolicy};
use crate::transport::EndpointPlan;

/// Configuration for a dongle session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// USB Vendor ID to look for.
    pub vendor_id: u16,
    /// USB Product ID to look for.
    pub product_id: u16,
    /// Interface carrying the vendor channel.
    pub interface: u8,
    /// Interrupt IN endpoint address.
    pub in_endpoint: u8,
    /// Preferred interrupt OUT endpoint address.
    pub out_endpoint: u8,
    /// OUT endpoint used when the preferred one is missing.
    pub fallback_out_endpoint: u8,
    /// Kernel driver to unload while the session is open; empty disables.
    pub competing_driver: String,
    /// Resends per write parcel.
    pub max_retries: u32,
    /// Acknowledgment wait per write parcel in milliseconds.
    pub parcel_timeout_ms: u64,
    /// Quiet period before a finished read is reported, in milliseconds.
    pub quiescence_ms: u64,
    /// Longest single blocking read in the dispatch loop, in milliseconds.
    pub read_poll_ms: u64,
    /// Capacity of the message queue.
    pub event_queue_capacity: usize,
    /// Trailer appended to outbound frames.
    pub integrity: Integrity,
    /// Write parcel layout for the standard channel.
    pub config_layout: ParcelLayout,
    /// Write parcel layout for the LED channel.
    pub led_layout: ParcelLayout,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            vendor_id: XINPUT_VENDOR_ID,
            product_id: XINPUT_PRODUCT_ID,
            interface: XINPUT_INTERFACE,
            in_endpoint: IN_ENDPOINT,
            out_endpoint: OUT_ENDPOINT_PRIMARY,
            fallback_out_endpoint: OUT_ENDPOINT_FALLBACK,
            competing_driver: COMPETING_DRIVER.to_string(),
            max_retries: PARCEL_MAX_RETRIES,
            parcel_timeout_ms: PARCEL_TIMEOUT_MS,
            quiescence_ms: QUIESCENCE_MS,
            read_poll_ms: READ_POLL_MS,
            event_queue_capacity: EVENT_QUEUE_CAPACITY,
            integrity: Integrity::None,
            config_layout: ParcelLayout::standard(),
            led_layout: ParcelLayout::led(),
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Driver to mitigate, if any.
    pub fn competing_driver(&self) -> Option<&str> {
        Some(self.competing_driver.trim()).filter(|d| !d.is_empty())
    }

    pub fn endpoint_plan(&self) -> EndpointPlan {
        EndpointPlan {
            interface: self.interface,
            in_endpoint: self.in_endpoint,
            out_primary: self.out_endpoint,
            out_fallback: self.fallback_out_endpoint,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            timeout: Duration::from_millis(self.parcel_timeout_ms),
        }
    }

    pub fn quiescence(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }

    /// Poll interval, never zero so the loop cannot spin.
    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.vendor_id, 0x045E);
        assert_eq!(config.product_id, 0x028E);
        assert_eq!(config.competing_driver(), Some("xpad"));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.quiescence(), Duration::from_millis(200));
        assert_eq!(config.event_queue_capacity, 10);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let text = r#"
            out_endpoint = 0x02
            max_retries = 5

            [integrity]
            kind = "crc16"
            poly = 0x1021
            init = 0xFFFF
            xor_out = 0
        "#;
        let config: SessionConfig = toml::from_str(text).unwrap();
        assert_eq!(config.out_endpoint, 0x02);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.in_endpoint, IN_ENDPOINT);
        assert_eq!(
            config.integrity,
            Integrity::Crc16 {
                poly: 0x1021,
                init: 0xFFFF,
                xor_out: 0,
                reflect: false,
                big_endian: true,
            }
        );
    }

    #[test]
    fn test_toml_text_roundtrip() {
        let config = SessionConfig {
            competing_driver: String::new(),
            led_layout: ParcelLayout {
                payload_len: 8,
                ..ParcelLayout::led()
            },
            ..Default::default()
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: SessionConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.competing_driver(), None);
    }
}
