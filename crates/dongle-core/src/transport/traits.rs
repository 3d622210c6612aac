//! USB Transport layer abstraction.
//!
//! Defines the `UsbTransport` trait for report I/O and the `UsbBackend`
//! trait for locating and claiming the dongle, allowing different
//! implementations (nusb, mock, etc.).

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint not found: address=0x{address:02X}, direction={direction}")]
    EndpointNotFound {
        address: u8,
        direction: &'static str,
    },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Interface and endpoint addresses to claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointPlan {
    pub interface: u8,
    pub in_endpoint: u8,
    /// Tried first.
    pub out_primary: u8,
    /// Tried when the primary OUT endpoint is not exposed.
    pub out_fallback: u8,
}

/// Abstract report transport.
///
/// Implementations are shared between the dispatch loop (reads) and the
/// caller (writes, close), so every method takes `&self`.
pub trait UsbTransport: Send + Sync {
    /// Write one report to the OUT endpoint.
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read one report from the IN endpoint, waiting at most `timeout`.
    ///
    /// Returns `TransportError::Timeout` when nothing arrived and
    /// `TransportError::Disconnected` once the device is gone or the
    /// transport has been closed.
    fn read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Release endpoints, interface and device. Idempotent.
    fn close(&self) -> Result<(), TransportError>;

    /// Check if device is still connected.
    fn is_connected(&self) -> bool;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}

/// Device discovery and acquisition.
///
/// Split in two steps so the session can mitigate a competing kernel driver
/// between locating the device and claiming its interface.
pub trait UsbBackend {
    /// A located, opened device that has not been claimed yet.
    type Device;
    type Transport: UsbTransport + 'static;

    /// Locate the first device matching `vid`/`pid`.
    fn find(&self, vid: u16, pid: u16) -> Result<Self::Device, TransportError>;

    /// Claim the interface and endpoints described by `plan`.
    fn claim(
        &self,
        device: Self::Device,
        plan: &EndpointPlan,
    ) -> Result<Self::Transport, TransportError>;
}
