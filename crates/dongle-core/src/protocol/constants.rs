//! Protocol constants for the XInput-emulating gamepad dongle.
//!
//! Command and report codes are the vendor channel values observed on the
//! dongle firmware; the USB identity is the emulated wired Xbox 360 pad.

// ============================================================================
// Device Identification
// ============================================================================

/// Microsoft Vendor ID (emulated).
pub const XINPUT_VENDOR_ID: u16 = 0x045E;

/// Xbox 360 wired controller Product ID (emulated).
pub const XINPUT_PRODUCT_ID: u16 = 0x028E;

/// Interface carrying the vendor channel.
pub const XINPUT_INTERFACE: u8 = 0;

/// Interrupt IN endpoint.
pub const IN_ENDPOINT: u8 = 0x81;

/// Interrupt OUT endpoint on most dongle revisions.
pub const OUT_ENDPOINT_PRIMARY: u8 = 0x05;

/// Interrupt OUT endpoint on revisions that do not expose 0x05.
pub const OUT_ENDPOINT_FALLBACK: u8 = 0x02;

/// Kernel driver that claims the emulated pad by default.
pub const COMPETING_DRIVER: &str = "xpad";

// ============================================================================
// Framing
// ============================================================================

/// Magic byte opening every outbound frame and gating every inbound report.
pub const MAGIC: u8 = 0xA5;

/// Logical size of an outbound frame (magic + command + arguments).
pub const FRAME_LEN: usize = 15;

/// Argument capacity of an outbound frame.
pub const MAX_ARGS: usize = FRAME_LEN - 2;

/// Size of the buffer handed to each inbound read.
pub const REPORT_BUFFER_LEN: usize = 100;

/// Offset of the magic byte in an inbound report.
pub const REPORT_MAGIC_OFFSET: usize = 14;

/// Offset of the event discriminant in an inbound report.
pub const REPORT_KIND_OFFSET: usize = 15;

/// Offset of the event payload in an inbound report.
pub const REPORT_PAYLOAD_OFFSET: usize = 16;

/// Payload bytes carried by one configuration parcel.
pub const PARCEL_PAYLOAD_LEN: usize = 11;

// ============================================================================
// Logical Buffers
// ============================================================================

/// Length of a standard configuration buffer.
pub const CONFIG_LEN: usize = 52;

/// Length of an LED configuration buffer.
pub const LED_CONFIG_LEN: usize = 49;

// ============================================================================
// Commands (Host -> Dongle)
// ============================================================================

pub const CMD_GET_DEVICE_INFO: u8 = 16;
pub const CMD_GET_DONGLE_VERSION: u8 = 17;
pub const CMD_READ_CONFIG: u8 = 33;
pub const CMD_READ_LED_CONFIG: u8 = 38;

/// Default write-start command for the standard channel.
pub const CMD_WRITE_CONFIG_START: u8 = 35;
/// Default parcel command for the standard channel.
pub const CMD_WRITE_CONFIG_DATA: u8 = 36;
/// Default write-start command for the LED channel.
pub const CMD_WRITE_LED_CONFIG_START: u8 = 42;
/// Default parcel command for the LED channel.
pub const CMD_WRITE_LED_CONFIG_DATA: u8 = 41;

/// Every command code the dongle is known to accept.
pub const KNOWN_COMMANDS: &[u8] = &[
    CMD_GET_DEVICE_INFO,
    CMD_GET_DONGLE_VERSION,
    CMD_READ_CONFIG,
    CMD_WRITE_CONFIG_START,
    CMD_WRITE_CONFIG_DATA,
    CMD_READ_LED_CONFIG,
    CMD_WRITE_LED_CONFIG_DATA,
    CMD_WRITE_LED_CONFIG_START,
];

// ============================================================================
// Report Discriminants (Dongle -> Host)
// ============================================================================

pub const EVT_GAMEPAD_INFO: u8 = 16;
pub const EVT_DONGLE_INFO: u8 = 17;
pub const EVT_CONFIG_ID: u8 = 32;
pub const EVT_CONFIG_PARCEL: u8 = 34;
pub const EVT_CONFIG_WRITE_START: u8 = 35;
pub const EVT_CONFIG_PARCEL_ACK: u8 = 36;
pub const EVT_CONFIG_WRITE_START_ALT: u8 = 37;
pub const EVT_LED_CONFIG_PARCEL: u8 = 39;
pub const EVT_LED_CONFIG_PARCEL_ACK: u8 = 41;
pub const EVT_LED_CONFIG_WRITE_START: u8 = 42;

// ============================================================================
// Timing
// ============================================================================

/// Quiet period between reassembly completion and the completion message.
pub const QUIESCENCE_MS: u64 = 200;

/// Retries per parcel before a write is abandoned.
pub const PARCEL_MAX_RETRIES: u32 = 3;

/// Acknowledgment wait per parcel attempt.
pub const PARCEL_TIMEOUT_MS: u64 = 3000;

/// Upper bound on a single blocking read in the dispatch loop.
pub const READ_POLL_MS: u64 = 50;

/// Capacity of the outbound message queue.
pub const EVENT_QUEUE_CAPACITY: usize = 10;
