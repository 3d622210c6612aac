//! Session-level error taxonomy.

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Gamepad dongle not present: VID={vid:04X} PID={pid:04X}")]
    DeviceNotPresent { vid: u16, pid: u16 },

    #[error("No OUT endpoint: tried 0x{primary:02X} and 0x{fallback:02X}")]
    EndpointUnavailable { primary: u8, fallback: u8 },

    #[error("Failed to {step}: {source}")]
    Acquire {
        step: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("Parcel {index} not acknowledged after {attempts} attempts")]
    TransferTimeout { index: usize, attempts: u32 },

    #[error("Unknown command 0x{0:02X}")]
    UnknownCommand(u8),

    #[error("Command arguments too long: {len} bytes")]
    ArgumentsTooLong { len: usize },

    #[error("Config buffer has {actual} bytes, channel expects {expected}")]
    ConfigLength { expected: usize, actual: usize },

    #[error("Config buffer of {len} bytes needs too many parcels (max {max} bytes)")]
    TooManyParcels { len: usize, max: usize },

    #[error("Session closed")]
    SessionClosed,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}
