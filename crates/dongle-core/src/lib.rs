//! Dongle-Core: host side of the XInput gamepad dongle vendor protocol.
//!
//! The dongle enumerates as a stock XInput pad and multiplexes a vendor
//! command channel over the same interrupt endpoints. This crate frames
//! commands, decodes vendor reports, reassembles configuration reads and
//! drives acknowledged configuration writes.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, outbound frame codec, inbound report decoding
//! - **Transport**: USB communication abstraction (nusb, mock)
//! - **Transfer**: Parcel reassembly for reads, acknowledged parcel writes
//! - **Driver**: Unloading and restoring the competing kernel driver
//! - **Session**: Device acquisition, dispatch loop and command surface
//!
//! # Example
//!
//! ```no_run
//! use dongle_core::{ProtocolCommand, ProtocolMessage, Session, SessionConfig};
//!
//! let session = Session::open(SessionConfig::default()).expect("no dongle");
//! session.send(ProtocolCommand::ReadConfig { config_id: 0 }).unwrap();
//!
//! let messages = session.take_messages().expect("queue already taken");
//! for message in messages.iter() {
//!     if let ProtocolMessage::ConfigReadComplete { data } = message {
//!         println!("{data:02X?}");
//!         break;
//!     }
//! }
//! session.close().unwrap();
//! ```

pub mod config;
mod dispatch;
pub mod driver;
pub mod error;
pub mod message;
pub mod protocol;
pub mod session;
pub mod transfer;
pub mod transport;

// Re-exports for convenience
pub use config::SessionConfig;
pub use driver::{DriverControl, DriverError, DriverMitigation, Modprobe};
pub use error::ProtocolError;
pub use message::{ConfigChannel, DongleInfo, GamePadInfo, ProtocolCommand, ProtocolMessage};
pub use protocol::{InboundEvent, Integrity, OutboundFrame};
pub use session::Session;
pub use transfer::{ConfigReader, ConfigWriter, ParcelLayout, RetryPolicy};
pub use transport::{
    EndpointPlan, MockBackend, MockTransport, NusbBackend, NusbTransport, TransportError,
    UsbBackend, UsbTransport,
};
