//! Protocol module - vendor channel framing.

pub mod constants;
pub mod frame;
pub mod integrity;
pub mod report;

pub use constants::*;
pub use frame::OutboundFrame;
pub use integrity::Integrity;
pub use report::{InboundEvent, decode};
