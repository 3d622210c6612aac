//! Chunked configuration transfers.
//!
//! Provides reassembly for reads and acknowledged parcel delivery for writes.

pub mod parcel;
pub mod reader;
pub mod writer;

pub use parcel::ParcelLayout;
pub use reader::ConfigReader;
pub use writer::{ConfigWriter, RetryPolicy};
