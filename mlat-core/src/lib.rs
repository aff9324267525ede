//! mlat-core: streaming decoder for Mode S / ADS-B multilateration feeds.
//!
//! No async, no I/O, just the decoder. Bytes from a receiver connection
//! go in through [`Reader::feed`]; typed Mode S / Mode A/C messages and
//! metadata events come out. The crate handles the byte-accurate framing
//! of the Beast, Radarcape, SBS and AVR wire formats, Mode S CRC and
//! field extraction, Gillham altitude decoding, and the widening and
//! outlier-tracking of receiver hardware timestamps into a monotonic
//! multilateration time base.
//!
//! Network transport, the mlat server protocol, and aircraft state
//! tracking live with the callers of this crate.

pub mod altitude;
mod avr;
mod beast;
pub mod clock;
pub mod crc;
pub mod filter;
pub mod message;
pub mod reader;
mod sbs;
pub mod types;

// Re-export the commonly used types at crate root
pub use clock::ClockTracker;
pub use filter::Filters;
pub use message::{EventData, GpsStatus, Message};
pub use reader::{FeedResult, Reader, ReaderConfig};
pub use types::{
    DecoderMode, FeedError, DF_EVENT_EPOCH_ROLLOVER, DF_EVENT_MODE_CHANGE,
    DF_EVENT_RADARCAPE_POSITION, DF_EVENT_RADARCAPE_STATUS, DF_EVENT_TIMESTAMP_JUMP, DF_MODEAC,
    MAGIC_MLAT_TIMESTAMP, MAGIC_UAT_TIMESTAMP,
};
