//! Shared types: decoder modes, DF constants, the feed error enum, and hex
//! helpers used by the ASCII parser and tests.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

/// All errors produced by `Reader::feed`.
///
/// Every variant except [`FeedError::NoModeSelected`] is a framing error:
/// the byte window does not match the wire format of the current decoder
/// mode. Framing errors are surfaced two-phase, see [`crate::reader`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("no decoder mode selected")]
    NoModeSelected,
    #[error("lost sync with input stream: expected a 0x1A marker at offset {offset} but found 0x{found:02x} instead")]
    ExpectedMarker { offset: usize, found: u8 },
    #[error("lost sync with input stream: unexpected record type 0x{found:02x} after 0x1A marker at offset {offset}")]
    UnknownRecordType { offset: usize, found: u8 },
    #[error("lost sync with input stream: expected 0x1A after 0x1A escape at offset {offset}")]
    BadEscape { offset: usize },
    #[error("lost sync with input stream: expected DLE STX at offset {offset} but found 0x{b0:02x} 0x{b1:02x} instead")]
    ExpectedDleStx { offset: usize, b0: u8, b1: u8 },
    #[error("lost sync with input stream: unexpected DLE 0x{found:02x} at offset {offset}")]
    BadDle { offset: usize, found: u8 },
    #[error("lost sync with input stream: expected a record marker at offset {offset} but found 0x{found:02x} instead")]
    ExpectedRecordStart { offset: usize, found: u8 },
    #[error("lost sync with input stream: expected a hex digit at offset {offset} but found 0x{found:02x} instead")]
    ExpectedHexDigit { offset: usize, found: u8 },
    #[error("lost sync with input stream: expected ';' at offset {offset} but found 0x{found:02x} instead")]
    ExpectedTerminator { offset: usize, found: u8 },
    #[error("lost sync with input stream: unexpected {len}-byte message starting at offset {offset}")]
    BadMessageLength { offset: usize, len: usize },
}

impl FeedError {
    /// True for errors caused by malformed input rather than misuse of the
    /// reader.
    pub fn is_framing(&self) -> bool {
        !matches!(self, FeedError::NoModeSelected)
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;

// ---------------------------------------------------------------------------
// Special DF values
// ---------------------------------------------------------------------------

/// Mode A/C message (2-byte payload, squawk code as address).
pub const DF_MODEAC: u8 = 32;
/// Event: hardware timestamp jumped against wall-clock progress.
pub const DF_EVENT_TIMESTAMP_JUMP: u8 = 33;
/// Event: decoder mode changed (radarcape status frame reshaped timestamps).
pub const DF_EVENT_MODE_CHANGE: u8 = 34;
/// Event: GPS end-of-day rollover of the timestamp epoch.
pub const DF_EVENT_EPOCH_ROLLOVER: u8 = 35;
/// Event: radarcape status report.
pub const DF_EVENT_RADARCAPE_STATUS: u8 = 36;
/// Event: radarcape receiver position report.
pub const DF_EVENT_RADARCAPE_POSITION: u8 = 37;

// ---------------------------------------------------------------------------
// Magic timestamps
// ---------------------------------------------------------------------------

/// Timestamp marking synthetic frames built from multilateration results
/// (FF 00 "MLAT"). These bypass clock tracking entirely.
pub const MAGIC_MLAT_TIMESTAMP: u64 = 0xFF00_4D4C_4154;

/// Reserved for UAT uplink data (FF 00 "MLAU").
pub const MAGIC_UAT_TIMESTAMP: u64 = 0xFF00_4D4C_4155;

/// A timestamp that must never update the clock state or take part in
/// outlier checks: zero, or anything in the small reserved magic range.
pub fn is_synthetic_timestamp(timestamp: u64) -> bool {
    timestamp == 0
        || (MAGIC_MLAT_TIMESTAMP..=MAGIC_MLAT_TIMESTAMP + 10).contains(&timestamp)
}

// ---------------------------------------------------------------------------
// Decoder modes
// ---------------------------------------------------------------------------

/// Receiver wire format currently selected on a [`crate::Reader`].
///
/// The mode determines which frame parser runs and the units of the
/// hardware timestamps it produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DecoderMode {
    /// Beast binary, freerunning 48-bit timestamp at 12MHz.
    Beast,
    /// Beast binary, 1GHz radarcape timestamp, UTC synchronized from GPS.
    Radarcape,
    /// Beast binary, 1GHz radarcape timestamp, not synchronized.
    RadarcapeEmulated,
    /// AVR ASCII, no timestamp.
    Avr,
    /// AVR ASCII, freerunning 48-bit timestamp at 12MHz.
    AvrMlat,
    /// Kinetic SBS binary, freerunning 20MHz 24-bit timestamp that wraps
    /// continuously and is widened by the decoder.
    Sbs,
}

impl DecoderMode {
    /// Frequency of the timestamp counter in Hz. Zero for plain AVR, which
    /// carries no timestamps.
    pub fn frequency(self) -> u64 {
        match self {
            DecoderMode::Beast | DecoderMode::AvrMlat => 12_000_000,
            DecoderMode::Radarcape | DecoderMode::RadarcapeEmulated => 1_000_000_000,
            DecoderMode::Sbs => 20_000_000,
            DecoderMode::Avr => 0,
        }
    }

    /// Epoch label of the timestamp counter, if it has a defined origin.
    pub fn epoch(self) -> Option<&'static str> {
        match self {
            DecoderMode::Radarcape => Some("utc_midnight"),
            _ => None,
        }
    }

    /// True for the modes whose timestamps are GPS nanoseconds since
    /// midnight and therefore roll over at end of day.
    pub fn is_radarcape(self) -> bool {
        matches!(self, DecoderMode::Radarcape | DecoderMode::RadarcapeEmulated)
    }

    pub fn name(self) -> &'static str {
        match self {
            DecoderMode::Beast => "BEAST",
            DecoderMode::Radarcape => "RADARCAPE",
            DecoderMode::RadarcapeEmulated => "RADARCAPE_EMULATED",
            DecoderMode::Avr => "AVR",
            DecoderMode::AvrMlat => "AVRMLAT",
            DecoderMode::Sbs => "SBS",
        }
    }
}

impl fmt::Display for DecoderMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized decoder mode: {0}")]
pub struct ParseModeError(pub String);

impl FromStr for DecoderMode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "BEAST" => Ok(DecoderMode::Beast),
            "RADARCAPE" => Ok(DecoderMode::Radarcape),
            "RADARCAPE_EMULATED" => Ok(DecoderMode::RadarcapeEmulated),
            "AVR" => Ok(DecoderMode::Avr),
            "AVRMLAT" => Ok(DecoderMode::AvrMlat),
            "SBS" => Ok(DecoderMode::Sbs),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Hex utilities
// ---------------------------------------------------------------------------

/// Value of one ASCII hex digit, or `None`.
pub(crate) fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Decode a hex string into bytes. Case-insensitive, must be even length.
pub fn hex_decode(hex: &str) -> Option<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 {
        return None;
    }
    let mut bytes = Vec::with_capacity(hex.len() / 2);
    for chunk in hex.as_bytes().chunks(2) {
        let high = hex_digit(chunk[0])?;
        let low = hex_digit(chunk[1])?;
        bytes.push((high << 4) | low);
    }
    Some(bytes)
}

/// Encode bytes as a lowercase hex string.
pub fn hex_encode(data: &[u8]) -> String {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";
    let mut s = String::with_capacity(data.len() * 2);
    for &b in data {
        s.push(HEX_CHARS[(b >> 4) as usize] as char);
        s.push(HEX_CHARS[(b & 0x0F) as usize] as char);
    }
    s
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
