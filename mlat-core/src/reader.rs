//! The stream reader façade.
//!
//! A [`Reader`] owns the decoder mode, the clock tracker, the filters and
//! the statistics counters, and dispatches byte windows to the parser for
//! the current wire format. It performs no I/O and never buffers input:
//! `feed` reports how many bytes it consumed and the caller re-presents
//! the remainder together with new data.
//!
//! Framing errors are surfaced two-phase. When a malformed byte sequence
//! is found after some messages already parsed in the same call, those
//! messages are returned with `error_pending = true`; the next `feed` on
//! the residual window then fails at offset zero with the actual error.
//! This lets callers drain good data before handling the fault.

use std::collections::HashSet;

use crate::clock::ClockTracker;
use crate::filter::{self, Filters, Verdict};
use crate::message::Message;
use crate::types::{DecoderMode, FeedError, Result};
use crate::{avr, beast, sbs};

/// Boolean knobs controlling what a reader reports.
#[derive(Clone, Copy, Debug)]
pub struct ReaderConfig {
    /// May radarcape status frames switch the decoder mode mid-stream?
    pub allow_mode_change: bool,
    /// Return messages whose timestamp is zero?
    pub want_zero_timestamps: bool,
    /// Return synthetic multilateration result messages?
    pub want_mlat_messages: bool,
    /// Return messages that failed CRC or length checks?
    pub want_invalid_messages: bool,
    /// Return metadata event messages?
    pub want_events: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            allow_mode_change: true,
            want_zero_timestamps: false,
            want_mlat_messages: false,
            want_invalid_messages: false,
            want_events: true,
        }
    }
}

/// Outcome of one `feed` call.
#[derive(Debug)]
pub struct FeedResult {
    /// Bytes consumed from the front of the window. The caller re-presents
    /// everything after this point on the next call.
    pub consumed: usize,
    /// Decoded messages and events, in wire order.
    pub messages: Vec<Message>,
    /// A framing error follows the consumed bytes; feeding the residual
    /// window again will return it.
    pub error_pending: bool,
}

/// Streaming Mode S / Mode A/C decoder for one receiver connection.
pub struct Reader {
    mode: Option<DecoderMode>,
    pub config: ReaderConfig,
    pub filters: Filters,
    /// Addresses seen in CRC-checked messages, when tracking is enabled.
    pub seen: Option<HashSet<u32>>,
    pub(crate) clock: ClockTracker,
    /// Status frames report whether the firmware already reports UTC
    /// seconds (rather than the next second).
    pub(crate) radarcape_utc_bugfix: bool,
    pub received_messages: u64,
    pub suppressed_messages: u64,
    pub mlat_messages: u64,
}

impl Reader {
    pub fn new(mode: Option<DecoderMode>) -> Self {
        let mut reader = Reader {
            mode: None,
            config: ReaderConfig::default(),
            filters: Filters::default(),
            seen: None,
            clock: ClockTracker::new(),
            radarcape_utc_bugfix: false,
            received_messages: 0,
            suppressed_messages: 0,
            mlat_messages: 0,
        };
        reader.set_mode(mode);
        reader
    }

    pub fn mode(&self) -> Option<DecoderMode> {
        self.mode
    }

    /// Switch decoder mode, deriving timestamp frequency and epoch.
    pub fn set_mode(&mut self, mode: Option<DecoderMode>) {
        self.mode = mode;
        let frequency = mode.map_or(0, DecoderMode::frequency);
        let utc_day_epoch = mode.is_some_and(DecoderMode::is_radarcape);
        self.clock.configure(frequency, utc_day_epoch);
    }

    /// Timestamp counter frequency of the current mode, in Hz.
    pub fn frequency(&self) -> u64 {
        self.mode.map_or(0, DecoderMode::frequency)
    }

    /// Timestamp epoch label of the current mode, if any.
    pub fn epoch(&self) -> Option<&'static str> {
        self.mode.and_then(DecoderMode::epoch)
    }

    /// Last accepted hardware timestamp, in current-mode units.
    pub fn last_timestamp(&self) -> u64 {
        self.clock.last_timestamp()
    }

    /// Process a window of receiver bytes.
    ///
    /// Returns the consumed byte count, the decoded messages in wire
    /// order, and the pending-error flag. `max_messages = 0` sizes the
    /// output for the worst-case message density of the window; a nonzero
    /// bound makes the parser stop early with `consumed < buf.len()` so
    /// the caller can re-invoke.
    pub fn feed(&mut self, buf: &[u8], max_messages: usize) -> Result<FeedResult> {
        match self.mode {
            None => Err(FeedError::NoModeSelected),
            Some(DecoderMode::Beast)
            | Some(DecoderMode::Radarcape)
            | Some(DecoderMode::RadarcapeEmulated) => {
                let max = if max_messages == 0 {
                    // minimal record: 1A '1' + 6 ts + 1 signal + 2 payload
                    buf.len() / 11 + 2
                } else {
                    max_messages
                };
                beast::feed(self, buf, max)
            }
            Some(DecoderMode::Avr) | Some(DecoderMode::AvrMlat) => {
                let max = if max_messages == 0 {
                    // minimal record: '*' + 4 hex + ';' + LF
                    buf.len() / 5 + 1
                } else {
                    max_messages
                };
                avr::feed(self, buf, max)
            }
            Some(DecoderMode::Sbs) => {
                let max = if max_messages == 0 {
                    // minimal record: DLE STX + 5 header + 2 payload + DLE ETX + CRC
                    buf.len() / 13 + 1
                } else {
                    max_messages
                };
                sbs::feed(self, buf, max)
            }
        }
    }

    /// Count and filter one decoded frame, appending it to `out` when
    /// accepted.
    pub(crate) fn accept_message(&mut self, msg: Message, out: &mut Vec<Message>) {
        self.received_messages += 1;
        let verdict = filter::message_wanted(
            &msg,
            &self.filters,
            self.seen.as_mut(),
            &self.clock,
            &self.config,
        );
        match verdict {
            Verdict::Accept => out.push(msg),
            Verdict::Suppress => self.suppressed_messages += 1,
            Verdict::SuppressMlat => {
                self.mlat_messages += 1;
                self.suppressed_messages += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_none_rejects_feed() {
        let mut reader = Reader::new(None);
        let err = reader.feed(b"\x1a1", 0).unwrap_err();
        assert_eq!(err, FeedError::NoModeSelected);
    }

    #[test]
    fn test_mode_derives_frequency_and_epoch() {
        let mut reader = Reader::new(Some(DecoderMode::Beast));
        assert_eq!(reader.frequency(), 12_000_000);
        assert_eq!(reader.epoch(), None);

        reader.set_mode(Some(DecoderMode::Radarcape));
        assert_eq!(reader.frequency(), 1_000_000_000);
        assert_eq!(reader.epoch(), Some("utc_midnight"));

        reader.set_mode(Some(DecoderMode::Avr));
        assert_eq!(reader.frequency(), 0);
        assert_eq!(reader.epoch(), None);

        reader.set_mode(None);
        assert_eq!(reader.mode(), None);
        assert_eq!(reader.frequency(), 0);
    }
}
