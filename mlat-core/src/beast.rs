//! Beast / Radarcape binary frame parser.
//!
//! A record is `1A <type>` followed by a type-dependent body. Types '1'
//! (Mode A/C), '2' (short Mode S), '3' (long Mode S) and '4' (radarcape
//! status) carry a 6-byte big-endian timestamp and a signal byte before
//! the payload; type '5' (radarcape position) carries a bare 21-byte
//! payload. Everywhere after the type byte, a literal 0x1A is transmitted
//! doubled; a lone 0x1A is a framing violation.
//!
//! Radarcape status records double as a mode-change protocol: the settings
//! byte says whether the receiver timestamps at 12MHz or with GPS
//! nanoseconds, and the decoder reshapes its timestamp handling
//! accordingly, mid-stream.

use crate::clock::OUTLIER_LIMIT;
use crate::message::{radarcape_settings, EventData, GpsStatus, Message};
use crate::reader::{FeedResult, Reader};
use crate::types::{
    is_synthetic_timestamp, DecoderMode, FeedError, Result, DF_EVENT_EPOCH_ROLLOVER,
    DF_EVENT_MODE_CHANGE, DF_EVENT_RADARCAPE_POSITION, DF_EVENT_RADARCAPE_STATUS,
    DF_EVENT_TIMESTAMP_JUMP,
};

const ESCAPE: u8 = 0x1A;

const NANOS_PER_SECOND: u64 = 1_000_000_000;
const NANOS_PER_DAY: u64 = 86_400 * NANOS_PER_SECOND;

/// Read `out.len()` doubling-decoded bytes starting at `pos`.
///
/// Returns the index just past the consumed region, `None` when the window
/// ends inside the record, or a framing error for an unpaired escape.
fn unescape(buf: &[u8], mut pos: usize, out: &mut [u8]) -> Result<Option<usize>> {
    for slot in out.iter_mut() {
        if pos >= buf.len() {
            return Ok(None);
        }
        let byte = buf[pos];
        pos += 1;
        if byte == ESCAPE {
            if pos < buf.len() && buf[pos] != ESCAPE {
                return Err(FeedError::BadEscape { offset: pos });
            }
            pos += 1;
            if pos > buf.len() {
                return Ok(None);
            }
        }
        *slot = byte;
    }
    Ok(Some(pos))
}

pub(crate) fn feed(reader: &mut Reader, buf: &[u8], max_messages: usize) -> Result<FeedResult> {
    let mut messages: Vec<Message> = Vec::with_capacity(max_messages);
    let mut p = 0usize;
    let eod = buf.len();
    let mut error_pending = false;

    // keep two slots of headroom: a record can emit an event and a message
    'records: while p + 2 <= eod && messages.len() + 2 < max_messages {
        if buf[p] != ESCAPE {
            let err = FeedError::ExpectedMarker { offset: p, found: buf[p] };
            if messages.is_empty() {
                return Err(err);
            }
            error_pending = true;
            break 'records;
        }

        let rtype = buf[p + 1];
        let (message_len, has_timestamp_signal) = match rtype {
            b'1' => (2usize, true),  // Mode A/C
            b'2' => (7, true),       // Mode S short
            b'3' => (14, true),      // Mode S long
            b'4' => (14, true),      // radarcape status
            b'5' => (21, false),     // radarcape position, no timestamp/signal
            _ => {
                let err = FeedError::UnknownRecordType { offset: p, found: rtype };
                if messages.is_empty() {
                    return Err(err);
                }
                error_pending = true;
                break 'records;
            }
        };

        let prefix = if has_timestamp_signal { 7 } else { 0 };
        let mut raw = [0u8; 21];
        let end = match unescape(buf, p + 2, &mut raw[..prefix + message_len]) {
            Ok(Some(end)) => end,
            Ok(None) => break 'records, // record extends past the window
            Err(err) => {
                if messages.is_empty() {
                    return Err(err);
                }
                error_pending = true;
                break 'records;
            }
        };

        let (mut timestamp, signal, data) = if has_timestamp_signal {
            let mut ts = 0u64;
            for &b in &raw[..6] {
                ts = (ts << 8) | b as u64;
            }
            (ts, raw[6], &raw[7..7 + message_len])
        } else {
            (0, 0, &raw[..message_len])
        };

        if rtype == b'4' {
            // status record: may reshape the decoder's timestamp semantics
            reader.radarcape_utc_bugfix = data[2] & 0x80 == 0x80;

            if reader.config.allow_mode_change {
                let newmode = if data[0] & 0x10 != 0 {
                    if data[2] & 0x20 == 0x20 {
                        DecoderMode::RadarcapeEmulated
                    } else {
                        DecoderMode::Radarcape
                    }
                } else {
                    DecoderMode::Beast
                };

                if reader.mode() != Some(newmode) {
                    reader.set_mode(Some(newmode));
                    tracing::debug!(mode = %newmode, "status frame switched decoder mode");
                    if reader.config.want_events {
                        messages.push(Message::event(
                            DF_EVENT_MODE_CHANGE,
                            0,
                            EventData::ModeChange {
                                mode: newmode,
                                frequency: newmode.frequency(),
                                epoch: newmode.epoch(),
                            },
                        ));
                    }
                }
            }
        }

        if has_timestamp_signal && !is_synthetic_timestamp(timestamp) {
            if reader.mode() == Some(DecoderMode::Beast) {
                // 12MHz counter. dump1090 can hold messages for up to a
                // minute and sends very stale Mode A/C, so the check skips
                // type '1' and jump events wait for a confirmed outlier.
                if rtype != b'1' {
                    let last = reader.clock.last_timestamp();
                    let in_range = reader.clock.check(timestamp);
                    if !in_range
                        && reader.clock.outliers() > OUTLIER_LIMIT
                        && reader.config.want_events
                    {
                        messages.push(Message::event(
                            DF_EVENT_TIMESTAMP_JUMP,
                            timestamp,
                            EventData::TimestampJump { last_timestamp: last },
                        ));
                    }
                }

                // anchor the timestamp to the start of the frame
                let adjust = match rtype {
                    // Mode A/C: reported at F2, 20.3us after F1
                    b'1' => 244,
                    // Mode S: reported at bit 56, 8us preamble + 56us data
                    b'2' | b'3' => 768,
                    _ => 0,
                };
                timestamp = timestamp.saturating_sub(adjust);
            } else {
                // GPS mode: the raw value is secs << 30 | nanos, flatten
                // it to contiguous nanoseconds since midnight
                let nanos = timestamp & 0x3FFF_FFFF;
                let mut secs = timestamp >> 30;

                if !reader.radarcape_utc_bugfix {
                    // pre-fix firmware reports the next second
                    secs = if secs == 0 { 86_399 } else { secs - 1 };
                }

                timestamp = nanos + secs * NANOS_PER_SECOND;

                let adjust: u64 = match rtype {
                    b'1' => 20_300,
                    b'2' => 64_000,
                    b'3' => 120_000,
                    _ => 0,
                };
                if adjust <= timestamp {
                    timestamp -= adjust;
                } else {
                    // wrap to the previous day
                    timestamp = timestamp + NANOS_PER_DAY - adjust;
                }

                let last = reader.clock.last_timestamp();
                if last >= 86_340 * NANOS_PER_SECOND && timestamp <= 60 * NANOS_PER_SECOND {
                    // GPS end of day
                    if reader.config.want_events {
                        messages.push(Message::event(
                            DF_EVENT_EPOCH_ROLLOVER,
                            timestamp,
                            EventData::EpochRollover,
                        ));
                    }
                } else if rtype != b'1' {
                    let in_range = reader.clock.check(timestamp);
                    if !in_range && reader.config.want_events {
                        messages.push(Message::event(
                            DF_EVENT_TIMESTAMP_JUMP,
                            timestamp,
                            EventData::TimestampJump { last_timestamp: last },
                        ));
                    }
                }
            }

            if rtype != b'1' {
                reader.clock.update(timestamp);
            }
        }

        if rtype == b'4' {
            if reader.config.want_events {
                messages.push(Message::event(
                    DF_EVENT_RADARCAPE_STATUS,
                    timestamp,
                    EventData::RadarcapeStatus {
                        settings: radarcape_settings(data[0]),
                        timestamp_pps_delta: data[1] as i8,
                        gps_status: GpsStatus::from_byte(data[2]),
                    },
                ));
            }
            p = end;
            continue;
        }

        if rtype == b'5' {
            if reader.config.want_events {
                messages.push(Message::event(
                    DF_EVENT_RADARCAPE_POSITION,
                    0,
                    EventData::RadarcapePosition {
                        lat: f32::from_be_bytes([data[4], data[5], data[6], data[7]]),
                        lon: f32::from_be_bytes([data[8], data[9], data[10], data[11]]),
                        alt: f32::from_be_bytes([data[12], data[13], data[14], data[15]]),
                    },
                ));
            }
            p = end;
            continue;
        }

        let msg = Message::from_frame(timestamp, signal, data);
        reader.accept_message(msg, &mut messages);
        p = end;
    }

    Ok(FeedResult {
        consumed: p,
        messages,
        error_pending,
    })
}
