//! SBS / Kinetic binary frame parser.
//!
//! Records are framed DLE STX .. DLE ETX with two trailing CRC bytes; a
//! literal 0x10 inside the record is doubled. Record content is
//! `type spare ts0 ts1 ts2 data…` with a little-endian 24-bit timestamp
//! measured at the *end* of the frame.
//!
//! The Mode S bytes are stored XOR-scrambled: the receiver XORs the
//! computed CRC into the parity field, so a correct DF17 arrives with
//! zeroed parity bytes. Recomputing the CRC over the body and XORing it
//! back recovers the canonical frame.
//!
//! The 24-bit counter at 20MHz wraps about every 839ms; it is widened
//! against the last accepted timestamp assuming at least one message per
//! wrap, with no outlier checking (see [`crate::clock`]).

use crate::crc;
use crate::message::Message;
use crate::reader::{FeedResult, Reader};
use crate::types::{FeedError, Result};

const DLE: u8 = 0x10;
const STX: u8 = 0x02;
const ETX: u8 = 0x03;

/// type(1) + spare(1) + timestamp(3) + longest Mode S frame(14)
const MAX_RECORD: usize = 19;

pub(crate) fn feed(reader: &mut Reader, buf: &[u8], max_messages: usize) -> Result<FeedResult> {
    let mut messages: Vec<Message> = Vec::with_capacity(max_messages);
    let mut p = 0usize;
    let eod = buf.len();
    let mut error_pending = false;

    'records: while p + 13 <= eod && messages.len() < max_messages {
        if buf[p] != DLE || buf[p + 1] != STX {
            let err = FeedError::ExpectedDleStx { offset: p, b0: buf[p], b1: buf[p + 1] };
            if messages.is_empty() {
                return Err(err);
            }
            error_pending = true;
            break 'records;
        }

        // copy unescaped record content up to DLE ETX
        let mut m = p + 2;
        let mut data = [0u8; MAX_RECORD];
        let mut content_len = 0usize;
        loop {
            if m >= eod {
                break 'records;
            }
            if buf[m] == DLE {
                if m + 1 >= eod {
                    break 'records;
                }
                if buf[m + 1] == ETX {
                    break;
                }
                if buf[m + 1] != DLE {
                    let err = FeedError::BadDle { offset: m, found: buf[m + 1] };
                    if messages.is_empty() {
                        return Err(err);
                    }
                    error_pending = true;
                    break 'records;
                }
                m += 1; // DLE DLE
            }
            if content_len < MAX_RECORD {
                data[content_len] = buf[m];
                content_len += 1;
            }
            m += 1;
        }
        m += 2; // past DLE ETX

        // two CRC bytes follow, each possibly DLE-escaped
        for _ in 0..2 {
            if m >= eod {
                break 'records;
            }
            let byte = buf[m];
            m += 1;
            if byte == DLE {
                if m >= eod {
                    break 'records;
                }
                if buf[m] != DLE {
                    let err = FeedError::BadDle { offset: m, found: buf[m] };
                    if messages.is_empty() {
                        return Err(err);
                    }
                    error_pending = true;
                    break 'records;
                }
                m += 1;
            }
        }

        let message_len = match data[0] {
            0x01 | 0x05 => 14, // ADS-B / Mode S long
            0x07 => 7,         // Mode S short
            0x09 => 2,         // Mode A/C
            _ => {
                // some other record type (e.g. AIS), skip it silently
                p = m;
                continue;
            }
        };

        if 5 + message_len > content_len {
            // truncated content, skip
            p = m;
            continue;
        }

        if message_len > 2 {
            // undo the CRC scrambling
            let payload = &mut data[5..5 + message_len];
            let c = crc::crc(&payload[..message_len - 3]);
            payload[message_len - 3] ^= (c >> 16) as u8;
            payload[message_len - 2] ^= (c >> 8) as u8;
            payload[message_len - 1] ^= c as u8;
        }

        // little-endian 24-bit timestamp, measured at end of frame; shift
        // it so it consistently anchors to start-of-frame + 112us
        let ts24 = ((data[4] as u64) << 16) | ((data[3] as u64) << 8) | data[2] as u64;
        let ts24 = (ts24 + (14 - message_len as u64) * 160) & 0xFF_FFFF;
        let timestamp = reader.clock.widen_sbs(ts24);

        let msg = Message::from_frame(timestamp, 0, &data[5..5 + message_len]);
        reader.accept_message(msg, &mut messages);

        p = m;
    }

    Ok(FeedResult {
        consumed: p,
        messages,
        error_pending,
    })
}
