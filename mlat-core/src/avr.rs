//! AVR ASCII frame parser.
//!
//! Line-oriented: each record is a format marker, optional hex timestamp
//! and signal, the payload as hex digits, and a `;` terminator optionally
//! followed by CR/LF. Markers `@`, `%` and `<` carry a 12-digit (48-bit)
//! timestamp; `<` additionally carries two signal digits that are
//! skipped; `*` and `:` carry neither.

use crate::message::{EventData, Message};
use crate::reader::{FeedResult, Reader};
use crate::types::{hex_digit, FeedError, Result, DF_EVENT_TIMESTAMP_JUMP};

pub(crate) fn feed(reader: &mut Reader, buf: &[u8], max_messages: usize) -> Result<FeedResult> {
    let mut messages: Vec<Message> = Vec::with_capacity(max_messages);
    let mut p = 0usize;
    let eod = buf.len();
    let mut error_pending = false;

    // keep one slot of headroom for a jump event ahead of its message
    'records: while p + 17 <= eod && messages.len() + 1 < max_messages {
        let format = buf[p];
        if !matches!(format, b'@' | b'%' | b'<' | b'*' | b':') {
            let err = FeedError::ExpectedRecordStart { offset: p, found: format };
            if messages.is_empty() {
                return Err(err);
            }
            error_pending = true;
            break 'records;
        }

        let mut m = p + 1;
        let mut timestamp = 0u64;
        if matches!(format, b'@' | b'%' | b'<') {
            // 12 hex digits of 48-bit timestamp
            for _ in 0..12 {
                if m >= eod {
                    break 'records;
                }
                match hex_digit(buf[m]) {
                    Some(v) => timestamp = (timestamp << 4) | v as u64,
                    None => {
                        let err = FeedError::ExpectedHexDigit { offset: m, found: buf[m] };
                        if messages.is_empty() {
                            return Err(err);
                        }
                        error_pending = true;
                        break 'records;
                    }
                }
                m += 1;
            }
        }

        if format == b'<' {
            // skip 2 hex digits of signal level
            m += 2;
            if m >= eod {
                break 'records;
            }
        }

        // payload hex digits up to the terminator
        let mut data = [0u8; 14];
        let mut message_len = 0usize;
        while message_len < 14 {
            if m + 1 >= eod {
                break 'records;
            }
            if buf[m] == b';' {
                break;
            }
            let high = match hex_digit(buf[m]) {
                Some(v) => v,
                None => {
                    let err = FeedError::ExpectedHexDigit { offset: m, found: buf[m] };
                    if messages.is_empty() {
                        return Err(err);
                    }
                    error_pending = true;
                    break 'records;
                }
            };
            let low = match hex_digit(buf[m + 1]) {
                Some(v) => v,
                None => {
                    let err = FeedError::ExpectedHexDigit { offset: m + 1, found: buf[m + 1] };
                    if messages.is_empty() {
                        return Err(err);
                    }
                    error_pending = true;
                    break 'records;
                }
            };
            data[message_len] = (high << 4) | low;
            message_len += 1;
            m += 2;
        }

        if m >= eod {
            break 'records;
        }
        if buf[m] != b';' {
            let err = FeedError::ExpectedTerminator { offset: m, found: buf[m] };
            if messages.is_empty() {
                return Err(err);
            }
            error_pending = true;
            break 'records;
        }
        m += 1;

        // optional line ending: CR, LF, CRLF, LFCR all seen in the wild
        while m < eod && (buf[m] == b'\r' || buf[m] == b'\n') {
            m += 1;
        }

        if message_len != 2 && message_len != 7 && message_len != 14 {
            let err = FeedError::BadMessageLength { offset: p, len: message_len };
            if messages.is_empty() {
                return Err(err);
            }
            error_pending = true;
            break 'records;
        }

        // stale Mode A/C is common, skip the outlier check for it
        if message_len != 2 {
            let last = reader.clock.last_timestamp();
            let in_range = reader.clock.check(timestamp);
            if !in_range && reader.config.want_events {
                messages.push(Message::event(
                    DF_EVENT_TIMESTAMP_JUMP,
                    timestamp,
                    EventData::TimestampJump { last_timestamp: last },
                ));
            }
        }
        reader.clock.update(timestamp);

        let msg = Message::from_frame(timestamp, 0, &data[..message_len]);
        reader.accept_message(msg, &mut messages);

        p = m;
    }

    Ok(FeedResult {
        consumed: p,
        messages,
        error_pending,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DecoderMode;

    fn reader() -> Reader {
        Reader::new(Some(DecoderMode::AvrMlat))
    }

    #[test]
    fn test_timestamped_short_frame() {
        let mut reader = reader();
        reader.config.want_invalid_messages = true;
        let result = reader.feed(b"@0000000003e85d4840d6123456;\n", 0).unwrap();
        assert_eq!(result.messages.len(), 1);
        let msg = &result.messages[0];
        assert_eq!(msg.df, 11);
        assert_eq!(msg.timestamp, 0x3E8);
        assert_eq!(msg.signal, 0);
        assert_eq!(reader.last_timestamp(), 0x3E8);
    }

    #[test]
    fn test_percent_marker_and_long_frame() {
        let mut reader = reader();
        let result = reader
            .feed(b"%0000000003e88d4840d6202cc371c32ce0576098;\r\n", 0)
            .unwrap();
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].df, 17);
        assert_eq!(result.messages[0].address, Some(0x4840D6));
        assert!(result.messages[0].valid);
    }

    #[test]
    fn test_signal_marker_skips_signal_digits() {
        let mut reader = reader();
        let result = reader
            .feed(b"<0000000003e8a78d4840d6202cc371c32ce0576098;\n", 0)
            .unwrap();
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].df, 17);
        assert_eq!(result.messages[0].timestamp, 0x3E8);
    }

    #[test]
    fn test_untimestamped_frame_needs_zero_flag() {
        let mut reader = reader();
        // zero-timestamp messages are dropped by default
        let result = reader
            .feed(b"*8d4840d6202cc371c32ce0576098;\n\n\n\n\n\n\n\n\n\n\n\n\n\n\n", 0)
            .unwrap();
        assert!(result.messages.is_empty());
        assert_eq!(reader.suppressed_messages, 1);

        reader.config.want_zero_timestamps = true;
        let result = reader
            .feed(b"*8d4840d6202cc371c32ce0576098;\n\n\n\n\n\n\n\n\n\n\n\n\n\n\n", 0)
            .unwrap();
        assert_eq!(result.messages.len(), 1);
        assert_eq!(result.messages[0].timestamp, 0);
    }

    #[test]
    fn test_crlf_variants() {
        let mut reader = reader();
        reader.config.want_zero_timestamps = true;
        let mut input = Vec::new();
        input.extend_from_slice(b"@0000000007d01234;\r\n");
        input.extend_from_slice(b"@0000000007d11234;\n\r");
        input.extend_from_slice(b"@0000000007d21234;\n");
        input.extend_from_slice(b"@0000000007d31234;00000000"); // next record pending
        let result = reader.feed(&input, 0).unwrap();
        assert_eq!(result.messages.len(), 4);
        assert_eq!(result.consumed, input.len() - 8);
    }

    #[test]
    fn test_bad_hex_digit_is_framing_error() {
        let mut reader = reader();
        let err = reader.feed(b"@00000000zzzz5d4840d6123456;\n", 0).unwrap_err();
        assert!(matches!(err, FeedError::ExpectedHexDigit { offset: 9, .. }));
    }

    #[test]
    fn test_bad_marker_is_framing_error() {
        let mut reader = reader();
        let err = reader.feed(b"#0000000003e85d4840d6123456;\n", 0).unwrap_err();
        assert_eq!(err, FeedError::ExpectedRecordStart { offset: 0, found: b'#' });
    }

    #[test]
    fn test_bad_payload_length() {
        let mut reader = reader();
        // 4-byte payload is not a Mode A/C or Mode S length
        let err = reader.feed(b"@0000000003e85d4840d6;\n\n\n\n\n\n\n", 0).unwrap_err();
        assert_eq!(err, FeedError::BadMessageLength { offset: 0, len: 4 });
    }

    #[test]
    fn test_two_phase_error_after_good_record() {
        let mut reader = reader();
        reader.config.want_zero_timestamps = true;
        let input = b"@0000000007d01234;\n#garbage-follows-here";
        let result = reader.feed(input, 0).unwrap();
        assert_eq!(result.messages.len(), 1);
        assert!(result.error_pending);
        assert_eq!(result.consumed, 19);

        let err = reader.feed(&input[result.consumed..], 0).unwrap_err();
        assert_eq!(err, FeedError::ExpectedRecordStart { offset: 0, found: b'#' });
    }

    #[test]
    fn test_incomplete_record_not_consumed() {
        let mut reader = reader();
        let input = b"@0000000003e85d4840d61234";
        let result = reader.feed(input, 0).unwrap();
        assert_eq!(result.consumed, 0);
        assert!(result.messages.is_empty());
        assert!(!result.error_pending);
    }

    #[test]
    fn test_jump_event_on_wild_timestamp() {
        let mut reader = reader();
        reader.config.want_invalid_messages = true;
        // establish a time base around 1s, then jump 1000s ahead
        let result = reader.feed(b"@000000b71b005d4840d6123456;\n", 0).unwrap();
        assert_eq!(result.messages.len(), 1);
        let result = reader.feed(b"@002cb4178c005d4840d6123456;\n", 0).unwrap();
        let events: Vec<_> = result.messages.iter().filter(|m| m.is_event()).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].df, DF_EVENT_TIMESTAMP_JUMP);
        // the message itself is suppressed while the time base is in doubt
        assert_eq!(result.messages.len(), 1);
    }

    #[test]
    fn test_modeac_skips_outlier_check() {
        let mut reader = reader();
        reader.feed(b"@000000b71b005d4840d6123456;\n", 0).unwrap();
        // a wildly stale Mode A/C line produces no jump event
        let result = reader.feed(b"@0000000000011234;\n\n\n\n\n\n\n\n\n\n\n", 0).unwrap();
        assert!(result.messages.iter().all(|m| !m.is_event()));
    }
}
