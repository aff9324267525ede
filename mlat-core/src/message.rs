//! The decoded message value type and the Mode S field decoder.
//!
//! A [`Message`] is either a decoded frame (Mode A/C or Mode S, with an
//! owned copy of the payload bytes) or a metadata event (`df >= 33`, no
//! payload, structured [`EventData`]). Messages compare, order and hash by
//! payload bytes alone so that identical frames received at different
//! times or signal levels deduplicate.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::altitude::{decode_ac12, decode_ac13};
use crate::crc;
use crate::types::{
    DecoderMode, DF_EVENT_EPOCH_ROLLOVER, DF_EVENT_MODE_CHANGE, DF_EVENT_RADARCAPE_POSITION,
    DF_EVENT_RADARCAPE_STATUS, DF_EVENT_TIMESTAMP_JUMP, DF_MODEAC,
};

// ---------------------------------------------------------------------------
// Event payloads
// ---------------------------------------------------------------------------

/// Radarcape GPS status, decoded from the third status byte.
///
/// Receivers without the UTC bugfix firmware report only the legacy form;
/// the detailed subfields are then absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct GpsStatus {
    pub utc_bugfix: bool,
    pub timestamp_ok: bool,
    pub sync_ok: Option<bool>,
    pub utc_offset_ok: Option<bool>,
    pub sats_ok: Option<bool>,
    pub tracking_ok: Option<bool>,
    pub antenna_ok: Option<bool>,
}

impl GpsStatus {
    pub fn from_byte(status: u8) -> Self {
        if status & 0x80 == 0 {
            return GpsStatus {
                utc_bugfix: false,
                timestamp_ok: true,
                sync_ok: None,
                utc_offset_ok: None,
                sats_ok: None,
                tracking_ok: None,
                antenna_ok: None,
            };
        }

        GpsStatus {
            utc_bugfix: true,
            timestamp_ok: status & 0x20 == 0,
            sync_ok: Some(status & 0x10 != 0),
            utc_offset_ok: Some(status & 0x08 != 0),
            sats_ok: Some(status & 0x04 != 0),
            tracking_ok: Some(status & 0x02 != 0),
            antenna_ok: Some(status & 0x01 != 0),
        }
    }
}

/// Decode a radarcape DIP-switch settings byte into its setting labels.
pub fn radarcape_settings(settings: u8) -> Vec<&'static str> {
    vec![
        if settings & 0x01 != 0 {
            "beast"
        } else if settings & 0x04 != 0 {
            "avrmlat"
        } else {
            "avr"
        },
        if settings & 0x02 != 0 { "filtered_frames" } else { "all_frames" },
        if settings & 0x08 != 0 { "no_crc" } else { "check_crc" },
        if settings & 0x10 != 0 { "gps_timestamps" } else { "legacy_timestamps" },
        if settings & 0x20 != 0 { "rtscts" } else { "no_rtscts" },
        if settings & 0x40 != 0 { "no_fec" } else { "fec" },
        if settings & 0x80 != 0 { "modeac" } else { "no_modeac" },
    ]
}

/// Structured payload of a metadata event message.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventData {
    ModeChange {
        mode: DecoderMode,
        frequency: u64,
        epoch: Option<&'static str>,
    },
    TimestampJump {
        last_timestamp: u64,
    },
    EpochRollover,
    RadarcapeStatus {
        settings: Vec<&'static str>,
        timestamp_pps_delta: i8,
        gps_status: GpsStatus,
    },
    RadarcapePosition {
        lat: f32,
        lon: f32,
        alt: f32,
    },
}

fn df_event_name(df: u8) -> Option<&'static str> {
    match df {
        DF_EVENT_TIMESTAMP_JUMP => Some("DF_EVENT_TIMESTAMP_JUMP"),
        DF_EVENT_MODE_CHANGE => Some("DF_EVENT_MODE_CHANGE"),
        DF_EVENT_EPOCH_ROLLOVER => Some("DF_EVENT_EPOCH_ROLLOVER"),
        DF_EVENT_RADARCAPE_STATUS => Some("DF_EVENT_RADARCAPE_STATUS"),
        DF_EVENT_RADARCAPE_POSITION => Some("DF_EVENT_RADARCAPE_POSITION"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One decoded frame or one metadata event.
#[derive(Clone, Debug, Serialize)]
pub struct Message {
    /// Hardware timestamp; units depend on the decoder mode that produced
    /// it. Writable so that upstream can rewrite it to an adjusted
    /// frame-start reference.
    pub timestamp: u64,
    /// Signal level, 0 for formats that do not report one.
    pub signal: u8,
    /// Downlink format, or one of the `DF_*` sentinels.
    pub df: u8,
    /// NUCp, nonzero only for DF17/18 position messages.
    pub nuc: u8,
    pub even_cpr: bool,
    pub odd_cpr: bool,
    pub valid: bool,
    pub crc_residual: Option<u32>,
    /// 24-bit ICAO address, or the squawk code for Mode A/C.
    pub address: Option<u32>,
    /// Barometric altitude in feet.
    pub altitude: Option<i32>,
    /// Raw frame bytes (2, 7 or 14); absent for events.
    pub payload: Option<Vec<u8>>,
    /// Structured payload for events; absent for frames.
    pub eventdata: Option<EventData>,
}

impl Message {
    /// Decode a Mode A/C or Mode S frame from its payload bytes.
    ///
    /// The payload is copied; the caller may reuse its buffer. Frames that
    /// fail CRC or have an unexpected length come back with
    /// `valid == false` and whatever fields could still be extracted.
    pub fn from_frame(timestamp: u64, signal: u8, data: &[u8]) -> Message {
        let mut msg = Message {
            timestamp,
            signal,
            df: 0,
            nuc: 0,
            even_cpr: false,
            odd_cpr: false,
            valid: false,
            crc_residual: None,
            address: None,
            altitude: None,
            payload: Some(data.to_vec()),
            eventdata: None,
        };
        msg.decode();
        msg
    }

    /// Build a metadata event message.
    pub fn event(df: u8, timestamp: u64, eventdata: EventData) -> Message {
        Message {
            timestamp,
            signal: 0,
            df,
            nuc: 0,
            even_cpr: false,
            odd_cpr: false,
            valid: false,
            crc_residual: None,
            address: None,
            altitude: None,
            payload: None,
            eventdata: Some(eventdata),
        }
    }

    /// True for metadata events (`df >= 33`).
    pub fn is_event(&self) -> bool {
        self.eventdata.is_some()
    }

    fn decode(&mut self) {
        let Some(data) = self.payload.take() else {
            return;
        };
        self.decode_payload(&data);
        self.payload = Some(data);
    }

    fn decode_payload(&mut self, data: &[u8]) {
        if data.len() == 2 {
            // Mode A/C: the two bytes are the squawk code
            self.df = DF_MODEAC;
            self.address = Some(((data[0] as u32) << 8) | data[1] as u32);
            self.valid = true;
            return;
        }

        self.df = (data[0] >> 3) & 31;

        if (self.df < 16 && data.len() != 7) || (self.df >= 16 && data.len() != 14) {
            // wrong length for the DF class, no further processing
            return;
        }

        let residual = crc::residual(data);
        self.crc_residual = Some(residual);

        match self.df {
            0 | 4 | 16 | 20 => {
                // address/parity reply with 13-bit altitude field
                self.address = Some(residual);
                self.altitude = decode_ac13(((data[2] as u16 & 0x1F) << 8) | data[3] as u16);
                self.valid = true;
            }

            5 | 21 | 24 => {
                self.address = Some(residual);
                self.valid = true;
            }

            11 => {
                // all-call reply: low 7 residual bits carry the IID
                self.valid = residual & !0x7F == 0;
                if self.valid {
                    self.address = Some(
                        (data[1] as u32) << 16 | (data[2] as u32) << 8 | data[3] as u32,
                    );
                }
            }

            17 | 18 => {
                self.valid = residual == 0;
                if self.valid {
                    self.address = Some(
                        (data[1] as u32) << 16 | (data[2] as u32) << 8 | data[3] as u32,
                    );

                    let metype = data[4] >> 3;
                    if (9..=18).contains(&metype) || (20..22).contains(&metype) {
                        self.nuc = if metype <= 18 { 18 - metype } else { 29 - metype };

                        if data[6] & 0x04 != 0 {
                            self.odd_cpr = true;
                        } else {
                            self.even_cpr = true;
                        }

                        self.altitude = decode_ac12(
                            ((data[5] as u16) << 4) | ((data[6] as u16 & 0xF0) >> 4),
                        );

                        // All-zero CPR coordinates are implausible and turn
                        // up in corrupted-but-CRC-clean frames.
                        let cpr_lat = ((data[6] as u32 & 0x03) << 15)
                            | ((data[7] as u32) << 7)
                            | ((data[8] as u32) >> 1);
                        let cpr_lon = ((data[8] as u32 & 0x01) << 16)
                            | ((data[9] as u32) << 8)
                            | data[10] as u32;
                        if cpr_lat == 0 || cpr_lon == 0 {
                            self.valid = false;
                        }
                    }
                }
            }

            _ => {
                // unhandled DF, leave defaults
            }
        }
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.payload == other.payload
    }
}

impl Eq for Message {}

impl PartialOrd for Message {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Message {
    fn cmp(&self, other: &Self) -> Ordering {
        // shorter payloads order first, then bytewise; events sort ahead
        match (&self.payload, &other.payload) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
        }
    }
}

impl Hash for Message {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.payload.hash(state);
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            Some(data) => f.write_str(&crate::types::hex_encode(data)),
            None => match df_event_name(self.df) {
                Some(name) => write!(f, "{}@{}", name, self.timestamp),
                None => write!(f, "DF{}@{}", self.df, self.timestamp),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::hex_decode;

    fn frame(hex: &str) -> Message {
        Message::from_frame(1, 0, &hex_decode(hex).unwrap())
    }

    /// Append a correct parity field to a frame body.
    fn with_parity(body: &[u8]) -> Vec<u8> {
        let parity = crc::crc(body);
        let mut frame = body.to_vec();
        frame.push((parity >> 16) as u8);
        frame.push((parity >> 8) as u8);
        frame.push(parity as u8);
        frame
    }

    #[test]
    fn test_modeac_frame() {
        let msg = Message::from_frame(5, 0xA0, &[0x12, 0x34]);
        assert_eq!(msg.df, DF_MODEAC);
        assert_eq!(msg.address, Some(0x1234));
        assert!(msg.valid);
        assert_eq!(msg.crc_residual, None);
        assert_eq!(msg.payload.as_deref(), Some(&[0x12, 0x34][..]));
    }

    #[test]
    fn test_df17_identification() {
        let msg = frame("8d4840d6202cc371c32ce0576098");
        assert_eq!(msg.df, 17);
        assert!(msg.valid);
        assert_eq!(msg.crc_residual, Some(0));
        assert_eq!(msg.address, Some(0x4840D6));
        // metype 4 is identification: no position fields
        assert_eq!(msg.nuc, 0);
        assert!(!msg.even_cpr && !msg.odd_cpr);
        assert_eq!(msg.altitude, None);
    }

    #[test]
    fn test_df17_position_even() {
        let msg = frame("8d40621d58c382d690c8ac2863a7");
        assert_eq!(msg.df, 17);
        assert!(msg.valid);
        assert_eq!(msg.address, Some(0x40621D));
        // metype 11 -> NUCp 7
        assert_eq!(msg.nuc, 7);
        assert!(msg.even_cpr);
        assert!(!msg.odd_cpr);
        assert_eq!(msg.altitude, Some(38000));
    }

    #[test]
    fn test_df17_position_odd() {
        let msg = frame("8d40621d58c386435cc412692ad6");
        assert!(msg.valid);
        assert!(msg.odd_cpr);
        assert!(!msg.even_cpr);
        assert_eq!(msg.altitude, Some(38000));
    }

    #[test]
    fn test_df17_bad_crc() {
        let mut data = hex_decode("8d4840d6202cc371c32ce0576098").unwrap();
        data[5] ^= 0x01;
        let msg = Message::from_frame(1, 0, &data);
        assert_eq!(msg.df, 17);
        assert!(!msg.valid);
        assert_ne!(msg.crc_residual, Some(0));
        assert_eq!(msg.address, None);
    }

    #[test]
    fn test_df17_all_zero_cpr_invalidated() {
        // Take a valid position frame, zero the CPR latitude bits and
        // re-parity it: CRC passes but the content is implausible.
        let mut body = hex_decode("8d40621d58c382d690c8ac2863a7").unwrap()[..11].to_vec();
        body[6] &= !0x03;
        body[7] = 0;
        body[8] &= 0x01;
        let msg = Message::from_frame(1, 0, &with_parity(&body));
        assert_eq!(msg.crc_residual, Some(0));
        assert!(!msg.valid);
    }

    #[test]
    fn test_df11_valid() {
        let data = with_parity(&[0x5D, 0x48, 0x40, 0xD6]);
        let msg = Message::from_frame(1, 0, &data);
        assert_eq!(msg.df, 11);
        assert!(msg.valid);
        assert_eq!(msg.crc_residual, Some(0));
        assert_eq!(msg.address, Some(0x4840D6));
    }

    #[test]
    fn test_df11_iid_still_valid() {
        // a nonzero IID leaves the low 7 residual bits set
        let mut data = with_parity(&[0x5D, 0x48, 0x40, 0xD6]);
        let last = data.len() - 1;
        data[last] ^= 0x21;
        let msg = Message::from_frame(1, 0, &data);
        assert!(msg.valid);
        assert_eq!(msg.crc_residual, Some(0x21));
        assert_eq!(msg.address, Some(0x4840D6));
    }

    #[test]
    fn test_df11_corrupt_invalid() {
        // flipping a high parity bit puts the residual outside the IID range
        let mut data = with_parity(&[0x5D, 0x48, 0x40, 0xD6]);
        data[4] ^= 0x80;
        let msg = Message::from_frame(1, 0, &data);
        assert_eq!(msg.df, 11);
        assert!(!msg.valid);
        assert_eq!(msg.crc_residual, Some(0x800000));
        assert_eq!(msg.address, None);
    }

    #[test]
    fn test_df4_altitude_reply() {
        // 13-bit AC field holding the Q-bit encoding of 38000ft
        let data = [0x20, 0x00, 0x18, 0x38, 0xAB, 0xCD, 0xEF];
        let msg = Message::from_frame(1, 0, &data);
        assert_eq!(msg.df, 4);
        assert!(msg.valid);
        assert_eq!(msg.altitude, Some(38000));
        // address/parity: the residual is the address
        assert_eq!(msg.address, msg.crc_residual);
    }

    #[test]
    fn test_df5_identity_reply() {
        let data = [0x28, 0x00, 0x12, 0x34, 0xAB, 0xCD, 0xEF];
        let msg = Message::from_frame(1, 0, &data);
        assert_eq!(msg.df, 5);
        assert!(msg.valid);
        assert_eq!(msg.altitude, None);
        assert_eq!(msg.address, msg.crc_residual);
    }

    #[test]
    fn test_df24_comm_d() {
        let mut data = [0u8; 14];
        data[0] = 24 << 3;
        let msg = Message::from_frame(1, 0, &data);
        assert_eq!(msg.df, 24);
        assert!(msg.valid);
        assert_eq!(msg.altitude, None);
        assert_eq!(msg.address, msg.crc_residual);
    }

    #[test]
    fn test_df20_long_altitude_reply() {
        let mut data = [0u8; 14];
        data[0] = 20 << 3;
        data[2] = 0x18;
        data[3] = 0x38;
        let msg = Message::from_frame(1, 0, &data);
        assert_eq!(msg.df, 20);
        assert!(msg.valid);
        assert_eq!(msg.altitude, Some(38000));
    }

    #[test]
    fn test_wrong_length_for_df() {
        // DF4 must be 7 bytes
        let msg = Message::from_frame(1, 0, &[0x20; 14]);
        assert_eq!(msg.df, 4);
        assert!(!msg.valid);
        assert_eq!(msg.crc_residual, None);
    }

    #[test]
    fn test_unknown_df_left_invalid() {
        let mut data = [0u8; 14];
        data[0] = 0xF8; // DF31
        let msg = Message::from_frame(1, 0, &data);
        assert_eq!(msg.df, 31);
        assert!(!msg.valid);
        assert!(msg.crc_residual.is_some());
        assert_eq!(msg.address, None);
    }

    #[test]
    fn test_messages_compare_by_payload() {
        let a = Message::from_frame(1, 10, &[0x12, 0x34]);
        let b = Message::from_frame(99, 200, &[0x12, 0x34]);
        let c = Message::from_frame(1, 10, &[0x12, 0x35]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a < c);
        // shorter payloads order first
        let long = frame("8d4840d6202cc371c32ce0576098");
        assert!(a < long);
    }

    #[test]
    fn test_display() {
        let msg = Message::from_frame(1, 0, &[0x12, 0x34]);
        assert_eq!(msg.to_string(), "1234");
        let ev = Message::event(
            DF_EVENT_EPOCH_ROLLOVER,
            5,
            EventData::EpochRollover,
        );
        assert_eq!(ev.to_string(), "DF_EVENT_EPOCH_ROLLOVER@5");
        assert!(ev.is_event());
    }

    #[test]
    fn test_radarcape_settings_labels() {
        assert_eq!(
            radarcape_settings(0x11),
            vec![
                "beast",
                "all_frames",
                "check_crc",
                "gps_timestamps",
                "no_rtscts",
                "fec",
                "no_modeac"
            ]
        );
        assert_eq!(radarcape_settings(0x04)[0], "avrmlat");
        assert_eq!(radarcape_settings(0x00)[0], "avr");
    }

    #[test]
    fn test_gps_status_legacy() {
        let status = GpsStatus::from_byte(0x00);
        assert!(!status.utc_bugfix);
        assert!(status.timestamp_ok);
        assert_eq!(status.sync_ok, None);
    }

    #[test]
    fn test_gps_status_detailed() {
        let status = GpsStatus::from_byte(0x80 | 0x10 | 0x04 | 0x01);
        assert!(status.utc_bugfix);
        assert!(status.timestamp_ok);
        assert_eq!(status.sync_ok, Some(true));
        assert_eq!(status.utc_offset_ok, Some(false));
        assert_eq!(status.sats_ok, Some(true));
        assert_eq!(status.tracking_ok, Some(false));
        assert_eq!(status.antenna_ok, Some(true));

        let bad_ts = GpsStatus::from_byte(0x80 | 0x20);
        assert!(!bad_ts.timestamp_ok);
    }
}
