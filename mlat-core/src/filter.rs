//! Message filtering.
//!
//! Runs after field decode, before a message is handed to the caller.
//! Drops multilateration echoes, messages arriving during sustained
//! timestamp outliers, stale backdated messages, and anything excluded by
//! the installed per-DF / per-address / Mode A/C accept filters. Also
//! maintains the seen-address set for CRC-checked message types.

use std::collections::{HashMap, HashSet};

use crate::clock::ClockTracker;
use crate::message::Message;
use crate::reader::ReaderConfig;
use crate::types::{is_synthetic_timestamp, DF_MODEAC, MAGIC_MLAT_TIMESTAMP};

/// Accept filters installed on a reader. With none installed every decoded
/// message is accepted.
#[derive(Debug, Default)]
pub struct Filters {
    /// Per-DF accept list for all aircraft; `true` accepts the DF.
    pub default_filter: Option<[bool; 32]>,
    /// Per-DF address accept sets; membership accepts the message.
    pub specific_filter: Option<HashMap<u8, HashSet<u32>>>,
    /// Mode A/C squawk accept set.
    pub modeac_filter: Option<HashSet<u32>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Verdict {
    Accept,
    Suppress,
    /// Suppressed specifically because it is an unwanted mlat echo.
    SuppressMlat,
}

/// Decide whether a decoded frame message should be passed to the caller.
/// Event messages do not come through here.
pub(crate) fn message_wanted(
    msg: &Message,
    filters: &Filters,
    seen: Option<&mut HashSet<u32>>,
    clock: &ClockTracker,
    config: &ReaderConfig,
) -> Verdict {
    if msg.timestamp == MAGIC_MLAT_TIMESTAMP && !config.want_mlat_messages {
        return Verdict::SuppressMlat;
    }

    if !is_synthetic_timestamp(msg.timestamp) {
        if clock.outliers() > 0 {
            // the time base is in doubt, drop until it settles
            return Verdict::Suppress;
        }
        if msg.timestamp < clock.last_timestamp() {
            // stale message from before the current time base
            return Verdict::Suppress;
        }
    }

    if msg.df == DF_MODEAC {
        if let Some(accept) = &filters.modeac_filter {
            let squawk = msg.address.unwrap_or(0);
            return if accept.contains(&squawk) {
                Verdict::Accept
            } else {
                Verdict::Suppress
            };
        }
        return Verdict::Accept;
    }

    if !msg.valid {
        // contents are dubious, don't process further
        return if config.want_invalid_messages {
            Verdict::Accept
        } else {
            Verdict::Suppress
        };
    }

    if let Some(seen) = seen {
        if matches!(msg.df, 11 | 17 | 18) {
            // note that we saw this aircraft even if the message is
            // filtered; only CRC-checked types, the rest is noise
            if let Some(address) = msg.address {
                seen.insert(address);
            }
        }
    }

    if msg.timestamp == 0 && !config.want_zero_timestamps {
        return Verdict::Suppress;
    }

    if filters.default_filter.is_none() && filters.specific_filter.is_none() {
        return Verdict::Accept;
    }

    if let Some(default) = &filters.default_filter {
        if (msg.df as usize) < default.len() && default[msg.df as usize] {
            return Verdict::Accept;
        }
    }

    if let Some(specific) = &filters.specific_filter {
        if let (Some(accept), Some(address)) = (specific.get(&msg.df), msg.address) {
            if accept.contains(&address) {
                return Verdict::Accept;
            }
        }
    }

    Verdict::Suppress
}
