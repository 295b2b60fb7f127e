//! Byte keys for `(location_id, observed_at)` trees.
//!
//! Layout: `location_id 0x00 seconds(u64 BE, sign bit flipped) nanos(u32 BE)`.
//! Keys of one location sort chronologically down to the nanosecond, and a
//! prefix scan over `location_id 0x00` never matches a longer id sharing the
//! same prefix.

use chrono::{DateTime, Utc};

/// Prefix shared by every key of one location.
pub fn location_prefix(location_id: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(location_id.len() + 13);
    prefix.extend_from_slice(location_id.as_bytes());
    prefix.push(0);
    prefix
}

/// Full key for one observation time.
pub fn location_time_key(location_id: &str, observed_at: &DateTime<Utc>) -> Vec<u8> {
    let mut key = location_prefix(location_id);
    key.extend_from_slice(&order_preserving_seconds(observed_at).to_be_bytes());
    key.extend_from_slice(&observed_at.timestamp_subsec_nanos().to_be_bytes());
    key
}

#[allow(clippy::cast_sign_loss)]
fn order_preserving_seconds(ts: &DateTime<Utc>) -> u64 {
    (ts.timestamp() as u64) ^ (1u64 << 63)
}
