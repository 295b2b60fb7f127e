//! Wire timestamp format shared by readings, observations and stored documents.
//!
//! Serializes as `YYYY-MM-DD HH:MM:SS` (UTC), with a fractional part only
//! when the timestamp has one. Deserialization also accepts RFC 3339 so
//! observations exported by other tools can be imported.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Canonical timestamp layout on the wire and in both stores.
pub const WIRE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Wire format plus optional fractional seconds (`%.f` prints nothing for
/// whole seconds and is optional when parsing).
const STORED_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Parse a timestamp with an explicit `chrono` format string, interpreted as UTC.
pub fn parse_with_format(raw: &str, format: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw.trim(), format)
        .ok()
        .map(|naive| naive.and_utc())
}

/// Parse the wire format, falling back to RFC 3339.
pub fn parse_lenient(raw: &str) -> Option<DateTime<Utc>> {
    parse_with_format(raw, STORED_FORMAT).or_else(|| {
        DateTime::parse_from_rfc3339(raw.trim())
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    })
}

/// Render a timestamp in the wire format.
pub fn format(ts: &DateTime<Utc>) -> String {
    ts.format(STORED_FORMAT).to_string()
}

pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(ts))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_lenient(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}
