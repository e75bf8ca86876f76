//! Entry timestamp codec.
//!
//! Timestamps are stored as RFC 3339 strings in UTC with as many fractional
//! digits as needed (`2016-01-27T14:01:03.123456Z`), which round-trips
//! exactly down to the nanosecond. RFC 3339 only has four-digit years, so
//! entries are limited to years 0000 through 9999. Older sidecars hold
//! a `[seconds, microseconds]` pair since the Unix epoch; those still decode.

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use serde_json::Value;

use crate::container::error::{ContainerError, ContainerResult};

/// Encode a datetime for the `timestamp` attribute.
pub fn datetime_to_timestamp(dt: DateTime<Utc>) -> Value {
    Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Fail unless `dt` has a four-digit year, the range RFC 3339 can express.
pub(crate) fn check_encodable(dt: DateTime<Utc>) -> ContainerResult<()> {
    if (0..=9999).contains(&dt.year()) {
        return Ok(());
    }
    Err(ContainerError::InvalidTimestamp {
        message: format!("year {} is outside 0000-9999", dt.year()),
    })
}

/// Decode a `timestamp` attribute.
pub fn timestamp_to_datetime(encoded: &Value) -> ContainerResult<DateTime<Utc>> {
    let invalid = |message: String| ContainerError::InvalidTimestamp { message };

    match encoded {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| invalid(format!("'{s}': {e}"))),
        Value::Array(pair) => {
            let [secs, micros] = pair.as_slice() else {
                return Err(invalid(format!(
                    "expected [seconds, microseconds], found {} elements",
                    pair.len()
                )));
            };
            let (Some(secs), Some(micros)) = (secs.as_i64(), micros.as_i64()) else {
                return Err(invalid(format!("non-integer pair {encoded}")));
            };
            if !(0..1_000_000).contains(&micros) {
                return Err(invalid(format!("microseconds out of range: {micros}")));
            }
            DateTime::from_timestamp(secs, (micros * 1_000) as u32)
                .ok_or_else(|| invalid(format!("seconds out of range: {secs}")))
        }
        other => Err(invalid(format!("unsupported encoding {other}"))),
    }
}
