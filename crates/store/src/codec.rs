//! Expiration timestamp encoding.
//!
//! Expirations are stored as 8-byte big-endian Unix seconds rather than a
//! textual timestamp, so the stored value has exactly one reading.

use chrono::{DateTime, TimeZone, Utc};

/// Size of an encoded expiration value in bytes
pub const ENCODED_LEN: usize = 8;

/// Encode an expiration as big-endian Unix seconds.
pub fn encode_expiry(expires_at: DateTime<Utc>) -> [u8; ENCODED_LEN] {
    expires_at.timestamp().to_be_bytes()
}

/// Decode a stored expiration value.
///
/// Fails if the value is not exactly [`ENCODED_LEN`] bytes or names an
/// instant chrono cannot represent.
pub fn decode_expiry(bytes: &[u8]) -> Result<DateTime<Utc>, String> {
    let raw: [u8; ENCODED_LEN] = bytes
        .try_into()
        .map_err(|_| format!("expected {} bytes, got {}", ENCODED_LEN, bytes.len()))?;
    let secs = i64::from_be_bytes(raw);
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| format!("timestamp {} out of range", secs))
}
