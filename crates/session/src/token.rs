//! Bearer token inspection
//!
//! Reads the `exp` claim of a JWT-shaped token. Nothing here verifies a
//! signature; the server remains the only judge of token validity.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD_NO_PAD, URL_SAFE_NO_PAD};
use serde_json::Value;
use std::time::Duration;

/// Expiry of `token` in epoch milliseconds, or `None` if it cannot be read
pub fn decode_expiry(token: &str) -> Option<i64> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };

    let payload = payload.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| STANDARD_NO_PAD.decode(payload))
        .ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.as_object()?.get("exp")?;

    if let Some(seconds) = exp.as_i64() {
        return seconds.checked_mul(1000);
    }
    exp.as_f64()
        .filter(|seconds| seconds.is_finite())
        .map(seconds_to_millis)
}

#[allow(clippy::cast_possible_truncation)]
fn seconds_to_millis(seconds: f64) -> i64 {
    (seconds * 1000.0).round() as i64
}

/// Whether a token expiring at `expiry` should no longer be used at `now`
///
/// A token counts as expired once `now` is within `margin` of its expiry.
/// An unknown expiry is always expired.
pub fn is_expired(expiry: Option<i64>, now: i64, margin: Duration) -> bool {
    expiry.is_none_or(|expiry| now >= expiry.saturating_sub(duration_millis(margin)))
}

/// Milliseconds in `duration`, saturating at `i64::MAX`
pub fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
