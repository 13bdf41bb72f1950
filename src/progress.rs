//! Progress decoding for the playout process
//!
//! The playout tool reports encode progress on stderr as free-form status
//! lines containing a `time=HH:MM:SS.ff` token. Lines are noisy: partial
//! writes, banners, and warnings are interleaved with the timer, so both
//! extraction and decoding are tolerant: callers treat any failure as
//! "ignore this line" rather than an error.

use crate::error::{Error, Result};

/// Marker preceding the elapsed-time token in a progress line
const TIMER_MARKER: &str = "time=";

/// Isolate the elapsed-time token from a raw progress line.
///
/// Returns the text between the `time=` marker and the next space (or end of
/// line), or `None` when the marker is absent.
pub fn extract_timer(line: &str) -> Option<&str> {
    let start = line.find(TIMER_MARKER)? + TIMER_MARKER.len();
    let rest = &line[start..];
    let end = rest.find(' ').unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Decode an `HH:MM:SS.ff` token into milliseconds.
///
/// The token is a colon-separated triple; the last field carries seconds and
/// exactly two fractional digits (centiseconds):
/// `ms = (H*3600 + M*60 + S)*1000 + ff*10`.
///
/// Fails if the token does not contain exactly two colons or the fractional
/// part is not exactly two digits. The playout tool emits `time=N/A` before
/// its clock starts, and truncated tokens on partial writes; both decode as
/// errors and are ignored upstream.
pub fn decode_elapsed(token: &str) -> Result<u64> {
    let mut fields = token.split(':');
    let (hours, minutes, seconds) = match (fields.next(), fields.next(), fields.next(), fields.next()) {
        (Some(h), Some(m), Some(s), None) => (h, m, s),
        _ => return Err(Error::Decode(format!("expected HH:MM:SS.ff, got {token:?}"))),
    };

    let (secs, frac) = seconds
        .split_once('.')
        .ok_or_else(|| Error::Decode(format!("missing fractional seconds in {token:?}")))?;
    if frac.len() != 2 {
        return Err(Error::Decode(format!(
            "expected two fractional digits in {token:?}"
        )));
    }

    let parse = |field: &str| {
        field
            .parse::<u64>()
            .map_err(|_| Error::Decode(format!("non-numeric field {field:?} in {token:?}")))
    };

    let ms = (parse(hours)? * 3600 + parse(minutes)? * 60 + parse(secs)?) * 1000 + parse(frac)? * 10;
    Ok(ms)
}
