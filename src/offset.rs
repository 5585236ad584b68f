use chrono::{Duration, NaiveDateTime};

use crate::TimetableEvent;

/// Sentinel marking an embedded offset in subject text, e.g. `"Math !!-10"`
/// for "the true boundary is 10 minutes before the nominal start".
pub const OFFSET_MARKER: &str = "!!";

/// Strip offset markers out of the event's subject text and return the
/// offset the first one encoded. Presentation only; the cache never holds
/// the transformed event.
pub fn calculate_offset(event: &mut TimetableEvent) -> Option<Duration> {
    let mut offset: Option<Duration> = None;
    for subject in &mut event.subjects {
        if let Some((cleaned, minutes)) = split_offset(subject) {
            *subject = cleaned;
            offset.get_or_insert(Duration::minutes(minutes));
        }
    }
    offset
}

/// Whether `now` has passed the event's offset boundary.
#[must_use]
pub fn is_offset_reached(
    event: &TimetableEvent,
    offset: Option<Duration>,
    now: NaiveDateTime,
) -> bool {
    offset.is_some_and(|o| event.start + o <= now)
}

/// Splits `"Math !!-10"` into `("Math", -10)`. `None` when there is no
/// well-formed marker in the text.
fn split_offset(text: &str) -> Option<(String, i64)> {
    let pos = text.find(OFFSET_MARKER)?;
    let after = &text[pos + OFFSET_MARKER.len()..];

    let bytes = after.as_bytes();
    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }

    let minutes: i64 = after[..end].parse().ok()?;
    let cleaned = format!("{}{}", text[..pos].trim_end(), &after[end..]);
    Some((cleaned.trim().to_string(), minutes))
}
