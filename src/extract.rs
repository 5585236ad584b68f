use crate::TimetableEvent;
use crate::session::entries::{Element, Period};

/// Map one remote period into the fixed event shape the entities expose.
#[must_use]
pub fn event_from_period(period: &Period) -> TimetableEvent {
    TimetableEvent {
        code: period.code,
        kind: period.kind,
        subjects: display_names(&period.subjects),
        rooms: display_names(&period.rooms),
        teachers: display_names(&period.teachers),
        start: period.start(),
        end: period.end(),
    }
}

fn display_names(elements: &[Element]) -> Vec<String> {
    elements.iter().map(display_name).collect()
}

/// Prefer the long name, fall back to the short one.
fn display_name(element: &Element) -> String {
    if element.long_name.is_empty() {
        element.name.clone()
    } else {
        element.long_name.clone()
    }
}
