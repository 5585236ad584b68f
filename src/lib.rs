#![deny(unexpected_cfgs)]
//
#![warn(clippy::cargo)]
#![warn(clippy::nursery)]
//
// https://github.com/rust-lang/rust-clippy/issues/16440
#![allow(clippy::multiple_crate_versions)]

use chrono::NaiveDateTime;

mod config;
mod error;
mod extract;
mod json_util;
mod offset;

pub mod platform;
pub mod session;

pub use config::{ConnectionConfig, DEFAULT_NAME};
pub use error::{ConfigError, UntisError};
pub use extract::event_from_period;
pub use offset::OFFSET_MARKER;
pub use session::entries::{Element, Klasse, LessonKind, Period, PeriodCode};
pub use platform::{
    CalendarEntity, QueryWindow, SensorEntity, UpdatePolicy, setup_calendar_platform,
    setup_sensor_platform,
};

/// One timetable entry in the shape both platforms expose to the host.
///
/// Either a fully populated event is exposed or no event at all; callers
/// never see a partially filled record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimetableEvent {
    pub code: Option<PeriodCode>,
    pub kind: Option<LessonKind>,
    pub subjects: Vec<String>,
    pub rooms: Vec<String>,
    pub teachers: Vec<String>,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}
