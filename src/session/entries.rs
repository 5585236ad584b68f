use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use serde_json::json;

use crate::error::UntisError;
use crate::json_util::{parse_string, parse_untis_date, parse_untis_time, parse_vec, untis_date};
use crate::session::{UntisClient, UntisSession};

/// A school class as returned by the `getKlassen` query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Klasse {
    pub id: i64,
    pub name: String,

    #[serde(default, deserialize_with = "parse_string")]
    pub long_name: String,
}

/// A subject, room, teacher or class reference inside a period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Element {
    pub id: i64,

    #[serde(default, deserialize_with = "parse_string")]
    pub name: String,

    #[serde(default, rename = "longname", deserialize_with = "parse_string")]
    pub long_name: String,
}

/// Deviation marker on a period. Absent for a regular lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodCode {
    Cancelled,
    Irregular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum LessonKind {
    #[serde(rename = "ls")]
    Lesson,
    #[serde(rename = "oh")]
    OfficeHour,
    #[serde(rename = "sb")]
    Standby,
    #[serde(rename = "bs")]
    BreakSupervision,
    #[serde(rename = "ex")]
    Exam,
}

/// One remote timetable entry (a lesson occurrence).
///
/// The element lists are null-tolerant: the server omits or nulls them for
/// special periods, which must not make the whole day undeserializable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Period {
    pub id: i64,

    #[serde(deserialize_with = "parse_untis_date")]
    pub date: NaiveDate,

    #[serde(rename = "startTime", deserialize_with = "parse_untis_time")]
    pub start_time: NaiveTime,

    #[serde(rename = "endTime", deserialize_with = "parse_untis_time")]
    pub end_time: NaiveTime,

    #[serde(default)]
    pub code: Option<PeriodCode>,

    #[serde(default, rename = "lstype")]
    pub kind: Option<LessonKind>,

    #[serde(default, rename = "kl", deserialize_with = "parse_vec")]
    pub klassen: Vec<Element>,

    #[serde(default, rename = "su", deserialize_with = "parse_vec")]
    pub subjects: Vec<Element>,

    #[serde(default, rename = "ro", deserialize_with = "parse_vec")]
    pub rooms: Vec<Element>,

    #[serde(default, rename = "te", deserialize_with = "parse_vec")]
    pub teachers: Vec<Element>,
}

impl Period {
    #[must_use]
    pub const fn start(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    #[must_use]
    pub const fn end(&self) -> NaiveDateTime {
        self.date.and_time(self.end_time)
    }
}

impl UntisSession for UntisClient {
    fn klassen(&self) -> Result<Vec<Klasse>, UntisError> {
        self.call("getKlassen", json!({}))
    }

    /// Fetch timetable entries for a class.
    ///
    /// The endpoint works at day granularity, so the dates of `start` and
    /// `end` bound the query (inclusive) and the time of day is ignored.
    /// Entries come back in the server's order and stay that way.
    fn timetable(
        &self,
        klasse: &Klasse,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<Period>, UntisError> {
        let params = json!({
            "id": klasse.id,
            "type": 1,
            "startDate": untis_date(&start.date()),
            "endDate": untis_date(&end.date()),
        });
        self.call("getTimetable", params)
    }

    fn logout(&self) -> Result<(), UntisError> {
        // The server answers with a null result on success.
        self.rpc("logout", json!({}))?;
        Ok(())
    }
}
