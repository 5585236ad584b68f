use anyhow::anyhow;
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer};

/// Deserializes a Vec, using an empty Vec if the field is null
pub fn parse_vec<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
}

/// Deserializes a String, using an empty String if the field is null
pub fn parse_string<'de, D>(d: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

/// Deserializes a [`NaiveDate`] from the API's `yyyymmdd` integer format
pub fn parse_untis_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let n = u32::deserialize(deserializer)?;
    NaiveDate::from_ymd_opt((n / 10_000) as i32, n / 100 % 100, n % 100)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid date {n}")))
}

/// Deserializes a [`NaiveTime`] from the API's `hmm`/`hhmm` integer format
pub fn parse_untis_time<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let n = u32::deserialize(deserializer)?;
    NaiveTime::from_hms_opt(n / 100, n % 100, 0)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid time {n}")))
}

/// Formats a [`NaiveDate`] as the API's `yyyymmdd` integer.
pub fn untis_date(date: &NaiveDate) -> u32 {
    use chrono::Datelike;
    date.year() as u32 * 10_000 + date.month() * 100 + date.day()
}

pub fn improve_json_error(err: &serde_json::Error, json_string: &str) -> anyhow::Error {
    if err.line() != 1 {
        // Fallback if the JSON is not minified (for some reason)
        return anyhow!("{err}");
    }

    let col = err.column();
    let start = col.saturating_sub(50);
    let end = (col + 50).min(json_string.len());
    let start_ell = if start == 0 { "" } else { "..." };
    let end_ell = if end == json_string.len() { "" } else { "..." };

    let snippet = &json_string[start..end];
    anyhow!("{err} | {start_ell}{snippet}{end_ell}")
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime};

    use super::untis_date;

    #[test]
    fn date_roundtrip() {
        let date = NaiveDate::from_ymd_opt(2024, 9, 3).unwrap();
        assert_eq!(untis_date(&date), 20_240_903);
    }

    #[test]
    fn parse_date_and_time_fields() {
        #[derive(serde::Deserialize)]
        struct Probe {
            #[serde(deserialize_with = "super::parse_untis_date")]
            date: NaiveDate,
            #[serde(deserialize_with = "super::parse_untis_time")]
            time: NaiveTime,
        }

        let probe: Probe = serde_json::from_str(r#"{"date": 20240903, "time": 755}"#).unwrap();
        assert_eq!(probe.date, NaiveDate::from_ymd_opt(2024, 9, 3).unwrap());
        assert_eq!(probe.time, NaiveTime::from_hms_opt(7, 55, 0).unwrap());
    }

    #[test]
    fn invalid_date_is_rejected() {
        #[derive(serde::Deserialize)]
        struct Probe {
            #[serde(deserialize_with = "super::parse_untis_date")]
            #[allow(unused)]
            date: NaiveDate,
        }

        assert!(serde_json::from_str::<Probe>(r#"{"date": 20241399}"#).is_err());
    }
}
