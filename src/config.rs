use std::str::FromStr;

use chrono_tz::Tz;
use serde_json::{Map, Value};

use crate::error::ConfigError;

pub const DEFAULT_NAME: &str = "Webuntis";

const CONF_USERNAME: &str = "username";
const CONF_PASSWORD: &str = "password";
const CONF_SCHOOL: &str = "school";
const CONF_KLASSE: &str = "klasse";
const CONF_HOST: &str = "host";
const CONF_NAME: &str = "name";
const CONF_TIMEZONE: &str = "timezone";

/// Validated connection settings for one platform instance.
///
/// Built once from the host's raw configuration mapping, then owned by the
/// entity and never mutated. The authenticated session handle is obtained
/// separately at setup time.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub username: String,
    pub password: String,
    pub school: String,
    pub klasse: String,
    pub host: String,
    pub name: String,
    pub timezone: Tz,
}

impl ConnectionConfig {
    /// Validate a raw key/value mapping.
    ///
    /// `username`, `password`, `school`, `klasse` and `host` are required
    /// strings. `name` defaults to [`DEFAULT_NAME`], `timezone` to UTC.
    /// No side effects and no network I/O happen here.
    ///
    /// # Errors
    /// [`ConfigError`] if a required key is missing, a value has the wrong
    /// type, or the timezone name is unknown.
    pub fn from_mapping(mapping: &Map<String, Value>) -> Result<Self, ConfigError> {
        let timezone = match optional_string(mapping, CONF_TIMEZONE)? {
            None => Tz::UTC,
            Some(raw) => Tz::from_str(&raw).map_err(|_| ConfigError::UnknownTimezone(raw))?,
        };

        Ok(Self {
            username: required_string(mapping, CONF_USERNAME)?,
            password: required_string(mapping, CONF_PASSWORD)?,
            school: required_string(mapping, CONF_SCHOOL)?,
            klasse: required_string(mapping, CONF_KLASSE)?,
            host: required_string(mapping, CONF_HOST)?,
            name: optional_string(mapping, CONF_NAME)?.unwrap_or_else(|| DEFAULT_NAME.to_string()),
            timezone,
        })
    }
}

fn required_string(mapping: &Map<String, Value>, key: &'static str) -> Result<String, ConfigError> {
    match mapping.get(key) {
        None => Err(ConfigError::MissingKey(key)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(ConfigError::WrongType {
            key,
            found: json_type_name(other),
        }),
    }
}

fn optional_string(
    mapping: &Map<String, Value>,
    key: &'static str,
) -> Result<Option<String>, ConfigError> {
    match mapping.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ConfigError::WrongType {
            key,
            found: json_type_name(other),
        }),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
