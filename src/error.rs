use thiserror::Error;

/// Rejections raised while validating a raw configuration mapping.
///
/// These surface to the host before any network call is made.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("required configuration key {0:?} is missing")]
    MissingKey(&'static str),

    #[error("configuration key {key:?} must be a string, got {found}")]
    WrongType { key: &'static str, found: &'static str },

    #[error("unknown timezone {0:?}")]
    UnknownTimezone(String),
}

/// Failures from the remote timetable service.
///
/// `BadCredentials` and `Auth` are the two recognized login failures: setup
/// logs them and creates no entity. `ClassNotFound` likewise aborts setup.
/// Everything else is unclassified and propagates to the host's own error
/// boundary instead of being swallowed here.
#[derive(Debug, Error)]
pub enum UntisError {
    #[error("incorrect username or password")]
    BadCredentials,

    #[error("did not receive a valid session from the server: {0}")]
    Auth(String),

    #[error("could not find the specified klasse {0:?} on the server")]
    ClassNotFound(String),

    #[error("the API rejected the request: {0}")]
    Api(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
