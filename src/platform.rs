use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Days, NaiveDateTime, Utc};
use chrono_tz::Tz;

use crate::TimetableEvent;
use crate::config::ConnectionConfig;
use crate::error::UntisError;
use crate::extract::event_from_period;
use crate::offset::{calculate_offset, is_offset_reached};
use crate::session::entries::Klasse;
use crate::session::{Connector, UntisSession};

const CALENDAR_THROTTLE: Duration = Duration::from_secs(3 * 60);
const SENSOR_THROTTLE: Duration = Duration::from_secs(15 * 60);

/// Which slice of the timetable a throttled update fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryWindow {
    /// Start of the current local day until the start of the next one.
    CurrentDay,
    /// From now until N hours ahead.
    RollingHours(i64),
}

impl QueryWindow {
    fn bounds(self, now: DateTime<Tz>) -> (NaiveDateTime, NaiveDateTime) {
        match self {
            Self::CurrentDay => {
                let start = now.date_naive().and_hms_opt(0, 0, 0).unwrap_or_default();
                let end = now
                    .date_naive()
                    .checked_add_days(Days::new(1))
                    .map_or(start, |d| d.and_hms_opt(0, 0, 0).unwrap_or_default());
                (start, end)
            }
            Self::RollingHours(hours) => {
                let start = now.naive_local();
                (start, start + chrono::Duration::hours(hours))
            }
        }
    }
}

/// Per-instance refresh behavior.
///
/// The two platforms historically hard-coded different values; both are
/// explicit here and overridable at setup time.
#[derive(Debug, Clone, Copy)]
pub struct UpdatePolicy {
    /// Minimum wall-clock interval between actual remote fetches.
    pub throttle: Duration,
    pub window: QueryWindow,
    /// Severity for the "query returned no events" message. The calendar
    /// default is [`log::Level::Error`]; the sensor default deliberately
    /// stays at [`log::Level::Debug`] — a day without lessons is routine
    /// there, not a fault.
    pub empty_log_level: log::Level,
}

impl UpdatePolicy {
    /// Calendar defaults: 3 minute throttle, one hour ahead, errors loudly.
    #[must_use]
    pub const fn calendar() -> Self {
        Self {
            throttle: CALENDAR_THROTTLE,
            window: QueryWindow::RollingHours(1),
            empty_log_level: log::Level::Error,
        }
    }

    /// Sensor defaults: 15 minute throttle, current day window, quiet.
    #[must_use]
    pub const fn sensor() -> Self {
        Self {
            throttle: SENSOR_THROTTLE,
            window: QueryWindow::CurrentDay,
            empty_log_level: log::Level::Debug,
        }
    }
}

/// Shared poll-and-cache state behind both entity variants.
///
/// Owns the session exclusively; the host serializes calls per entity, so
/// no locking is needed.
#[derive(Debug)]
struct TimetableData<S> {
    session: Arc<S>,
    klasse: Klasse,
    timezone: Tz,
    policy: UpdatePolicy,
    event: Option<TimetableEvent>,
    last_fetch: Option<Instant>,
}

impl<S: UntisSession> TimetableData<S> {
    fn new(session: Arc<S>, klasse: Klasse, timezone: Tz, policy: UpdatePolicy) -> Self {
        Self {
            session,
            klasse,
            timezone,
            policy,
            event: None,
            last_fetch: None,
        }
    }

    /// Refresh the cached event, unless the throttle interval since the last
    /// actual fetch has not elapsed yet (then this is a no-op).
    ///
    /// An empty result clears the cache; a failed fetch leaves the previous
    /// value in place and logs. Never panics, never returns an error.
    fn update(&mut self) {
        if let Some(last) = self.last_fetch
            && last.elapsed() < self.policy.throttle
        {
            return;
        }
        self.last_fetch = Some(Instant::now());

        let now = Utc::now().with_timezone(&self.timezone);
        let (start, end) = self.policy.window.bounds(now);

        let periods = match self.session.timetable(&self.klasse, start, end) {
            Ok(periods) => periods,
            Err(e) => {
                log::error!(
                    "Timetable fetch for {} failed, keeping the previous event: {e}",
                    self.klasse.name
                );
                return;
            }
        };

        if periods.is_empty() {
            log::log!(
                self.policy.empty_log_level,
                "No matching event found for {}",
                self.klasse.name
            );
            self.event = None;
            return;
        }

        self.event = Some(event_from_period(&periods[0]));
    }

    /// Fresh query for an arbitrary range, bypassing throttle and cache.
    ///
    /// The blocking network call runs on a worker thread; cancelling the
    /// future abandons the call and the cache is untouched either way.
    async fn get_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimetableEvent>, UntisError> {
        let session = Arc::clone(&self.session);
        let klasse = self.klasse.clone();
        let start = start.with_timezone(&self.timezone).naive_local();
        let end = end.with_timezone(&self.timezone).naive_local();

        let periods = tokio::task::spawn_blocking(move || session.timetable(&klasse, start, end))
            .await
            .map_err(|e| anyhow::Error::new(e).context("Timetable worker failed"))??;

        Ok(periods.iter().map(event_from_period).collect())
    }

    /// Invalidate the session on the server. Best effort, failures are
    /// only logged.
    fn logout(&self) {
        if let Err(e) = self.session.logout() {
            log::warn!("Logout for {} failed: {e}", self.klasse.name);
        }
    }
}

/// Calendar entity: cached current event plus on-demand range queries.
#[derive(Debug)]
pub struct CalendarEntity<S> {
    entity_id: String,
    name: String,
    data: TimetableData<S>,
}

impl<S: UntisSession> CalendarEntity<S> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// The most recently cached event. Callers get their own copy; mutating
    /// it cannot corrupt the cache.
    #[must_use]
    pub fn event(&self) -> Option<TimetableEvent> {
        self.data.event.clone()
    }

    pub fn update(&mut self) {
        self.data.update();
    }

    /// All events in the given range, in the order the server returned them.
    ///
    /// # Errors
    /// Remote failures propagate; the throttled cache is never consulted or
    /// mutated by this path.
    pub async fn async_get_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TimetableEvent>, UntisError> {
        self.data.get_events(start, end).await
    }

    /// Release the server-side session when the entity is unloaded.
    pub fn logout(&self) {
        self.data.logout();
    }
}

/// Sensor entity: single next/current event with the offset flag folded in.
pub struct SensorEntity<S> {
    entity_id: String,
    name: String,
    data: TimetableData<S>,
    event: Option<TimetableEvent>,
    offset_reached: bool,
}

impl<S: UntisSession> SensorEntity<S> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// The exposed event, offset markers stripped. An owned copy, as with
    /// [`CalendarEntity::event`].
    #[must_use]
    pub fn event(&self) -> Option<TimetableEvent> {
        self.event.clone()
    }

    #[must_use]
    pub const fn offset_reached(&self) -> bool {
        self.offset_reached
    }

    pub fn update(&mut self) {
        self.data.update();

        let Some(mut event) = self.data.event.clone() else {
            self.event = None;
            self.offset_reached = false;
            return;
        };

        let offset = calculate_offset(&mut event);
        let now = Utc::now().with_timezone(&self.data.timezone).naive_local();
        self.offset_reached = is_offset_reached(&event, offset, now);
        self.event = Some(event);
    }

    /// Release the server-side session when the entity is unloaded.
    pub fn logout(&self) {
        self.data.logout();
    }
}

/// Set up the calendar platform.
///
/// Recognized login failures and an unresolvable klasse are logged and yield
/// `Ok(None)` — the host sees "no entity created", not a crash. Anything
/// else propagates.
///
/// # Errors
/// Unclassified remote failures (transport, malformed responses).
pub fn setup_calendar_platform<C: Connector>(
    connector: &C,
    config: &ConnectionConfig,
    policy: Option<UpdatePolicy>,
) -> Result<Option<CalendarEntity<C::Session>>, UntisError> {
    let Some((session, klasse)) = connect(connector, config)? else {
        return Ok(None);
    };

    let data = TimetableData::new(
        Arc::new(session),
        klasse,
        config.timezone,
        policy.unwrap_or_else(UpdatePolicy::calendar),
    );
    Ok(Some(CalendarEntity {
        entity_id: generate_entity_id("calendar", &config.name),
        name: config.name.clone(),
        data,
    }))
}

/// Set up the sensor platform. Same failure contract as the calendar setup.
///
/// # Errors
/// Unclassified remote failures (transport, malformed responses).
pub fn setup_sensor_platform<C: Connector>(
    connector: &C,
    config: &ConnectionConfig,
    policy: Option<UpdatePolicy>,
) -> Result<Option<SensorEntity<C::Session>>, UntisError> {
    let Some((session, klasse)) = connect(connector, config)? else {
        return Ok(None);
    };

    let data = TimetableData::new(
        Arc::new(session),
        klasse,
        config.timezone,
        policy.unwrap_or_else(UpdatePolicy::sensor),
    );
    Ok(Some(SensorEntity {
        entity_id: generate_entity_id("sensor", &config.name),
        name: config.name.clone(),
        data,
        event: None,
        offset_reached: false,
    }))
}

/// Login plus klasse resolution, shared by both platform setups.
fn connect<C: Connector>(
    connector: &C,
    config: &ConnectionConfig,
) -> Result<Option<(C::Session, Klasse)>, UntisError> {
    let session = match connector.connect(config) {
        Ok(session) => session,
        Err(UntisError::BadCredentials) => {
            log::error!(
                "Incorrect credentials for {:?}, please check your username and password",
                config.username
            );
            return Ok(None);
        }
        Err(UntisError::Auth(reason)) => {
            log::error!(
                "Did not receive a valid session from {}, reason: {reason}",
                config.host
            );
            return Ok(None);
        }
        Err(other) => return Err(other),
    };

    let klassen = session.klassen()?;

    // Exact name match; if the server ever returns duplicates, the first
    // one wins.
    let Some(klasse) = klassen.into_iter().find(|k| k.name == config.klasse) else {
        let err = UntisError::ClassNotFound(config.klasse.clone());
        log::error!("{err}");
        return Ok(None);
    };

    log::debug!("Resolved klasse {:?} to id {}", klasse.name, klasse.id);
    Ok(Some((session, klasse)))
}

/// Entity ids look like `calendar.webuntis`: platform prefix plus the
/// slugified display name.
fn generate_entity_id(platform: &str, name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('_') && !slug.is_empty() {
            slug.push('_');
        }
    }
    let slug = slug.trim_end_matches('_');
    format!("{platform}.{slug}")
}
