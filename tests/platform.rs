//! Platform setup and polling behavior against a scripted fake service.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value, json};
use webuntis_platforms::session::{Connector, UntisSession};
use webuntis_platforms::{
    ConfigError, ConnectionConfig, Element, Klasse, Period, PeriodCode, QueryWindow,
    TimetableEvent, UntisError, UpdatePolicy, setup_calendar_platform, setup_sensor_platform,
};

#[derive(Clone, Copy)]
enum LoginOutcome {
    Success,
    BadCredentials,
    AuthFailure,
    ConnectionReset,
}

#[derive(Debug, Clone)]
enum FetchOutcome {
    Periods(Vec<Period>),
    Outage,
}

#[derive(Debug)]
struct FakeState {
    klassen: Vec<Klasse>,
    /// Scripted fetch results; each fetch pops the front, the last repeats.
    timetables: Mutex<VecDeque<FetchOutcome>>,
    fetches: AtomicUsize,
    logouts: AtomicUsize,
    queried_klasse: Mutex<Option<i64>>,
}

#[derive(Debug)]
struct FakeSession(Arc<FakeState>);

impl UntisSession for FakeSession {
    fn klassen(&self) -> Result<Vec<Klasse>, UntisError> {
        Ok(self.0.klassen.clone())
    }

    fn timetable(
        &self,
        klasse: &Klasse,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
    ) -> Result<Vec<Period>, UntisError> {
        self.0.fetches.fetch_add(1, Ordering::SeqCst);
        *self.0.queried_klasse.lock().unwrap() = Some(klasse.id);

        let mut scripted = self.0.timetables.lock().unwrap();
        let outcome = if scripted.len() > 1 {
            scripted.pop_front().unwrap()
        } else {
            scripted
                .front()
                .cloned()
                .unwrap_or(FetchOutcome::Periods(vec![]))
        };
        match outcome {
            FetchOutcome::Periods(periods) => Ok(periods),
            FetchOutcome::Outage => Err(UntisError::Api("scripted outage".into())),
        }
    }

    fn logout(&self) -> Result<(), UntisError> {
        self.0.logouts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakeConnector {
    login: LoginOutcome,
    state: Arc<FakeState>,
}

impl FakeConnector {
    fn new(login: LoginOutcome, klassen: Vec<Klasse>, timetables: Vec<Vec<Period>>) -> Self {
        let outcomes = timetables.into_iter().map(FetchOutcome::Periods).collect();
        Self::with_outcomes(login, klassen, outcomes)
    }

    fn with_outcomes(
        login: LoginOutcome,
        klassen: Vec<Klasse>,
        outcomes: Vec<FetchOutcome>,
    ) -> Self {
        Self {
            login,
            state: Arc::new(FakeState {
                klassen,
                timetables: Mutex::new(outcomes.into()),
                fetches: AtomicUsize::new(0),
                logouts: AtomicUsize::new(0),
                queried_klasse: Mutex::new(None),
            }),
        }
    }

    fn fetches(&self) -> usize {
        self.state.fetches.load(Ordering::SeqCst)
    }
}

impl Connector for FakeConnector {
    type Session = FakeSession;

    fn connect(&self, _config: &ConnectionConfig) -> Result<Self::Session, UntisError> {
        match self.login {
            LoginOutcome::Success => Ok(FakeSession(Arc::clone(&self.state))),
            LoginOutcome::BadCredentials => Err(UntisError::BadCredentials),
            LoginOutcome::AuthFailure => Err(UntisError::Auth("no session id".into())),
            LoginOutcome::ConnectionReset => {
                Err(UntisError::Other(anyhow::anyhow!("connection reset by peer")))
            }
        }
    }
}

fn mapping() -> Map<String, Value> {
    let Value::Object(map) = json!({
        "username": "u",
        "password": "p",
        "school": "s",
        "klasse": "5A",
        "host": "h",
    }) else {
        unreachable!()
    };
    map
}

fn config() -> ConnectionConfig {
    ConnectionConfig::from_mapping(&mapping()).unwrap()
}

fn klasse(id: i64, name: &str) -> Klasse {
    Klasse {
        id,
        name: name.to_string(),
        long_name: format!("Class {name}"),
    }
}

fn element(name: &str) -> Element {
    Element {
        id: 1,
        name: name.to_string(),
        long_name: String::new(),
    }
}

fn period(subject: &str, code: Option<PeriodCode>, start: NaiveDateTime) -> Period {
    Period {
        id: 1,
        date: start.date(),
        start_time: start.time(),
        end_time: (start + chrono::Duration::minutes(45)).time(),
        code,
        kind: None,
        klassen: vec![],
        subjects: vec![element(subject)],
        rooms: vec![element("R12")],
        teachers: vec![element("Mueller")],
    }
}

fn some_start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 9, 3)
        .unwrap()
        .and_hms_opt(8, 0, 0)
        .unwrap()
}

/// Zero throttle so every update performs an actual fetch.
fn eager_policy() -> UpdatePolicy {
    UpdatePolicy {
        throttle: Duration::ZERO,
        window: QueryWindow::CurrentDay,
        empty_log_level: log::Level::Debug,
    }
}

#[test]
fn incomplete_configuration_fails_before_any_network_call() {
    for key in ["username", "password", "school", "klasse", "host"] {
        let mut raw = mapping();
        raw.remove(key);
        let err = ConnectionConfig::from_mapping(&raw).unwrap_err();
        assert_eq!(err, ConfigError::MissingKey(key));
    }
}

#[test]
fn bad_credentials_abort_setup_without_an_entity() {
    let connector = FakeConnector::new(LoginOutcome::BadCredentials, vec![], vec![]);
    let entity = setup_calendar_platform(&connector, &config(), None).unwrap();
    assert!(entity.is_none());
    assert_eq!(connector.fetches(), 0);
}

#[test]
fn auth_failure_aborts_setup_without_an_entity() {
    let connector = FakeConnector::new(LoginOutcome::AuthFailure, vec![], vec![]);
    let entity = setup_sensor_platform(&connector, &config(), None).unwrap();
    assert!(entity.is_none());
}

#[test]
fn unclassified_login_errors_propagate() {
    let connector = FakeConnector::new(LoginOutcome::ConnectionReset, vec![], vec![]);
    let err = setup_calendar_platform(&connector, &config(), None).unwrap_err();
    assert!(matches!(err, UntisError::Other(_)));
}

#[test]
fn unresolvable_klasse_aborts_setup() {
    let connector =
        FakeConnector::new(LoginOutcome::Success, vec![klasse(1, "5B"), klasse(2, "6A")], vec![]);
    let entity = setup_calendar_platform(&connector, &config(), None).unwrap();
    assert!(entity.is_none());
}

#[test]
fn duplicate_klasse_names_resolve_to_the_first_match() {
    let connector = FakeConnector::new(
        LoginOutcome::Success,
        vec![klasse(10, "5A"), klasse(20, "5A")],
        vec![vec![period("Math", None, some_start())]],
    );
    let mut entity = setup_calendar_platform(&connector, &config(), None)
        .unwrap()
        .unwrap();

    entity.update();
    assert_eq!(*connector.state.queried_klasse.lock().unwrap(), Some(10));
}

#[test]
fn update_within_the_throttle_interval_fetches_once() {
    let connector = FakeConnector::new(
        LoginOutcome::Success,
        vec![klasse(1, "5A")],
        vec![vec![period("Math", None, some_start())]],
    );
    let mut entity = setup_calendar_platform(&connector, &config(), None)
        .unwrap()
        .unwrap();

    entity.update();
    let first = entity.event();
    entity.update();

    assert_eq!(connector.fetches(), 1);
    assert_eq!(entity.event(), first);
    assert!(first.is_some());
}

#[test]
fn empty_result_clears_the_cached_event() {
    let connector = FakeConnector::new(
        LoginOutcome::Success,
        vec![klasse(1, "5A")],
        vec![vec![period("Math", None, some_start())], vec![]],
    );
    let mut entity = setup_calendar_platform(&connector, &config(), Some(eager_policy()))
        .unwrap()
        .unwrap();

    entity.update();
    assert!(entity.event().is_some());

    entity.update();
    assert!(entity.event().is_none());

    entity.update();
    assert!(entity.event().is_none());
    assert_eq!(connector.fetches(), 3);
}

#[test]
fn failed_fetch_keeps_the_previous_event() {
    let connector = FakeConnector::with_outcomes(
        LoginOutcome::Success,
        vec![klasse(1, "5A")],
        vec![
            FetchOutcome::Periods(vec![period("Math", None, some_start())]),
            FetchOutcome::Outage,
        ],
    );
    let mut entity = setup_calendar_platform(&connector, &config(), Some(eager_policy()))
        .unwrap()
        .unwrap();

    entity.update();
    let cached = entity.event();
    assert!(cached.is_some());

    // The outage repeats from here on; the last good event stays exposed.
    entity.update();
    assert_eq!(entity.event(), cached);
    entity.update();
    assert_eq!(entity.event(), cached);
    assert_eq!(connector.fetches(), 3);
}

#[test]
fn logout_is_forwarded_to_the_session() {
    let connector = FakeConnector::new(LoginOutcome::Success, vec![klasse(1, "5A")], vec![]);
    let entity = setup_sensor_platform(&connector, &config(), None)
        .unwrap()
        .unwrap();

    entity.logout();
    assert_eq!(connector.state.logouts.load(Ordering::SeqCst), 1);
}

#[test]
fn exposed_event_is_a_detached_copy() {
    let connector = FakeConnector::new(
        LoginOutcome::Success,
        vec![klasse(1, "5A")],
        vec![vec![period("Math", None, some_start())]],
    );
    let mut entity = setup_calendar_platform(&connector, &config(), None)
        .unwrap()
        .unwrap();
    entity.update();

    let mut stolen = entity.event().unwrap();
    stolen.subjects.push("Forgery".to_string());

    assert_eq!(entity.event().unwrap().subjects, vec!["Math"]);
}

#[tokio::test]
async fn range_query_maps_in_order_and_leaves_the_cache_alone() {
    let cached = period("Math", None, some_start());
    let ranged = vec![
        period("Biology", None, some_start()),
        period("History", Some(PeriodCode::Cancelled), some_start() + chrono::Duration::hours(1)),
        period("Arts", None, some_start() + chrono::Duration::hours(2)),
    ];
    let connector = FakeConnector::new(
        LoginOutcome::Success,
        vec![klasse(1, "5A")],
        vec![vec![cached], ranged.clone()],
    );
    let mut entity = setup_calendar_platform(&connector, &config(), None)
        .unwrap()
        .unwrap();
    entity.update();
    let before = entity.event();

    let events = entity
        .async_get_events(Utc::now(), Utc::now() + chrono::Duration::days(1))
        .await
        .unwrap();

    assert_eq!(events.len(), ranged.len());
    for (event, source) in events.iter().zip(&ranged) {
        assert_eq!(event.code, source.code);
        assert_eq!(event.subjects, vec![source.subjects[0].name.clone()]);
        assert_eq!(event.rooms, vec!["R12"]);
        assert_eq!(event.teachers, vec!["Mueller"]);
        assert_eq!(event.start, source.start());
        assert_eq!(event.end, source.end());
    }

    // The ranged query went past the cache entirely.
    assert_eq!(entity.event(), before);
    assert_eq!(entity.event().unwrap().subjects, vec!["Math"]);
}

#[test]
fn end_to_end_setup_update_and_event_shape() {
    let start = some_start();
    let connector = FakeConnector::new(
        LoginOutcome::Success,
        vec![klasse(71, "5A")],
        vec![vec![period("Math", Some(PeriodCode::Irregular), start)]],
    );

    let mut entity = setup_calendar_platform(&connector, &config(), None)
        .unwrap()
        .unwrap();
    assert_eq!(entity.name(), "Webuntis");
    assert_eq!(entity.entity_id(), "calendar.webuntis");

    entity.update();
    let expected = TimetableEvent {
        code: Some(PeriodCode::Irregular),
        kind: None,
        subjects: vec!["Math".to_string()],
        rooms: vec!["R12".to_string()],
        teachers: vec!["Mueller".to_string()],
        start,
        end: start + chrono::Duration::minutes(45),
    };
    assert_eq!(entity.event(), Some(expected));
}

#[test]
fn sensor_strips_offset_marker_and_reports_reached() {
    // Start in 5 minutes with a -10 minute offset: the boundary is already
    // 5 minutes behind us.
    let start = Utc::now().naive_utc() + chrono::Duration::minutes(5);
    let connector = FakeConnector::new(
        LoginOutcome::Success,
        vec![klasse(1, "5A")],
        vec![vec![period("Math !!-10", None, start)]],
    );
    let mut entity = setup_sensor_platform(&connector, &config(), None)
        .unwrap()
        .unwrap();

    entity.update();
    let event = entity.event().unwrap();
    assert_eq!(event.subjects, vec!["Math"]);
    assert!(entity.offset_reached());
}

#[test]
fn sensor_offset_not_reached_for_a_distant_event() {
    let start = Utc::now().naive_utc() + chrono::Duration::minutes(30);
    let connector = FakeConnector::new(
        LoginOutcome::Success,
        vec![klasse(1, "5A")],
        vec![vec![period("Math !!-10", None, start)]],
    );
    let mut entity = setup_sensor_platform(&connector, &config(), None)
        .unwrap()
        .unwrap();

    entity.update();
    assert!(!entity.offset_reached());
    assert_eq!(entity.event().unwrap().subjects, vec!["Math"]);
}

#[test]
fn sensor_with_no_event_reports_no_offset() {
    let connector = FakeConnector::new(LoginOutcome::Success, vec![klasse(1, "5A")], vec![]);
    let mut entity = setup_sensor_platform(&connector, &config(), None)
        .unwrap()
        .unwrap();

    entity.update();
    assert!(entity.event().is_none());
    assert!(!entity.offset_reached());
}
