mod logging;

use anyhow::{Context, Result, bail};
use chrono::{Duration, Utc};
use clap::{Parser, ValueEnum};
use serde_json::{Map, Value};
use webuntis_platforms::{
    ConnectionConfig, session::UntisConnector, setup_calendar_platform, setup_sensor_platform,
};

/// Inspect a WebUntis timetable the way the host platforms expose it
#[derive(Parser)]
struct Args {
    /// Your WebUntis username
    #[arg(short, long)]
    username: String,

    /// Your WebUntis password
    #[arg(short, long)]
    password: String,

    /// Subdomain name of the school
    #[arg(short, long)]
    school: String,

    /// Name of the class whose timetable should be queried
    #[arg(short, long)]
    klasse: String,

    /// Server address, e.g. `ikarus.webuntis.com`
    #[arg(long)]
    host: String,

    /// Display name of the entity
    #[arg(short, long)]
    name: Option<String>,

    /// IANA timezone of the school, e.g. `Europe/Berlin`
    #[arg(short = 'z', long)]
    timezone: Option<String>,

    /// Which platform variant to set up
    #[arg(short = 'P', long, value_enum, default_value_t = Platform::Calendar)]
    platform: Platform,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Platform {
    Calendar,
    Sensor,
}

fn build_mapping(args: &Args) -> Map<String, Value> {
    let mut mapping = Map::new();
    mapping.insert("username".into(), args.username.clone().into());
    mapping.insert("password".into(), args.password.clone().into());
    mapping.insert("school".into(), args.school.clone().into());
    mapping.insert("klasse".into(), args.klasse.clone().into());
    mapping.insert("host".into(), args.host.clone().into());
    if let Some(name) = &args.name {
        mapping.insert("name".into(), name.clone().into());
    }
    if let Some(timezone) = &args.timezone {
        mapping.insert("timezone".into(), timezone.clone().into());
    }
    mapping
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init();

    let config =
        ConnectionConfig::from_mapping(&build_mapping(&args)).context("Invalid configuration")?;

    match args.platform {
        Platform::Calendar => run_calendar(&config),
        Platform::Sensor => run_sensor(&config),
    }
}

fn run_calendar(config: &ConnectionConfig) -> Result<()> {
    let Some(mut entity) = setup_calendar_platform(&UntisConnector, config, None)? else {
        bail!("Setup failed, see the log above");
    };
    log::info!("Created entity {}", entity.entity_id());

    entity.update();
    match entity.event() {
        Some(event) => log::info!("Current event: {event:?}"),
        None => log::info!("No current event"),
    }

    // The blocking login/update above must stay off the async runtime; only
    // the range query is async.
    let runtime = tokio::runtime::Runtime::new().context("Could not start async runtime")?;
    let now = Utc::now();
    let events = runtime.block_on(entity.async_get_events(now, now + Duration::days(1)))?;
    log::info!("{} event(s) in the next 24 hours:", events.len());
    for event in events {
        log::info!(
            "  {} - {}  {}",
            event.start,
            event.end.time(),
            event.subjects.join(", "),
        );
    }

    entity.logout();
    Ok(())
}

fn run_sensor(config: &ConnectionConfig) -> Result<()> {
    let Some(mut entity) = setup_sensor_platform(&UntisConnector, config, None)? else {
        bail!("Setup failed, see the log above");
    };
    log::info!("Created entity {}", entity.entity_id());

    entity.update();
    match entity.event() {
        Some(event) => log::info!(
            "Event: {event:?} (offset reached: {})",
            entity.offset_reached()
        ),
        None => log::info!("No event today"),
    }

    entity.logout();
    Ok(())
}
