// Homewatt - Household energy telemetry collector and process supervisor
//
// Copyright 2026 The Homewatt Authors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use chrono::{NaiveTime, Weekday};
use clap::{crate_version, Args, Parser, Subcommand};
use homewatt::clock::{Cadence, Clock, LocalClock, Schedule};
use homewatt::collector::Collector;
use homewatt::executor::{BoundedExecutor, TaskCommand, DEFAULT_CEILING};
use homewatt::http::{http_route, RequestContext};
use homewatt::meter;
use homewatt::metrics::{CollectorMetrics, MetricsExposition};
use homewatt::notify::{LogNotifier, Notifier, TelegramNotifier};
use homewatt::retry::{RetryScheduler, DEFAULT_RETRY_AFTER, DEFAULT_SUCCESS_MARKER};
use homewatt::source::{
    parse_heaters, PortalClient, SolaxClient, Source, TuyaClient, WeatherClient, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_TUYA_ENDPOINT,
};
use homewatt::storage::SqliteStorage;
use homewatt::supervisor::{
    backup_database, BackgroundNetworkCheck, NetworkMonitor, ProcessIdentity, ProcessSpec, SiteWatcher, Supervisor,
    SystemProcessTable, TerminateOutcome, DEFAULT_EXPECTED_TEXT, DEFAULT_PING_HOST, DEFAULT_TUNNEL_NAME,
};
use hyper::server::Server;
use hyper::service::{make_service_fn, service_fn};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{env, io, process};
use tokio::signal::unix::{self, SignalKind};
use tokio::time::MissedTickBehavior;
use tracing::{event, span, Instrument, Level};

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_DATABASE: &str = "electricity.db";
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 9782);
const DEFAULT_COLLECT_SECS: u64 = 10;
const DEFAULT_WEATHER_CITY: &str = "Gdansk";
const DEFAULT_DAILY_AT: &str = "12:00";
const DEFAULT_CHECK_SECS: u64 = 5;
const DEFAULT_NETWORK_SECS: u64 = 300;
const DEFAULT_DASHBOARD: &str = "python app.py";
const DEFAULT_BACKUP_DIR: &str = "backup";
const DEFAULT_WATCH_SECS: u64 = 300;

/// Collect household energy telemetry into SQLite and keep the collectors running
///
/// Poll a solar inverter, heater thermostats with an energy sub-meter and a weather
/// service, import the grid meter reading from the utility provider's portal once a
/// day, and supervise all of these long-running processes on a Raspberry PI.
///
/// Every credential and endpoint can also be set with an environment variable or in
/// a `.env` file in the working directory.
#[derive(Debug, Parser)]
#[clap(name = "homewatt", version = crate_version!())]
struct HomewattApplication {
    /// Path of the SQLite database readings are stored in
    #[clap(long, env = "HOMEWATT_DB", default_value = DEFAULT_DATABASE)]
    database: PathBuf,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error' (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Telegram bot token used to send notifications. Notifications are only
    /// logged when this or the chat ID is missing
    #[clap(long, env = "TELEGRAM_TOKEN", hide_env_values = true)]
    telegram_token: Option<String>,

    /// Telegram chat to send notifications to
    #[clap(long, env = "TELEGRAM_CHAT_ID")]
    telegram_chat_id: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read the solar, heater and weather sources at a fixed interval
    Collect(CollectArgs),
    /// Run the daily meter import, retrying every hour until it succeeds
    Schedule(ScheduleArgs),
    /// Keep the collector, scheduler and dashboard running
    Supervise(SuperviseArgs),
    /// Import today's grid meter reading unless it was already imported
    Meter(MeterArgs),
    /// Send SIGTERM to the first running process with a command and argument
    Stop(StopArgs),
    /// Copy the database into the backup directory
    Backup(BackupArgs),
    /// Check from another machine that the public dashboard is up
    Watch(WatchArgs),
}

#[derive(Debug, Args)]
struct CollectArgs {
    /// Read every source at this interval, in seconds
    #[clap(long, default_value_t = DEFAULT_COLLECT_SECS)]
    interval_secs: u64,

    /// Timeout for a single request to a source, in seconds
    #[clap(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    request_timeout_secs: u64,

    /// Address to expose collection metrics on
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,

    /// Solax inverter realtime data URL, including the token and serial number
    #[clap(long, env = "SOLAX_URL", hide_env_values = true)]
    solax_url: Option<String>,

    /// OpenWeatherMap API key
    #[clap(long, env = "WEATHER_API_KEY", hide_env_values = true)]
    weather_api_key: Option<String>,

    /// City to get the weather for
    #[clap(long, env = "WEATHER_CITY", default_value = DEFAULT_WEATHER_CITY)]
    weather_city: String,

    /// Tuya cloud project access ID
    #[clap(long, env = "TUYA_ACCESS_ID")]
    tuya_access_id: Option<String>,

    /// Tuya cloud project access key
    #[clap(long, env = "TUYA_ACCESS_KEY", hide_env_values = true)]
    tuya_access_key: Option<String>,

    /// Tuya OpenAPI endpoint for the data center of the project
    #[clap(long, env = "TUYA_ENDPOINT", default_value = DEFAULT_TUYA_ENDPOINT)]
    tuya_endpoint: String,

    /// Heater thermostats as comma separated 'room=device_id' pairs
    #[clap(long, env = "TUYA_HEATERS", default_value = "")]
    tuya_heaters: String,

    /// Device ID of the energy sub-meter
    #[clap(long, env = "TUYA_METER_ID")]
    tuya_meter_id: Option<String>,
}

#[derive(Debug, Args)]
struct ScheduleArgs {
    /// Command to run every day. Defaults to the 'meter' command of this program
    #[clap(long, env = "HOMEWATT_TASK")]
    task: Option<String>,

    /// Kill the task if it runs longer than this, in seconds
    #[clap(long, default_value_t = DEFAULT_CEILING.as_secs())]
    ceiling_secs: u64,

    /// Run the task again this long after a failed attempt, in seconds
    #[clap(long, default_value_t = DEFAULT_RETRY_AFTER.as_secs())]
    retry_after_secs: u64,

    /// Text in the task's output that marks a successful run
    #[clap(long, default_value = DEFAULT_SUCCESS_MARKER)]
    success_marker: String,

    /// Local time of day (HH:MM) to run the task at after a success
    #[clap(long, value_parser = parse_time, default_value = DEFAULT_DAILY_AT)]
    daily_at: NaiveTime,
}

#[derive(Debug, Args)]
struct SuperviseArgs {
    /// Command line of a process that must always run, the last argument
    /// identifies it. Defaults to the 'collect' and 'schedule' commands of this
    /// program plus the dashboard
    #[clap(long = "require", value_name = "COMMAND")]
    required: Vec<ProcessSpec>,

    /// Command line of the dashboard, restarted every night
    #[clap(long, default_value = DEFAULT_DASHBOARD)]
    dashboard: ProcessSpec,

    /// Name of the tunnel process exposing the dashboard, empty to not check for it
    #[clap(long, default_value = DEFAULT_TUNNEL_NAME)]
    tunnel: String,

    /// Check required processes at this interval, in seconds
    #[clap(long, default_value_t = DEFAULT_CHECK_SECS)]
    check_secs: u64,

    /// Check the network connection at this interval, in seconds
    #[clap(long, default_value_t = DEFAULT_NETWORK_SECS)]
    network_secs: u64,

    /// Host to ping to check the network connection
    #[clap(long, default_value = DEFAULT_PING_HOST)]
    ping_host: String,

    /// Wireless network to reconnect to when the connection is lost
    #[clap(long, env = "NETWORK_NAME")]
    network_name: Option<String>,

    /// Password of the wireless network
    #[clap(long, env = "NETWORK_PSWRD", hide_env_values = true)]
    network_password: Option<String>,

    /// Directory weekly database backups are written to
    #[clap(long, default_value = DEFAULT_BACKUP_DIR)]
    backup_dir: PathBuf,
}

#[derive(Debug, Args)]
struct MeterArgs {
    /// Command that logs in to the utility provider's portal and prints the taken
    /// and given meter units
    #[clap(long, env = "PORTAL_SCRAPE_CMD")]
    portal_cmd: Option<String>,

    /// Kill the portal command if it runs longer than this, in seconds
    #[clap(long, default_value_t = DEFAULT_CEILING.as_secs())]
    timeout_secs: u64,
}

#[derive(Debug, Args)]
struct StopArgs {
    /// Command of the process, e.g. 'python'
    program: String,

    /// Argument identifying the process, e.g. 'app.py'
    token: String,
}

#[derive(Debug, Args)]
struct BackupArgs {
    /// Directory to write the backup to
    #[clap(long, default_value = DEFAULT_BACKUP_DIR)]
    dir: PathBuf,
}

#[derive(Debug, Args)]
struct WatchArgs {
    /// Public URL of the dashboard
    #[clap(long, env = "DASHBOARD_URL")]
    url: Option<String>,

    /// Text the dashboard shows once it has loaded
    #[clap(long, default_value = DEFAULT_EXPECTED_TEXT)]
    expected_text: String,

    /// Check the dashboard at this interval, in seconds
    #[clap(long, default_value_t = DEFAULT_WATCH_SECS)]
    interval_secs: u64,

    /// Timeout for loading the dashboard, in seconds
    #[clap(long, default_value_t = DEFAULT_REQUEST_TIMEOUT.as_secs())]
    request_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let dotenv = dotenvy::dotenv();
    let opts = HomewattApplication::parse();
    // Logs go to stderr, stdout of the meter command is read by the scheduler
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .with_writer(io::stderr)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    if let Ok(path) = dotenv {
        event!(Level::DEBUG, message = "loaded environment file", path = %path.display());
    }

    let notifier = notifier(&opts);
    match opts.command {
        Command::Collect(ref args) => collect(&opts, args, notifier).await,
        Command::Schedule(ref args) => schedule(&opts, args, notifier).await,
        Command::Supervise(ref args) => supervise(&opts, args, notifier).await,
        Command::Meter(ref args) => import_meter(&opts, args).await,
        Command::Stop(ref args) => stop(args, notifier).await,
        Command::Backup(ref args) => backup(&opts, args, notifier).await,
        Command::Watch(ref args) => watch(args, notifier).await,
    }
}

async fn collect(
    opts: &HomewattApplication,
    args: &CollectArgs,
    notifier: Arc<dyn Notifier>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let startup = Instant::now();
    let storage = Arc::new(open_storage(&opts.database));
    let sources = sources(args);
    if sources.is_empty() {
        event!(
            Level::ERROR,
            message = "no sources configured, set credentials for at least one source",
        );
        process::exit(1);
    }

    let reg = prometheus::default_registry().clone();
    let metrics = CollectorMetrics::new(&reg).unwrap_or_else(|e| {
        event!(
            Level::ERROR,
            message = "failed to register collector metrics",
            error = %e,
        );

        process::exit(1)
    });

    let mut collector = Collector::new(sources, storage, notifier).with_metrics(metrics);
    let kinds: Vec<_> = collector.sources().map(|k| k.as_label()).collect();
    event!(
        Level::INFO,
        message = "collecting readings",
        sources = ?kinds,
        interval_secs = args.interval_secs,
    );

    // Poll the sources in the background, the server shutting down ends the process.
    let interval_secs = args.interval_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let _ = interval.tick().await;
            collector
                .run_cycle(&LocalClock)
                .instrument(span!(Level::DEBUG, "collect_cycle"))
                .await;
        }
    });

    let context = Arc::new(RequestContext::new(MetricsExposition::new(reg)));
    let service = make_service_fn(move |_| {
        let context = context.clone();

        async move {
            Ok::<_, hyper::Error>(service_fn(move |req| {
                http_route(req, context.clone()).instrument(span!(Level::DEBUG, "homewatt_request"))
            }))
        }
    });
    let server = Server::try_bind(&args.bind).unwrap_or_else(|e| {
        event!(
            Level::ERROR,
            message = "server failed to start",
            address = %args.bind,
            error = %e,
        );

        process::exit(1);
    });

    event!(Level::INFO, message = "server started", address = %args.bind);

    server
        .serve(service)
        .with_graceful_shutdown(async {
            let _ = shutdown_signal().await;
        })
        .await?;

    event!(
        Level::INFO,
        message = "server shutdown",
        runtime_secs = %startup.elapsed().as_secs(),
    );

    Ok(())
}

async fn schedule(
    opts: &HomewattApplication,
    args: &ScheduleArgs,
    notifier: Arc<dyn Notifier>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let task = match args.task {
        Some(ref cmd) => TaskCommand::from_command_line(cmd).unwrap_or_else(|| {
            event!(Level::ERROR, message = "empty task command");
            process::exit(1)
        }),
        None => TaskCommand::new(own_program(), own_args(&opts.database, &["meter"])),
    };

    let executor = BoundedExecutor::new(Duration::from_secs(args.ceiling_secs));
    event!(
        Level::INFO,
        message = "scheduling daily task",
        command = %task,
        daily_at = %args.daily_at,
        ceiling_secs = executor.ceiling().as_secs(),
        retry_after_secs = args.retry_after_secs,
    );

    let mut scheduler = RetryScheduler::new(executor, task, notifier, Arc::new(LocalClock))
        .with_daily_at(args.daily_at)
        .with_retry_after(Duration::from_secs(args.retry_after_secs))
        .with_success_marker(args.success_marker.as_str());

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {}
        }

        if let Some(state) = scheduler.tick().await {
            event!(Level::DEBUG, message = "retry state", state = ?state);
        }
    }

    event!(Level::INFO, message = "scheduler shutdown");
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SupervisorJob {
    Check,
    Network,
    RecycleDashboard,
    Backup,
}

async fn supervise(
    opts: &HomewattApplication,
    args: &SuperviseArgs,
    notifier: Arc<dyn Notifier>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let storage = open_storage(&opts.database);

    let mut required = args.required.clone();
    if required.is_empty() {
        required.push(own_spec(&opts.database, "collect"));
        required.push(own_spec(&opts.database, "schedule"));
        required.push(args.dashboard.clone());
    }

    let tunnel = Some(args.tunnel.clone()).filter(|t| !t.is_empty());
    let mut supervisor =
        Supervisor::new(SystemProcessTable::new(), required, notifier.clone()).with_tunnel(tunnel);

    let credentials = match (&args.network_name, &args.network_password) {
        (Some(ssid), Some(psk)) => Some((ssid.as_str(), psk.as_str())),
        _ => None,
    };
    let mut network = BackgroundNetworkCheck::new(NetworkMonitor::new(&args.ping_host, credentials));

    let clock = LocalClock;
    let start = clock.now();
    let mut schedule = Schedule::new();
    schedule.add(
        SupervisorJob::Check,
        Cadence::Every(Duration::from_secs(args.check_secs)),
        start,
    );
    schedule.add(
        SupervisorJob::Network,
        Cadence::Every(Duration::from_secs(args.network_secs)),
        start,
    );
    schedule.add(SupervisorJob::RecycleDashboard, Cadence::DailyAt(time(0, 5)), start);
    schedule.add(SupervisorJob::Backup, Cadence::WeeklyAt(Weekday::Mon, time(0, 0)), start);

    let names: Vec<_> = supervisor.required().iter().map(|s| s.token.as_str()).collect();
    event!(Level::INFO, message = "supervising processes", required = ?names);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {}
        }

        let now = clock.now();
        for job in schedule.due(now) {
            match job {
                SupervisorJob::Check => {
                    supervisor.check(now).instrument(span!(Level::DEBUG, "process_check")).await;
                }
                SupervisorJob::Network => {
                    network.start();
                }
                SupervisorJob::RecycleDashboard => {
                    // The next check starts it again
                    let outcome = supervisor.terminate(&args.dashboard.identity(), now).await;
                    event!(Level::INFO, message = "recycled dashboard", outcome = ?outcome);
                }
                SupervisorJob::Backup => {
                    backup_database(&storage, &args.backup_dir, now, notifier.as_ref()).await;
                }
            }
        }
    }

    event!(Level::INFO, message = "supervisor shutdown");
    Ok(())
}

async fn import_meter(
    opts: &HomewattApplication,
    args: &MeterArgs,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let now = LocalClock.now();
    let client = args
        .portal_cmd
        .as_deref()
        .and_then(PortalClient::from_command_line)
        .unwrap_or_else(|| {
            println!("{} Error, no portal command configured", now.date());
            process::exit(1)
        });

    let storage = open_storage(&opts.database);
    let res = tokio::time::timeout(
        Duration::from_secs(args.timeout_secs),
        meter::import(&storage, &client, now),
    )
    .await;

    match res {
        Ok(Ok(outcome)) => {
            println!("{}", outcome.summary());
            Ok(())
        }
        Ok(Err(e)) => {
            println!("{} Error, {}", now.date(), e);
            process::exit(1)
        }
        Err(_) => {
            println!("{} Error, portal command timed out", now.date());
            process::exit(1)
        }
    }
}

async fn stop(args: &StopArgs, notifier: Arc<dyn Notifier>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let identity = ProcessIdentity::new(&args.program, &args.token);
    let mut supervisor = Supervisor::new(SystemProcessTable::new(), Vec::new(), notifier);

    match supervisor.terminate(&identity, LocalClock.now()).await {
        TerminateOutcome::Terminated(pid) => {
            println!("Stopped {} (pid {})", identity, pid);
            Ok(())
        }
        TerminateOutcome::NotRunning => {
            println!("{} isn't running", identity);
            Ok(())
        }
        TerminateOutcome::Failed => process::exit(1),
    }
}

async fn backup(
    opts: &HomewattApplication,
    args: &BackupArgs,
    notifier: Arc<dyn Notifier>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let storage = open_storage(&opts.database);
    match backup_database(&storage, &args.dir, LocalClock.now(), notifier.as_ref()).await {
        Some(path) => {
            println!("{}", path.display());
            Ok(())
        }
        None => process::exit(1),
    }
}

async fn watch(args: &WatchArgs, notifier: Arc<dyn Notifier>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let url = args.url.as_deref().unwrap_or_else(|| {
        event!(Level::ERROR, message = "no dashboard URL configured");
        process::exit(1)
    });

    let timeout = Duration::from_secs(args.request_timeout_secs);
    let mut watcher = SiteWatcher::new(url, &args.expected_text, timeout, notifier).unwrap_or_else(|e| {
        event!(Level::ERROR, message = "unable to create dashboard watcher", error = %e);
        process::exit(1)
    });

    let clock = LocalClock;
    let mut schedule = Schedule::new();
    schedule.add((), Cadence::Every(Duration::from_secs(args.interval_secs)), clock.now());
    event!(Level::INFO, message = "watching dashboard", url = %url, interval_secs = args.interval_secs);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut interval = tokio::time::interval(Duration::from_secs(1));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {}
        }

        let now = clock.now();
        if !schedule.due(now).is_empty() {
            watcher.check(now).instrument(span!(Level::DEBUG, "site_check")).await;
        }
    }

    event!(Level::INFO, message = "watcher shutdown");
    Ok(())
}

/// Sources with complete configuration, in collection order.
fn sources(args: &CollectArgs) -> Vec<Box<dyn Source>> {
    let timeout = Duration::from_secs(args.request_timeout_secs);
    let mut sources: Vec<Box<dyn Source>> = Vec::new();

    if let Some(ref url) = args.solax_url {
        match SolaxClient::new(url, timeout) {
            Ok(client) => sources.push(Box::new(client)),
            Err(e) => event!(Level::ERROR, message = "unable to create solar client", error = %e),
        }
    }

    if let (Some(id), Some(key), Some(meter_id)) = (&args.tuya_access_id, &args.tuya_access_key, &args.tuya_meter_id) {
        let heaters = parse_heaters(&args.tuya_heaters);
        match TuyaClient::new(&args.tuya_endpoint, id, key, heaters, meter_id, timeout) {
            Ok(client) => sources.push(Box::new(client)),
            Err(e) => event!(Level::ERROR, message = "unable to create appliance client", error = %e),
        }
    }

    if let Some(ref key) = args.weather_api_key {
        match WeatherClient::new(&args.weather_city, key, timeout) {
            Ok(client) => sources.push(Box::new(client)),
            Err(e) => event!(Level::ERROR, message = "unable to create weather client", error = %e),
        }
    }

    sources
}

fn notifier(opts: &HomewattApplication) -> Arc<dyn Notifier> {
    match (&opts.telegram_token, &opts.telegram_chat_id) {
        (Some(token), Some(chat_id)) => Arc::new(TelegramNotifier::new(token, chat_id).unwrap_or_else(|e| {
            event!(
                Level::ERROR,
                message = "failed to initialize Telegram notifier",
                error = %e,
            );

            process::exit(1)
        })),
        _ => {
            event!(Level::DEBUG, message = "Telegram not configured, notifications are only logged");
            Arc::new(LogNotifier)
        }
    }
}

fn open_storage(path: &Path) -> SqliteStorage {
    SqliteStorage::open(path).unwrap_or_else(|e| {
        event!(
            Level::ERROR,
            message = "failed to open database",
            path = %path.display(),
            error = %e,
        );

        process::exit(1)
    })
}

/// Path this program was started from, used to start its other commands.
fn own_program() -> String {
    env::current_exe()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "homewatt".to_owned())
}

fn own_args(database: &Path, command: &[&str]) -> Vec<String> {
    let mut args = vec!["--database".to_owned(), database.to_string_lossy().into_owned()];
    args.extend(command.iter().map(|c| c.to_string()));
    args
}

fn own_spec(database: &Path, command: &str) -> ProcessSpec {
    let program = own_program();
    let args = own_args(database, &[command]);
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    ProcessSpec::new(&program, &args, command)
}

fn parse_time(s: &str) -> Result<NaiveTime, chrono::ParseError> {
    NaiveTime::parse_from_str(s, "%H:%M")
}

fn time(hour: u32, min: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, min, 0).unwrap_or_default()
}

/// Return after the first SIGTERM or SIGINT signal received by this process
async fn shutdown_signal() -> io::Result<()> {
    tokio::select! {
        res = sigterm() => res,
        res = sigint() => res,
    }
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    tokio::signal::ctrl_c().await
}
