pub mod activity_log;
pub mod commands;
pub mod dashboard;
pub mod db;
pub mod dispatcher;
pub mod models;
pub mod settings;
pub mod store;
pub mod sync;
pub mod utils;
pub mod view;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use db::Database;
use dashboard::Dashboard;
use dispatcher::{Dispatcher, HttpCommandSink};
use log::{info, warn};
use settings::SettingsStore;
use sync::{SharedDashboard, SyncController};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::Mutex,
    time::Duration,
};

pub const DATA_DIR_ENV: &str = "POTWATCH_DATA_DIR";
const DEFAULT_DATA_DIR: &str = "potwatch-data";
const STOP_GRACE: Duration = Duration::from_secs(5);

pub struct AppState {
    pub db: Database,
    pub dashboard: SharedDashboard,
    pub dispatcher: Dispatcher<HttpCommandSink>,
    pub settings: SettingsStore,
}

fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

pub fn run() -> Result<()> {
    utils::logging::init();
    info!("Potwatch starting up...");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(run_console())
}

async fn run_console() -> Result<()> {
    let app_data_dir = data_dir();
    std::fs::create_dir_all(&app_data_dir)
        .with_context(|| format!("failed to create {}", app_data_dir.display()))?;

    let database = Database::new(app_data_dir.join("potwatch.sqlite3"))?;
    let settings_store = SettingsStore::new(app_data_dir.join("settings.json"))?;
    let settings = settings_store.effective();
    info!(
        "Using controller at {} ({:?})",
        settings.server_url, settings.transport
    );

    let dashboard: SharedDashboard = Arc::new(Mutex::new(
        Dashboard::load(&database, settings.log_capacity).await,
    ));
    let client = sync::build_http_client(settings.connect_timeout())?;

    let state = AppState {
        db: database.clone(),
        dashboard: dashboard.clone(),
        dispatcher: Dispatcher::new(HttpCommandSink::new(client.clone(), settings.push_url())),
        settings: settings_store,
    };

    let mut controller = SyncController::new();
    controller.start(
        sync::report_source(&settings, client),
        dashboard,
        database,
        settings.retry_delay(),
    )?;

    // Ask for a full picture so a fresh mirror fills in without waiting for events.
    if let Err(err) = state.dispatcher.request_report().await {
        warn!("Initial report request failed: {err:#}");
    }

    println!("{}", commands::render_status(&*state.dashboard.lock().await));
    println!("Type `help` for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }

        let intent = match line.parse::<commands::Intent>() {
            Ok(intent) => intent,
            Err(err) => {
                println!("{err:#}");
                continue;
            }
        };
        match commands::execute(&state, intent).await {
            Some(Ok(reply)) => println!("{reply}"),
            Some(Err(err)) => println!("error: {err}"),
            None => break,
        }
    }

    info!("Shutting down");
    controller.stop(STOP_GRACE).await?;
    let mut dashboard = state.dashboard.lock().await;
    if dashboard.has_pending_writes() {
        dashboard.flush(&state.db).await?;
    }
    Ok(())
}
