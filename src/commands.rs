//! Console intents. Each line typed at the prompt parses into an [`Intent`]
//! and is handled against the shared [`AppState`].

use std::{fmt::Write as _, str::FromStr};

use anyhow::{anyhow, bail, Result};

use crate::{
    dashboard::Dashboard,
    dispatcher::{select_pots, BulkDispatch},
    models::{GlobalFlag, ImageRef, PotKey, Stage},
    settings::{SyncSettings, TransportMode},
    view::DetailPanelMode,
    AppState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Switch {
    On,
    Off,
    Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    In,
    Out,
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Water(PotKey),
    Check(PotKey),
    WaterAll(Option<Stage>),
    CheckAll(Option<Stage>),
    AutoWater(Switch),
    AutoCheck(Switch),
    Refresh,
    Zoom(Step),
    Scale(Step),
    Select(PotKey),
    Show(DetailPanelMode),
    Hide,
    ToggleDetail,
    Settings,
    SetServer(String),
    SetTransport(TransportMode),
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
water <x> <y> | water pot<x>-<y>    water one pot
check <x> <y>                       check one pot
water-all [stage] | check-all [stage]
auto-water on|off|toggle            auto-check on|off|toggle
refresh                             ask the controller for a full report
zoom in|out|reset                   scale in|out|reset
select <x> <y>                      show general|detail|log    hide    toggle
settings                            server <url>    transport push|poll
status                              help    quit";

fn parse_key(args: &[&str]) -> Result<PotKey> {
    match args {
        [key] => key.parse(),
        [x, y] => Ok(PotKey::new(x.parse()?, y.parse()?)),
        _ => bail!("expected a pot as `<x> <y>` or `pot<x>-<y>`"),
    }
}

fn parse_stage(args: &[&str]) -> Result<Option<Stage>> {
    match args {
        [] => Ok(None),
        [stage] => Ok(Some(stage.parse()?)),
        _ => bail!("expected at most one stage"),
    }
}

fn parse_switch(args: &[&str]) -> Result<Switch> {
    match args {
        ["on"] => Ok(Switch::On),
        ["off"] => Ok(Switch::Off),
        [] | ["toggle"] => Ok(Switch::Toggle),
        _ => bail!("expected on, off or toggle"),
    }
}

fn parse_step(args: &[&str]) -> Result<Step> {
    match args {
        ["in"] | ["+"] => Ok(Step::In),
        ["out"] | ["-"] => Ok(Step::Out),
        ["reset"] => Ok(Step::Reset),
        _ => bail!("expected in, out or reset"),
    }
}

impl FromStr for Intent {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((verb, args)) = words.split_first() else {
            bail!("empty command");
        };

        match verb.to_ascii_lowercase().as_str() {
            "water" => parse_key(args).map(Intent::Water),
            "check" => parse_key(args).map(Intent::Check),
            "water-all" => parse_stage(args).map(Intent::WaterAll),
            "check-all" => parse_stage(args).map(Intent::CheckAll),
            "auto-water" => parse_switch(args).map(Intent::AutoWater),
            "auto-check" => parse_switch(args).map(Intent::AutoCheck),
            "refresh" => Ok(Intent::Refresh),
            "zoom" => parse_step(args).map(Intent::Zoom),
            "scale" => parse_step(args).map(Intent::Scale),
            "select" => parse_key(args).map(Intent::Select),
            "show" => match args {
                ["general"] => Ok(Intent::Show(DetailPanelMode::General)),
                ["detail"] => Ok(Intent::Show(DetailPanelMode::PotDetail)),
                ["log"] => Ok(Intent::Show(DetailPanelMode::Log)),
                _ => bail!("expected general, detail or log"),
            },
            "hide" => Ok(Intent::Hide),
            "toggle" => Ok(Intent::ToggleDetail),
            "settings" => Ok(Intent::Settings),
            "server" => match args {
                [url] if url.starts_with("http://") || url.starts_with("https://") => {
                    Ok(Intent::SetServer(url.trim_end_matches('/').to_string()))
                }
                _ => bail!("expected an http(s) URL"),
            },
            "transport" => match args {
                [mode] => mode.parse().map(Intent::SetTransport),
                _ => bail!("expected push or poll"),
            },
            "status" | "ls" => Ok(Intent::Status),
            "help" | "?" => Ok(Intent::Help),
            "quit" | "exit" => Ok(Intent::Quit),
            other => Err(anyhow!("unknown command '{other}', try `help`")),
        }
    }
}

pub async fn water_pot(state: &AppState, key: PotKey) -> Result<String, String> {
    state
        .dispatcher
        .manual_water(key)
        .await
        .map_err(|e| format!("{e:#}"))?;
    Ok(format!("Water requested for {key}"))
}

pub async fn check_pot(state: &AppState, key: PotKey) -> Result<String, String> {
    state
        .dispatcher
        .manual_check(key)
        .await
        .map_err(|e| format!("{e:#}"))?;
    Ok(format!("Check requested for {key}"))
}

fn describe_bulk(verb: &str, stage: Option<Stage>, outcome: BulkDispatch) -> Result<String, String> {
    let scope = stage.map_or("all".to_string(), |stage| stage.as_str().to_ascii_lowercase());
    if outcome.failures.is_empty() {
        return Ok(format!("{verb} requested for {} {scope} pot(s)", outcome.sent));
    }
    let failed: Vec<String> = outcome
        .failures
        .iter()
        .map(|(key, err)| format!("{key}: {err:#}"))
        .collect();
    Err(format!(
        "{verb} requested for {} {scope} pot(s), {} failed: {}",
        outcome.sent,
        failed.len(),
        failed.join("; ")
    ))
}

pub async fn water_all(state: &AppState, stage: Option<Stage>) -> Result<String, String> {
    let keys = select_pots(state.dashboard.lock().await.pots(), stage);
    let outcome = state.dispatcher.water_pots(&keys).await;
    describe_bulk("Water", stage, outcome)
}

pub async fn check_all(state: &AppState, stage: Option<Stage>) -> Result<String, String> {
    let keys = select_pots(state.dashboard.lock().await.pots(), stage);
    let outcome = state.dispatcher.check_pots(&keys).await;
    describe_bulk("Check", stage, outcome)
}

pub async fn set_auto_water(state: &AppState, switch: Switch) -> Result<String, String> {
    let requested = match switch {
        Switch::On => state.dispatcher.set_auto_water(true).await.map(|_| true),
        Switch::Off => state.dispatcher.set_auto_water(false).await.map(|_| false),
        Switch::Toggle => {
            let flags = *state.dashboard.lock().await.flags();
            state.dispatcher.toggle_auto_water(&flags).await
        }
    }
    .map_err(|e| format!("{e:#}"))?;
    Ok(format!("Auto water {} requested", on_off(requested)))
}

pub async fn set_auto_check(state: &AppState, switch: Switch) -> Result<String, String> {
    let requested = match switch {
        Switch::On => state.dispatcher.set_auto_check(true).await.map(|_| true),
        Switch::Off => state.dispatcher.set_auto_check(false).await.map(|_| false),
        Switch::Toggle => {
            let flags = *state.dashboard.lock().await.flags();
            state.dispatcher.toggle_auto_check(&flags).await
        }
    }
    .map_err(|e| format!("{e:#}"))?;
    Ok(format!("Auto check {} requested", on_off(requested)))
}

pub async fn request_report(state: &AppState) -> Result<String, String> {
    state
        .dispatcher
        .request_report()
        .await
        .map_err(|e| format!("{e:#}"))?;
    Ok("Full report requested".to_string())
}

/// Runs a local display change and persists the viewport if it moved.
async fn with_viewport(
    state: &AppState,
    change: impl FnOnce(&mut Dashboard) -> bool,
) -> Result<String, String> {
    let mut dashboard = state.dashboard.lock().await;
    if change(&mut dashboard) {
        dashboard
            .flush(&state.db)
            .await
            .map_err(|e| format!("{e:#}"))?;
    }
    let viewport = dashboard.viewport();
    Ok(format!(
        "Zoom {}%, scale {}%",
        viewport.zoom(),
        viewport.scale()
    ))
}

pub async fn zoom(state: &AppState, step: Step) -> Result<String, String> {
    with_viewport(state, |dashboard| match step {
        Step::In => dashboard.zoom_in(),
        Step::Out => dashboard.zoom_out(),
        Step::Reset => dashboard.zoom_reset(),
    })
    .await
}

pub async fn scale(state: &AppState, step: Step) -> Result<String, String> {
    with_viewport(state, |dashboard| match step {
        Step::In => dashboard.scale_in(),
        Step::Out => dashboard.scale_out(),
        Step::Reset => dashboard.scale_reset(),
    })
    .await
}

pub async fn select_pot(state: &AppState, key: PotKey) -> Result<String, String> {
    let mut dashboard = state.dashboard.lock().await;
    if !dashboard.select_pot(key) {
        return Err(format!("{key} has not been reported yet"));
    }
    dashboard
        .flush(&state.db)
        .await
        .map_err(|e| format!("{e:#}"))?;
    Ok(render_panel(&dashboard))
}

pub async fn show_panel(state: &AppState, mode: DetailPanelMode) -> Result<String, String> {
    let mut dashboard = state.dashboard.lock().await;
    dashboard.show_panel(mode);
    dashboard
        .flush(&state.db)
        .await
        .map_err(|e| format!("{e:#}"))?;
    Ok(render_panel(&dashboard))
}

pub async fn hide_panel(state: &AppState) -> Result<String, String> {
    state.dashboard.lock().await.hide_detail();
    Ok("Detail panel hidden".to_string())
}

pub async fn toggle_detail(state: &AppState) -> Result<String, String> {
    let mut dashboard = state.dashboard.lock().await;
    dashboard.toggle_detail();
    if dashboard.viewport().detail_visible {
        Ok(render_panel(&dashboard))
    } else {
        Ok("Detail panel hidden".to_string())
    }
}

fn render_settings(settings: &SyncSettings) -> String {
    format!(
        "server {}\ntransport {:?}\nretry delay {} ms\nconnect timeout {} s\nlog capacity {}",
        settings.server_url,
        settings.transport,
        settings.retry_delay_ms,
        settings.connect_timeout_secs,
        settings.log_capacity
    )
}

pub async fn show_settings(state: &AppState) -> Result<String, String> {
    Ok(render_settings(&state.settings.effective()))
}

/// Stores a settings change. The running sync keeps its transport until the
/// next start, and environment overrides still win over stored values.
fn update_settings(
    state: &AppState,
    change: impl FnOnce(&mut SyncSettings),
) -> Result<String, String> {
    let mut stored = state.settings.stored();
    change(&mut stored);
    state
        .settings
        .update(stored.clone())
        .map_err(|e| format!("{e:#}"))?;
    Ok(format!(
        "{}\n(saved; applies on next start)",
        render_settings(&stored)
    ))
}

pub async fn set_server(state: &AppState, url: String) -> Result<String, String> {
    update_settings(state, |settings| settings.server_url = url)
}

pub async fn set_transport(state: &AppState, mode: TransportMode) -> Result<String, String> {
    update_settings(state, |settings| settings.transport = mode)
}

pub async fn status(state: &AppState) -> Result<String, String> {
    Ok(render_status(&*state.dashboard.lock().await))
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

/// Image source cut down to one console line; inline data can be huge.
fn shorten(image: &ImageRef) -> String {
    let src = image.to_src();
    if src.chars().count() <= 64 {
        return src;
    }
    let head: String = src.chars().take(61).collect();
    format!("{head}...")
}

pub fn render_status(dashboard: &Dashboard) -> String {
    let summary = dashboard.summary();
    let flags = dashboard.flags();
    let mut out = String::new();

    let _ = writeln!(
        out,
        "{} pots: {} young, {} ready, {} old, {} unknown",
        summary.total, summary.young, summary.ready, summary.old, summary.unknown
    );
    let flag_line: Vec<String> = GlobalFlag::ALL
        .iter()
        .map(|flag| format!("{} {}", flag.label(), on_off(flags.get(*flag))))
        .collect();
    let _ = writeln!(out, "{}", flag_line.join(", "));
    if let Some(image) = dashboard.synced().camera_image() {
        let _ = writeln!(out, "camera {}", shorten(image));
    }
    for (key, rect) in dashboard.view().iter() {
        let stage = dashboard
            .pots()
            .get(key)
            .map_or("Unknown", |pot| pot.stage.as_str());
        let _ = writeln!(
            out,
            "  {key:<12} {stage:<8} at ({:.1}, {:.1}) size {:.1}x{:.1}",
            rect.x_pos, rect.y_pos, rect.width, rect.height
        );
    }
    if let Some(entry) = dashboard.log().latest() {
        let _ = write!(out, "last: [{:?}] {}", entry.kind, entry.message);
    }
    out.trim_end().to_string()
}

pub fn render_panel(dashboard: &Dashboard) -> String {
    let mut out = String::new();
    match dashboard.viewport().detail_panel {
        DetailPanelMode::PotDetail => match dashboard.selected_detail() {
            Some(detail) => {
                let _ = writeln!(out, "{} ({})", detail.key, detail.stage);
                let _ = writeln!(out, "  position {}", detail.position);
                let _ = writeln!(out, "  size {}", detail.size);
                let _ = writeln!(
                    out,
                    "  last check {}",
                    detail.last_check.as_deref().unwrap_or("never")
                );
                let _ = writeln!(
                    out,
                    "  last water {}",
                    detail.last_water.as_deref().unwrap_or("never")
                );
                if let Some(image) = dashboard.selected_pot().and_then(|pot| pot.image.as_ref()) {
                    let _ = writeln!(out, "  image {}", shorten(image));
                }
            }
            None => {
                let _ = writeln!(out, "No pot selected");
            }
        },
        DetailPanelMode::Log => {
            for entry in dashboard.log().entries().take(20) {
                let _ = writeln!(
                    out,
                    "{} [{:?}] {}",
                    entry.at.format("%H:%M:%S"),
                    entry.kind,
                    entry.message
                );
            }
        }
        DetailPanelMode::General => {
            out = render_status(dashboard);
        }
    }
    out.trim_end().to_string()
}

/// Handles one intent. `Ok(None)` means the console should exit.
pub async fn execute(state: &AppState, intent: Intent) -> Option<Result<String, String>> {
    let result = match intent {
        Intent::Water(key) => water_pot(state, key).await,
        Intent::Check(key) => check_pot(state, key).await,
        Intent::WaterAll(stage) => water_all(state, stage).await,
        Intent::CheckAll(stage) => check_all(state, stage).await,
        Intent::AutoWater(switch) => set_auto_water(state, switch).await,
        Intent::AutoCheck(switch) => set_auto_check(state, switch).await,
        Intent::Refresh => request_report(state).await,
        Intent::Zoom(step) => zoom(state, step).await,
        Intent::Scale(step) => scale(state, step).await,
        Intent::Select(key) => select_pot(state, key).await,
        Intent::Show(mode) => show_panel(state, mode).await,
        Intent::Hide => hide_panel(state).await,
        Intent::ToggleDetail => toggle_detail(state).await,
        Intent::Settings => show_settings(state).await,
        Intent::SetServer(url) => set_server(state, url).await,
        Intent::SetTransport(mode) => set_transport(state, mode).await,
        Intent::Status => status(state).await,
        Intent::Help => Ok(HELP.to_string()),
        Intent::Quit => return None,
    };
    Some(result)
}
