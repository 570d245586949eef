use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, str::FromStr, sync::RwLock, time::Duration};

use crate::activity_log::DEFAULT_LOG_CAPACITY;

pub const SERVER_URL_ENV: &str = "POTWATCH_SERVER_URL";
pub const TRANSPORT_ENV: &str = "POTWATCH_TRANSPORT";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Push,
    Poll,
}

impl Default for TransportMode {
    fn default() -> Self {
        TransportMode::Push
    }
}

impl FromStr for TransportMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "push" | "sse" => Ok(TransportMode::Push),
            "poll" | "long-poll" => Ok(TransportMode::Poll),
            other => Err(anyhow!("unknown transport '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    pub server_url: String,
    pub transport: TransportMode,
    pub retry_delay_ms: u64,
    pub connect_timeout_secs: u64,
    pub log_capacity: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8080".into(),
            transport: TransportMode::Push,
            retry_delay_ms: 2_000,
            connect_timeout_secs: 10,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl SyncSettings {
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.server_url.trim_end_matches('/'))
    }

    /// Command endpoint.
    pub fn push_url(&self) -> String {
        self.endpoint("push")
    }

    /// Server-push event stream.
    pub fn pull_url(&self) -> String {
        self.endpoint("pull")
    }

    /// Long-poll endpoint.
    pub fn wait_url(&self) -> String {
        self.endpoint("wait")
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Applies `POTWATCH_*` overrides. Unparseable values are ignored with a warning.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(SERVER_URL_ENV).filter(|url| !url.trim().is_empty()) {
            self.server_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(TRANSPORT_ENV) {
            match raw.parse() {
                Ok(mode) => self.transport = mode,
                Err(err) => log::warn!("Ignoring {TRANSPORT_ENV}: {err}"),
            }
        }
        self
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<SyncSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            SyncSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Stored settings with environment overrides applied.
    pub fn effective(&self) -> SyncSettings {
        self.stored().with_overrides(|key| std::env::var(key).ok())
    }

    pub fn stored(&self) -> SyncSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, settings: SyncSettings) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &SyncSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
