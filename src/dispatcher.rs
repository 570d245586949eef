//! Outbound user intents.
//!
//! Dispatching never touches the local mirror: the effect of a command only
//! shows up once the controller reports it back through the sync loop.

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    models::{GlobalFlags, Pot, PotKey, Stage},
    store::EntityStore,
};

/// Wire form: `"GetReport"`, `{"Water":{"x":1,"y":2}}`, `{"SetAutoWater":true}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    GetReport,
    Water { x: u32, y: u32 },
    Check { x: u32, y: u32 },
    SetAutoWater(bool),
    SetAutoCheck(bool),
}

#[async_trait]
pub trait CommandSink: Send + Sync {
    /// Delivers one command. Called exactly once per intent; no retry.
    async fn send(&self, command: &Command) -> Result<()>;
}

pub struct HttpCommandSink {
    client: reqwest::Client,
    url: String,
}

impl HttpCommandSink {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl CommandSink for HttpCommandSink {
    async fn send(&self, command: &Command) -> Result<()> {
        self.client
            .post(&self.url)
            .json(command)
            .send()
            .await
            .with_context(|| format!("failed to send {command:?} to {}", self.url))?
            .error_for_status()
            .with_context(|| format!("{} rejected {command:?}", self.url))?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct BulkDispatch {
    pub sent: usize,
    pub failures: Vec<(PotKey, anyhow::Error)>,
}

pub struct Dispatcher<S> {
    sink: S,
}

impl<S: CommandSink> Dispatcher<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    async fn dispatch(&self, command: Command) -> Result<()> {
        info!("Dispatching {command:?}");
        self.sink.send(&command).await
    }

    pub async fn request_report(&self) -> Result<()> {
        self.dispatch(Command::GetReport).await
    }

    pub async fn manual_water(&self, key: PotKey) -> Result<()> {
        self.dispatch(Command::Water { x: key.x, y: key.y }).await
    }

    pub async fn manual_check(&self, key: PotKey) -> Result<()> {
        self.dispatch(Command::Check { x: key.x, y: key.y }).await
    }

    pub async fn set_auto_water(&self, enabled: bool) -> Result<()> {
        self.dispatch(Command::SetAutoWater(enabled)).await
    }

    pub async fn set_auto_check(&self, enabled: bool) -> Result<()> {
        self.dispatch(Command::SetAutoCheck(enabled)).await
    }

    /// Requests the opposite of the mirrored auto-water flag; returns the
    /// requested value.
    pub async fn toggle_auto_water(&self, flags: &GlobalFlags) -> Result<bool> {
        let requested = !flags.auto_water_enabled;
        self.set_auto_water(requested).await?;
        Ok(requested)
    }

    pub async fn toggle_auto_check(&self, flags: &GlobalFlags) -> Result<bool> {
        let requested = !flags.auto_check_enabled;
        self.set_auto_check(requested).await?;
        Ok(requested)
    }

    pub async fn water_pots(&self, keys: &[PotKey]) -> BulkDispatch {
        self.bulk(keys, |key| Command::Water { x: key.x, y: key.y })
            .await
    }

    pub async fn check_pots(&self, keys: &[PotKey]) -> BulkDispatch {
        self.bulk(keys, |key| Command::Check { x: key.x, y: key.y })
            .await
    }

    async fn bulk(&self, keys: &[PotKey], command: impl Fn(PotKey) -> Command) -> BulkDispatch {
        let mut outcome = BulkDispatch::default();
        for key in keys {
            match self.dispatch(command(*key)).await {
                Ok(()) => outcome.sent += 1,
                Err(err) => {
                    warn!("Command for {key} failed: {err:#}");
                    outcome.failures.push((*key, err));
                }
            }
        }
        outcome
    }
}

/// Keys of every pot, or only those in `stage`, in key order. Collected up
/// front so no store lock is held while commands are in flight.
pub fn select_pots(store: &EntityStore, stage: Option<Stage>) -> Vec<PotKey> {
    match stage {
        Some(stage) => store.with_stage(stage).map(Pot::key).collect(),
        None => store.iter().map(Pot::key).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use mockito::{Matcher, Server};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Command>>,
        reject: Option<PotKey>,
    }

    #[async_trait]
    impl CommandSink for RecordingSink {
        async fn send(&self, command: &Command) -> Result<()> {
            if let (Some(reject), Command::Water { x, y }) = (self.reject, command) {
                if reject == PotKey::new(*x, *y) {
                    bail!("controller busy");
                }
            }
            self.sent.lock().unwrap().push(command.clone());
            Ok(())
        }
    }

    #[test]
    fn commands_serialise_to_controller_format() {
        assert_eq!(serde_json::to_string(&Command::GetReport).unwrap(), "\"GetReport\"");
        assert_eq!(
            serde_json::to_string(&Command::Water { x: 1, y: 2 }).unwrap(),
            r#"{"Water":{"x":1,"y":2}}"#
        );
        assert_eq!(
            serde_json::to_string(&Command::SetAutoCheck(false)).unwrap(),
            r#"{"SetAutoCheck":false}"#
        );
    }

    #[tokio::test]
    async fn each_intent_sends_exactly_one_command() {
        let dispatcher = Dispatcher::new(RecordingSink::default());
        dispatcher.manual_water(PotKey::new(1, 2)).await.unwrap();
        dispatcher.manual_check(PotKey::new(3, 4)).await.unwrap();
        dispatcher.request_report().await.unwrap();

        let flags = GlobalFlags {
            auto_water_enabled: true,
            ..GlobalFlags::default()
        };
        assert!(!dispatcher.toggle_auto_water(&flags).await.unwrap());
        assert!(dispatcher.toggle_auto_check(&flags).await.unwrap());

        let sent = dispatcher.sink.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                Command::Water { x: 1, y: 2 },
                Command::Check { x: 3, y: 4 },
                Command::GetReport,
                Command::SetAutoWater(false),
                Command::SetAutoCheck(true),
            ]
        );
    }

    #[tokio::test]
    async fn bulk_continues_past_failures() {
        let dispatcher = Dispatcher::new(RecordingSink {
            reject: Some(PotKey::new(0, 1)),
            ..RecordingSink::default()
        });
        let keys = [PotKey::new(0, 0), PotKey::new(0, 1), PotKey::new(0, 2)];

        let outcome = dispatcher.water_pots(&keys).await;
        assert_eq!(outcome.sent, 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].0, PotKey::new(0, 1));

        let outcome = dispatcher.check_pots(&keys).await;
        assert_eq!(outcome.sent, 3);
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn select_pots_filters_by_stage() {
        let mut store = EntityStore::default();
        store.get_or_discover(PotKey::new(2, 0)).0.stage = Stage::Old;
        store.get_or_discover(PotKey::new(1, 0));
        store.get_or_discover(PotKey::new(3, 0)).0.stage = Stage::Old;

        assert_eq!(
            select_pots(&store, Some(Stage::Old)),
            vec![PotKey::new(2, 0), PotKey::new(3, 0)]
        );
        assert_eq!(select_pots(&store, None).len(), 3);
    }

    #[tokio::test]
    async fn http_sink_posts_json() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/push")
            .match_header("content-type", "application/json")
            .match_body(Matcher::JsonString(r#"{"Check":{"x":5,"y":6}}"#.into()))
            .with_status(200)
            .with_body("ignored")
            .create_async()
            .await;

        let sink = HttpCommandSink::new(reqwest::Client::new(), format!("{}/push", server.url()));
        Dispatcher::new(sink)
            .manual_check(PotKey::new(5, 6))
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_sink_surfaces_rejection() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/push")
            .with_status(400)
            .create_async()
            .await;

        let sink = HttpCommandSink::new(reqwest::Client::new(), format!("{}/push", server.url()));
        assert!(sink.send(&Command::GetReport).await.is_err());
    }
}
