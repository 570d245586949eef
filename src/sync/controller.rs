use anyhow::{bail, Context, Result};
use log::{info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::db::Database;

use super::loop_worker::{sync_loop, SharedDashboard, SyncExit};
use super::transport::ReportSource;

/// Owns the background sync loop.
pub struct SyncController {
    handle: Option<JoinHandle<SyncExit>>,
    cancel_token: Option<CancellationToken>,
    drain_tx: Option<watch::Sender<bool>>,
}

impl Default for SyncController {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel_token: None,
            drain_tx: None,
        }
    }

    pub fn start(
        &mut self,
        source: Box<dyn ReportSource>,
        dashboard: SharedDashboard,
        db: Database,
        retry_delay: Duration,
    ) -> Result<()> {
        if self.is_running() {
            bail!("sync already active");
        }

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();

        // false = keep syncing, true = finish the in-flight frame then exit
        let (drain_tx, drain_rx) = watch::channel(false);

        info!("Starting sync on {}", source.describe());
        let handle = tokio::spawn(sync_loop(
            source,
            dashboard,
            db,
            retry_delay,
            token_clone,
            drain_rx,
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        self.drain_tx = Some(drain_tx);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Asks the loop to stop after the in-flight request has been merged.
    /// If it has not exited within `grace`, the loop is cancelled outright.
    pub async fn stop(&mut self, grace: Duration) -> Result<Option<SyncExit>> {
        if let Some(tx) = self.drain_tx.take() {
            let _ = tx.send(true);
        }
        let cancel_token = self.cancel_token.take();

        let Some(mut handle) = self.handle.take() else {
            return Ok(None);
        };

        let exit = match tokio::time::timeout(grace, &mut handle).await {
            Ok(joined) => joined.context("sync loop task failed to join")?,
            Err(_) => {
                warn!("Sync loop still busy after {grace:?}; cancelling");
                if let Some(token) = cancel_token {
                    token.cancel();
                }
                handle.await.context("sync loop task failed to join")?
            }
        };
        info!("Sync stopped: {exit:?}");
        Ok(Some(exit))
    }
}
