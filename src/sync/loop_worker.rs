use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{watch, Mutex};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::{dashboard::Dashboard, db::Database};

use super::{
    message::{decode_report, Report},
    transport::ReportSource,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

// Import the logging macros (exported at crate root)
use crate::{log_debug, log_error, log_info, log_warn};

pub type SharedDashboard = Arc<Mutex<Dashboard>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncExit {
    /// Stop was requested; the last in-flight frame was merged first.
    Drained,
    /// Hard cancellation; an in-flight request was abandoned.
    Cancelled,
    /// The source reported it will never produce another frame.
    SourceExhausted,
}

/// Sole writer to the dashboard mirror. Frames are decoded, merged and
/// flushed strictly one at a time, in arrival order.
pub async fn sync_loop(
    mut source: Box<dyn ReportSource>,
    dashboard: SharedDashboard,
    db: Database,
    retry_delay: Duration,
    cancel_token: CancellationToken,
    mut drain_rx: watch::Receiver<bool>,
) -> SyncExit {
    log_info!("sync loop started on {}", source.describe());

    loop {
        if *drain_rx.borrow() {
            log_info!("sync loop drained");
            return SyncExit::Drained;
        }

        let next = tokio::select! {
            biased;
            _ = cancel_token.cancelled() => {
                log_info!("sync loop cancelled");
                return SyncExit::Cancelled;
            }
            next = source.next_frame() => next,
        };

        match next {
            Ok(Some(frame)) => {
                let Some(report) = decode_report(&frame) else {
                    continue;
                };
                merge_and_flush(&dashboard, &db, report).await;
            }
            Ok(None) => {
                log_info!("{} exhausted, sync loop exiting", source.describe());
                return SyncExit::SourceExhausted;
            }
            Err(err) => {
                log_warn!("{} failed: {err:#}", source.describe());
                dashboard
                    .lock()
                    .await
                    .apply_report(Report::Error(format!("Sync failed: {err:#}")), Utc::now());

                tokio::select! {
                    biased;
                    _ = cancel_token.cancelled() => {
                        log_info!("sync loop cancelled during back-off");
                        return SyncExit::Cancelled;
                    }
                    _ = drain_requested(&mut drain_rx) => {
                        log_info!("sync loop drained during back-off");
                        return SyncExit::Drained;
                    }
                    _ = tokio::time::sleep(retry_delay) => {}
                }
            }
        }
    }
}

async fn merge_and_flush(dashboard: &SharedDashboard, db: &Database, report: Report) {
    let kind = report.kind();
    let pending = {
        let mut guard = dashboard.lock().await;
        let outcome = guard.apply_report(report, Utc::now());
        log_debug!("merged {kind}: {outcome:?}");
        guard.take_pending_writes()
    };

    let pending = match pending {
        Ok(pending) if pending.is_empty() => return,
        Ok(pending) => pending,
        Err(err) => {
            log_error!("failed to snapshot dashboard state: {err:#}");
            return;
        }
    };

    // Written outside the lock; only this loop dirties the synced keys.
    if let Err(err) = pending.write(db).await {
        // Re-marked keys are retried on the next merge.
        log_error!("failed to persist dashboard state: {err:#}");
        dashboard.lock().await.mark_unsaved(&pending);
    }
}

/// Resolves once a drain is signalled. A dropped sender never resolves.
async fn drain_requested(drain_rx: &mut watch::Receiver<bool>) {
    if drain_rx.wait_for(|drain| *drain).await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PotKey;
    use crate::sync::transport::ChannelSource;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct FailingSource;

    #[async_trait]
    impl ReportSource for FailingSource {
        async fn next_frame(&mut self) -> Result<Option<String>> {
            Err(anyhow!("connection refused"))
        }

        fn describe(&self) -> String {
            "failing source".into()
        }
    }

    fn shared() -> SharedDashboard {
        Arc::new(Mutex::new(Dashboard::new(20)))
    }

    #[tokio::test]
    async fn applies_frames_in_order_and_skips_garbage() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("loop.sqlite3")).unwrap();
        let dashboard = shared();
        let (sender, source) = ChannelSource::new(8);

        for frame in [
            r#"{"ReportPot":{"x":1,"y":2}}"#,
            r#"{"ReportSomethingNew":{"x":1}}"#,
            r#"{"ReportCheck":{"x":1,"y":2,"top":15,"left":15,"bottom":15,"right":15,"stage":"Old","timestamp":1000}}"#,
            r#"{"ReportWater":{"x":1,"y":2,"timestamp":1200}}"#,
        ] {
            sender.send(frame.to_string()).await.unwrap();
        }
        drop(sender);

        let (_drain_tx, drain_rx) = watch::channel(false);
        let exit = sync_loop(
            Box::new(source),
            dashboard.clone(),
            db.clone(),
            Duration::from_millis(1),
            CancellationToken::new(),
            drain_rx,
        )
        .await;
        assert_eq!(exit, SyncExit::SourceExhausted);

        let guard = dashboard.lock().await;
        let pot = guard.pots().get(&PotKey::new(1, 2)).unwrap();
        assert_eq!(pot.top, 15);
        assert_eq!(pot.last_check_timestamp, Some(1000));
        assert_eq!(pot.last_water_timestamp, Some(1200));
        assert!(!guard.has_pending_writes());
        drop(guard);

        let restored = Dashboard::load(&db, 20).await;
        assert_eq!(restored.pots().len(), 1);
    }

    #[tokio::test]
    async fn oversized_margins_do_not_stop_the_loop() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("loop.sqlite3")).unwrap();
        let dashboard = shared();
        let (sender, source) = ChannelSource::new(4);

        sender
            .send(
                r#"{"ReportCheck":{"x":1,"y":1,"top":4294967295,"left":4294967295,"bottom":1,"right":1,"stage":"Young","timestamp":5}}"#
                    .to_string(),
            )
            .await
            .unwrap();
        sender
            .send(r#"{"ReportPot":{"x":9,"y":9}}"#.to_string())
            .await
            .unwrap();
        drop(sender);

        let (_drain_tx, drain_rx) = watch::channel(false);
        let exit = sync_loop(
            Box::new(source),
            dashboard.clone(),
            db,
            Duration::from_millis(1),
            CancellationToken::new(),
            drain_rx,
        )
        .await;
        assert_eq!(exit, SyncExit::SourceExhausted);

        let guard = dashboard.lock().await;
        assert!(guard.pots().contains(&PotKey::new(9, 9)));
        let rect = guard.view().get(&PotKey::new(1, 1)).unwrap();
        assert_eq!(rect.width, 4_294_967_296.0);
    }

    #[tokio::test]
    async fn transport_failure_is_logged_and_retried() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("loop.sqlite3")).unwrap();
        let dashboard = shared();
        let cancel = CancellationToken::new();
        let (_drain_tx, drain_rx) = watch::channel(false);

        let handle = tokio::spawn(sync_loop(
            Box::new(FailingSource),
            dashboard.clone(),
            db,
            Duration::from_millis(5),
            cancel.clone(),
            drain_rx,
        ));

        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
        assert_eq!(handle.await.unwrap(), SyncExit::Cancelled);

        let guard = dashboard.lock().await;
        assert!(guard.log().len() >= 2);
        assert!(guard
            .log()
            .entries()
            .all(|entry| entry.message.contains("connection refused")));
    }

    #[tokio::test]
    async fn drain_during_back_off_exits_promptly() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("loop.sqlite3")).unwrap();
        let (drain_tx, drain_rx) = watch::channel(false);

        let handle = tokio::spawn(sync_loop(
            Box::new(FailingSource),
            shared(),
            db,
            Duration::from_secs(3600),
            CancellationToken::new(),
            drain_rx,
        ));

        tokio::time::sleep(Duration::from_millis(20)).await;
        drain_tx.send(true).unwrap();
        let exit = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("loop should drain")
            .unwrap();
        assert_eq!(exit, SyncExit::Drained);
    }
}
