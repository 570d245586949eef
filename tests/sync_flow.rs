use std::sync::Arc;

use potwatch_lib::{
    activity_log::EntryKind,
    dashboard::Dashboard,
    db::Database,
    models::{PotKey, Stage},
    sync::{ChannelSource, SyncController, SyncExit},
    view::derive_rect,
};
use tempfile::tempdir;
use tokio::{sync::Mutex, time::Duration};

#[tokio::test]
async fn reports_flow_into_persisted_dashboard() {
    let dir = tempdir().unwrap();
    let db = Database::new(dir.path().join("potwatch.sqlite3")).unwrap();
    let dashboard = Arc::new(Mutex::new(Dashboard::load(&db, 50).await));
    let (sender, source) = ChannelSource::new(16);

    let mut controller = SyncController::new();
    controller
        .start(
            Box::new(source),
            dashboard.clone(),
            db.clone(),
            Duration::from_millis(10),
        )
        .unwrap();

    for frame in [
        r#"{"ReportPot":{"x":100,"y":40}}"#,
        r#"{"ReportPot":{"x":200,"y":40}}"#,
        r#"{"ReportCheck":{"x":100,"y":40,"top":25,"left":30,"bottom":25,"right":30,"stage":"Ready","timestamp":1700000000}}"#,
        r#"{"ReportWater":{"x":200,"y":40,"timestamp":1700000100}}"#,
        r#"{"ReportAutoWater":true}"#,
        r#"{"ReportMoving":null}"#,
        r#"{"Status":"Moving to pot100-40"}"#,
        r#"{"Error":"Camera timeout"}"#,
        "not json at all",
    ] {
        sender.send(frame.to_string()).await.unwrap();
    }
    drop(sender);

    tokio::time::timeout(Duration::from_secs(5), async {
        while controller.is_running() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("sync loop should finish once the source closes");
    assert_eq!(
        controller.stop(Duration::from_secs(1)).await.unwrap(),
        Some(SyncExit::SourceExhausted)
    );

    {
        let live = dashboard.lock().await;
        assert_eq!(live.pots().len(), 2);
        assert_eq!(live.summary().ready, 1);
        assert!(live.flags().auto_water_enabled);
        assert!(!live.flags().is_moving);

        let latest = live.log().latest().unwrap();
        assert_eq!(latest.kind, EntryKind::Error);
        assert_eq!(latest.message, "Camera timeout");
        assert_eq!(live.log().len(), 2);
    }

    let restored = Dashboard::load(&db, 50).await;
    let checked = restored.pots().get(&PotKey::new(100, 40)).unwrap();
    assert_eq!(checked.stage, Stage::Ready);
    assert_eq!(checked.last_check_timestamp, Some(1_700_000_000));
    assert_eq!(
        restored.view().get(&PotKey::new(100, 40)),
        Some(&derive_rect(checked, 100, 100))
    );
    assert_eq!(
        restored
            .pots()
            .get(&PotKey::new(200, 40))
            .unwrap()
            .last_water_timestamp,
        Some(1_700_000_100)
    );
    assert!(restored.flags().auto_water_enabled);
    // The activity log lives in memory only.
    assert!(restored.log().is_empty());
}
