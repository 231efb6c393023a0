//! Integration tests driving the sync runtime against the in-memory table.

use std::sync::Arc;
use std::time::Duration;

use rendlog_core::{parse_naive_timestamp, Row, Timeframe};
use rendlog_remote::{ChannelStatus, MemoryTable};
use rendlog_sync::{SessionContext, SyncHandle, SyncOptions, SyncRuntime, SyncSnapshot, SyncState};
use serde_json::json;
use tokio::sync::watch;
use tokio::time::timeout;

fn row(subject: &str, category: Timeframe, hm: &str) -> Row {
    Row::new(
        subject.into(),
        category,
        parse_naive_timestamp(&format!("2024-03-01T{hm}:00")),
        json!({ "rendlog": { "z_score": 0.5 } }),
    )
}

fn seeded_table() -> Arc<MemoryTable> {
    let table = Arc::new(MemoryTable::new());
    table.insert_many(vec![
        row("u-1", Timeframe::Min1, "10:01"),
        row("u-1", Timeframe::Min1, "10:00"),
        row("u-1", Timeframe::Min1, "10:02"),
        row("u-1", Timeframe::Min5, "10:00"),
        row("u-2", Timeframe::Min1, "10:03"),
    ]);
    table
}

fn options(refresh: Duration) -> SyncOptions {
    SyncOptions {
        max_rows: 100,
        refresh_interval: refresh,
        event_buffer: 64,
    }
}

fn spawn(table: &Arc<MemoryTable>, refresh: Duration) -> SyncHandle {
    SyncRuntime::spawn(
        table.clone(),
        options(refresh),
        Some(SessionContext::new("u-1")),
        Some(Timeframe::Min1),
    )
}

async fn wait_for<F>(rx: &mut watch::Receiver<SyncSnapshot>, what: &str, pred: F) -> SyncSnapshot
where
    F: FnMut(&SyncSnapshot) -> bool,
{
    match timeout(Duration::from_secs(5), rx.wait_for(pred)).await {
        Ok(Ok(snapshot)) => (*snapshot).clone(),
        Ok(Err(_)) => panic!("sync loop stopped while waiting for {what}"),
        Err(_) => panic!("timed out waiting for {what}"),
    }
}

fn times(snapshot: &SyncSnapshot) -> Vec<String> {
    snapshot
        .rows
        .iter()
        .map(|r| r.timestamp.unwrap().format("%H:%M").to_string())
        .collect()
}

#[tokio::test]
async fn test_initial_load_goes_live() {
    let table = seeded_table();
    let handle = spawn(&table, Duration::from_secs(60));
    let mut rx = handle.snapshots();

    let snapshot = wait_for(&mut rx, "live window", |s| {
        s.state == SyncState::Live && s.rows.len() == 3
    })
    .await;

    assert_eq!(times(&snapshot), vec!["10:00", "10:01", "10:02"]);
    assert!(snapshot.rows.iter().all(|r| r.category == Timeframe::Min1));
    assert_eq!(snapshot.category, Some(Timeframe::Min1));
    assert_eq!(snapshot.channel_status, ChannelStatus::Connected);
    assert_eq!(handle.get_channel_status(), ChannelStatus::Connected);
    assert_eq!(table.subscriber_count(), 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_push_notification_refreshes_window() {
    let table = seeded_table();
    let handle = spawn(&table, Duration::from_secs(60));
    let mut rx = handle.snapshots();
    wait_for(&mut rx, "live window", |s| s.state == SyncState::Live && s.rows.len() == 3).await;

    table.insert(row("u-1", Timeframe::Min1, "10:03"));
    let snapshot = wait_for(&mut rx, "pushed row", |s| s.rows.len() == 4).await;
    assert_eq!(
        snapshot.latest().unwrap().timestamp,
        parse_naive_timestamp("2024-03-01T10:03:00")
    );

    handle.shutdown().await;
}

#[tokio::test]
async fn test_category_switch_never_mixes_rows() {
    let table = seeded_table();
    let handle = spawn(&table, Duration::from_secs(60));
    let mut rx = handle.snapshots();
    wait_for(&mut rx, "live window", |s| s.state == SyncState::Live && s.rows.len() == 3).await;

    handle.on_category_change(Timeframe::Min5).await.unwrap();

    let snapshot = wait_for(&mut rx, "switched window", |s| {
        // Every observed snapshot is homogeneous in its own category
        assert!(s
            .rows
            .iter()
            .all(|r| Some(r.category) == s.category && r.subject_id.as_str() == "u-1"));
        s.category == Some(Timeframe::Min5) && s.state == SyncState::Live && s.rows.len() == 1
    })
    .await;

    assert_eq!(times(&snapshot), vec!["10:00"]);
    assert_eq!(table.subscriber_count(), 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_channel_loss_degrades_and_recovers() {
    let table = seeded_table();
    let handle = spawn(&table, Duration::from_millis(100));
    let mut rx = handle.snapshots();
    wait_for(&mut rx, "live window", |s| s.state == SyncState::Live && s.rows.len() == 3).await;

    table.set_channel_status(ChannelStatus::Disconnected);
    wait_for(&mut rx, "degraded", |s| s.state == SyncState::Degraded).await;
    assert_eq!(handle.get_channel_status(), ChannelStatus::Disconnected);

    // Polling keeps the window current while push is silent
    table.set_push_enabled(false);
    table.insert(row("u-1", Timeframe::Min1, "10:04"));
    let snapshot = wait_for(&mut rx, "polled row", |s| s.rows.len() == 4).await;
    assert_eq!(snapshot.state, SyncState::Degraded);

    table.set_channel_status(ChannelStatus::Connected);
    wait_for(&mut rx, "live again", |s| s.state == SyncState::Live).await;
    assert_eq!(handle.state(), SyncState::Live);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_ended_channel_is_reopened_by_timer() {
    let table = seeded_table();
    let handle = spawn(&table, Duration::from_millis(300));
    let mut rx = handle.snapshots();
    wait_for(&mut rx, "live window", |s| s.state == SyncState::Live && s.rows.len() == 3).await;

    table.close_channels();
    assert_eq!(table.subscriber_count(), 0);
    let snapshot = wait_for(&mut rx, "degraded", |s| s.state == SyncState::Degraded).await;
    assert_eq!(snapshot.channel_status, ChannelStatus::Disconnected);

    // The next tick subscribes again and push delivery resumes
    wait_for(&mut rx, "live again", |s| s.state == SyncState::Live).await;
    assert_eq!(table.subscriber_count(), 1);
    table.insert(row("u-1", Timeframe::Min1, "10:05"));
    wait_for(&mut rx, "pushed row", |s| s.rows.len() == 4).await;

    handle.shutdown().await;
    assert_eq!(table.subscriber_count(), 0);
}

#[tokio::test]
async fn test_timer_retries_failed_initial_load() {
    let table = seeded_table();
    table.fail_next_queries(1);
    let handle = spawn(&table, Duration::from_millis(100));
    let mut rx = handle.snapshots();

    wait_for(&mut rx, "recovered load", |s| {
        s.state == SyncState::Live && s.rows.len() == 3
    })
    .await;
    assert!(table.query_count() >= 2);

    handle.shutdown().await;
}

#[tokio::test]
async fn test_sign_out_and_shutdown_release_subscription() {
    let table = seeded_table();
    let handle = spawn(&table, Duration::from_secs(60));
    let mut rx = handle.snapshots();
    wait_for(&mut rx, "live window", |s| s.state == SyncState::Live).await;

    handle.on_subject_change(None).await.unwrap();
    let snapshot = wait_for(&mut rx, "signed out", |s| s.subject.is_none()).await;
    assert_eq!(snapshot.state, SyncState::Uninitialized);
    assert!(snapshot.rows.is_empty());
    assert_eq!(table.subscriber_count(), 0);

    handle
        .on_subject_change(Some(SessionContext::new("u-2")))
        .await
        .unwrap();
    let snapshot = wait_for(&mut rx, "second subject", |s| {
        s.state == SyncState::Live && s.rows.len() == 1
    })
    .await;
    assert_eq!(snapshot.rows[0].subject_id.as_str(), "u-2");

    handle.shutdown().await;
    assert_eq!(rx.borrow().state, SyncState::Teardown);
    assert!(rx.borrow().rows.is_empty());
    assert_eq!(table.subscriber_count(), 0);
}

#[tokio::test]
async fn test_uninitialized_without_category() {
    let table = seeded_table();
    let handle = SyncRuntime::spawn(
        table.clone(),
        options(Duration::from_secs(60)),
        Some(SessionContext::new("u-1")),
        None,
    );
    let mut rx = handle.snapshots();

    let snapshot = wait_for(&mut rx, "subject recorded", |s| s.subject.is_some()).await;
    assert_eq!(snapshot.state, SyncState::Uninitialized);
    assert_eq!(table.query_count(), 0);

    handle.on_category_change(Timeframe::Min1).await.unwrap();
    wait_for(&mut rx, "loaded", |s| s.rows.len() == 3).await;

    handle.shutdown().await;
}
