//! Sync coordinator integration tests.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use caresync::offline::{
    NewAuditEntry, NewConversation, NewMessage, NewNotification, NewToolResult,
    OfflineWriteService,
};
use caresync::remote::StaticTokenProvider;
use caresync::store::Table;
use caresync::sync::{ConnectivityMonitor, SyncConfig, SyncCoordinator};

mod common;
use common::{MockApi, mock_api, offline_service};

fn coordinator(
    offline: &OfflineWriteService,
    api: &Arc<MockApi>,
    monitor: &ConnectivityMonitor,
) -> SyncCoordinator {
    SyncCoordinator::new(
        offline.clone(),
        api.clone(),
        Arc::new(StaticTokenProvider::new("test-token")),
        monitor.subscribe(),
        SyncConfig::default(),
    )
}

fn message(content: &str) -> NewMessage {
    NewMessage {
        conversation_id: 1,
        role: Default::default(),
        content: content.to_string(),
        timestamp: None,
    }
}

/// N offline writes followed by reconnect end up with exactly N records
/// synced and stamped with a server id.
#[tokio::test]
async fn test_no_loss_under_partition() {
    let (offline, store) = offline_service().await;
    let api = mock_api();
    let monitor = ConnectivityMonitor::new(false);
    let sync = coordinator(&offline, &api, &monitor);

    for content in ["first", "second", "third"] {
        offline.save_message(message(content)).await.unwrap();
    }
    assert_eq!(offline.unsynced_items().await.total, 3);

    // Offline: the cycle must not touch the server.
    sync.force_sync().await;
    assert_eq!(api.push_count(), 0);
    assert_eq!(offline.unsynced_items().await.total, 3);

    monitor.set_online(true);
    sync.force_sync().await;

    assert_eq!(offline.unsynced_items().await.total, 0);
    for id in 1..=3 {
        let record = store.get(Table::Messages, id).await.unwrap().unwrap();
        assert!(record.synced);
        assert!(record.server_id.as_deref().unwrap().starts_with("srv-"));
    }
}

/// A second cycle with no new local writes performs zero additional pushes.
#[tokio::test]
async fn test_idempotent_resync() {
    let (offline, _store) = offline_service().await;
    let api = mock_api();
    let monitor = ConnectivityMonitor::new(true);
    let sync = coordinator(&offline, &api, &monitor);

    offline.save_message(message("only")).await.unwrap();

    sync.force_sync().await;
    let after_first = api.push_count();

    sync.force_sync().await;
    assert_eq!(api.push_count(), after_first);
}

/// A failed record stays unsynced and is retried next cycle; the failure
/// does not abort the rest of the table.
#[tokio::test]
async fn test_per_record_failure_is_isolated() {
    let (offline, store) = offline_service().await;
    let api = mock_api();
    let monitor = ConnectivityMonitor::new(true);
    let sync = coordinator(&offline, &api, &monitor);

    offline.save_message(message("good one")).await.unwrap();
    let poisoned = offline.save_message(message("poison")).await.unwrap();
    offline.save_message(message("good two")).await.unwrap();

    *api.fail_matching.lock().unwrap() = Some("poison".to_string());
    sync.force_sync().await;

    let remaining = offline.unsynced_items().await;
    assert_eq!(remaining.total, 1);
    assert_eq!(remaining.messages[0].id, poisoned);
    let record = store.get(Table::Messages, poisoned).await.unwrap().unwrap();
    assert!(!record.synced);
    assert!(record.server_id.is_none());

    // Server recovers; the next cycle delivers the leftover record.
    *api.fail_matching.lock().unwrap() = None;
    sync.force_sync().await;
    assert_eq!(offline.unsynced_items().await.total, 0);
    assert_eq!(api.push_count(), 3);
}

/// Conversations are drained before messages so a message never reaches the
/// server ahead of its parent conversation.
#[tokio::test]
async fn test_conversations_pushed_before_messages() {
    let (offline, _store) = offline_service().await;
    let api = mock_api();
    let monitor = ConnectivityMonitor::new(true);
    let sync = coordinator(&offline, &api, &monitor);

    // Saved in the "wrong" order on purpose.
    offline.save_message(message("hello")).await.unwrap();
    offline
        .save_conversation(NewConversation {
            user_id: "u1".to_string(),
            title: "rounds".to_string(),
            last_message_at: None,
        })
        .await
        .unwrap();

    sync.force_sync().await;

    let endpoints = api.pushed_endpoints();
    assert_eq!(endpoints, vec!["/conversations", "/messages"]);
}

/// The pull phase merges additively: notifications already held locally are
/// not duplicated, new ones arrive synced.
#[tokio::test]
async fn test_pull_merges_only_new_notifications() {
    let (offline, store) = offline_service().await;
    let api = mock_api();
    let monitor = ConnectivityMonitor::new(true);
    let sync = coordinator(&offline, &api, &monitor);

    offline
        .insert_synced(
            Table::Notifications,
            json!({"userId": "u1", "title": "existing", "read": false}),
            "srv-n1",
            chrono::Utc::now(),
        )
        .await
        .unwrap();

    *api.notifications.lock().unwrap() = vec![
        serde_json::from_value(json!({
            "id": "srv-n1",
            "userId": "u1",
            "title": "existing",
            "timestamp": "2026-08-07T10:00:00Z"
        }))
        .unwrap(),
        serde_json::from_value(json!({
            "id": "srv-n2",
            "userId": "u1",
            "title": "fresh",
            "timestamp": "2026-08-07T10:05:00Z"
        }))
        .unwrap(),
    ];

    // The pull phase only runs in a cycle that had something to push.
    offline.save_message(message("trigger")).await.unwrap();
    sync.force_sync().await;

    assert_eq!(store.count(Table::Notifications).await.unwrap(), 2);
    let merged = store
        .find_by_server_id(Table::Notifications, "srv-n2")
        .await
        .unwrap()
        .unwrap();
    assert!(merged.synced);
    assert_eq!(merged.payload["title"], "fresh");

    // Profile was pulled alongside.
    let profile = offline.get_user_profile("u1").await.unwrap();
    assert_eq!(profile["displayName"], "Dr. Dev");
}

/// Without an auth token the cycle is skipped entirely.
#[tokio::test]
async fn test_missing_token_skips_cycle() {
    let (offline, _store) = offline_service().await;
    let api = mock_api();
    let monitor = ConnectivityMonitor::new(true);
    let sync = SyncCoordinator::new(
        offline.clone(),
        api.clone(),
        Arc::new(StaticTokenProvider::empty()),
        monitor.subscribe(),
        SyncConfig::default(),
    );

    offline.save_message(message("stuck")).await.unwrap();
    sync.force_sync().await;

    assert_eq!(api.push_count(), 0);
    assert_eq!(offline.unsynced_items().await.total, 1);
    assert!(!sync.status().is_syncing);
}

/// A record written while a cycle is in flight is not picked up by that
/// cycle's snapshot, but the next cycle delivers it.
#[tokio::test]
async fn test_mid_cycle_write_synced_by_next_cycle() {
    let (offline, store) = offline_service().await;
    let api = mock_api();
    let monitor = ConnectivityMonitor::new(true);
    let sync = coordinator(&offline, &api, &monitor);

    for content in ["one", "two", "three"] {
        offline.save_message(message(content)).await.unwrap();
    }

    *api.push_delay.lock().unwrap() = Some(Duration::from_millis(50));
    let running = {
        let sync = sync.clone();
        tokio::spawn(async move { sync.force_sync().await })
    };

    // Land the fourth write while the cycle is mid-flight.
    tokio::time::sleep(Duration::from_millis(25)).await;
    let fourth = offline.save_message(message("four")).await.unwrap();
    running.await.unwrap();

    let record = store.get(Table::Messages, fourth).await.unwrap().unwrap();
    assert!(!record.synced);
    assert_eq!(offline.unsynced_items().await.total, 1);

    *api.push_delay.lock().unwrap() = None;
    sync.force_sync().await;
    let record = store.get(Table::Messages, fourth).await.unwrap().unwrap();
    assert!(record.synced);
}

/// A local read-mark on a notification the server already knows is pushed
/// as a PATCH; notifications with nothing to push are acked vacuously.
#[tokio::test]
async fn test_notification_read_mark_is_pushed() {
    let (offline, store) = offline_service().await;
    let api = mock_api();
    let monitor = ConnectivityMonitor::new(true);
    let sync = coordinator(&offline, &api, &monitor);

    let known = offline
        .save_notification(NewNotification {
            user_id: "u1".to_string(),
            title: "critical lab".to_string(),
            body: "K+ 6.2".to_string(),
            read: false,
            server_id: Some("srv-remote-7".to_string()),
            timestamp: None,
        })
        .await
        .unwrap();
    let local_only = offline
        .save_notification(NewNotification {
            user_id: "u1".to_string(),
            title: "local note".to_string(),
            body: "".to_string(),
            read: false,
            server_id: None,
            timestamp: None,
        })
        .await
        .unwrap();

    offline.mark_notification_read(known).await.unwrap();
    sync.force_sync().await;

    assert_eq!(
        *api.read_marks.lock().unwrap(),
        vec!["srv-remote-7".to_string()]
    );
    for id in [known, local_only] {
        let record = store.get(Table::Notifications, id).await.unwrap().unwrap();
        assert!(record.synced);
    }
}

/// The background loop reacts to the offline->online transition.
#[tokio::test]
async fn test_start_syncs_on_reconnect() {
    let (offline, _store) = offline_service().await;
    let api = mock_api();
    let monitor = ConnectivityMonitor::new(false);
    let sync = coordinator(&offline, &api, &monitor);

    offline.save_message(message("queued")).await.unwrap();
    sync.start();
    assert!(sync.status().auto_sync_active);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(api.push_count(), 0);

    monitor.set_online(true);
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(offline.unsynced_items().await.total, 0);
    assert_eq!(api.push_count(), 1);

    sync.stop();
    assert!(!sync.status().auto_sync_active);
}

/// Every syncable table drains through its own endpoint in one cycle.
#[tokio::test]
async fn test_all_tables_drain_in_one_cycle() {
    let (offline, _store) = offline_service().await;
    let api = mock_api();
    let monitor = ConnectivityMonitor::new(true);
    let sync = coordinator(&offline, &api, &monitor);

    offline
        .save_conversation(NewConversation {
            user_id: "u1".to_string(),
            title: "icu rounds".to_string(),
            last_message_at: None,
        })
        .await
        .unwrap();
    offline.save_message(message("sofa score?")).await.unwrap();
    offline
        .save_tool_result(NewToolResult {
            user_id: "u1".to_string(),
            tool_type: "sofa".to_string(),
            input: json!({"platelets": 90}),
            output: json!({"score": 3}),
            timestamp: None,
        })
        .await
        .unwrap();
    offline
        .save_audit_entry(NewAuditEntry {
            action: "tool.run".to_string(),
            resource_type: "tool".to_string(),
            resource_id: "sofa".to_string(),
            timestamp: None,
        })
        .await
        .unwrap();

    sync.force_sync().await;

    assert_eq!(offline.unsynced_items().await.total, 0);
    assert_eq!(
        api.pushed_endpoints(),
        vec!["/conversations", "/messages", "/tool-results", "/audit/sync"]
    );
}

/// Once synced, a record never reverts; only new writes create new
/// unsynced state.
#[tokio::test]
async fn test_monotonic_durability() {
    let (offline, store) = offline_service().await;
    let api = mock_api();
    let monitor = ConnectivityMonitor::new(true);
    let sync = coordinator(&offline, &api, &monitor);

    let first = offline.save_message(message("first")).await.unwrap();
    sync.force_sync().await;

    // A later failing cycle (new poisoned record) must not disturb it.
    *api.fail_matching.lock().unwrap() = Some("second".to_string());
    offline.save_message(message("second")).await.unwrap();
    sync.force_sync().await;

    let record = store.get(Table::Messages, first).await.unwrap().unwrap();
    assert!(record.synced);
    assert_eq!(offline.unsynced_items().await.total, 1);
}
