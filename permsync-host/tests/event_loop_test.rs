//! Integration tests for the event-driven flow

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use permsync_host::permission::{
    permission_set, AutoAckPresenter, DeviceProfile, GrantResult, PermissionId,
    PermissionStateStore, Reconciler, RecordingRationalePresenter, RequestCode, RequestToken,
    SimulatedHost,
};
use permsync_host::runtime::{self, EventLoop, HostEvent};
use permsync_host::session::CheckState;

fn ids(names: &[&str]) -> Vec<PermissionId> {
    names.iter().map(|n| PermissionId::new(*n)).collect()
}

#[tokio::test]
async fn test_full_flow_with_rationale() {
    let (tx, rx) = runtime::channel();
    let store = Arc::new(PermissionStateStore::new());
    let host = Arc::new(SimulatedHost::with_events(
        DeviceProfile {
            declared: ids(&["p.CAMERA", "p.RECORD_AUDIO", "p.LOCATION"]),
            granted: BTreeSet::from([PermissionId::new("p.CAMERA")]),
            rationale: BTreeSet::from([PermissionId::new("p.RECORD_AUDIO")]),
            answers: HashMap::from([(PermissionId::new("p.LOCATION"), false)]),
            default_answer: true,
            ..Default::default()
        },
        tx.clone(),
    ));
    let presenter = Arc::new(AutoAckPresenter::new(tx));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    store.subscribe(move |set| s.lock().unwrap().push(set.clone()));

    let mut reconciler = Reconciler::new(store.clone(), host.clone(), presenter);
    let session = reconciler.open_session(None);
    reconciler.check_once(session).unwrap();

    let mut event_loop = EventLoop::new(rx);
    let processed = event_loop.run(&mut reconciler).await;

    // Ack, then the host result
    assert_eq!(processed, 2);
    assert_eq!(
        *store.current(),
        permission_set(["p.CAMERA", "p.RECORD_AUDIO"])
    );
    assert_eq!(
        reconciler.session(session).unwrap().state(),
        &CheckState::Checked
    );

    let requests = host.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].permissions, ids(&["p.RECORD_AUDIO", "p.LOCATION"]));

    let published = seen.lock().unwrap().clone();
    assert_eq!(
        published,
        vec![
            permission_set(["p.CAMERA"]),
            permission_set(["p.CAMERA", "p.RECORD_AUDIO"]),
        ]
    );
}

#[tokio::test]
async fn test_run_returns_when_nothing_pending() {
    let (tx, rx) = runtime::channel();
    let store = Arc::new(PermissionStateStore::new());
    let host = Arc::new(SimulatedHost::with_events(DeviceProfile::default(), tx.clone()));
    let mut reconciler = Reconciler::new(store, host, Arc::new(AutoAckPresenter::new(tx)));

    let session = reconciler.open_session(None);
    reconciler.check_once(session).unwrap();

    let processed = EventLoop::new(rx).run(&mut reconciler).await;
    assert_eq!(processed, 0);
}

#[tokio::test]
async fn test_destroyed_session_result_is_dropped() {
    let (tx, rx) = runtime::channel();
    let store = Arc::new(PermissionStateStore::new());
    let host = Arc::new(SimulatedHost::new(DeviceProfile {
        declared: ids(&["A"]),
        ..Default::default()
    }));
    let mut reconciler = Reconciler::new(
        store.clone(),
        host.clone(),
        Arc::new(RecordingRationalePresenter::new()),
    );

    let session = reconciler.open_session(None);
    reconciler.check_once(session).unwrap();
    let token = host.requests()[0].token;

    tx.send(HostEvent::SessionDestroyed(session)).unwrap();
    tx.send(HostEvent::PermissionsResult {
        token,
        permissions: ids(&["A"]),
        results: vec![GrantResult::Granted],
    })
    .unwrap();

    let processed = EventLoop::new(rx).run(&mut reconciler).await;
    assert_eq!(processed, 2);
    assert!(store.current().is_empty());
    assert!(reconciler.session(session).is_none());
}

#[tokio::test]
async fn test_shutdown_stops_loop() {
    let (tx, rx) = runtime::channel();
    let host = Arc::new(SimulatedHost::new(DeviceProfile {
        declared: ids(&["A"]),
        ..Default::default()
    }));
    let mut reconciler = Reconciler::new(
        Arc::new(PermissionStateStore::new()),
        host,
        Arc::new(RecordingRationalePresenter::new()),
    );
    let session = reconciler.open_session(None);
    reconciler.check_once(session).unwrap();
    assert!(reconciler.has_pending());

    let stray = RequestToken::new(session, RequestCode(7));
    tx.send(HostEvent::PermissionsResult {
        token: stray,
        permissions: ids(&["A"]),
        results: vec![GrantResult::Granted],
    })
    .unwrap();
    tx.send(HostEvent::Shutdown).unwrap();

    let processed = EventLoop::new(rx).run(&mut reconciler).await;
    assert_eq!(processed, 2);
    assert!(reconciler.has_pending());
}

#[tokio::test]
async fn test_stale_ack_does_not_stop_loop() {
    let (tx, rx) = runtime::channel();
    let host = Arc::new(SimulatedHost::with_events(
        DeviceProfile {
            declared: ids(&["A"]),
            default_answer: true,
            ..Default::default()
        },
        tx.clone(),
    ));
    let store = Arc::new(PermissionStateStore::new());
    let mut reconciler = Reconciler::new(
        store.clone(),
        host,
        Arc::new(RecordingRationalePresenter::new()),
    );
    let session = reconciler.open_session(None);

    // Arrives ahead of the host result and is rejected by the reconciler
    tx.send(HostEvent::RationaleAcknowledged(session)).unwrap();
    reconciler.check_once(session).unwrap();

    EventLoop::new(rx).run(&mut reconciler).await;
    assert_eq!(*store.current(), permission_set(["A"]));
}
