use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, TimeZone, Utc};
use serde_json::{json, Map};
use tokio::sync::broadcast;
use training_portal_core::memory::{MemoryCache, MemoryRemote};
use training_portal_core::store::DEFAULT_CACHE_KEY;
use training_portal_core::{
    AppStore, Clock, Collection, FormKind, LocalCache, ManualClock, RejectReason, RequestKind,
    RemoteStore, RequestStatus, Role, Severity, StoreError, StoreEvent, StoreOptions, TrainingModule,
    UserSession,
};

struct Harness {
    store: AppStore,
    remote: Arc<MemoryRemote>,
    cache: Arc<MemoryCache>,
    clock: Arc<ManualClock>,
}

fn harness_with_cache(cache: Arc<MemoryCache>) -> Harness {
    let remote = Arc::new(MemoryRemote::new());
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap(),
    ));
    let store = AppStore::open(
        remote.clone(),
        cache.clone(),
        StoreOptions {
            clock: clock.clone(),
            ..StoreOptions::default()
        },
    );
    Harness {
        store,
        remote,
        cache,
        clock,
    }
}

fn harness() -> Harness {
    harness_with_cache(Arc::new(MemoryCache::new()))
}

/// Waits for the next remote write outcome, skipping other events.
async fn next_remote_outcome(rx: &mut broadcast::Receiver<StoreEvent>) -> StoreEvent {
    loop {
        let event = tokio::time::timeout(StdDuration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a remote write")
            .expect("event channel closed");
        match event {
            StoreEvent::RemoteWriteSucceeded { .. } | StoreEvent::RemoteWriteFailed { .. } => {
                return event
            }
            _ => continue,
        }
    }
}

fn coordinator() -> UserSession {
    UserSession::new("coord@x.com", Role::TrainingCoordinator)
}

#[tokio::test]
async fn passcode_valid_on_day_six_and_expired_on_day_eight() {
    let h = harness();
    h.store.set_user(coordinator()).unwrap();

    let entry = h
        .store
        .issue_passcode("trainee@x.com", Some("4821"), Some(7))
        .unwrap();
    assert_eq!(entry.issued_by.as_deref(), Some("coord@x.com"));
    assert!(h.store.validate_passcode("trainee@x.com", "4821").is_ok());
    assert_eq!(
        h.store.validate_passcode("trainee@x.com", "0000"),
        Err(RejectReason::NotFound)
    );

    h.clock.advance(Duration::days(6));
    assert!(h.store.validate_passcode("trainee@x.com", "4821").is_ok());

    h.clock.advance(Duration::days(2));
    assert_eq!(
        h.store.validate_passcode("trainee@x.com", "4821"),
        Err(RejectReason::Expired)
    );
}

#[tokio::test]
async fn non_numeric_explicit_code_does_not_commit() {
    let h = harness();
    let err = h
        .store
        .issue_passcode("trainee@x.com", Some("12a4"), Some(7))
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert!(h.store.passcodes().is_empty());
}

#[tokio::test]
async fn passcode_login_consumes_code_locally_and_remotely() {
    let h = harness();
    let mut events = h.store.subscribe();
    let entry = h
        .store
        .issue_passcode("trainee@x.com", None, None)
        .unwrap();
    assert_eq!(entry.code.len(), 4);
    assert!(matches!(
        next_remote_outcome(&mut events).await,
        StoreEvent::RemoteWriteSucceeded { collection: Collection::Passcodes }
    ));

    let session = h
        .store
        .login_with_passcode("trainee@x.com", &entry.code, Some("Tess".to_string()))
        .unwrap();
    assert_eq!(session.role, Role::Trainee);
    assert_eq!(h.store.user(), Some(session));
    assert_eq!(
        h.store.validate_passcode("trainee@x.com", &entry.code),
        Err(RejectReason::AlreadyUsed)
    );
    assert!(matches!(
        h.store.mark_passcode_used(entry.id),
        Err(StoreError::AlreadyUsed(_))
    ));

    // passcode update + user insert
    for _ in 0..2 {
        assert!(matches!(
            next_remote_outcome(&mut events).await,
            StoreEvent::RemoteWriteSucceeded { .. }
        ));
    }
    let remote_codes = h.remote.records(Collection::Passcodes);
    assert_eq!(remote_codes.len(), 1);
    assert_eq!(remote_codes[0]["is_used"], json!(true));
}

#[tokio::test]
async fn reset_clears_session_and_cache() {
    let h = harness();
    let mut user = UserSession::new("a@b.com", Role::Trainee);
    user.passcode = Some("1234".to_string());
    h.store.set_user(user).unwrap();
    assert!(h.cache.load(DEFAULT_CACHE_KEY).unwrap().is_some());

    h.store.reset();
    assert_eq!(h.store.user(), None);
    assert_eq!(h.cache.load(DEFAULT_CACHE_KEY).unwrap(), None);
}

#[tokio::test]
async fn reassignment_overwrites_and_writes_remote_each_time() {
    let h = harness();
    let mut events = h.store.subscribe();
    h.store
        .assign_training_modules("t@x.com", vec![TrainingModule::Bosiet])
        .unwrap();
    h.store
        .assign_training_modules("t@x.com", vec![TrainingModule::FireWatch])
        .unwrap();

    let current = h.store.trainee_assignments("t@x.com").unwrap();
    assert_eq!(current.modules, vec![TrainingModule::FireWatch]);

    for _ in 0..2 {
        next_remote_outcome(&mut events).await;
    }
    assert_eq!(h.remote.records(Collection::TrainingAssignments).len(), 2);
}

#[tokio::test]
async fn snapshot_survives_reload_from_cache() {
    let h = harness();
    h.store.set_user(coordinator()).unwrap();
    h.store
        .issue_passcode("trainee@x.com", Some("4821"), Some(7))
        .unwrap();
    h.store
        .assign_training_modules("trainee@x.com", vec![TrainingModule::Bosiet, TrainingModule::Huet])
        .unwrap();
    h.store
        .complete_module("trainee@x.com", TrainingModule::Huet)
        .unwrap();
    let mut fields = Map::new();
    fields.insert("site".to_string(), json!("North Rig"));
    h.store.save_form(FormKind::SiteInduction, fields).unwrap();
    h.store
        .submit_observation("Deck 2", "Loose grating", Severity::Medium)
        .unwrap();
    h.store
        .submit_request(RequestKind::Request, "New gloves", "Size L")
        .unwrap();

    let before = h.store.snapshot();
    let reloaded = harness_with_cache(h.cache.clone());
    assert_eq!(reloaded.store.snapshot(), before);
}

#[tokio::test]
async fn cache_failure_keeps_in_memory_commit() {
    let h = harness_with_cache(Arc::new(MemoryCache::with_quota(16)));
    let mut events = h.store.subscribe();
    h.store.set_user(coordinator()).unwrap();

    assert_eq!(h.store.user(), Some(coordinator()));
    assert!(matches!(
        events.recv().await.unwrap(),
        StoreEvent::CacheWriteFailed { .. }
    ));
}

#[tokio::test]
async fn remote_failure_is_reported_without_rollback() {
    let h = harness();
    h.remote.set_offline(true);
    let mut events = h.store.subscribe();
    h.store.set_user(coordinator()).unwrap();
    let request = h
        .store
        .submit_request(RequestKind::Complaint, "Noise", "Generator at night")
        .unwrap();

    for _ in 0..2 {
        assert!(matches!(
            next_remote_outcome(&mut events).await,
            StoreEvent::RemoteWriteFailed { .. }
        ));
    }
    assert_eq!(h.store.requests(), vec![request.clone()]);

    h.remote.set_offline(false);
    let updated = h
        .store
        .update_request_status(request.id, RequestStatus::InProgress)
        .unwrap();
    assert_eq!(updated.status, RequestStatus::InProgress);
}

#[tokio::test]
async fn sync_replaces_passcodes_and_session_assignment() {
    let h = harness();
    let mut events = h.store.subscribe();
    h.store
        .set_user(UserSession::new("T@x.com", Role::Trainee))
        .unwrap();
    h.store
        .assign_training_modules("t@x.com", vec![TrainingModule::FirstAid])
        .unwrap();
    for _ in 0..2 {
        next_remote_outcome(&mut events).await;
    }

    // Another device re-assigned the trainee later and issued a code.
    let later = h.clock.now() + Duration::hours(2);
    h.remote
        .insert(
            Collection::TrainingAssignments,
            json!({
                "id": "remote-1",
                "trainee_email": "t@x.com",
                "modules": ["HUET", "BOSIET"],
                "assigned_at": later,
            }),
        )
        .await
        .unwrap();
    h.remote
        .insert(
            Collection::Passcodes,
            json!({
                "id": uuid::Uuid::new_v4().to_string(),
                "code": "7777",
                "trainee_email": "t@x.com",
                "is_used": false,
                "created_at": later,
                "expires_at": later + Duration::days(7),
            }),
        )
        .await
        .unwrap();
    h.remote
        .insert(Collection::Passcodes, json!({"id": "garbage"}))
        .await
        .unwrap();

    let report = h.store.sync().await.unwrap();
    assert_eq!(report.passcodes, 1);
    assert_eq!(
        h.store.trainee_assignments("t@x.com").unwrap().modules,
        vec![TrainingModule::Huet, TrainingModule::Bosiet]
    );
    assert_eq!(h.store.passcodes()[0].code, "7777");
}

#[tokio::test]
async fn failed_sync_leaves_state_alone() {
    let h = harness();
    h.store.set_user(coordinator()).unwrap();
    h.store
        .issue_passcode("trainee@x.com", Some("4821"), Some(7))
        .unwrap();
    h.remote.set_offline(true);

    let before = h.store.snapshot();
    assert!(matches!(h.store.sync().await, Err(StoreError::Remote(_))));
    assert_eq!(h.store.snapshot(), before);
}

#[tokio::test]
async fn sync_drops_codes_whose_insert_never_reached_the_remote() {
    let h = harness();
    let mut events = h.store.subscribe();
    h.remote.set_offline(true);
    h.store.set_user(coordinator()).unwrap();

    let local_only = h
        .store
        .issue_passcode("trainee@x.com", Some("4821"), Some(7))
        .unwrap();
    // user insert + passcode insert, both refused
    for _ in 0..2 {
        assert!(matches!(
            next_remote_outcome(&mut events).await,
            StoreEvent::RemoteWriteFailed { .. }
        ));
    }
    assert!(h.store.validate_passcode("trainee@x.com", "4821").is_ok());

    h.remote.set_offline(false);
    let report = h.store.sync().await.unwrap();

    assert_eq!(report.passcodes, 0);
    assert!(h.store.passcodes().iter().all(|p| p.id != local_only.id));
    assert_eq!(
        h.store.validate_passcode("trainee@x.com", "4821"),
        Err(RejectReason::NotFound)
    );
    assert!(h.remote.records(Collection::Passcodes).is_empty());
}
