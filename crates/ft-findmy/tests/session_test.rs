use std::io::Write;
use std::sync::Arc;

use ft_core::error::TrackerError;
use ft_findmy::fake::{phone, FakeFailure, FakeFindMy};
use ft_findmy::{DeviceLocator, SessionHolder, SessionState};

fn artifact(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

const SESSION: &str = r#"{
    "apple_id": "someone@example.com",
    "dsid": "42",
    "service_url": "https://p01-fmipweb.icloud.com",
    "cookies": "X-APPLE-WEBAUTH-TOKEN=t",
    "created_at": "2026-10-18T08:00:00Z"
}"#;

fn fake() -> Arc<FakeFindMy> {
    Arc::new(FakeFindMy::new(vec![phone(
        "pro",
        "Work Phone",
        "iPhone 16 Pro",
        37.7749,
        -122.4194,
    )]))
}

#[tokio::test]
async fn load_valid_artifact() {
    let file = artifact(SESSION);
    let holder = SessionHolder::new(fake());

    let session = holder.load(file.path()).await.unwrap();
    assert_eq!(holder.state().await, SessionState::Authenticated);
    assert_eq!(session.credentials().dsid, "42");
    assert!(session.created_at().is_some());
}

#[tokio::test]
async fn validation_listing_is_handed_back() {
    let file = artifact(SESSION);
    let api = fake();
    let holder = SessionHolder::new(api.clone());

    let (session, devices) = holder.load_with_devices(file.path()).await.unwrap();
    assert_eq!(session.generation(), 1);
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].id, "pro");
    assert_eq!(api.list_calls(), 1);
}

#[tokio::test]
async fn missing_artifact_expires() {
    let holder = SessionHolder::new(fake());
    let err = holder
        .load(std::path::Path::new("/definitely/not/here.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::AuthExpired(_)));
    assert_eq!(holder.state().await, SessionState::Expired);
}

#[tokio::test]
async fn malformed_artifact_expires() {
    let file = artifact("{ this is not json");
    let holder = SessionHolder::new(fake());
    assert!(matches!(
        holder.load(file.path()).await,
        Err(TrackerError::AuthExpired(_))
    ));
    assert_eq!(holder.state().await, SessionState::Expired);
}

#[tokio::test]
async fn remote_rejection_during_load_expires() {
    let file = artifact(SESSION);
    let api = fake();
    api.fail_list(Some(FakeFailure::Unauthorized));
    let holder = SessionHolder::new(api);

    assert!(holder.load(file.path()).await.is_err());
    assert_eq!(holder.state().await, SessionState::Expired);
}

#[tokio::test]
async fn expiry_seen_by_one_caller_reaches_all() {
    let file = artifact(SESSION);
    let api = fake();
    let holder = Arc::new(SessionHolder::new(api.clone()));
    holder.load(file.path()).await.unwrap();
    let locator = DeviceLocator::new(holder.clone(), "iPhone 16 Pro");

    let session = holder.get().await.unwrap();
    locator.resolve(&session).await.unwrap();

    api.fail_sound(Some(FakeFailure::Unauthorized));
    let err = holder
        .play_sound(&session, "pro", "Find My iPhone Alert")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "auth_expired");

    // Other holders of the same session see it on their next read.
    assert!(matches!(holder.get().await, Err(TrackerError::AuthExpired(_))));
    assert!(locator.cached().await.is_none());
}

#[tokio::test]
async fn concurrent_readers_share_one_session() {
    let file = artifact(SESSION);
    let holder = Arc::new(SessionHolder::new(fake()));
    holder.load(file.path()).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let holder = holder.clone();
        handles.push(tokio::spawn(async move {
            holder.get().await.map(|s| s.generation())
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), 1);
    }
}
