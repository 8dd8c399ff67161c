//! Integration tests for flagpost-toggle

use async_trait::async_trait;
use flagpost_config::FlagpostConfig;
use flagpost_core::store::StoreResult;
use flagpost_core::*;
use flagpost_csrf::{CsrfConfig, CsrfGuard};
use flagpost_toggle::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

const SESSION: &str = "session-1";

fn registry() -> Arc<FlagRegistry> {
    let registry = FlagRegistry::new(Arc::new(MemoryFlagStore::new()));
    registry
        .register(Flag::new("f1", "Stable flag", "").stable(true))
        .unwrap();
    registry.register(Flag::new("f2", "Unstable flag", "")).unwrap();
    registry
        .register(Flag::new("f3", "Enforced flag", "").stable(true).enforced(true))
        .unwrap();
    Arc::new(registry)
}

fn service() -> ToggleService {
    ToggleService::new(registry(), CsrfGuard::new(CsrfConfig::default()))
        .with_retry(RetryPolicy::new(3).with_backoff(Duration::ZERO))
}

fn user() -> ToggleContext {
    ToggleContext::new(SESSION, Viewer::from_user_id(1))
}

fn request(service: &ToggleService, action: &str, key: &str, direction: &str) -> ToggleRequest {
    let token = service.issue_token(SESSION).unwrap();
    ToggleRequest::new(action, key, direction, token)
}

async fn is_on(service: &ToggleService, key: &str, viewer: Viewer) -> bool {
    let registry = service.registry();
    let state = registry.load_viewer_state(viewer).await;
    registry.is_on(key, &state).unwrap()
}

#[tokio::test]
async fn test_publish_and_unpublish() {
    let service = service();

    let data = service
        .handle(&request(&service, "toggle_feature", "f1", "on"), &user())
        .await
        .unwrap();
    assert_eq!(data.action, "toggle_feature");
    assert_eq!(data.flag, "f1");
    assert_eq!(data.direction, "on");
    assert_eq!(data.outcome, "applied");
    assert!(is_on(&service, "f1", Viewer::Anonymous).await);

    service
        .handle(&request(&service, "toggle_feature", "f1", "off"), &user())
        .await
        .unwrap();
    assert!(!is_on(&service, "f1", Viewer::Anonymous).await);
}

#[tokio::test]
async fn test_policy_rejections_are_successful_responses() {
    let service = service();

    let unstable = service
        .respond(&request(&service, "toggle_feature", "f2", "on"), &user())
        .await;
    assert!(unstable.success);
    let data = unstable.data.unwrap();
    assert_eq!(data.outcome, "rejected");
    assert_eq!(data.reason, Some(Rejection::Unstable));
    assert!(!is_on(&service, "f2", Viewer::Anonymous).await);

    let enforced = service
        .handle(&request(&service, "toggle_feature", "f3", "off"), &user())
        .await
        .unwrap();
    assert_eq!(enforced.reason, Some(Rejection::Enforced));
    assert!(is_on(&service, "f3", Viewer::Anonymous).await);
}

#[tokio::test]
async fn test_preview_for_signed_in_user() {
    let service = service();

    service
        .handle(&request(&service, "toggle_preview", "f1", "on"), &user())
        .await
        .unwrap();

    assert!(is_on(&service, "f1", Viewer::from_user_id(1)).await);
    assert!(!is_on(&service, "f1", Viewer::from_user_id(2)).await);
    assert!(!is_on(&service, "f1", Viewer::Anonymous).await);
}

#[tokio::test]
async fn test_preview_requires_signed_in_user() {
    let service = service();
    let anonymous = ToggleContext::new(SESSION, Viewer::Anonymous);

    let err = service
        .handle(&request(&service, "toggle_preview", "f1", "on"), &anonymous)
        .await
        .unwrap_err();
    assert!(matches!(err, ToggleError::AuthenticationRequired));
    assert_eq!(err.status_code(), 401);
}

#[tokio::test]
async fn test_missing_or_foreign_token_changes_nothing() {
    let service = service();

    let mut missing = request(&service, "toggle_feature", "f1", "on");
    missing.token = None;
    let response = service.respond(&missing, &user()).await;
    assert!(!response.success);
    assert_eq!(response.error.as_ref().unwrap().code, "missing_token");

    let foreign_token = service.issue_token("someone-else").unwrap();
    let foreign = ToggleRequest::new("toggle_feature", "f1", "on", foreign_token);
    let response = service.respond(&foreign, &user()).await;
    assert_eq!(response.error.as_ref().unwrap().code, "invalid_token");
    assert_eq!(response.status, 403);
    assert!(response.data.is_none());

    assert!(!is_on(&service, "f1", Viewer::Anonymous).await);
}

#[tokio::test]
async fn test_token_is_checked_before_request_shape() {
    let service = service();
    let mut bad = ToggleRequest::new("delete_everything", "f1", "sideways", "");
    bad.token = None;

    let err = service.handle(&bad, &user()).await.unwrap_err();
    assert!(matches!(err, ToggleError::Authentication(_)));
}

#[tokio::test]
async fn test_validation_failures() {
    let service = service();

    for (action, key, direction) in [
        ("toggle_everything", "f1", "on"),
        ("toggle_feature", "f1", "up"),
        ("toggle_feature", "", "on"),
        ("toggle_feature", "f1<script>", "on"),
    ] {
        let response = service
            .respond(&request(&service, action, key, direction), &user())
            .await;
        assert_eq!(response.error.unwrap().code, "invalid_request");
        assert_eq!(response.status, 400);
    }

    assert!(!is_on(&service, "f1", Viewer::Anonymous).await);
}

#[tokio::test]
async fn test_unknown_flag() {
    let service = service();

    let err = service
        .handle(&request(&service, "toggle_feature", "nope", "on"), &user())
        .await
        .unwrap_err();
    assert!(matches!(err, ToggleError::UnknownFlag(ref key) if key == "nope"));
    assert_eq!(err.status_code(), 404);
}

#[tokio::test]
async fn test_disabled_service_refuses_toggles_but_not_queries() {
    let service = service();
    service
        .handle(&request(&service, "toggle_feature", "f1", "on"), &user())
        .await
        .unwrap();

    service.set_enabled(false);
    let err = service
        .handle(&request(&service, "toggle_feature", "f1", "off"), &user())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "disabled");
    assert!(is_on(&service, "f1", Viewer::Anonymous).await);
}

#[tokio::test]
async fn test_form_body_with_original_field_names() {
    let service = service();
    let token = service.issue_token(SESSION).unwrap();
    let body = format!(
        "action=toggle_feature&secret={}&flag_key=f1&flag_direction=on",
        token
    );

    let response = service.respond_form(&body, &user()).await;
    assert!(response.success, "{}", response.to_json());
    assert!(is_on(&service, "f1", Viewer::Anonymous).await);
}

#[tokio::test]
async fn test_json_body() {
    let service = service();
    let token = service.issue_token(SESSION).unwrap();
    let body = serde_json::json!({
        "action": "toggle_preview",
        "flag_key": "f1",
        "direction": "on",
        "token": token,
    })
    .to_string();

    let response = service.respond_json(&body, &user()).await;
    let payload: serde_json::Value = serde_json::from_str(&response.to_json()).unwrap();
    assert_eq!(payload["success"], true);
    assert_eq!(payload["data"]["outcome"], "applied");

    let garbage = service.respond_json("not json", &user()).await;
    assert_eq!(garbage.error.unwrap().code, "invalid_request");
}

#[tokio::test]
async fn test_from_config() {
    let mut config = FlagpostConfig::default();
    config.csrf.secret = Some("0123456789abcdef0123456789abcdef".to_string());
    config.enabled = false;

    let service = ToggleService::from_config(registry(), &config).unwrap();
    assert!(!service.is_enabled());
    assert_eq!(service.registry().len(), 3);

    config.csrf.secret = Some("too-short".to_string());
    assert!(matches!(
        ToggleService::from_config(registry(), &config),
        Err(ToggleError::Configuration(_))
    ));
}

#[tokio::test]
async fn test_services_sharing_a_secret_accept_each_others_tokens() {
    let mut config = FlagpostConfig::default();
    config.csrf.secret = Some("0123456789abcdef0123456789abcdef".to_string());

    let shared = registry();
    let first = ToggleService::from_config(shared.clone(), &config).unwrap();
    let second = ToggleService::from_config(shared, &config).unwrap();

    let token = first.issue_token(SESSION).unwrap();
    let result = second
        .handle(&ToggleRequest::new("toggle_feature", "f1", "on", token), &user())
        .await;
    assert!(result.is_ok());
}

/// Memory store whose writes fail a set number of times.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryFlagStore,
    failures: AtomicU32,
    corrupt: std::sync::atomic::AtomicBool,
    writes: AtomicU32,
}

#[async_trait]
impl FlagStore for FlakyStore {
    async fn get_published(&self) -> StoreResult<Versioned<FlagSet>> {
        self.inner.get_published().await
    }

    async fn put_published(&self, flags: &FlagSet, expected_version: u64) -> StoreResult<u64> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.corrupt.load(Ordering::SeqCst) {
            let error = serde_json::from_str::<FlagSet>("{").unwrap_err();
            return Err(StoreError::Serialization(error));
        }
        if self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Connection("connection reset".to_string()));
        }
        self.inner.put_published(flags, expected_version).await
    }

    async fn get_preview(&self, user: UserId) -> StoreResult<Versioned<FlagSet>> {
        self.inner.get_preview(user).await
    }

    async fn put_preview(
        &self,
        user: UserId,
        flags: &FlagSet,
        expected_version: u64,
    ) -> StoreResult<u64> {
        self.inner.put_preview(user, flags, expected_version).await
    }

    async fn clear(&self) -> StoreResult<()> {
        self.inner.clear().await
    }
}

fn flaky_service(store: Arc<FlakyStore>) -> ToggleService {
    let registry = FlagRegistry::new(store);
    registry
        .register(Flag::new("f1", "Stable flag", "").stable(true))
        .unwrap();
    ToggleService::new(Arc::new(registry), CsrfGuard::new(CsrfConfig::default()))
        .with_retry(RetryPolicy::new(3).with_backoff(Duration::ZERO))
}

#[tokio::test]
async fn test_transient_store_failures_are_retried() {
    let store = Arc::new(FlakyStore::default());
    store.failures.store(2, Ordering::SeqCst);
    let service = flaky_service(store.clone());

    let data = service
        .handle(&request(&service, "toggle_feature", "f1", "on"), &user())
        .await
        .unwrap();

    assert_eq!(data.outcome, "applied");
    assert_eq!(store.writes.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_persistent_store_failure_is_surfaced() {
    let store = Arc::new(FlakyStore::default());
    store.failures.store(100, Ordering::SeqCst);
    let service = flaky_service(store.clone());

    let err = service
        .handle(&request(&service, "toggle_feature", "f1", "on"), &user())
        .await
        .unwrap_err();

    assert!(matches!(err, ToggleError::StoreUnavailable { attempts: 3, .. }));
    assert_eq!(err.code(), "store_unavailable");
    assert!(!is_on(&service, "f1", Viewer::Anonymous).await);
}

#[tokio::test]
async fn test_corrupt_store_is_not_retried() {
    let store = Arc::new(FlakyStore::default());
    store.corrupt.store(true, Ordering::SeqCst);
    let service = flaky_service(store.clone());

    let err = service
        .handle(&request(&service, "toggle_feature", "f1", "on"), &user())
        .await
        .unwrap_err();

    assert!(matches!(err, ToggleError::StoreUnavailable { attempts: 1, .. }));
    assert_eq!(store.writes.load(Ordering::SeqCst), 1);
}
