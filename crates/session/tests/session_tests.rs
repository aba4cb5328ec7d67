//! Integration tests for the session lifecycle

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use ledger_core::{AuthResponse, AuthTokens, CategoryFilters, User};
use ledger_http::{ApiClient, ClientError};
use ledger_session::storage::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, TOKEN_EXPIRY_KEY};
use ledger_session::{
    DASHBOARD_ROUTE, FileStore, KeyValueStore, LOGIN_ROUTE, ManualClock, MemoryStore, Navigator,
    Session, SessionState, TokenRefresher, redirect_if_authenticated, require_auth,
};
use mockall::mock;
use serde_json::json;
use ledger_core::{CoreError, CoreResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NOW_SECS: i64 = 1_700_000_000;
const NOW_MS: i64 = NOW_SECS * 1000;

mock! {
    pub Refresher {}

    #[async_trait]
    impl TokenRefresher for Refresher {
        async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ClientError>;
    }
}

#[derive(Default)]
struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    fn routes(&self) -> Vec<String> {
        self.routes.lock().unwrap().clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, route: &str) {
        self.routes.lock().unwrap().push(route.to_string());
    }
}

/// Answers every refresh after a fixed delay
struct SlowRefresher {
    delay: Duration,
    response: AuthResponse,
}

#[async_trait]
impl TokenRefresher for SlowRefresher {
    async fn refresh(&self, _refresh_token: &str) -> Result<AuthResponse, ClientError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.response.clone())
    }
}

/// Memory store whose writes can be switched off
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    reject_writes: AtomicBool,
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, key: &str) -> CoreResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> CoreResult<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(CoreError::storage("disk full"));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> CoreResult<()> {
        self.inner.remove(key).await
    }
}

struct Harness {
    session: Session,
    store: Arc<MemoryStore>,
    clock: Arc<ManualClock>,
    navigator: Arc<RecordingNavigator>,
}

fn harness_with(store: MemoryStore, refresher: impl TokenRefresher + 'static) -> Harness {
    let store = Arc::new(store);
    let clock = Arc::new(ManualClock::new(NOW_MS));
    let navigator = Arc::new(RecordingNavigator::default());
    let session = Session::builder(store.clone(), Arc::new(refresher))
        .clock(clock.clone())
        .navigator(navigator.clone())
        .build();
    Harness {
        session,
        store,
        clock,
        navigator,
    }
}

fn harness(refresher: impl TokenRefresher + 'static) -> Harness {
    harness_with(MemoryStore::new(), refresher)
}

/// Unsigned JWT-shaped token expiring at `exp` (epoch seconds)
fn jwt(exp: i64, subject: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = URL_SAFE_NO_PAD.encode(json!({ "exp": exp, "sub": subject }).to_string());
    format!("{header}.{claims}.signature")
}

fn issued(access_token: &str, refresh_token: &str) -> AuthResponse {
    AuthResponse {
        data: Some(AuthTokens {
            access_token: Some(access_token.to_string()),
            refresh_token: Some(refresh_token.to_string()),
        }),
        message: Some("ok".to_string()),
    }
}

async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn login_with_fresh_token_is_authenticated() {
    let mut refresher = MockRefresher::new();
    refresher.expect_refresh().never();
    let h = harness(refresher);
    let access = jwt(NOW_SECS + 3600, "u1");

    h.session.login(&access, "r1").await.unwrap();

    assert!(h.session.check_auth());
    let state = h.session.state();
    assert!(state.is_authenticated());
    assert_eq!(state.token_expiry(), Some((NOW_SECS + 3600) * 1000));
    assert!(h.session.refresh_scheduled());

    assert_eq!(h.store.get(ACCESS_TOKEN_KEY).await.unwrap(), Some(access));
    assert_eq!(
        h.store.get(REFRESH_TOKEN_KEY).await.unwrap(),
        Some("r1".to_string())
    );
    assert_eq!(
        h.store.get(TOKEN_EXPIRY_KEY).await.unwrap(),
        Some(((NOW_SECS + 3600) * 1000).to_string())
    );
}

#[tokio::test]
async fn token_without_expiry_is_never_valid() {
    let mut refresher = MockRefresher::new();
    refresher.expect_refresh().returning(|_| {
        Err(ClientError::Client {
            status: 401,
            message: "Invalid refresh token".into(),
            errors: None,
        })
    });
    let h = harness(refresher);
    h.store.set(TOKEN_EXPIRY_KEY, "123").await.unwrap();

    h.session.login("opaque-token", "r1").await.unwrap();

    assert_eq!(h.session.state().token_expiry(), None);
    assert_eq!(h.store.get(TOKEN_EXPIRY_KEY).await.unwrap(), None);
    assert!(!h.session.refresh_scheduled());
    assert!(!h.session.check_auth());
}

#[tokio::test(start_paused = true)]
async fn token_inside_margin_starts_background_refresh() {
    let fresh = jwt(NOW_SECS + 3600, "u1");
    let mut refresher = MockRefresher::new();
    let issued_token = fresh.clone();
    refresher
        .expect_refresh()
        .withf(|token| token == "r1")
        .times(1)
        .returning(move |_| Ok(issued(&issued_token, "r2")));
    let h = harness(refresher);

    h.session.login(&jwt(NOW_SECS + 30, "u1"), "r1").await.unwrap();
    assert!(!h.session.refresh_scheduled());

    assert!(!h.session.check_auth());
    settle().await;

    let state = h.session.state();
    assert_eq!(state.access_token(), Some(fresh.as_str()));
    assert_eq!(state.refresh_token(), Some("r2"));
    assert!(h.session.check_auth());
}

#[tokio::test]
async fn logout_is_idempotent() {
    let h = harness(MockRefresher::new());
    h.session
        .login(&jwt(NOW_SECS + 3600, "u1"), "r1")
        .await
        .unwrap();

    h.session.logout().await.unwrap();
    let after_first = h.session.state();
    h.session.logout().await.unwrap();

    assert_eq!(after_first, SessionState::anonymous());
    assert_eq!(h.session.state(), SessionState::anonymous());
    assert!(h.store.is_empty());
    assert!(!h.session.refresh_scheduled());
    assert_eq!(h.navigator.routes(), vec![LOGIN_ROUTE, LOGIN_ROUTE]);
}

#[tokio::test]
async fn refresh_without_refresh_token_logs_out() {
    let mut refresher = MockRefresher::new();
    refresher.expect_refresh().never();
    let h = harness(refresher);

    assert!(!h.session.try_refresh().await);
    assert_eq!(h.navigator.routes(), vec![LOGIN_ROUTE]);
}

#[tokio::test]
async fn failed_refresh_ends_session() {
    let mut refresher = MockRefresher::new();
    refresher.expect_refresh().times(1).returning(|_| {
        Err(ClientError::Server {
            status: 500,
            message: "Server error occurred".into(),
        })
    });
    let h = harness(refresher);
    h.session
        .login(&jwt(NOW_SECS + 3600, "u1"), "r1")
        .await
        .unwrap();

    assert!(!h.session.try_refresh().await);

    assert_eq!(h.session.state(), SessionState::anonymous());
    assert!(h.store.is_empty());
    assert_eq!(h.navigator.routes(), vec![LOGIN_ROUTE]);
}

#[tokio::test]
async fn refresh_response_missing_a_token_ends_session() {
    let mut refresher = MockRefresher::new();
    refresher.expect_refresh().times(1).returning(|_| {
        Ok(AuthResponse {
            data: Some(AuthTokens {
                access_token: Some("only-access".into()),
                refresh_token: None,
            }),
            message: None,
        })
    });
    let h = harness(refresher);
    h.session
        .login(&jwt(NOW_SECS + 3600, "u1"), "r1")
        .await
        .unwrap();

    assert!(!h.session.try_refresh().await);
    assert!(!h.session.state().is_authenticated());
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn successful_refresh_rotates_and_persists_tokens() {
    let rotated = jwt(NOW_SECS + 7200, "u1");
    let mut refresher = MockRefresher::new();
    let next = rotated.clone();
    refresher
        .expect_refresh()
        .withf(|token| token == "r1")
        .times(1)
        .returning(move |_| Ok(issued(&next, "r2")));
    let h = harness(refresher);
    h.session
        .login(&jwt(NOW_SECS + 3600, "u1"), "r1")
        .await
        .unwrap();

    assert!(h.session.try_refresh().await);

    let state = h.session.state();
    assert!(state.is_authenticated());
    assert_eq!(state.access_token(), Some(rotated.as_str()));
    assert_eq!(state.token_expiry(), Some((NOW_SECS + 7200) * 1000));
    assert_eq!(h.store.get(ACCESS_TOKEN_KEY).await.unwrap(), Some(rotated));
    assert_eq!(
        h.store.get(REFRESH_TOKEN_KEY).await.unwrap(),
        Some("r2".to_string())
    );
    assert!(h.navigator.routes().is_empty());
}

#[tokio::test]
async fn concurrent_refreshes_share_one_request() {
    let server = MockServer::start().await;
    let rotated = jwt(NOW_SECS + 7200, "u1");
    Mock::given(method("POST"))
        .and(path("/v1/auth/refresh-token"))
        .and(body_json(json!({ "refresh_token": "r1" })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(200))
                .set_body_json(json!({
                    "data": { "access_token": rotated, "refresh_token": "r2" }
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let api = ApiClient::new(server.uri()).unwrap();
    let h = harness(api);
    h.session
        .login(&jwt(NOW_SECS + 3600, "u1"), "r1")
        .await
        .unwrap();

    let (a, b, c) = tokio::join!(
        h.session.try_refresh(),
        h.session.try_refresh(),
        h.session.try_refresh()
    );

    assert!(a && b && c);
    assert_eq!(h.session.state().access_token(), Some(rotated.as_str()));
}

#[tokio::test]
async fn parallel_unauthorized_requests_refresh_once() {
    let server = MockServer::start().await;
    let stale = jwt(NOW_SECS + 3600, "stale");
    let rotated = jwt(NOW_SECS + 7200, "rotated");

    Mock::given(method("GET"))
        .and(path("/v1/categories"))
        .and(header("authorization", format!("Bearer {stale}").as_str()))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "expired" })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/categories"))
        .and(header("authorization", format!("Bearer {rotated}").as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "categories": [], "total_data": 0, "total_page": 0 }
        })))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/auth/refresh-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(300))
                .set_body_json(json!({
                    "data": { "access_token": rotated, "refresh_token": "r2" }
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let public = ApiClient::new(server.uri()).unwrap();
    let h = harness(public.clone());
    h.session.login(&stale, "r1").await.unwrap();
    let api = public.with_credentials(Arc::new(h.session.clone()));

    let filters = CategoryFilters::default();
    let (first, second) = tokio::join!(api.get_categories(&filters), api.get_categories(&filters));

    assert_eq!(first.unwrap().total_data, 0);
    assert_eq!(second.unwrap().total_data, 0);
}

#[tokio::test]
async fn init_restores_valid_persisted_session() {
    let store = MemoryStore::new();
    let access = jwt(NOW_SECS + 3600, "u1");
    store.set(ACCESS_TOKEN_KEY, &access).await.unwrap();
    store.set(REFRESH_TOKEN_KEY, "r1").await.unwrap();
    let mut refresher = MockRefresher::new();
    refresher.expect_refresh().never();
    let h = harness_with(store, refresher);

    h.session.init().await.unwrap();

    assert!(h.session.check_auth());
    assert_eq!(h.session.state().access_token(), Some(access.as_str()));
    assert!(h.session.refresh_scheduled());
}

#[tokio::test]
async fn init_renews_expired_persisted_session() {
    let store = MemoryStore::new();
    store
        .set(ACCESS_TOKEN_KEY, &jwt(NOW_SECS - 10, "u1"))
        .await
        .unwrap();
    store.set(REFRESH_TOKEN_KEY, "r1").await.unwrap();
    let rotated = jwt(NOW_SECS + 3600, "u1");
    let mut refresher = MockRefresher::new();
    let next = rotated.clone();
    refresher
        .expect_refresh()
        .withf(|token| token == "r1")
        .times(1)
        .returning(move |_| Ok(issued(&next, "r2")));
    let h = harness_with(store, refresher);

    h.session.init().await.unwrap();

    let state = h.session.state();
    assert!(state.is_authenticated());
    assert_eq!(state.access_token(), Some(rotated.as_str()));
    assert!(h.session.check_auth());
    assert_eq!(h.store.get(ACCESS_TOKEN_KEY).await.unwrap(), Some(rotated));
}

#[tokio::test]
async fn init_with_rejected_refresh_stays_signed_out() {
    let store = MemoryStore::new();
    store
        .set(ACCESS_TOKEN_KEY, &jwt(NOW_SECS - 10, "u1"))
        .await
        .unwrap();
    store.set(REFRESH_TOKEN_KEY, "r1").await.unwrap();
    let mut refresher = MockRefresher::new();
    refresher.expect_refresh().times(1).returning(|_| {
        Err(ClientError::Client {
            status: 401,
            message: "Invalid refresh token".into(),
            errors: None,
        })
    });
    let h = harness_with(store, refresher);

    h.session.init().await.unwrap();

    assert_eq!(h.session.state(), SessionState::anonymous());
    assert!(h.store.is_empty());
    assert_eq!(h.navigator.routes(), vec![LOGIN_ROUTE]);
}

#[tokio::test]
async fn init_needs_both_tokens() {
    let store = MemoryStore::new();
    store
        .set(ACCESS_TOKEN_KEY, &jwt(NOW_SECS + 3600, "u1"))
        .await
        .unwrap();
    let mut refresher = MockRefresher::new();
    refresher.expect_refresh().never();
    let h = harness_with(store, refresher);

    h.session.init().await.unwrap();

    assert_eq!(h.session.state(), SessionState::anonymous());
    assert!(h.navigator.routes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn proactive_refresh_fires_ahead_of_expiry() {
    let rotated = jwt(NOW_SECS + 3600, "u1");
    let mut refresher = MockRefresher::new();
    let next = rotated.clone();
    refresher
        .expect_refresh()
        .times(1)
        .returning(move |_| Ok(issued(&next, "r2")));
    let h = harness(refresher);
    let original = jwt(NOW_SECS + 600, "u1");

    h.session.login(&original, "r1").await.unwrap();
    assert!(h.session.refresh_scheduled());

    tokio::time::advance(Duration::from_secs(299)).await;
    settle().await;
    assert_eq!(h.session.state().access_token(), Some(original.as_str()));

    h.clock.advance(Duration::from_secs(300));
    tokio::time::advance(Duration::from_secs(2)).await;
    settle().await;

    assert_eq!(h.session.state().access_token(), Some(rotated.as_str()));
    assert!(h.session.check_auth());
    assert!(h.session.refresh_scheduled());
}

#[tokio::test(start_paused = true)]
async fn logout_cancels_proactive_refresh() {
    let mut refresher = MockRefresher::new();
    refresher.expect_refresh().never();
    let h = harness(refresher);

    h.session
        .login(&jwt(NOW_SECS + 600, "u1"), "r1")
        .await
        .unwrap();
    h.session.logout().await.unwrap();

    tokio::time::advance(Duration::from_secs(600)).await;
    settle().await;
    assert!(!h.session.state().is_authenticated());
}

#[tokio::test]
async fn subscribers_observe_login() {
    let h = harness(MockRefresher::new());
    let mut updates = h.session.subscribe();

    h.session
        .login(&jwt(NOW_SECS + 3600, "u1"), "r1")
        .await
        .unwrap();

    assert!(updates.has_changed().unwrap());
    assert!(updates.borrow_and_update().is_authenticated());
}

#[tokio::test]
async fn user_profile_needs_authenticated_session() {
    let h = harness(MockRefresher::new());
    let user = User {
        id: "u1".into(),
        email: "ada@example.com".into(),
        name: "Ada".into(),
        role: Some("admin".into()),
    };

    h.session.set_user(user.clone());
    assert!(h.session.state().user().is_none());

    h.session
        .login(&jwt(NOW_SECS + 3600, "u1"), "r1")
        .await
        .unwrap();
    h.session.set_user(user.clone());
    assert_eq!(h.session.state().user(), Some(&user));

    h.session.logout().await.unwrap();
    assert!(h.session.state().user().is_none());
}

#[tokio::test]
async fn guards_follow_authentication() {
    let h = harness(MockRefresher::new());

    let redirect = require_auth(&h.session).unwrap_err();
    assert_eq!(redirect.status, http::StatusCode::FOUND);
    assert_eq!(redirect.location, LOGIN_ROUTE);
    assert!(redirect_if_authenticated(&h.session, DASHBOARD_ROUTE).is_ok());

    h.session
        .login(&jwt(NOW_SECS + 3600, "u1"), "r1")
        .await
        .unwrap();

    let state = require_auth(&h.session).unwrap();
    assert!(state.is_authenticated());
    let redirect = redirect_if_authenticated(&h.session, DASHBOARD_ROUTE).unwrap_err();
    assert_eq!(redirect.location, DASHBOARD_ROUTE);
}

#[tokio::test]
async fn file_store_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    let access = jwt(NOW_SECS + 3600, "u1");

    let first = Session::builder(
        Arc::new(FileStore::new(&path)),
        Arc::new(MockRefresher::new()),
    )
    .clock(Arc::new(ManualClock::new(NOW_MS)))
    .build();
    first.login(&access, "r1").await.unwrap();
    drop(first);

    let second = Session::builder(
        Arc::new(FileStore::new(&path)),
        Arc::new(MockRefresher::new()),
    )
    .clock(Arc::new(ManualClock::new(NOW_MS)))
    .build();
    second.init().await.unwrap();

    assert!(second.check_auth());
    assert_eq!(second.state().access_token(), Some(access.as_str()));
}

#[tokio::test(start_paused = true)]
async fn logout_during_refresh_keeps_session_ended() {
    let refresher = SlowRefresher {
        delay: Duration::from_millis(200),
        response: issued(&jwt(NOW_SECS + 7200, "u1"), "r2"),
    };
    let h = harness(refresher);
    h.session
        .login(&jwt(NOW_SECS + 3600, "u1"), "r1")
        .await
        .unwrap();

    let refreshing = tokio::spawn({
        let session = h.session.clone();
        async move { session.try_refresh().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.session.logout().await.unwrap();

    assert!(!refreshing.await.unwrap());
    assert_eq!(h.session.state(), SessionState::anonymous());
    assert!(!h.session.refresh_scheduled());
    assert!(h.store.is_empty());
    assert_eq!(h.navigator.routes(), vec![LOGIN_ROUTE.to_string()]);

    let restarted = Session::builder(h.store.clone(), Arc::new(MockRefresher::new()))
        .clock(h.clock.clone())
        .build();
    restarted.init().await.unwrap();
    assert!(!restarted.check_auth());
}

#[tokio::test(start_paused = true)]
async fn login_during_refresh_is_not_overwritten() {
    let refresher = SlowRefresher {
        delay: Duration::from_millis(200),
        response: issued(&jwt(NOW_SECS + 7200, "u1"), "r2"),
    };
    let h = harness(refresher);
    h.session
        .login(&jwt(NOW_SECS + 3600, "u1"), "r1")
        .await
        .unwrap();

    let refreshing = tokio::spawn({
        let session = h.session.clone();
        async move { session.try_refresh().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    let other = jwt(NOW_SECS + 3600, "u2");
    h.session.login(&other, "other").await.unwrap();

    assert!(!refreshing.await.unwrap());
    assert!(h.session.check_auth());
    assert_eq!(h.session.state().access_token(), Some(other.as_str()));
    assert_eq!(
        h.store.get(REFRESH_TOKEN_KEY).await.unwrap(),
        Some("other".to_string())
    );
}

#[tokio::test]
async fn refresh_that_cannot_be_persisted_ends_session() {
    let mut refresher = MockRefresher::new();
    let rotated = jwt(NOW_SECS + 7200, "u1");
    refresher
        .expect_refresh()
        .times(1)
        .returning(move |_| Ok(issued(&rotated, "r2")));
    let store = Arc::new(FlakyStore::default());
    let navigator = Arc::new(RecordingNavigator::default());
    let session = Session::builder(store.clone(), Arc::new(refresher))
        .clock(Arc::new(ManualClock::new(NOW_MS)))
        .navigator(navigator.clone())
        .build();
    session
        .login(&jwt(NOW_SECS + 3600, "u1"), "r1")
        .await
        .unwrap();

    store.reject_writes.store(true, Ordering::SeqCst);
    assert!(!session.try_refresh().await);

    assert_eq!(session.state(), SessionState::anonymous());
    assert_eq!(store.get(REFRESH_TOKEN_KEY).await.unwrap(), None);
    assert_eq!(navigator.routes(), vec![LOGIN_ROUTE.to_string()]);
}

#[tokio::test]
async fn corrupt_session_file_does_not_block_login() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.json");
    tokio::fs::write(&path, b"{garbage").await.unwrap();
    let access = jwt(NOW_SECS + 3600, "u1");

    let session = Session::builder(
        Arc::new(FileStore::new(&path)),
        Arc::new(MockRefresher::new()),
    )
    .clock(Arc::new(ManualClock::new(NOW_MS)))
    .build();
    session.init().await.unwrap();
    assert!(!session.check_auth());
    session.logout().await.unwrap();
    session.login(&access, "r1").await.unwrap();

    let restarted = Session::builder(
        Arc::new(FileStore::new(&path)),
        Arc::new(MockRefresher::new()),
    )
    .clock(Arc::new(ManualClock::new(NOW_MS)))
    .build();
    restarted.init().await.unwrap();
    assert!(restarted.check_auth());
}
