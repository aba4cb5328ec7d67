//! Session state machine
//!
//! ```text
//! Anonymous --login--> Authenticated --refresh ok--> Authenticated
//!     ^                      |
//!     +--logout / refresh failure
//! ```
//!
//! Every mutation writes through to the [`KeyValueStore`]. A successful token
//! issuance re-arms the proactive refresh timer; logout cancels it.

use crate::clock::{Clock, SystemClock};
use crate::navigator::{LOGIN_ROUTE, Navigator, NoopNavigator};
use crate::refresher::TokenRefresher;
use crate::scheduler::RefreshScheduler;
use crate::state::SessionState;
use crate::storage::{KeyValueStore, PersistedTokens};
use crate::{lock, token};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use ledger_core::{CoreResult, User};
use ledger_http::CredentialProvider;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Timing knobs of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// A token this close to its expiry is treated as expired
    pub expiry_margin: Duration,
    /// How long before expiry the proactive refresh fires
    pub refresh_lead: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expiry_margin: Duration::from_secs(60),
            refresh_lead: Duration::from_secs(5 * 60),
        }
    }
}

type PendingRefresh = Shared<BoxFuture<'static, bool>>;

struct Inner {
    state: watch::Sender<SessionState>,
    store: Arc<dyn KeyValueStore>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    navigator: Arc<dyn Navigator>,
    scheduler: RefreshScheduler,
    pending: Mutex<Option<PendingRefresh>>,
    /// Held while a token change and its persistence happen together
    persist: tokio::sync::Mutex<()>,
    config: SessionConfig,
}

/// Handle to the authentication state of one user
///
/// Clones share the same state.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    /// Start building a session over `store`, renewing tokens with `refresher`
    pub fn builder(
        store: Arc<dyn KeyValueStore>,
        refresher: Arc<dyn TokenRefresher>,
    ) -> SessionBuilder {
        SessionBuilder {
            store,
            refresher,
            clock: None,
            navigator: None,
            config: SessionConfig::default(),
        }
    }

    /// Current snapshot of the session
    pub fn state(&self) -> SessionState {
        self.inner.state.borrow().clone()
    }

    /// Receive every subsequent change of the session
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn config(&self) -> SessionConfig {
        self.inner.config
    }

    /// Whether the proactive refresh timer is armed
    pub fn refresh_scheduled(&self) -> bool {
        self.inner.scheduler.is_armed()
    }

    /// Start an authenticated session with a freshly issued token pair
    pub async fn login(&self, access_token: &str, refresh_token: &str) -> CoreResult<()> {
        info!("Starting authenticated session");
        self.apply_tokens(access_token, refresh_token, true, None)
            .await
            .map(drop)
    }

    /// Replace the tokens of the current session without touching its status
    pub async fn update_tokens(&self, access_token: &str, refresh_token: &str) -> CoreResult<()> {
        self.apply_tokens(access_token, refresh_token, false, None)
            .await
            .map(drop)
    }

    /// Attach the user profile; ignored while signed out
    pub fn set_user(&self, user: User) {
        self.inner.state.send_if_modified(|state| state.set_user(user));
    }

    /// End the session and send the user to the login route
    ///
    /// Calling this while already signed out is harmless.
    pub async fn logout(&self) -> CoreResult<()> {
        let persist = self.inner.persist.lock().await;
        self.inner.scheduler.cancel();
        self.inner.state.send_if_modified(|state| {
            let changed = *state != SessionState::anonymous();
            *state = SessionState::anonymous();
            changed
        });
        info!("Session ended");

        let cleared = PersistedTokens::clear(self.inner.store.as_ref()).await;
        drop(persist);
        self.inner.navigator.navigate(LOGIN_ROUTE);
        cleared
    }

    /// Restore the session persisted by a previous run
    ///
    /// An expired persisted token is renewed once before the session counts
    /// as authenticated. Without both tokens the session stays anonymous.
    pub async fn init(&self) -> CoreResult<()> {
        let persisted = PersistedTokens::load(self.inner.store.as_ref()).await?;
        let (Some(access_token), Some(refresh_token)) =
            (persisted.access_token, persisted.refresh_token)
        else {
            debug!("No persisted session to restore");
            return Ok(());
        };

        let expiry = token::decode_expiry(&access_token);
        if self.is_expired(expiry) {
            info!("Persisted access token expired, renewing");
            self.inner
                .state
                .send_modify(|state| state.seed_refresh_token(&refresh_token));
            if self.try_refresh().await {
                self.inner
                    .state
                    .send_if_modified(SessionState::mark_authenticated);
            }
            return Ok(());
        }

        self.inner
            .state
            .send_modify(|state| state.set_tokens(&access_token, &refresh_token, expiry, true));
        self.schedule_refresh(expiry);
        info!("Restored persisted session");
        Ok(())
    }

    /// Whether an authenticated call may be made right now
    ///
    /// A session whose token is inside the expiry margin answers `false` and
    /// starts a background refresh. The answer does not wait for that refresh.
    pub fn check_auth(&self) -> bool {
        let state = self.state();
        if !state.is_authenticated() || state.access_token().is_none() {
            return false;
        }

        if self.is_expired(state.token_expiry()) {
            self.spawn_refresh();
            return false;
        }

        true
    }

    /// Renew the tokens, sharing one network call among concurrent callers
    ///
    /// Any failure ends the session; callers only see the outcome.
    pub async fn try_refresh(&self) -> bool {
        let pending = {
            let mut slot = lock(&self.inner.pending);
            if let Some(pending) = slot.as_ref() {
                debug!("Joining in-flight token refresh");
                pending.clone()
            } else {
                let weak = Arc::downgrade(&self.inner);
                let refresh = run_refresh(weak).boxed().shared();
                *slot = Some(refresh.clone());
                refresh
            }
        };
        pending.await
    }

    async fn refresh_once(&self) -> bool {
        let Some(refresh_token) = self.state().refresh_token().map(str::to_owned) else {
            warn!("No refresh token held, ending session");
            self.end_session().await;
            return false;
        };

        match self.inner.refresher.refresh(&refresh_token).await {
            Ok(response) => match response.token_pair() {
                Some(pair) => match self
                    .apply_tokens(
                        &pair.access_token,
                        &pair.refresh_token,
                        false,
                        Some(&refresh_token),
                    )
                    .await
                {
                    Ok(true) => {
                        info!("Access token refreshed");
                        true
                    }
                    Ok(false) => {
                        info!("Session changed during refresh, discarding new tokens");
                        false
                    }
                    Err(err) => {
                        error!(error = %err, "Refreshed tokens not persisted, ending session");
                        self.end_session().await;
                        false
                    }
                },
                None => {
                    warn!("Refresh response is missing tokens, ending session");
                    self.end_session().await;
                    false
                }
            },
            Err(err) => {
                error!(error = %err, "Token refresh failed");
                self.end_session().await;
                false
            }
        }
    }

    async fn end_session(&self) {
        if let Err(err) = self.logout().await {
            warn!(error = %err, "Failed to clear persisted session");
        }
    }

    /// Install a token pair in memory and storage
    ///
    /// With `replaces` set, the pair is only installed while the session still
    /// holds that refresh token. Returns whether the pair was installed.
    async fn apply_tokens(
        &self,
        access_token: &str,
        refresh_token: &str,
        authenticate: bool,
        replaces: Option<&str>,
    ) -> CoreResult<bool> {
        let expiry = token::decode_expiry(access_token);
        if expiry.is_none() {
            warn!("Access token carries no readable expiry");
        }

        let _persist = self.inner.persist.lock().await;
        let installed = self.inner.state.send_if_modified(|state| {
            if replaces.is_some_and(|expected| state.refresh_token() != Some(expected)) {
                return false;
            }
            state.set_tokens(access_token, refresh_token, expiry, authenticate);
            true
        });
        if !installed {
            return Ok(false);
        }

        let persisted = PersistedTokens {
            access_token: Some(access_token.to_string()),
            refresh_token: Some(refresh_token.to_string()),
            token_expiry: expiry,
        };
        persisted.save(self.inner.store.as_ref()).await?;
        self.schedule_refresh(expiry);
        Ok(true)
    }

    fn schedule_refresh(&self, expiry: Option<i64>) {
        let Some(expiry) = expiry else {
            self.inner.scheduler.cancel();
            return;
        };

        let delay = expiry
            .saturating_sub(self.inner.clock.now_millis())
            .saturating_sub(token::duration_millis(self.inner.config.refresh_lead));
        if delay <= 0 {
            debug!("Token expires within the refresh lead, no timer armed");
            self.inner.scheduler.cancel();
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        self.inner
            .scheduler
            .arm(Duration::from_millis(delay.unsigned_abs()), async move {
                if let Some(inner) = weak.upgrade() {
                    debug!("Proactive token refresh firing");
                    Session { inner }.try_refresh().await;
                }
            });
    }

    fn spawn_refresh(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let session = self.clone();
                handle.spawn(async move {
                    session.try_refresh().await;
                });
            }
            Err(_) => warn!("No async runtime, skipping background token refresh"),
        }
    }

    fn is_expired(&self, expiry: Option<i64>) -> bool {
        token::is_expired(
            expiry,
            self.inner.clock.now_millis(),
            self.inner.config.expiry_margin,
        )
    }
}

/// Body of the shared refresh future; clears the in-flight slot when done
async fn run_refresh(weak: Weak<Inner>) -> bool {
    let Some(inner) = weak.upgrade() else {
        return false;
    };
    let session = Session { inner };
    let refreshed = session.refresh_once().await;
    lock(&session.inner.pending).take();
    refreshed
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &*self.inner.state.borrow())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialProvider for Session {
    fn access_token(&self) -> Option<String> {
        self.state().access_token().map(str::to_owned)
    }

    fn is_authenticated(&self) -> bool {
        self.check_auth()
    }

    async fn refresh(&self) -> bool {
        self.try_refresh().await
    }
}

/// Builder for Session
pub struct SessionBuilder {
    store: Arc<dyn KeyValueStore>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Option<Arc<dyn Clock>>,
    navigator: Option<Arc<dyn Navigator>>,
    config: SessionConfig,
}

impl SessionBuilder {
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    #[must_use]
    pub const fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Build an anonymous session; call [`Session::init`] to restore state
    pub fn build(self) -> Session {
        let (state, _) = watch::channel(SessionState::anonymous());
        Session {
            inner: Arc::new(Inner {
                state,
                store: self.store,
                refresher: self.refresher,
                clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
                navigator: self.navigator.unwrap_or_else(|| Arc::new(NoopNavigator)),
                scheduler: RefreshScheduler::new(),
                pending: Mutex::new(None),
                persist: tokio::sync::Mutex::new(()),
                config: self.config,
            }),
        }
    }
}
