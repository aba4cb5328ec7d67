//! In-memory authentication record

use ledger_core::User;
use std::fmt;

/// Snapshot of the session
///
/// Only the session mutates this record. `is_authenticated` implies an access
/// token is present, and `token_expiry` always comes from decoding that token.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    is_authenticated: bool,
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<User>,
    token_expiry: Option<i64>,
}

impl SessionState {
    /// The signed-out baseline
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub const fn is_authenticated(&self) -> bool {
        self.is_authenticated
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub const fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    /// Access token expiry in epoch milliseconds
    pub const fn token_expiry(&self) -> Option<i64> {
        self.token_expiry
    }

    pub(crate) fn set_tokens(
        &mut self,
        access_token: &str,
        refresh_token: &str,
        expiry: Option<i64>,
        authenticate: bool,
    ) {
        self.access_token = Some(access_token.to_string());
        self.refresh_token = Some(refresh_token.to_string());
        self.token_expiry = expiry;
        if authenticate {
            self.is_authenticated = true;
        }
    }

    /// Hold only a refresh token, e.g. while renewing a restored session
    pub(crate) fn seed_refresh_token(&mut self, refresh_token: &str) {
        *self = Self {
            refresh_token: Some(refresh_token.to_string()),
            ..Self::default()
        };
    }

    /// Returns `false` (and changes nothing) without an access token
    pub(crate) fn mark_authenticated(&mut self) -> bool {
        if self.access_token.is_none() || self.is_authenticated {
            return false;
        }
        self.is_authenticated = true;
        true
    }

    pub(crate) fn set_user(&mut self, user: User) -> bool {
        if !self.is_authenticated {
            return false;
        }
        self.user = Some(user);
        true
    }
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("is_authenticated", &self.is_authenticated)
            .field("has_access_token", &self.access_token.is_some())
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("user", &self.user)
            .field("token_expiry", &self.token_expiry)
            .finish()
    }
}
