//! Seam between the request client and whoever owns the session

use async_trait::async_trait;

/// Source of bearer credentials with the ability to renew them
///
/// The request client only sees this trait. It never reaches into session
/// state directly.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current access token, if any
    fn access_token(&self) -> Option<String>;

    /// Whether an authenticated call may be attempted right now
    fn is_authenticated(&self) -> bool;

    /// Renew the credentials, resolving to `true` on success
    ///
    /// Concurrent callers must share one underlying renewal.
    async fn refresh(&self) -> bool;
}
