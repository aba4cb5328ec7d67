//! Remote token refresh

use async_trait::async_trait;
use ledger_core::AuthResponse;
use ledger_http::{ApiClient, ClientError};

/// Calls the remote refresh endpoint
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ClientError>;
}

#[async_trait]
impl TokenRefresher for ApiClient {
    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ClientError> {
        self.refresh_token(refresh_token).await
    }
}
