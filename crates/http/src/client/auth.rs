//! Authentication API client methods

use super::{ApiClient, ClientError};
use ledger_core::{AuthResponse, LoginRequest, RefreshTokenRequest};
use reqwest::header::HeaderMap;

pub const LOGIN_ENDPOINT: &str = "/v1/auth/login";
pub const REFRESH_ENDPOINT: &str = "/v1/auth/refresh-token";

impl ApiClient {
    /// Exchange email and password for a token pair
    pub async fn login(&self, credentials: &LoginRequest) -> Result<AuthResponse, ClientError> {
        self.post(LOGIN_ENDPOINT, Some(credentials), HeaderMap::new())
            .await
    }

    /// Exchange a refresh token for a new token pair
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<AuthResponse, ClientError> {
        let body = RefreshTokenRequest {
            refresh_token: refresh_token.to_string(),
        };
        self.post(REFRESH_ENDPOINT, Some(&body), HeaderMap::new())
            .await
    }
}
