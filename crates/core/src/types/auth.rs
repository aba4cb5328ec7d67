//! Authentication payloads

use serde::{Deserialize, Serialize};

/// Credentials posted to the login endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body of the refresh endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Token fields as sent by the server, any of which may be missing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Response of both the login and the refresh endpoint
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    #[serde(default)]
    pub data: Option<AuthTokens>,
    #[serde(default)]
    pub message: Option<String>,
}

impl AuthResponse {
    /// Both tokens, if the server supplied two non-empty values
    #[must_use]
    pub fn token_pair(&self) -> Option<TokenPair> {
        let data = self.data.as_ref()?;
        let access_token = data.access_token.as_deref().filter(|t| !t.is_empty())?;
        let refresh_token = data.refresh_token.as_deref().filter(|t| !t.is_empty())?;
        Some(TokenPair {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.to_string(),
        })
    }
}

/// A complete access/refresh token pair
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Profile of the signed-in user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}
