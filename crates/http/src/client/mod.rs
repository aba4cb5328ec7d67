//! Ledger HTTP client
//!
//! Every call goes through [`ApiClient::request`]. A 401 on anything but the
//! login and refresh endpoints asks the [`CredentialProvider`] to renew the
//! session, then replays the original request exactly once with the new
//! bearer token.

pub mod auth;
pub mod body;
pub mod category;
pub mod credentials;
pub mod error;
pub mod public;
pub mod transaction;

use body::{MultipartForm, RequestBody};
use credentials::CredentialProvider;
use error::ClientError;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Endpoint fragments that must never trigger a refresh-and-retry
const AUTH_ENDPOINT_FRAGMENTS: [&str; 2] = ["/auth/login", "/auth/refresh-token"];

/// Ledger API client
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl ApiClient {
    /// Create a new client with default configuration
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Same connection pool, with `credentials` attached
    #[must_use]
    pub fn with_credentials(&self, credentials: Arc<dyn CredentialProvider>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            credentials: Some(credentials),
        }
    }

    /// Bearer headers for an authenticated call
    ///
    /// Fails with [`ClientError::SessionInvalid`] before anything is sent when
    /// the session cannot authenticate.
    pub fn auth_headers(&self) -> Result<HeaderMap, ClientError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(ClientError::SessionInvalid)?;
        if !credentials.is_authenticated() {
            return Err(ClientError::SessionInvalid);
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = credentials.access_token() {
            headers.insert(header::AUTHORIZATION, bearer(&token)?);
        }
        Ok(headers)
    }

    /// Issue a request, refreshing and retrying once on 401
    #[instrument(skip(self, body, headers))]
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: RequestBody,
        headers: HeaderMap,
    ) -> Result<T, ClientError> {
        let (status, data) = self.dispatch(&method, endpoint, &body, &headers).await?;

        if status == StatusCode::UNAUTHORIZED
            && !is_auth_endpoint(endpoint)
            && let Some(credentials) = &self.credentials
        {
            if credentials.refresh().await {
                let mut retry_headers = headers;
                if let Some(token) = credentials.access_token() {
                    retry_headers.insert(header::AUTHORIZATION, bearer(&token)?);
                }
                debug!(endpoint, "Retrying request with refreshed token");
                let (status, data) = self
                    .dispatch(&method, endpoint, &body, &retry_headers)
                    .await?;
                return finish(status, data);
            }
            warn!(endpoint, "Token refresh failed, returning original 401");
        }

        finish(status, data)
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        headers: HeaderMap,
    ) -> Result<T, ClientError> {
        self.request(Method::GET, endpoint, RequestBody::Empty, headers)
            .await
    }

    pub async fn post<T, B>(
        &self,
        endpoint: &str,
        body: Option<&B>,
        headers: HeaderMap,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = RequestBody::json(body)?;
        self.request(Method::POST, endpoint, body, headers).await
    }

    pub async fn patch<T, B>(
        &self,
        endpoint: &str,
        body: Option<&B>,
        headers: HeaderMap,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let body = RequestBody::json(body)?;
        self.request(Method::PATCH, endpoint, body, headers).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        headers: HeaderMap,
    ) -> Result<T, ClientError> {
        self.request(Method::DELETE, endpoint, RequestBody::Empty, headers)
            .await
    }

    /// POST a multipart form
    pub async fn upload<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        form: MultipartForm,
        headers: HeaderMap,
    ) -> Result<T, ClientError> {
        self.request(Method::POST, endpoint, RequestBody::Multipart(form), headers)
            .await
    }

    /// Send one attempt and read the body, without interpreting the status
    async fn dispatch(
        &self,
        method: &Method,
        endpoint: &str,
        body: &RequestBody,
        headers: &HeaderMap,
    ) -> Result<(StatusCode, Value), ClientError> {
        let url = format!("{}{}", self.base_url, endpoint);

        let mut merged = HeaderMap::new();
        merged.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        if !body.is_multipart() {
            merged.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
        }
        for (name, value) in headers {
            merged.insert(name.clone(), value.clone());
        }

        let mut request = self.client.request(method.clone(), url).headers(merged);
        request = match body {
            RequestBody::Empty => request,
            RequestBody::Json(bytes) => request.body(bytes.clone()),
            RequestBody::Multipart(form) => request.multipart(form.to_form()?),
        };

        debug!(endpoint, "Dispatching request");
        let response = request
            .send()
            .await
            .map_err(|err| ClientError::network(endpoint, &err))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| ClientError::network(endpoint, &err))?;
        debug!(endpoint, status = status.as_u16(), "Received response");

        Ok((status, parse_body(&text)))
    }
}

/// Builder for ApiClient
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    credentials: Option<Arc<dyn CredentialProvider>>,
}

impl ApiClientBuilder {
    /// Set the base URL
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the per-request timeout
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Attach the session used for bearer auth and silent refresh
    #[must_use]
    pub fn credentials(mut self, credentials: Arc<dyn CredentialProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;

        // Ensure base_url ends without a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();

        let mut client_builder = ClientBuilder::new();

        if let Some(timeout) = self.timeout {
            client_builder = client_builder.timeout(timeout);
        }

        let user_agent = self
            .user_agent
            .unwrap_or_else(|| concat!("ledger-client/", env!("CARGO_PKG_VERSION")).to_string());
        client_builder = client_builder.user_agent(user_agent);

        let client = client_builder
            .build()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        Ok(ApiClient {
            client,
            base_url,
            credentials: self.credentials,
        })
    }
}

fn is_auth_endpoint(endpoint: &str) -> bool {
    AUTH_ENDPOINT_FRAGMENTS
        .iter()
        .any(|fragment| endpoint.contains(fragment))
}

fn bearer(token: &str) -> Result<HeaderValue, ClientError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|_| ClientError::Configuration("access token is not a valid header".into()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Parse a body as JSON, wrapping anything else under `message`
fn parse_body(text: &str) -> Value {
    if text.is_empty() {
        return Value::Object(Map::new());
    }
    serde_json::from_str(text).unwrap_or_else(|_| json!({ "message": text }))
}

fn finish<T: DeserializeOwned>(status: StatusCode, data: Value) -> Result<T, ClientError> {
    if status.is_success() {
        Ok(serde_json::from_value(data)?)
    } else {
        Err(ClientError::from_response(status, &data))
    }
}
