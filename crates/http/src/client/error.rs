//! Client error types

use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// No HTTP exchange took place (DNS, connection, timeout)
    #[error("{message}")]
    Network { endpoint: String, message: String },

    /// 4xx response, including a 401 that survived the refresh attempt
    #[error("Client error {status}: {message}")]
    Client {
        status: u16,
        message: String,
        errors: Option<Value>,
    },

    /// 5xx or otherwise unclassified non-2xx response
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// An authenticated call was attempted without a valid session
    #[error("Authentication required")]
    SessionInvalid,

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Create a transport error for `endpoint`
    pub fn network(endpoint: &str, err: &reqwest::Error) -> Self {
        Self::Network {
            endpoint: endpoint.to_string(),
            message: format!("Network error accessing {endpoint}: {err}"),
        }
    }

    /// Classify a non-success response from its status and parsed body
    pub fn from_response(status: StatusCode, data: &Value) -> Self {
        if status.is_client_error() {
            let message = text_field(data, "error")
                .or_else(|| text_field(data, "message"))
                .unwrap_or("Request failed")
                .to_string();
            Self::Client {
                status: status.as_u16(),
                message,
                errors: data.get("errors").filter(|e| !e.is_null()).cloned(),
            }
        } else {
            Self::Server {
                status: status.as_u16(),
                message: text_field(data, "message")
                    .unwrap_or("Server error occurred")
                    .to_string(),
            }
        }
    }

    /// HTTP status of the failure, 0 when no response was received
    pub const fn status(&self) -> u16 {
        match self {
            Self::Client { status, .. } | Self::Server { status, .. } => *status,
            _ => 0,
        }
    }

    /// Field-level validation errors supplied by the server
    pub const fn field_errors(&self) -> Option<&Value> {
        match self {
            Self::Client { errors, .. } => errors.as_ref(),
            _ => None,
        }
    }

    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Client { status: 401, .. })
    }
}

fn text_field<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}
