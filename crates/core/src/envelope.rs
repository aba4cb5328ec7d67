//! Response envelopes returned by the bookkeeping API
//!
//! List endpoints answer with one of two shapes:
//!
//! * wrapped: `{"data": <list>, "message": "..."}`
//! * bare: `<list>`
//!
//! [`ListResponse`] accepts exactly those two and nothing else. A body that
//! matches neither is a deserialization error for the caller to handle.

use serde::{Deserialize, Serialize};

/// `{data, message}` wrapper used by most endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A list payload that may or may not be wrapped in an [`Envelope`]
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    Wrapped(Envelope<T>),
    Bare(T),
}

impl<T> ListResponse<T> {
    /// Unwrap to the list payload regardless of shape
    pub fn into_inner(self) -> T {
        match self {
            Self::Wrapped(envelope) => envelope.data,
            Self::Bare(list) => list,
        }
    }
}

/// Plain acknowledgement returned by mutating endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}
