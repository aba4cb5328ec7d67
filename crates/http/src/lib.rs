//! HTTP client for the Ledger bookkeeping API

pub mod client;

pub use client::body::{Attachment, FormPart, MultipartForm, RequestBody};
pub use client::credentials::CredentialProvider;
pub use client::error::ClientError;
pub use client::{ApiClient, ApiClientBuilder};
