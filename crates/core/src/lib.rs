//! Ledger core types and utilities

pub mod envelope;
pub mod error;
pub mod query;
pub mod types;

pub use envelope::{Envelope, ListResponse, MessageResponse};
pub use error::{CoreError, CoreResult};
pub use query::{QueryPairs, ToQuery};
pub use types::*;
