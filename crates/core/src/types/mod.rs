//! Domain types exchanged with the bookkeeping API

pub mod auth;
pub mod category;
pub mod transaction;

pub use auth::{AuthResponse, AuthTokens, LoginRequest, RefreshTokenRequest, TokenPair, User};
pub use category::{
    Category, CategoryFilters, CategoryList, CreateCategoryRequest, UpdateCategoryRequest,
};
pub use transaction::{
    CreateTransactionRequest, ProofUpload, Transaction, TransactionFilters, TransactionKind,
    TransactionList, TransactionSummary, UpdateTransactionRequest,
};
