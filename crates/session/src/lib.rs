//! Client-side session management for the Ledger API
//!
//! A [`Session`] owns the bearer tokens of one signed-in user. It persists
//! them through a [`KeyValueStore`], renews them shortly before they expire,
//! and lets the request client share a single in-flight refresh.

pub mod clock;
pub mod guard;
pub mod navigator;
pub mod refresher;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod storage;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use guard::{Redirect, redirect_if_authenticated, require_auth};
pub use navigator::{DASHBOARD_ROUTE, LOGIN_ROUTE, Navigator, NoopNavigator};
pub use refresher::TokenRefresher;
pub use scheduler::RefreshScheduler;
pub use session::{Session, SessionBuilder, SessionConfig};
pub use state::SessionState;
pub use storage::{FileStore, KeyValueStore, MemoryStore, PersistedTokens};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, continuing with the inner value if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
