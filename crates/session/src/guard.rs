//! Route guards
//!
//! Guards never navigate on their own; the caller performs the returned
//! [`Redirect`].

use crate::navigator::LOGIN_ROUTE;
use crate::session::Session;
use crate::state::SessionState;
use http::StatusCode;
use thiserror::Error;
use tracing::debug;

/// Navigation refused; go to `location` instead
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Redirect ({status}) to {location}")]
pub struct Redirect {
    pub status: StatusCode,
    pub location: String,
}

impl Redirect {
    pub fn to(location: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FOUND,
            location: location.into(),
        }
    }
}

/// Allow the page only for an authenticated session
pub fn require_auth(session: &Session) -> Result<SessionState, Redirect> {
    if session.check_auth() {
        Ok(session.state())
    } else {
        debug!(location = LOGIN_ROUTE, "Unauthenticated, redirecting");
        Err(Redirect::to(LOGIN_ROUTE))
    }
}

/// Send an already authenticated session away from e.g. the login page
pub fn redirect_if_authenticated(session: &Session, target: &str) -> Result<(), Redirect> {
    if session.check_auth() {
        debug!(location = target, "Already authenticated, redirecting");
        Err(Redirect::to(target))
    } else {
        Ok(())
    }
}
