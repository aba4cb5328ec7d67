//! Navigation side effects triggered by the session

/// Route of the sign-in surface
pub const LOGIN_ROUTE: &str = "/login";

/// Default landing route for signed-in users
pub const DASHBOARD_ROUTE: &str = "/dashboard";

/// Receives navigation requests, e.g. "go to the login page" after logout
pub trait Navigator: Send + Sync {
    fn navigate(&self, route: &str);
}

/// Navigator that ignores every request
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNavigator;

impl Navigator for NoopNavigator {
    fn navigate(&self, _route: &str) {}
}
