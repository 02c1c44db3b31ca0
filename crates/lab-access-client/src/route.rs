//! Console navigation targets.

use std::fmt;

/// A view of the console, identified by its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// The login view; the only unprotected route.
    Login,
    Dashboard,
    Activity,
    Classes,
    Rooms,
    Cards,
    Profile,
}

impl Route {
    /// Protected routes in navigation order.
    pub const PROTECTED: [Route; 6] = [
        Route::Dashboard,
        Route::Activity,
        Route::Classes,
        Route::Rooms,
        Route::Cards,
        Route::Profile,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Route::Login => "/",
            Route::Dashboard => "/dashboard",
            Route::Activity => "/dashboard/aktivitas",
            Route::Classes => "/dashboard/kelas",
            Route::Rooms => "/dashboard/lab",
            Route::Cards => "/dashboard/kartu",
            Route::Profile => "/dashboard/my-profile",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        let trimmed = path.trim_end_matches('/');
        let trimmed = if trimmed.is_empty() { "/" } else { trimmed };
        std::iter::once(Route::Login)
            .chain(Route::PROTECTED)
            .find(|r| r.path() == trimmed)
    }

    pub fn is_protected(self) -> bool {
        self != Route::Login
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}
