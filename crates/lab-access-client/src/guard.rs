//! # Auth Guard
//!
//! Gates the protected views of the console.
//!
//! [`view`] derives what to render from a session snapshot. [`AuthGuard`]
//! decides when to verify: on mount, and whenever `is_authenticated` is
//! observed to change to `false`. Repeated snapshots with the same
//! `is_authenticated` value (including the loading snapshots produced by
//! its own verification) never trigger another check, so there is no
//! verification loop.
//!
//! The guard is meant to be installed once at the application shell.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::api::auth::{AuthApi, UserProfile};
use crate::notice::messages;
use crate::route::Route;
use crate::session::{Session, SessionStore};

/// What a guarded view renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardView {
    /// Verification in flight: blocking "Memverifikasi akses..." placeholder.
    Verifying,
    /// Render the protected content.
    Protected,
    /// Render nothing.
    Hidden,
}

/// View derivation for a session snapshot.
pub fn view(session: &Session) -> GuardView {
    if session.is_loading {
        GuardView::Verifying
    } else if session.is_authenticated {
        GuardView::Protected
    } else {
        GuardView::Hidden
    }
}

/// Whether `user` holds one of `allowed_roles`. No user is never allowed.
pub fn role_allows(user: Option<&UserProfile>, allowed_roles: &[&str]) -> bool {
    user.is_some_and(|u| allowed_roles.iter().any(|r| *r == u.role))
}

/// Session verifier for the application shell.
pub struct AuthGuard<A> {
    store: Arc<SessionStore<A>>,
    last_authenticated: Option<bool>,
}

impl<A: AuthApi> AuthGuard<A> {
    pub fn new(store: Arc<SessionStore<A>>) -> Self {
        Self {
            store,
            last_authenticated: None,
        }
    }

    /// Process the current snapshot. The first call acts as mount.
    ///
    /// Returns the login route when verification ran and failed; the
    /// "login required" notice has been emitted in that case.
    pub async fn sync(&mut self) -> Option<Route> {
        let authenticated = self.store.snapshot().is_authenticated;
        if self.last_authenticated == Some(authenticated) {
            return None;
        }
        self.last_authenticated = Some(authenticated);
        if authenticated {
            return None;
        }
        self.verify().await
    }

    async fn verify(&mut self) -> Option<Route> {
        let valid = self.store.check_auth().await;
        self.last_authenticated = Some(self.store.snapshot().is_authenticated);
        if valid {
            None
        } else {
            tracing::info!("Session invalid, redirecting to login");
            self.store.notifier().error(messages::LOGIN_REQUIRED);
            Some(Route::Login)
        }
    }

    /// Follow session changes until the store is dropped, sending every
    /// redirect on `redirects`.
    pub async fn run(mut self, redirects: mpsc::UnboundedSender<Route>) {
        let mut rx = self.store.subscribe();
        rx.borrow_and_update();
        loop {
            if let Some(route) = self.sync().await {
                if redirects.send(route).is_err() {
                    break;
                }
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        tracing::debug!("Auth guard exiting");
    }
}
