//! # Session Store
//!
//! Owns the authenticated identity and the persisted bearer token.
//!
//! The current [`Session`] is published as an immutable snapshot on a
//! `tokio::sync::watch` channel. Every mutation goes through one of the
//! store's operations and is expressed as a pure transition
//! ([`Session::empty`], [`Session::loading`], [`Session::authenticated`])
//! producing the next snapshot.
//!
//! ```text
//!            login ok / check_auth ok
//!   empty ───────────────────────────► authenticated
//!     ▲  ▲                                   │
//!     │  └─── logout / 401 / check failed ───┘
//!     │
//!  loading  (check_auth in flight; always left on every path)
//! ```

use tokio::sync::watch;

use crate::api::auth::{AuthApi, LoginRequest, UserProfile};
use crate::error::LabError;
use crate::forms::{ChangePasswordForm, LoginForm, ValidationErrors};
use crate::notice::{Notice, Notifier, messages};
use crate::route::Route;
use crate::token::TokenStore;

/// Snapshot of the authentication state.
///
/// `is_authenticated` implies `user.is_some()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
    pub is_loading: bool,
}

impl Session {
    /// The unauthenticated, idle session.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Same identity, verification in flight.
    #[must_use]
    pub fn loading(&self) -> Self {
        Self {
            is_loading: true,
            ..self.clone()
        }
    }

    /// Authenticated as `user`, idle.
    pub fn authenticated(user: UserProfile) -> Self {
        Self {
            user: Some(user),
            is_authenticated: true,
            is_loading: false,
        }
    }

    pub fn username(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.username.as_str())
    }

    pub fn role(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.role.as_str())
    }
}

/// Result of submitting the login form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Client-side validation failed; nothing was sent.
    Invalid(ValidationErrors),
    /// The backend refused or the request failed; a notice was emitted.
    Failed,
    /// Logged in; navigate to the route.
    Redirect(Route),
}

/// Single owner of [`Session`] state and the only writer of the token.
pub struct SessionStore<A> {
    api: A,
    tokens: TokenStore,
    notifier: Notifier,
    state: watch::Sender<Session>,
}

impl<A: AuthApi> SessionStore<A> {
    pub fn new(api: A, tokens: TokenStore, notifier: Notifier) -> Self {
        let (state, _) = watch::channel(Session::empty());
        Self {
            api,
            tokens,
            notifier,
            state,
        }
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    /// Receive every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    // ─── Operations ─────────────────────────────────────────────────────

    /// Log in with `credentials`. Never returns an error: failures become
    /// notices and `false`. Only a `401` resets the session.
    pub async fn login(&self, credentials: &LoginRequest) -> bool {
        match self.api.login(credentials).await {
            Ok(response) => {
                if let Err(e) = self.tokens.set(&response.token) {
                    tracing::error!(error = %e, "Failed to persist auth token");
                    self.notifier.error(messages::LOGIN_FAILED);
                    return false;
                }
                tracing::info!(username = %response.username, role = %response.role, "Logged in");
                self.state.send_replace(Session::authenticated(UserProfile {
                    username: response.username,
                    role: response.role,
                }));
                self.notifier.success(messages::LOGIN_SUCCESS);
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "Login failed");
                if err.is_request_error() {
                    self.notifier.error(err.user_message(messages::LOGIN_FAILED));
                }
                if err.is_unauthorized() {
                    self.state.send_replace(Session::empty());
                }
                false
            }
        }
    }

    /// Log out. The session ends up empty and the loading notice is
    /// dismissed even if removing the token fails.
    pub fn logout(&self) {
        self.notifier.emit(Notice::loading(
            messages::LOGOUT_NOTICE_ID,
            messages::LOGOUT_PENDING,
        ));
        match self.tokens.remove() {
            Ok(()) => self.notifier.success(messages::LOGOUT_SUCCESS),
            Err(e) => tracing::error!(error = %e, "Failed to remove auth token"),
        }
        self.state.send_replace(Session::empty());
        self.notifier.emit(Notice::dismiss(messages::LOGOUT_NOTICE_ID));
        tracing::info!("Logged out");
    }

    /// Verify the stored token against `GET /Auth/profile`.
    ///
    /// `is_loading` is `true` while the request is in flight and `false`
    /// afterwards on every path, including cancellation of this future.
    pub async fn check_auth(&self) -> bool {
        self.state.send_modify(|s| *s = s.loading());
        let mut guard = LoadingGuard {
            state: &self.state,
            armed: true,
        };

        let result = if self.tokens.has_token() {
            self.api.profile().await
        } else {
            Err(LabError::MissingToken)
        };
        guard.armed = false;

        match result {
            Ok(user) => {
                tracing::debug!(username = %user.username, "Session verified");
                self.state.send_replace(Session::authenticated(user));
                true
            }
            Err(e) => {
                tracing::debug!(error = %e, "Session verification failed");
                self.state.send_replace(Session::empty());
                false
            }
        }
    }

    /// Entering the login view: an existing valid session goes straight to
    /// the dashboard.
    pub async fn resume(&self) -> Option<Route> {
        if self.check_auth().await {
            self.notifier.success(messages::WELCOME_BACK);
            Some(Route::Dashboard)
        } else {
            None
        }
    }

    /// Validate and submit the login form.
    pub async fn submit_login(&self, form: &LoginForm) -> LoginOutcome {
        let request = match form.validate() {
            Ok(request) => request,
            Err(errors) => return LoginOutcome::Invalid(errors),
        };
        if self.login(&request).await {
            self.notifier.success(messages::WELCOME_BACK);
            LoginOutcome::Redirect(Route::Dashboard)
        } else {
            LoginOutcome::Failed
        }
    }

    /// Change the current user's password, then refresh the identity.
    /// Validation and request failures become error notices.
    pub async fn change_password(&self, form: &ChangePasswordForm) -> bool {
        let request = match form.validate() {
            Ok(request) => request,
            Err(errors) => {
                if let Some((_, message)) = errors.iter().next() {
                    self.notifier.error(message);
                }
                return false;
            }
        };

        match self.api.change_password(&request).await {
            Ok(()) => {
                self.check_auth().await;
                self.notifier.success(messages::PASSWORD_CHANGED);
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "Change password failed");
                if err.is_request_error() {
                    self.notifier
                        .error(err.user_message(messages::PASSWORD_CHANGE_FAILED));
                }
                self.handle_api_error(&err);
                false
            }
        }
    }

    /// Central handling of a failed REST call made outside this store.
    ///
    /// A `401` resets the session, removes the token and returns the login
    /// route; anything else is left to the caller.
    pub fn handle_api_error(&self, err: &LabError) -> Option<Route> {
        if !err.is_unauthorized() {
            return None;
        }
        tracing::warn!(error = %err, "Authorization rejected, resetting session");
        if let Err(e) = self.tokens.remove() {
            tracing::error!(error = %e, "Failed to remove auth token");
        }
        self.state.send_replace(Session::empty());
        Some(Route::Login)
    }
}

/// Leaves `is_loading` on a cancelled `check_auth` by resetting the session.
struct LoadingGuard<'a> {
    state: &'a watch::Sender<Session>,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_replace(Session::empty());
        }
    }
}
