//! # Error Types
//!
//! Semantic error types for the lab access backend. REST failures keep the
//! server-supplied `message` from the response envelope so that callers can
//! surface it verbatim, falling back to a localized generic text.
//!
//! ## Status Mapping
//!
//! [`LabError::from_status`] maps HTTP status codes to variants. Only `401`
//! gets its own variant because it is the one status that forces a session
//! reset and a redirect to the login view.

use std::sync::Arc;

use thiserror::Error;

/// Convenient Result alias for lab access operations.
pub type LabResult<T> = std::result::Result<T, LabError>;

/// Called with every `401` a controller sees. Usually wired to the session
/// store's error handler.
pub type UnauthorizedHook = Arc<dyn Fn(&LabError) + Send + Sync>;

/// All errors that can occur when talking to the lab access backend.
#[derive(Error, Debug)]
pub enum LabError {
    // ─── Validation ─────────────────────────────────────────────────
    /// Client-side validation rejected a form field before submission.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    // ─── Authorization ──────────────────────────────────────────────
    /// The backend answered `401 Unauthorized`.
    #[error("Unauthorized{}", fmt_message(.message))]
    Unauthorized { message: Option<String> },

    /// No bearer token is stored; the user has to log in first.
    #[error("Not logged in")]
    MissingToken,

    // ─── REST ───────────────────────────────────────────────────────
    /// The backend answered with a non-success HTTP status.
    #[error("Request failed with status {status}{}", fmt_message(.message))]
    Api { status: u16, message: Option<String> },

    /// The backend answered 2xx but the envelope carried `success: false`.
    #[error("Request rejected{}", fmt_message(.message))]
    Rejected { message: Option<String> },

    /// Transport-level HTTP failure (DNS, refused connection, timeout, body read).
    #[error("HTTP error: {0}")]
    Http(String),

    // ─── Realtime hub ───────────────────────────────────────────────
    /// Failed to negotiate or open the hub connection.
    #[error("Failed to connect to hub at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    /// The hub connection dropped after being established.
    #[error("Hub connection lost: {reason}")]
    ConnectionLost { reason: String },

    /// An operation needed a live hub connection but there is none.
    #[error("Hub is not connected")]
    NotConnected,

    /// The hub rejected the protocol handshake.
    #[error("Hub handshake failed: {reason}")]
    Handshake { reason: String },

    /// A hub invocation completed with an error.
    #[error("Hub invocation failed: {message}")]
    Invocation { message: String },

    /// The reconnect schedule ran out without re-establishing the connection.
    #[error("Hub reconnect gave up after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    // ─── Protocol ───────────────────────────────────────────────────
    /// Malformed or unexpected message from the backend.
    #[error("Protocol error: {reason}")]
    ProtocolError { reason: String },

    // ─── Timeout ────────────────────────────────────────────────────
    /// An operation timed out waiting for a response.
    #[error("Operation timed out after {seconds}s")]
    Timeout { seconds: u64 },

    // ─── Config / storage ───────────────────────────────────────────
    /// Configuration file error (missing, malformed, or invalid values).
    #[error("Configuration error: {reason}")]
    ConfigError { reason: String },

    /// The persisted token file could not be read or written.
    #[error("Token storage error: {reason}")]
    Storage { reason: String },

    // ─── I/O ────────────────────────────────────────────────────────
    /// Filesystem or I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn fmt_message(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(": {m}"))
        .unwrap_or_default()
}

impl LabError {
    /// Map an HTTP status and the envelope `message` (if any) to an error.
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        let message = message.filter(|m| !m.trim().is_empty());
        match status {
            401 => LabError::Unauthorized { message },
            _ => LabError::Api { status, message },
        }
    }

    /// Returns `true` for `401` failures, which must reset the session.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, LabError::Unauthorized { .. })
    }

    /// Returns `true` for failures of a REST request itself: an error
    /// status, a rejected envelope, a transport failure or a timeout.
    /// These are the failures that produce a user-visible notice.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            LabError::Unauthorized { .. }
                | LabError::Api { .. }
                | LabError::Rejected { .. }
                | LabError::Http(_)
                | LabError::Timeout { .. }
        )
    }

    /// Returns `true` if this error indicates the hub connection is dead.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            LabError::ConnectionFailed { .. }
                | LabError::ConnectionLost { .. }
                | LabError::NotConnected
                | LabError::WebSocket(_)
        )
    }

    /// The message the server put in the response envelope, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            LabError::Unauthorized { message }
            | LabError::Api { message, .. }
            | LabError::Rejected { message } => message.as_deref(),
            LabError::Validation { message, .. } => Some(message),
            _ => None,
        }
    }

    /// The server message, or `fallback` when the server did not send one.
    pub fn user_message(&self, fallback: &str) -> String {
        self.server_message().unwrap_or(fallback).to_string()
    }
}

// ─── From impls for external error types ────────────────────────────────

impl From<reqwest::Error> for LabError {
    fn from(err: reqwest::Error) -> Self {
        LabError::Http(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for LabError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        LabError::WebSocket(err.to_string())
    }
}

#[cfg(feature = "config-toml")]
impl From<toml::de::Error> for LabError {
    fn from(err: toml::de::Error) -> Self {
        LabError::ConfigError {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_maps_401() {
        let err = LabError::from_status(401, Some("Username atau password salah".into()));
        assert!(err.is_unauthorized());
        assert_eq!(err.server_message(), Some("Username atau password salah"));
    }

    #[test]
    fn test_from_status_other_codes() {
        let err = LabError::from_status(500, None);
        assert!(matches!(err, LabError::Api { status: 500, .. }));
        assert!(!err.is_unauthorized());

        let err = LabError::from_status(404, Some("Kartu tidak ditemukan".into()));
        assert!(matches!(err, LabError::Api { status: 404, .. }));
        assert!(err.to_string().contains("Kartu tidak ditemukan"));
    }

    #[test]
    fn test_blank_server_message_is_dropped() {
        let err = LabError::from_status(400, Some("   ".into()));
        assert_eq!(err.server_message(), None);
        assert_eq!(err.user_message("Terjadi kesalahan!"), "Terjadi kesalahan!");
    }

    #[test]
    fn test_user_message_prefers_server_text() {
        let err = LabError::Rejected {
            message: Some("UID sudah terdaftar".into()),
        };
        assert_eq!(err.user_message("Terjadi kesalahan!"), "UID sudah terdaftar");
    }

    #[test]
    fn test_request_and_connection_classes() {
        assert!(LabError::Http("refused".into()).is_request_error());
        assert!(LabError::Api { status: 500, message: None }.is_request_error());
        assert!(!LabError::NotConnected.is_request_error());

        assert!(LabError::NotConnected.is_connection_error());
        assert!(LabError::WebSocket("reset".into()).is_connection_error());
        assert!(!LabError::Timeout { seconds: 1 }.is_connection_error());
    }

    #[test]
    fn test_from_tungstenite_error() {
        let ws_error = tokio_tungstenite::tungstenite::Error::Io(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "broken pipe",
        ));
        let err: LabError = ws_error.into();
        assert!(matches!(err, LabError::WebSocket(_)));
        assert!(err.is_connection_error());
    }

    #[cfg(feature = "config-toml")]
    #[test]
    fn test_from_toml_error_conversion() {
        #[derive(Debug, serde::Deserialize)]
        struct DummyConfig {
            _value: String,
        }

        let toml_err = toml::from_str::<DummyConfig>("value = [").unwrap_err();
        let err: LabError = toml_err.into();
        assert!(matches!(err, LabError::ConfigError { .. }));
        assert!(err.to_string().contains("Configuration error"));
    }
}
