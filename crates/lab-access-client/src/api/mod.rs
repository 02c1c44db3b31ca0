//! # REST Client
//!
//! [`ApiClient`] talks to the lab access REST backend. Every response body is
//! an [`Envelope`] of the form `{ success, data, message? }`; non-2xx
//! responses are mapped through [`LabError::from_status`] keeping the
//! envelope `message` so callers can show it verbatim.
//!
//! The bearer token is read from the shared [`TokenStore`] on every request,
//! so a login or logout takes effect immediately for all clones.
//!
//! Endpoint groups live in submodules, each with an `async_trait` seam that
//! the stateful stores are generic over:
//!
//! | Module | Trait | Endpoints |
//! |--------|-------|-----------|
//! | [`auth`] | [`AuthApi`] | `/Auth/login`, `/Auth/profile`, `/Auth/change-password` |
//! | [`dashboard`] | [`DashboardApi`] | `/Dashboard/*` |
//! | [`directory`] | [`DirectoryApi`] | `/Ruangan`, `/Kelas`, `/User` lists |
//! | [`cards`] | [`CardApi`] | `/Kartu` |
//! | [`rooms`] | [`RoomApi`] | `/Ruangan` |
//! | [`logs`] | (inherent) | `/AksesLog` |

pub mod auth;
pub mod cards;
pub mod dashboard;
pub mod directory;
pub mod logs;
pub mod rooms;

use reqwest::Method;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::config::LabConfig;
use crate::error::{LabError, LabResult};
use crate::token::TokenStore;

pub use auth::AuthApi;
pub use cards::CardApi;
pub use dashboard::DashboardApi;
pub use directory::DirectoryApi;
pub use rooms::RoomApi;

/// Response wrapper used by every backend endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    /// Payload of a successful envelope, which may be absent.
    ///
    /// # Errors
    /// Returns [`LabError::Rejected`] when `success` is `false`.
    pub fn into_result(self) -> LabResult<Option<T>> {
        if self.success {
            Ok(self.data)
        } else {
            Err(LabError::Rejected {
                message: self.message.filter(|m| !m.trim().is_empty()),
            })
        }
    }

    /// Payload of a successful envelope, which must be present.
    ///
    /// # Errors
    /// Returns [`LabError::Rejected`] when `success` is `false` and
    /// [`LabError::ProtocolError`] when `data` is missing.
    pub fn into_data(self) -> LabResult<T> {
        self.into_result()?.ok_or_else(|| LabError::ProtocolError {
            reason: "Response envelope has no data".into(),
        })
    }
}

/// HTTP client for the lab access backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    tokens: TokenStore,
    timeout_secs: u64,
}

impl ApiClient {
    /// Build a client from config, reading the bearer token from `tokens`.
    ///
    /// # Errors
    /// Returns [`LabError::ConfigError`] if the HTTP client cannot be built.
    pub fn new(config: &LabConfig, tokens: TokenStore) -> LabResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("lab-access-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LabError::ConfigError {
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: config.api_base().to_string(),
            tokens,
            timeout_secs: config.timeouts.request_timeout_secs,
        })
    }

    /// Token store shared with this client.
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// REST base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ─── Core request helpers ───────────────────────────────────────────

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> LabResult<Envelope<T>> {
        self.send(Method::GET, path, None::<&()>).await
    }

    pub(crate) async fn post<B, T>(&self, path: &str, body: &B) -> LabResult<Envelope<T>>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send(Method::POST, path, Some(body)).await
    }

    pub(crate) async fn put<B, T>(&self, path: &str, body: &B) -> LabResult<Envelope<T>>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.send(Method::PUT, path, Some(body)).await
    }

    pub(crate) async fn delete<T: DeserializeOwned>(&self, path: &str) -> LabResult<Envelope<T>> {
        self.send(Method::DELETE, path, None::<&()>).await
    }

    async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> LabResult<Envelope<T>>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.http.request(method.clone(), &url);
        if let Some(token) = self.tokens.get() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        tracing::debug!(method = %method, path, "Sending request");

        let response = request.send().await.map_err(|e| {
            tracing::warn!(method = %method, path, error = %e, "Request failed to send");
            if e.is_timeout() {
                LabError::Timeout {
                    seconds: self.timeout_secs,
                }
            } else {
                LabError::from(e)
            }
        })?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string));
            tracing::warn!(method = %method, path, status = %status, "Request rejected by backend");
            return Err(LabError::from_status(status.as_u16(), message));
        }

        if text.trim().is_empty() {
            return Ok(Envelope {
                success: true,
                data: None,
                message: None,
            });
        }

        serde_json::from_str(&text).map_err(|e| LabError::ProtocolError {
            reason: format!("Failed to parse response from {path}: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_success_with_data() {
        let env: Envelope<Vec<i32>> =
            serde_json::from_str(r#"{"success":true,"data":[1,2,3]}"#).unwrap();
        assert_eq!(env.into_data().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_envelope_rejected_keeps_message() {
        let env: Envelope<serde_json::Value> =
            serde_json::from_str(r#"{"success":false,"message":"UID sudah terdaftar"}"#).unwrap();
        let err = env.into_result().unwrap_err();
        assert!(matches!(err, LabError::Rejected { .. }));
        assert_eq!(err.server_message(), Some("UID sudah terdaftar"));
    }

    #[test]
    fn test_envelope_missing_data() {
        let env: Envelope<i32> = serde_json::from_str(r#"{"success":true}"#).unwrap();
        assert!(matches!(
            env.into_data().unwrap_err(),
            LabError::ProtocolError { .. }
        ));
    }

    #[test]
    fn test_envelope_payload_needs_no_default() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Token {
            token: String,
        }

        fn parse<T: DeserializeOwned>(text: &str) -> LabResult<Option<T>> {
            serde_json::from_str::<Envelope<T>>(text)?.into_result()
        }

        assert_eq!(
            parse::<Token>(r#"{"success":true,"data":{"token":"t"}}"#).unwrap(),
            Some(Token { token: "t".into() })
        );
        assert_eq!(parse::<Token>(r#"{"success":true}"#).unwrap(), None);
    }

    #[test]
    fn test_client_trims_base_url() {
        let client = ApiClient::new(
            &LabConfig::new("http://localhost:5000/api/"),
            TokenStore::in_memory(None),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000/api");
    }
}
