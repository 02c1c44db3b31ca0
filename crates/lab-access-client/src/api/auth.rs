//! Authentication endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ApiClient;
use crate::error::LabResult;

/// Credentials for `POST /Auth/login`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// `data` of a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoginResponse {
    pub token: String,
    pub username: String,
    pub role: String,
}

/// Authenticated user identity, as returned by `GET /Auth/profile`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(default)]
    pub role: String,
}

/// Body of `POST /Auth/change-password`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

/// Authentication operations used by the session store.
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Exchange credentials for a bearer token and identity.
    async fn login(&self, credentials: &LoginRequest) -> LabResult<LoginResponse>;

    /// Identity behind the stored token.
    async fn profile(&self) -> LabResult<UserProfile>;

    /// Change the current user's password.
    async fn change_password(&self, request: &ChangePasswordRequest) -> LabResult<()>;
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn login(&self, credentials: &LoginRequest) -> LabResult<LoginResponse> {
        self.post("/Auth/login", credentials).await?.into_data()
    }

    async fn profile(&self) -> LabResult<UserProfile> {
        self.get("/Auth/profile").await?.into_data()
    }

    async fn change_password(&self, request: &ChangePasswordRequest) -> LabResult<()> {
        self.post::<_, serde_json::Value>("/Auth/change-password", request)
            .await?
            .into_result()
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_password_wire_names() {
        let body = serde_json::to_value(ChangePasswordRequest {
            old_password: "lama".into(),
            new_password: "rahasia".into(),
            confirm_password: "rahasia".into(),
        })
        .unwrap();
        assert_eq!(body["oldPassword"], "lama");
        assert_eq!(body["newPassword"], "rahasia");
        assert_eq!(body["confirmPassword"], "rahasia");
    }

    #[test]
    fn test_profile_tolerates_extra_fields() {
        let profile: UserProfile =
            serde_json::from_str(r#"{"id":3,"username":"admin","role":"ADMIN"}"#).unwrap();
        assert_eq!(profile.username, "admin");
        assert_eq!(profile.role, "ADMIN");
    }
}
