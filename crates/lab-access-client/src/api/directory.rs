//! Reference lists: rooms, classes and users.
//!
//! These back the activity filter options and the card owner pickers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::rooms::{Room, RoomApi};
use super::ApiClient;
use crate::error::LabResult;

/// A school class (`Kelas`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub id: i64,
    #[serde(default)]
    pub nama: String,
}

/// A user account as listed by `GET /User`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub role: String,
}

/// Reference list lookups.
#[async_trait]
pub trait DirectoryApi: Send + Sync {
    async fn rooms(&self) -> LabResult<Vec<Room>>;
    async fn classes(&self) -> LabResult<Vec<ClassInfo>>;
    async fn users(&self) -> LabResult<Vec<UserAccount>>;
}

#[async_trait]
impl DirectoryApi for ApiClient {
    async fn rooms(&self) -> LabResult<Vec<Room>> {
        self.list_rooms().await
    }

    async fn classes(&self) -> LabResult<Vec<ClassInfo>> {
        Ok(self.get("/Kelas").await?.into_result()?.unwrap_or_default())
    }

    async fn users(&self) -> LabResult<Vec<UserAccount>> {
        Ok(self.get("/User").await?.into_result()?.unwrap_or_default())
    }
}
