//! Room (lab) endpoints: `/Ruangan`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ApiClient;
use crate::error::LabResult;

/// A lab room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    pub id: i64,
    #[serde(default)]
    pub nama: String,
}

/// Body of room create / update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoomPayload {
    pub nama: String,
}

/// Room mutations and lookups.
#[async_trait]
pub trait RoomApi: Send + Sync {
    async fn list_rooms(&self) -> LabResult<Vec<Room>>;
    async fn get_room(&self, id: i64) -> LabResult<Room>;
    async fn create_room(&self, payload: &RoomPayload) -> LabResult<()>;
    async fn update_room(&self, id: i64, payload: &RoomPayload) -> LabResult<()>;
    async fn delete_room(&self, id: i64) -> LabResult<()>;
}

#[async_trait]
impl RoomApi for ApiClient {
    async fn list_rooms(&self) -> LabResult<Vec<Room>> {
        Ok(self.get("/Ruangan").await?.into_result()?.unwrap_or_default())
    }

    async fn get_room(&self, id: i64) -> LabResult<Room> {
        self.get(&format!("/Ruangan/{id}")).await?.into_data()
    }

    async fn create_room(&self, payload: &RoomPayload) -> LabResult<()> {
        self.post::<_, serde_json::Value>("/Ruangan", payload)
            .await?
            .into_result()
            .map(|_| ())
    }

    async fn update_room(&self, id: i64, payload: &RoomPayload) -> LabResult<()> {
        self.put::<_, serde_json::Value>(&format!("/Ruangan/{id}"), payload)
            .await?
            .into_result()
            .map(|_| ())
    }

    async fn delete_room(&self, id: i64) -> LabResult<()> {
        self.delete::<serde_json::Value>(&format!("/Ruangan/{id}"))
            .await?
            .into_result()
            .map(|_| ())
    }
}
