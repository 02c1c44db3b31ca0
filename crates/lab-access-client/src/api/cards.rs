//! Access card endpoints: `/Kartu`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ApiClient;
use crate::error::LabResult;

/// Card status values accepted by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CardStatus {
    #[default]
    Aktif,
    Nonaktif,
}

impl CardStatus {
    pub const ALL: [CardStatus; 2] = [CardStatus::Aktif, CardStatus::Nonaktif];

    pub fn as_str(self) -> &'static str {
        match self {
            CardStatus::Aktif => "AKTIF",
            CardStatus::Nonaktif => "NONAKTIF",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "AKTIF" => Some(CardStatus::Aktif),
            "NONAKTIF" => Some(CardStatus::Nonaktif),
            _ => None,
        }
    }
}

/// An RFID access card. A card belongs either to a user or to a class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: i64,
    pub uid: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub keterangan: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub kelas_id: Option<i64>,
    #[serde(default)]
    pub user_username: Option<String>,
    #[serde(default)]
    pub kelas_nama: Option<String>,
}

impl Card {
    /// Display name of the owner, user first.
    pub fn owner_label(&self) -> &str {
        self.user_username
            .as_deref()
            .or(self.kelas_nama.as_deref())
            .unwrap_or("-")
    }
}

/// Body of card create / update. An unset owner is sent as `0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardPayload {
    pub uid: String,
    pub status: String,
    pub keterangan: String,
    pub user_id: i64,
    pub kelas_id: i64,
}

/// Card mutations and lookups.
#[async_trait]
pub trait CardApi: Send + Sync {
    async fn list_cards(&self) -> LabResult<Vec<Card>>;
    async fn get_card(&self, id: i64) -> LabResult<Card>;
    async fn create_card(&self, payload: &CardPayload) -> LabResult<()>;
    async fn update_card(&self, id: i64, payload: &CardPayload) -> LabResult<()>;
    async fn delete_card(&self, id: i64) -> LabResult<()>;
    /// `GET /Kartu/check/:uid`; the payload shape is backend-defined.
    async fn check_card(&self, uid: &str) -> LabResult<serde_json::Value>;
}

#[async_trait]
impl CardApi for ApiClient {
    async fn list_cards(&self) -> LabResult<Vec<Card>> {
        Ok(self.get("/Kartu").await?.into_result()?.unwrap_or_default())
    }

    async fn get_card(&self, id: i64) -> LabResult<Card> {
        self.get(&format!("/Kartu/{id}")).await?.into_data()
    }

    async fn create_card(&self, payload: &CardPayload) -> LabResult<()> {
        self.post::<_, serde_json::Value>("/Kartu", payload)
            .await?
            .into_result()
            .map(|_| ())
    }

    async fn update_card(&self, id: i64, payload: &CardPayload) -> LabResult<()> {
        self.put::<_, serde_json::Value>(&format!("/Kartu/{id}"), payload)
            .await?
            .into_result()
            .map(|_| ())
    }

    async fn delete_card(&self, id: i64) -> LabResult<()> {
        self.delete::<serde_json::Value>(&format!("/Kartu/{id}"))
            .await?
            .into_result()
            .map(|_| ())
    }

    async fn check_card(&self, uid: &str) -> LabResult<serde_json::Value> {
        Ok(self
            .get(&format!("/Kartu/check/{uid}"))
            .await?
            .into_result()?
            .unwrap_or(serde_json::Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_wire_names() {
        let body = serde_json::to_value(CardPayload {
            uid: "04A1B2".into(),
            status: CardStatus::Aktif.as_str().into(),
            keterangan: String::new(),
            user_id: 7,
            kelas_id: 0,
        })
        .unwrap();
        assert_eq!(body["userId"], 7);
        assert_eq!(body["kelasId"], 0);
        assert_eq!(body["status"], "AKTIF");
    }

    #[test]
    fn test_card_owner_label() {
        let card: Card = serde_json::from_str(
            r#"{"id":1,"uid":"X","status":"AKTIF","kelasId":2,"kelasNama":"XII RPL 1"}"#,
        )
        .unwrap();
        assert_eq!(card.owner_label(), "XII RPL 1");
        assert_eq!(card.user_id, None);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(CardStatus::parse("NONAKTIF"), Some(CardStatus::Nonaktif));
        assert_eq!(CardStatus::parse("aktif"), None);
        assert_eq!(CardStatus::default(), CardStatus::Aktif);
    }
}
