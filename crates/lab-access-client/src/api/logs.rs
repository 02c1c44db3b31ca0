//! Access log endpoint: `/AksesLog`.

use serde::{Deserialize, Serialize};

use super::ApiClient;
use crate::error::LabResult;

/// One lab entry/exit record.
///
/// Timestamps are kept as the backend sends them (ISO-8601 without zone);
/// `timestampKeluar` uses the sentinel `0001-01-01T00:00:00` while the
/// visitor is still inside.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ActivityLogRow {
    pub id: Option<i64>,
    pub ruangan_id: Option<i64>,
    pub ruangan_nama: Option<String>,
    pub kelas_nama: Option<String>,
    pub user_username: Option<String>,
    pub uid: Option<String>,
    pub timestamp_masuk: Option<String>,
    pub timestamp_keluar: Option<String>,
}

impl ApiClient {
    /// Full access log collection.
    ///
    /// # Errors
    /// Any request failure.
    pub async fn access_logs(&self) -> LabResult<Vec<ActivityLogRow>> {
        Ok(self.get("/AksesLog").await?.into_result()?.unwrap_or_default())
    }
}
