//! Dashboard statistics endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ApiClient;
use crate::error::LabResult;

/// Headline counters shown on the dashboard. Replaced wholesale on every
/// update, whether it comes from a fetch or a push.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    #[serde(rename = "totalRuangan", default)]
    pub total_rooms: i64,
    #[serde(rename = "aktifSekarang", default)]
    pub active_now: i64,
    #[serde(rename = "totalKelas", default)]
    pub total_classes: i64,
    #[serde(rename = "totalAkses", default)]
    pub total_access_events: i64,
}

/// Which series the usage chart shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartMode {
    /// One point per month.
    #[default]
    Monthly,
    /// One point per day over the last 30 days.
    Daily,
}

impl ChartMode {
    /// The other mode.
    pub fn toggled(self) -> Self {
        match self {
            ChartMode::Monthly => ChartMode::Daily,
            ChartMode::Daily => ChartMode::Monthly,
        }
    }

    /// Short label for the mode switch.
    pub fn label(self) -> &'static str {
        match self {
            ChartMode::Monthly => "Bulanan",
            ChartMode::Daily => "30 Hari",
        }
    }

    fn path(self) -> &'static str {
        match self {
            ChartMode::Monthly => "/Dashboard/monthly-stats",
            ChartMode::Daily => "/Dashboard/last-30-days-stats",
        }
    }
}

/// One bar of the usage chart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub name: String,
    pub value: i64,
}

/// Raw series item. Monthly items carry `bulan`, daily items `tanggal`.
#[derive(Debug, Deserialize)]
struct SeriesItem {
    #[serde(default)]
    bulan: Option<serde_json::Value>,
    #[serde(default)]
    tanggal: Option<serde_json::Value>,
    #[serde(default)]
    total: i64,
}

fn label_of(value: Option<serde_json::Value>) -> String {
    match value {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Convert raw series items to chart points, keeping server order.
fn to_points(mode: ChartMode, items: Vec<SeriesItem>) -> Vec<ChartPoint> {
    items
        .into_iter()
        .map(|item| ChartPoint {
            name: match mode {
                ChartMode::Monthly => label_of(item.bulan),
                ChartMode::Daily => label_of(item.tanggal),
            },
            value: item.total,
        })
        .collect()
}

/// Dashboard data used by the controller.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    /// `GET /Dashboard/stats`.
    async fn overview_stats(&self) -> LabResult<DashboardStats>;

    /// Chart series for `mode`, in chronological order.
    async fn chart_series(&self, mode: ChartMode) -> LabResult<Vec<ChartPoint>>;
}

#[async_trait]
impl DashboardApi for ApiClient {
    async fn overview_stats(&self) -> LabResult<DashboardStats> {
        self.get("/Dashboard/stats").await?.into_data()
    }

    async fn chart_series(&self, mode: ChartMode) -> LabResult<Vec<ChartPoint>> {
        let items: Vec<SeriesItem> = self.get(mode.path()).await?.into_data()?;
        Ok(to_points(mode, items))
    }
}

// ─── Secondary statistics ───────────────────────────────────────────────

impl ApiClient {
    /// `GET /Dashboard/today-stats`.
    ///
    /// # Errors
    /// Any request failure.
    pub async fn today_stats(&self) -> LabResult<serde_json::Value> {
        self.get("/Dashboard/today-stats").await?.into_data()
    }

    /// `GET /Dashboard/tap-stats`.
    ///
    /// # Errors
    /// Any request failure.
    pub async fn tap_stats(&self) -> LabResult<serde_json::Value> {
        self.get("/Dashboard/tap-stats").await?.into_data()
    }

    /// `GET /Dashboard/today-tap-stats`.
    ///
    /// # Errors
    /// Any request failure.
    pub async fn today_tap_stats(&self) -> LabResult<serde_json::Value> {
        self.get("/Dashboard/today-tap-stats").await?.into_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_wire_names() {
        let stats: DashboardStats = serde_json::from_str(
            r#"{"totalRuangan":4,"aktifSekarang":1,"totalKelas":12,"totalAkses":310}"#,
        )
        .unwrap();
        assert_eq!(
            stats,
            DashboardStats {
                total_rooms: 4,
                active_now: 1,
                total_classes: 12,
                total_access_events: 310,
            }
        );
    }

    #[test]
    fn test_stats_missing_fields_default_to_zero() {
        let stats: DashboardStats = serde_json::from_str(r#"{"totalRuangan":2}"#).unwrap();
        assert_eq!(stats.total_rooms, 2);
        assert_eq!(stats.active_now, 0);
    }

    #[test]
    fn test_series_mapping_keeps_order() {
        let monthly: Vec<SeriesItem> = serde_json::from_str(
            r#"[{"bulan":"Jan","total":5},{"bulan":"Feb","total":7},{"bulan":3,"total":1}]"#,
        )
        .unwrap();
        let points = to_points(ChartMode::Monthly, monthly);
        assert_eq!(
            points.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
            vec!["Jan", "Feb", "3"]
        );
        assert_eq!(points[1].value, 7);

        let daily: Vec<SeriesItem> =
            serde_json::from_str(r#"[{"tanggal":"2025-01-01","total":2}]"#).unwrap();
        let points = to_points(ChartMode::Daily, daily);
        assert_eq!(points[0].name, "2025-01-01");
    }

    #[test]
    fn test_chart_mode_toggle_and_serde() {
        assert_eq!(ChartMode::Monthly.toggled(), ChartMode::Daily);
        assert_eq!(ChartMode::Daily.toggled(), ChartMode::Monthly);
        assert_eq!(serde_json::to_string(&ChartMode::Daily).unwrap(), "\"daily\"");
        assert_eq!(ChartMode::default(), ChartMode::Monthly);
    }
}
