//! # Activity Filter
//!
//! Client-side filtering of the access log. [`filter_rows`] is a pure
//! function of the rows, the [`FilterCriteria`] and the [`FilterOptions`];
//! [`ActivityFilter`] holds the three inputs and recomputes the result
//! whenever one of them changes.
//!
//! Filters are conjunctive and an empty criterion is skipped:
//!
//! | Field | Rule |
//! |-------|------|
//! | `lab` | room id, compared as text |
//! | `kelas` | row needs a class name; equal to the selected class name when the id resolves |
//! | `user` | row needs a username; equal to the selected username when the id resolves |
//! | `status` | `CHECKIN` / `CHECKOUT` against [`is_checked_out`] |
//! | `startDate` / `endDate` | inclusive, by calendar day of the check-in time |
//!
//! A selected class or user id that is missing from the option lists only
//! applies the "has a name" check. Dates that do not parse never exclude
//! a row.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};

use crate::api::directory::{ClassInfo, DirectoryApi, UserAccount};
use crate::api::logs::ActivityLogRow;
use crate::api::rooms::Room;
use crate::error::{LabError, LabResult};
use crate::token::TokenStore;

/// `timestampKeluar` value of a visit that has not been checked out.
pub const NOT_CHECKED_OUT: &str = "0001-01-01T00:00:00";

/// Status filter value for visitors still inside.
pub const STATUS_CHECKIN: &str = "CHECKIN";

/// Status filter value for finished visits.
pub const STATUS_CHECKOUT: &str = "CHECKOUT";

/// A filter form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterField {
    Lab,
    Kelas,
    User,
    Status,
    StartDate,
    EndDate,
}

impl FilterField {
    pub const ALL: [FilterField; 6] = [
        FilterField::Lab,
        FilterField::Kelas,
        FilterField::User,
        FilterField::Status,
        FilterField::StartDate,
        FilterField::EndDate,
    ];

    /// Form field name.
    pub fn name(self) -> &'static str {
        match self {
            FilterField::Lab => "lab",
            FilterField::Kelas => "kelas",
            FilterField::User => "user",
            FilterField::Status => "status",
            FilterField::StartDate => "startDate",
            FilterField::EndDate => "endDate",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

/// Filter form values. Empty strings mean "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub lab: String,
    pub kelas: String,
    pub user: String,
    pub status: String,
    pub start_date: String,
    pub end_date: String,
}

impl FilterCriteria {
    pub fn get(&self, field: FilterField) -> &str {
        match field {
            FilterField::Lab => &self.lab,
            FilterField::Kelas => &self.kelas,
            FilterField::User => &self.user,
            FilterField::Status => &self.status,
            FilterField::StartDate => &self.start_date,
            FilterField::EndDate => &self.end_date,
        }
    }

    pub fn set(&mut self, field: FilterField, value: impl Into<String>) {
        let value = value.into();
        match field {
            FilterField::Lab => self.lab = value,
            FilterField::Kelas => self.kelas = value,
            FilterField::User => self.user = value,
            FilterField::Status => self.status = value,
            FilterField::StartDate => self.start_date = value,
            FilterField::EndDate => self.end_date = value,
        }
    }

    /// Change handler keyed by form field name. Unknown names are ignored
    /// and reported as `false`.
    pub fn set_field(&mut self, name: &str, value: impl Into<String>) -> bool {
        match FilterField::from_name(name) {
            Some(field) => {
                self.set(field, value);
                true
            }
            None => {
                tracing::debug!(name, "Ignoring unknown filter field");
                false
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        FilterField::ALL.iter().all(|f| self.get(*f).is_empty())
    }
}

/// Option lists for the lab, class and user selectors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub labs: Vec<Room>,
    pub kelas: Vec<ClassInfo>,
    pub users: Vec<UserAccount>,
}

/// Whether the visit has been checked out: `timestampKeluar` is present,
/// not the sentinel, and differs from `timestampMasuk`.
pub fn is_checked_out(row: &ActivityLogRow) -> bool {
    let Some(out) = row.timestamp_keluar.as_deref() else {
        return false;
    };
    !out.is_empty() && out != NOT_CHECKED_OUT && row.timestamp_masuk.as_deref() != Some(out)
}

/// Calendar day of a timestamp or date string, in local time for zoned
/// timestamps.
fn parse_day(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(zoned) = DateTime::parse_from_rfc3339(value) {
        return Some(zoned.with_timezone(&Local).date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.date());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn names_match(row_name: Option<&str>, selected: Option<&str>) -> bool {
    match row_name {
        None | Some("") => false,
        Some(name) => selected.is_none_or(|s| s == name),
    }
}

fn matches(row: &ActivityLogRow, criteria: &FilterCriteria, options: &FilterOptions) -> bool {
    if !criteria.lab.is_empty()
        && row.ruangan_id.map(|id| id.to_string()).as_deref() != Some(criteria.lab.as_str())
    {
        return false;
    }

    if !criteria.kelas.is_empty() {
        let selected = options
            .kelas
            .iter()
            .find(|k| k.id.to_string() == criteria.kelas)
            .map(|k| k.nama.as_str());
        if !names_match(row.kelas_nama.as_deref(), selected) {
            return false;
        }
    }

    if !criteria.user.is_empty() {
        let selected = options
            .users
            .iter()
            .find(|u| u.id.to_string() == criteria.user)
            .map(|u| u.username.as_str());
        if !names_match(row.user_username.as_deref(), selected) {
            return false;
        }
    }

    match criteria.status.as_str() {
        STATUS_CHECKIN if is_checked_out(row) => return false,
        STATUS_CHECKOUT if !is_checked_out(row) => return false,
        _ => {}
    }

    let day = row.timestamp_masuk.as_deref().and_then(parse_day);
    if let Some(day) = day {
        if !criteria.start_date.is_empty()
            && parse_day(&criteria.start_date).is_some_and(|start| day < start)
        {
            return false;
        }
        if !criteria.end_date.is_empty()
            && parse_day(&criteria.end_date).is_some_and(|end| day > end)
        {
            return false;
        }
    }

    true
}

/// Rows that pass every non-empty criterion, in their original order.
pub fn filter_rows(
    rows: &[ActivityLogRow],
    criteria: &FilterCriteria,
    options: &FilterOptions,
) -> Vec<ActivityLogRow> {
    rows.iter()
        .filter(|row| matches(row, criteria, options))
        .cloned()
        .collect()
}

/// Filter state for the activity view.
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    rows: Vec<ActivityLogRow>,
    criteria: FilterCriteria,
    options: FilterOptions,
    filtered: Vec<ActivityLogRow>,
}

impl ActivityFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> &[ActivityLogRow] {
        &self.rows
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn options(&self) -> &FilterOptions {
        &self.options
    }

    /// The derived result.
    pub fn filtered(&self) -> &[ActivityLogRow] {
        &self.filtered
    }

    pub fn set_rows(&mut self, rows: Vec<ActivityLogRow>) {
        self.rows = rows;
        self.recompute();
    }

    pub fn set_options(&mut self, options: FilterOptions) {
        self.options = options;
        self.recompute();
    }

    pub fn set(&mut self, field: FilterField, value: impl Into<String>) {
        self.criteria.set(field, value);
        self.recompute();
    }

    pub fn set_field(&mut self, name: &str, value: impl Into<String>) {
        if self.criteria.set_field(name, value) {
            self.recompute();
        }
    }

    /// Clear every criterion at once.
    pub fn reset(&mut self) {
        self.criteria = FilterCriteria::default();
        self.recompute();
    }

    fn recompute(&mut self) {
        self.filtered = filter_rows(&self.rows, &self.criteria, &self.options);
    }
}

fn accepted<T>(result: LabResult<Vec<T>>) -> LabResult<Vec<T>> {
    match result {
        Err(LabError::Rejected { message }) => {
            tracing::debug!(message = message.as_deref().unwrap_or(""), "Option list rejected");
            Ok(Vec::new())
        }
        other => other,
    }
}

/// Fetch rooms, classes and users concurrently.
///
/// Returns `None` without any request when no token is stored, and `None`
/// when a request fails (the caller keeps its current lists). A list the
/// backend answers with `success: false` comes back empty.
pub async fn load_options<D>(api: &D, tokens: &TokenStore) -> Option<FilterOptions>
where
    D: DirectoryApi + ?Sized,
{
    if !tokens.has_token() {
        return None;
    }

    let loaded = tokio::try_join!(
        async { accepted(api.rooms().await) },
        async { accepted(api.classes().await) },
        async { accepted(api.users().await) },
    );

    match loaded {
        Ok((labs, kelas, users)) => {
            tracing::debug!(
                labs = labs.len(),
                kelas = kelas.len(),
                users = users.len(),
                "Filter options loaded"
            );
            Some(FilterOptions { labs, kelas, users })
        }
        Err(e) => {
            tracing::error!(error = %e, "Gagal memuat filter options");
            None
        }
    }
}
