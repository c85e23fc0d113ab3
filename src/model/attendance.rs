use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use utoipa::ToSchema;

use super::upstream::opt_string_or_number;

/// Status of a single class as recorded upstream.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, ToSchema,
)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Leave,
    /// Any state the ERP reports that we do not count.
    #[default]
    #[serde(other)]
    Unknown,
}

/// One raw attendance card for a subject, as returned by the ERP cards endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttendanceRecord {
    #[serde(default)]
    pub state: AttendanceStatus,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub start_time: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub date_formatted: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AttendanceDetail {
    #[schema(example = "2024-01-10T09:00:00Z")]
    pub time: String,
    pub status: AttendanceStatus,
    #[schema(example = "Wed 10 Jan 09:00 2024-01-10")]
    pub formatted: String,
}

/// Counts for one subject on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DailySummary {
    #[schema(example = "2024-01-10")]
    pub date: String,
    pub present: u32,
    pub absent: u32,
    pub leave: u32,
    pub details: Vec<AttendanceDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSummary {
    pub total_present: u32,
    pub total_absent: u32,
    pub total_leave: u32,
    pub daily: Vec<DailySummary>,
}
