use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::attendance::{DailySummary, SubjectSummary};

/// One subject row of the overall attendance table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CourseAttendance {
    #[schema(example = "Operating Systems")]
    pub course: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(example = "CS501")]
    pub course_code: Option<String>,
    pub present: u32,
    pub total: u32,
    #[schema(example = "90.0")]
    pub percent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummaryResponse {
    pub daily_attendance: Vec<CourseAttendance>,
    pub total_present: u32,
    pub total_classes: u32,
    #[schema(example = "87.5")]
    pub overall_percentage: String,
    pub batch: String,
    pub section: String,
    pub branch: String,
    #[schema(example = "98765")]
    pub student_id: String,
}

/// Aggregate attendance across every subject of the student.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllAttendanceResponse {
    #[schema(example = "98765")]
    pub student_id: String,
    pub total_present_all_subjects: u32,
    pub total_absent_all_subjects: u32,
    pub total_leave_all_subjects: u32,
    pub subjects: BTreeMap<String, SubjectSummary>,
    /// Course code to course name.
    pub course_code_map: BTreeMap<String, String>,
    /// Subjects whose cards could not be fetched; they appear zeroed in `subjects`.
    #[serde(default)]
    pub failed_subjects: Vec<String>,
    #[schema(value_type = String, format = "date-time")]
    pub cached_at: DateTime<Utc>,
    #[serde(default)]
    pub from_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAttendanceResponse {
    pub subject: String,
    pub student_id: String,
    pub cf_id: String,
    pub total_present: u32,
    pub total_absent: u32,
    pub total_leave: u32,
    pub total_records: usize,
    pub daily_attendance: Vec<DailySummary>,
    #[schema(value_type = String, format = "date-time")]
    pub fetched_at: DateTime<Utc>,
}
