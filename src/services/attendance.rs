use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::auth::auth::BearerToken;
use crate::config::Config;
use crate::error::AppError;
use crate::model::attendance::SubjectSummary;
use crate::model::dashboard::{
    AllAttendanceResponse, AttendanceSummaryResponse, CourseAttendance, SubjectAttendanceResponse,
};
use crate::model::upstream::SubjectRecord;
use crate::models::SubjectSelector;
use crate::services::aggregator::{aggregate_daily, summarize_subject};
use crate::services::batch::BatchProcessor;
use crate::services::erp::{CardOrder, CardsQuery, ErpClient};
use crate::utils::clock::SharedClock;
use crate::utils::response_cache::ResponseCache;
use crate::utils::summary_cache::SummaryCache;

/// Whether a payload came out of a cache; drives the `X-Cache` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_header(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// A subject to fetch cards for.
#[derive(Debug, Clone)]
struct SubjectRef {
    name: String,
    cf_id: String,
}

pub struct AttendanceService {
    erp: ErpClient,
    batch: BatchProcessor,
    summaries: SummaryCache<Arc<AttendanceSummaryResponse>>,
    responses: ResponseCache<AllAttendanceResponse>,
}

impl AttendanceService {
    pub fn new(config: &Config, erp: ErpClient, clock: SharedClock) -> Self {
        Self {
            erp,
            batch: BatchProcessor::new(config.batch_config()),
            summaries: SummaryCache::new(
                config.summary_cache_ttl,
                config.response_cache_capacity as u64,
            ),
            responses: ResponseCache::new(
                config.response_cache_ttl,
                config.response_cache_capacity,
                clock,
            ),
        }
    }

    /// Entries held by the aggregate and summary caches.
    pub fn cache_sizes(&self) -> (usize, u64) {
        (self.responses.len(), self.summaries.entry_count())
    }

    /// Overall attendance summary, shared across concurrent callers with the same token.
    #[instrument(skip_all, fields(session = %token.fingerprint()))]
    pub async fn summary(
        &self,
        token: &BearerToken,
    ) -> Result<(Arc<AttendanceSummaryResponse>, CacheStatus), AppError> {
        let key = token.fingerprint().to_string();
        if let Some(summary) = self.summaries.get(&key).await {
            return Ok((summary, CacheStatus::Hit));
        }

        let summary = self
            .summaries
            .get_or_fetch(&key, async {
                let records = self.erp.attendance_summary(token.as_str()).await?;
                build_summary(&records).map(Arc::new)
            })
            .await
            .map_err(|e: Arc<AppError>| (*e).clone())?;

        Ok((summary, CacheStatus::Miss))
    }

    /// Attendance for every subject of the student, aggregated per day.
    ///
    /// Subjects whose cards cannot be fetched are reported zeroed and listed
    /// in `failed_subjects`; they never fail the whole response.
    #[instrument(skip_all, fields(session = %token.fingerprint()))]
    pub async fn all_attendance(
        &self,
        token: &BearerToken,
    ) -> Result<(AllAttendanceResponse, CacheStatus), AppError> {
        let key = token.fingerprint().to_string();
        if let Some(mut cached) = self.responses.get(&key) {
            cached.from_cache = true;
            return Ok((cached, CacheStatus::Hit));
        }

        let (summary, _) = self.summary(token).await?;
        let student_id = summary.student_id.clone();
        if student_id.is_empty() {
            return Err(AppError::BadGateway(
                "Student id missing from attendance records".to_string(),
            ));
        }

        let rows = self.erp.subjects(token.as_str()).await?;
        let subjects = unique_subjects(&rows);
        if subjects.is_empty() {
            return Err(AppError::NotFound("No subjects found".to_string()));
        }
        let course_code_map = course_codes(&rows);

        let erp = &self.erp;
        let sid = student_id.as_str();
        let tok = token.as_str();
        let items = subjects
            .iter()
            .map(|s| (s.name.clone(), s.clone()))
            .collect::<Vec<_>>();

        let mut results = self
            .batch
            .run(items, |subject: SubjectRef| async move {
                let query = CardsQuery {
                    subject: &subject.name,
                    student_id: sid,
                    cf_id: &subject.cf_id,
                    order: CardOrder::NewestFirst,
                };
                erp.subject_cards(tok, &query).await
            })
            .await
            .map_err(|e| AppError::internal(e.to_string()))?;

        let today = Utc::now().date_naive();
        let mut by_subject = BTreeMap::new();
        let mut failed_subjects = Vec::new();

        for subject in &subjects {
            let outcome = results.remove(&subject.name);
            let summary = match outcome {
                Some(result) if result.success => {
                    summarize_subject(&result.data.unwrap_or_default(), today)
                }
                Some(result) => {
                    warn!(
                        subject = %subject.name,
                        retries = result.retries,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "Subject fetch failed, reporting zeroed"
                    );
                    failed_subjects.push(subject.name.clone());
                    SubjectSummary::default()
                }
                None => {
                    failed_subjects.push(subject.name.clone());
                    SubjectSummary::default()
                }
            };
            by_subject.insert(subject.name.clone(), summary);
        }

        let (present, absent, leave) = by_subject.values().fold((0, 0, 0), |acc, s| {
            (
                acc.0 + s.total_present,
                acc.1 + s.total_absent,
                acc.2 + s.total_leave,
            )
        });

        let response = AllAttendanceResponse {
            student_id,
            total_present_all_subjects: present,
            total_absent_all_subjects: absent,
            total_leave_all_subjects: leave,
            subjects: by_subject,
            course_code_map,
            failed_subjects,
            cached_at: Utc::now(),
            from_cache: false,
        };

        info!(
            subjects = response.subjects.len(),
            failed = response.failed_subjects.len(),
            "All-attendance aggregated"
        );
        // Partial aggregates are served but not kept.
        if response.failed_subjects.is_empty() {
            self.responses.set(key, response.clone());
        } else {
            warn!(
                failed = ?response.failed_subjects,
                "Skipping cache for partial aggregate"
            );
        }
        Ok((response, CacheStatus::Miss))
    }

    /// Day-by-day attendance for a single subject, oldest first.
    #[instrument(skip_all, fields(subject = %selector.subject))]
    pub async fn subject_attendance(
        &self,
        token: &BearerToken,
        selector: &SubjectSelector,
    ) -> Result<SubjectAttendanceResponse, AppError> {
        let query = CardsQuery {
            subject: &selector.subject,
            student_id: &selector.student_id,
            cf_id: &selector.cf_id,
            order: CardOrder::OldestFirst,
        };

        let records = self
            .erp
            .subject_cards(token.as_str(), &query)
            .await
            .map_err(|e| {
                AppError::internal_with(
                    format!("Failed to fetch attendance for {}", selector.subject),
                    e.to_string(),
                )
            })?;

        let daily = aggregate_daily(&records, Utc::now().date_naive());
        let (present, absent, leave) = daily.iter().fold((0, 0, 0), |acc, d| {
            (acc.0 + d.present, acc.1 + d.absent, acc.2 + d.leave)
        });

        Ok(SubjectAttendanceResponse {
            subject: selector.subject.clone(),
            student_id: selector.student_id.clone(),
            cf_id: selector.cf_id.clone(),
            total_present: present,
            total_absent: absent,
            total_leave: leave,
            total_records: records.len(),
            daily_attendance: daily,
            fetched_at: Utc::now(),
        })
    }

    /// Drops everything cached for the session.
    pub async fn forget(&self, token: &BearerToken) {
        let key = token.fingerprint().to_string();
        let had_response = self.responses.invalidate(&key);
        self.summaries.invalidate(&key).await;
        info!(session = %key, had_response, "Session caches cleared");
    }
}

/// Shapes the summary rows. The last row is the overall total; student
/// details come from the first subject row.
pub fn build_summary(records: &[SubjectRecord]) -> Result<AttendanceSummaryResponse, AppError> {
    let (total, subjects) = records
        .split_last()
        .ok_or_else(|| AppError::BadGateway("No attendance records returned".to_string()))?;
    let first = subjects
        .first()
        .ok_or_else(|| AppError::BadGateway("No subject attendance returned".to_string()))?;

    let daily_attendance = subjects
        .iter()
        .map(|row| {
            let tally = row.attendance_summary.clone().unwrap_or_default();
            let code = row.cdata.course_code.trim();
            CourseAttendance {
                course: row.cdata.course_name.trim().to_string(),
                course_code: (!code.is_empty()).then(|| code.to_string()),
                present: tally.present,
                total: tally.total,
                percent: tally.percent.unwrap_or_default(),
            }
        })
        .collect();

    let overall = total.attendance_summary.clone().unwrap_or_default();
    Ok(AttendanceSummaryResponse {
        daily_attendance,
        total_present: overall.present,
        total_classes: overall.total,
        overall_percentage: overall.percent.unwrap_or_default(),
        batch: first.batch.clone().unwrap_or_default(),
        section: first.section.clone().unwrap_or_default(),
        branch: first.dept.clone().unwrap_or_default(),
        student_id: first.student_id.clone().unwrap_or_default(),
    })
}

/// Subjects by trimmed course name; the first row wins when names repeat.
fn unique_subjects(rows: &[SubjectRecord]) -> Vec<SubjectRef> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| {
            let name = row.cdata.course_name.trim();
            if name.is_empty() || !seen.insert(name.to_string()) {
                return None;
            }
            Some(SubjectRef {
                name: name.to_string(),
                cf_id: row.id.clone().unwrap_or_default(),
            })
        })
        .collect()
}

fn course_codes(rows: &[SubjectRecord]) -> BTreeMap<String, String> {
    rows.iter()
        .filter_map(|row| {
            let code = row.cdata.course_code.trim();
            let name = row.cdata.course_name.trim();
            (!code.is_empty() && !name.is_empty()).then(|| (code.to_string(), name.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rows(value: serde_json::Value) -> Vec<SubjectRecord> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn summary_takes_total_from_last_row_and_student_from_first() {
        let records = rows(json!([
            {
                "id": 11, "cdata": {"course_name": " Operating Systems ", "course_code": "CS501"},
                "attendance_summary": {"Present": 18, "Total": 20, "Percent": "90.0"},
                "batch": "2023", "section": "A", "dept": "CSE", "student_id": 98765
            },
            {
                "id": 12, "cdata": {"course_name": "Networks", "course_code": ""},
                "attendance_summary": {"Present": "10", "Total": "12", "Percent": 83.33}
            },
            {
                "cdata": {"course_name": "Total"},
                "attendance_summary": {"Present": 28, "Total": 32, "Percent": "87.5"}
            }
        ]));

        let summary = build_summary(&records).unwrap();
        assert_eq!(summary.daily_attendance.len(), 2);
        assert_eq!(summary.daily_attendance[0].course, "Operating Systems");
        assert_eq!(summary.daily_attendance[0].course_code.as_deref(), Some("CS501"));
        assert_eq!(summary.daily_attendance[1].course_code, None);
        assert_eq!(summary.daily_attendance[1].percent, "83.33");
        assert_eq!(summary.total_present, 28);
        assert_eq!(summary.total_classes, 32);
        assert_eq!(summary.overall_percentage, "87.5");
        assert_eq!(summary.branch, "CSE");
        assert_eq!(summary.student_id, "98765");
    }

    #[test]
    fn summary_without_subject_rows_is_bad_gateway() {
        let records = rows(json!([{ "cdata": {"course_name": "Total"} }]));
        assert!(matches!(build_summary(&records), Err(AppError::BadGateway(_))));
        assert!(matches!(build_summary(&[]), Err(AppError::BadGateway(_))));
    }

    #[test]
    fn duplicate_subject_names_keep_first_row() {
        let records = rows(json!([
            {"id": 1, "cdata": {"course_name": "Maths", "course_code": "MA1"}},
            {"id": 2, "cdata": {"course_name": " Maths", "course_code": "MA2"}},
            {"id": 3, "cdata": {"course_name": "", "course_code": "XX"}},
            {"id": 4, "cdata": {"course_name": "Physics", "course_code": "PH1"}}
        ]));

        let subjects = unique_subjects(&records);
        let names: Vec<_> = subjects.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Maths", "Physics"]);
        assert_eq!(subjects[0].cf_id, "1");

        let codes = course_codes(&records);
        assert_eq!(codes.get("MA2").map(String::as_str), Some("Maths"));
        assert!(!codes.contains_key("XX"));
    }
}
