use actix_web::http::header::{CACHE_CONTROL, HeaderValue};
use actix_web::{HttpResponse, web};
use serde_json::json;
use tracing::instrument;

use crate::auth::auth::BearerToken;
use crate::error::AppError;
use crate::model::dashboard::{
    AllAttendanceResponse, AttendanceSummaryResponse, SubjectAttendanceResponse,
};
use crate::models::{AttendanceReq, SubjectAttendanceQuery, SubjectAttendanceReq, SubjectSelector};
use crate::services::attendance::CacheStatus;
use crate::state::AppState;

pub const X_CACHE: &str = "X-Cache";
pub const CACHEABLE: &str = "max-age=300, stale-while-revalidate=1800";

fn cached_json<T: serde::Serialize>(body: &T, status: CacheStatus) -> HttpResponse {
    HttpResponse::Ok()
        .insert_header((X_CACHE, HeaderValue::from_static(status.as_header())))
        .insert_header((CACHE_CONTROL, HeaderValue::from_static(CACHEABLE)))
        .json(body)
}

const MISSING_PARAMS: &str = "Missing required parameters: subject, studentId, cfId";

/// Overall attendance summary
#[utoipa::path(
    post,
    path = "/api/attendance",
    request_body = AttendanceReq,
    responses(
        (status = 200, description = "Per-subject totals and student details", body = AttendanceSummaryResponse),
        (status = 400, description = "Token missing", body = Object, example = json!({
            "error": "Token is required"
        })),
        (status = 408, description = "Upstream timed out"),
        (status = 502, description = "Upstream returned no records")
    ),
    tag = "Attendance"
)]
#[instrument(skip_all)]
pub async fn attendance_summary(
    state: web::Data<AppState>,
    body: web::Json<AttendanceReq>,
) -> Result<HttpResponse, AppError> {
    let token = body
        .into_inner()
        .token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .map(BearerToken::new)
        .ok_or_else(|| AppError::BadRequest("Token is required".to_string()))?;

    let (summary, status) = state.attendance.summary(&token).await?;
    Ok(cached_json(summary.as_ref(), status))
}

/// Attendance across every subject
#[utoipa::path(
    get,
    path = "/api/all-attendance",
    responses(
        (status = 200, description = "Aggregated attendance; `X-Cache` reports HIT or MISS", body = AllAttendanceResponse),
        (status = 400, description = "Missing Authorization header"),
        (status = 404, description = "No subjects found", body = Object, example = json!({
            "error": "No subjects found"
        })),
        (status = 500, description = "Internal server error")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(skip_all, fields(session = %token.fingerprint()))]
pub async fn all_attendance(
    state: web::Data<AppState>,
    token: BearerToken,
) -> Result<HttpResponse, AppError> {
    let (response, status) = state.attendance.all_attendance(&token).await?;
    Ok(cached_json(&response, status))
}

/// Attendance for one subject (body)
#[utoipa::path(
    post,
    path = "/api/subject-attendance",
    request_body = SubjectAttendanceReq,
    responses(
        (status = 200, description = "Daily attendance for the subject", body = SubjectAttendanceResponse),
        (status = 400, description = "Missing parameters", body = Object, example = json!({
            "error": "Missing required parameters: subject, studentId, cfId"
        })),
        (status = 500, description = "Upstream fetch failed", body = Object, example = json!({
            "error": "Failed to fetch attendance for Operating Systems",
            "details": "HTTP 503"
        }))
    ),
    tag = "Attendance"
)]
#[instrument(skip_all)]
pub async fn subject_attendance(
    state: web::Data<AppState>,
    header_token: Option<BearerToken>,
    body: web::Json<SubjectAttendanceReq>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let token = body
        .token
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .map(BearerToken::new)
        .or(header_token)
        .ok_or_else(|| AppError::BadRequest("Token is required".to_string()))?;

    let selector = SubjectSelector::from_parts(body.subject, body.student_id, body.cf_id)
        .ok_or_else(|| AppError::BadRequest(MISSING_PARAMS.to_string()))?;

    let response = state.attendance.subject_attendance(&token, &selector).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Attendance for one subject (query)
#[utoipa::path(
    get,
    path = "/api/subject-attendance",
    params(SubjectAttendanceQuery),
    responses(
        (status = 200, description = "Daily attendance for the subject", body = SubjectAttendanceResponse),
        (status = 400, description = "Missing parameters or Authorization header"),
        (status = 500, description = "Upstream fetch failed")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Attendance"
)]
#[instrument(skip_all)]
pub async fn subject_attendance_query(
    state: web::Data<AppState>,
    token: BearerToken,
    query: web::Query<SubjectAttendanceQuery>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let selector = SubjectSelector::from_parts(query.subject, query.student_id, query.cf_id)
        .ok_or_else(|| AppError::BadRequest(MISSING_PARAMS.to_string()))?;

    let response = state.attendance.subject_attendance(&token, &selector).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Liveness and cache occupancy
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is up", body = Object, example = json!({
            "status": "ok",
            "responseCacheEntries": 3,
            "summaryCacheEntries": 2,
            "quizCacheEntries": 1
        }))
    ),
    tag = "Health"
)]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let (responses, summaries) = state.attendance.cache_sizes();
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "responseCacheEntries": responses,
        "summaryCacheEntries": summaries,
        "quizCacheEntries": state.quizzes.entry_count(),
    }))
}
