use crate::model::attendance::{AttendanceDetail, AttendanceStatus, DailySummary, SubjectSummary};
use crate::model::dashboard::{
    AllAttendanceResponse, AttendanceSummaryResponse, CourseAttendance, SubjectAttendanceResponse,
};
use crate::models::{AttendanceReq, LoginReqDto, SubjectAttendanceReq};
use crate::utils::metrics::{MetricsSnapshot, RequestMetric, RouteStats};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Attendance Dashboard API",
        version = "1.0.0",
        description = r#"
## Student Attendance Dashboard

Backend for a student attendance dashboard. It sits in front of the college
ERP and turns its raw attendance cards into per-subject, per-day summaries.

### 🔹 Key Features
- **Login proxy**
  - Credentials are forwarded to the ERP; its answer is returned as-is
- **Attendance summary**
  - Overall and per-subject totals with student details
- **All-subject aggregation**
  - Parallel per-subject fetches with retries; failed subjects degrade to zeroed rows
- **Quizzes**
  - Evaluated quizzes, coalesced and held per token for a few minutes
- **Metrics**
  - Per-route request counts, errors and timings at `GET /api/metrics`

### 🔐 Security
Data endpoints take the ERP session token as `Authorization: Bearer <token>`.

### 📦 Caching
- Aggregated responses are cached per token for a short TTL (`X-Cache: HIT|MISS`)
- `POST /api/logout` clears everything cached for the token
"#,
    ),
    paths(
        crate::auth::handlers::login,
        crate::auth::handlers::logout,

        crate::api::attendance::attendance_summary,
        crate::api::attendance::all_attendance,
        crate::api::attendance::subject_attendance,
        crate::api::attendance::subject_attendance_query,
        crate::api::attendance::health,

        crate::api::quiz::quizzes,

        crate::api::metrics::metrics
    ),
    components(
        schemas(
            LoginReqDto,
            AttendanceReq,
            SubjectAttendanceReq,
            AttendanceStatus,
            AttendanceDetail,
            DailySummary,
            SubjectSummary,
            CourseAttendance,
            AttendanceSummaryResponse,
            AllAttendanceResponse,
            SubjectAttendanceResponse,
            RequestMetric,
            RouteStats,
            MetricsSnapshot
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Login proxy and session cache cleanup"),
        (name = "Attendance", description = "Attendance summary and aggregation APIs"),
        (name = "Quiz", description = "Evaluated quiz proxy"),
        (name = "Health", description = "Liveness"),
        (name = "Metrics", description = "In-process request metrics"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
        );
    }
}
