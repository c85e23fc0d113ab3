use std::time::Instant;

use actix_web::middleware::Next;
use actix_web::{
    Error, HttpResponse,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::{self, Data},
};
use tracing::{debug, warn};

use crate::state::AppState;
use crate::utils::metrics::MetricsSnapshot;

/// Times every request under the API scope and records it per route.
pub async fn record_metrics(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let state = req.app_data::<Data<AppState>>().cloned();
    let route = format!(
        "{} {}",
        req.method(),
        req.request()
            .match_pattern()
            .unwrap_or_else(|| req.path().to_string())
    );
    let started = Instant::now();

    let result = next.call(req).await;

    let status = match &result {
        Ok(res) => res.status(),
        Err(e) => e.as_response_error().status_code(),
    };
    let elapsed = started.elapsed();

    match state {
        Some(state) => state.metrics.record(&route, status.as_u16(), elapsed),
        None => warn!(%route, "App state missing, request not recorded"),
    }
    debug!(%route, status = status.as_u16(), elapsed_ms = elapsed.as_millis() as u64, "Request served");

    result
}

/// Per-route request counts, errors and recent timings
#[utoipa::path(
    get,
    path = "/api/metrics",
    responses(
        (status = 200, description = "Counters since process start", body = MetricsSnapshot)
    ),
    tag = "Metrics"
)]
pub async fn metrics(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.metrics.snapshot())
}
