use actix_web::http::header::{CACHE_CONTROL, HeaderValue};
use actix_web::{HttpResponse, web};
use tracing::{error, instrument};

use crate::api::attendance::X_CACHE;
use crate::auth::auth::BearerToken;
use crate::error::AppError;
use crate::state::AppState;

/// Evaluated quizzes, proxied from the ERP
#[utoipa::path(
    get,
    path = "/api/quiz",
    responses(
        (status = 200, description = "Upstream quiz payload, held server-side per token (`X-Cache`), never cached by the browser", body = Object),
        (status = 401, description = "No Bearer token", body = Object, example = json!({
            "error": "Unauthorized"
        })),
        (status = 408, description = "Upstream timed out")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Quiz"
)]
#[instrument(skip_all)]
pub async fn quizzes(
    state: web::Data<AppState>,
    token: Option<BearerToken>,
) -> Result<HttpResponse, AppError> {
    let token = token.ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))?;

    let (body, status) = state.quizzes.quizzes(&token).await.map_err(|e| {
        error!(session = %token.fingerprint(), error = %e, "Quiz fetch failed");
        e
    })?;

    Ok(HttpResponse::Ok()
        .insert_header((X_CACHE, HeaderValue::from_static(status.as_header())))
        .insert_header((CACHE_CONTROL, HeaderValue::from_static("no-store")))
        .json(body.as_ref()))
}
