use actix_web::http::StatusCode;
use actix_web::{HttpResponse, Responder, web};
use tracing::{debug, error, info, instrument, warn};

use crate::auth::auth::BearerToken;
use crate::error::AppError;
use crate::models::LoginReqDto;
use crate::state::AppState;

/// Exchange ERP credentials for a session token
///
/// The upstream answer (status and body) is returned untouched so the
/// dashboard sees exactly what the ERP said.
#[utoipa::path(
    post,
    path = "/api/login",
    request_body = LoginReqDto,
    responses(
        (status = 200, description = "Upstream authentication payload", body = Object),
        (status = 400, description = "Empty username or password", body = Object, example = json!({
            "error": "Username and password are required"
        })),
        (status = 408, description = "Upstream timed out"),
        (status = 429, description = "Too many login attempts")
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(state, user),
    fields(username = %user.username)
)]
pub async fn login(
    user: web::Json<LoginReqDto>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Login request received");

    // 1️⃣ Basic validation
    if user.username.trim().is_empty() || user.password.is_empty() {
        info!("Validation failed: empty username or password");
        return Err(AppError::BadRequest(
            "Username and password are required".to_string(),
        ));
    }

    // 2️⃣ Forward to the ERP
    debug!("Forwarding credentials upstream");
    let (status, body) = state
        .erp
        .authenticate(user.username.trim(), &user.password)
        .await
        .map_err(|e| {
            error!(error = %e, "Upstream authentication failed");
            e
        })?;

    // 3️⃣ Pass the answer through
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
    if status.is_success() {
        info!("Login successful");
    } else {
        warn!(status = status.as_u16(), "Login rejected upstream");
    }

    Ok(HttpResponse::build(status)
        .content_type("application/json")
        .body(body))
}

/// Drop every cached payload tied to the caller's token
#[utoipa::path(
    post,
    path = "/api/logout",
    responses(
        (status = 204, description = "Session caches cleared, or nothing to clear")
    ),
    security(
        ("bearer_auth" = [])
    ),
    tag = "Auth"
)]
#[instrument(name = "auth_logout", skip_all)]
pub async fn logout(token: Option<BearerToken>, state: web::Data<AppState>) -> impl Responder {
    match token {
        Some(token) => {
            state.attendance.forget(&token).await;
            state.quizzes.forget(&token).await;
        }
        None => debug!("Logout without a token, nothing to clear"),
    }
    HttpResponse::NoContent().finish()
}
