use crate::{
    api::{attendance, metrics, quiz},
    auth::handlers,
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::from_fn;
use actix_web::web;
use anyhow::{Result, anyhow};
use std::sync::Arc;

type Limiter = Governor<PeerIpKeyExtractor, NoOpMiddleware>;

/// Per-IP limiters, built once and shared by every worker.
#[derive(Clone)]
pub struct RateLimiters {
    login: Arc<Limiter>,
    protected: Arc<Limiter>,
}

impl RateLimiters {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            login: Arc::new(build_limiter(config.rate_login_per_min)?),
            protected: Arc::new(build_limiter(config.rate_protected_per_min)?),
        })
    }
}

// Helper to build per-route limiter
fn build_limiter(requests_per_min: u32) -> Result<Limiter> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / requests_per_min as u64).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .ok_or_else(|| anyhow!("invalid rate limit: {requests_per_min} requests per minute"))?;
    Ok(Governor::new(&cfg))
}

/// Browser access for the dashboard origin only, with credentials.
pub fn cors(config: &Config) -> Cors {
    Cors::default()
        .allowed_origin(&config.cors_allowed_origin)
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![header::AUTHORIZATION, header::CONTENT_TYPE])
        .supports_credentials()
        .max_age(3600)
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config, limiters: &RateLimiters) {
    let protected = &limiters.protected;

    cfg.service(
        web::scope(&config.api_prefix)
            .wrap(from_fn(metrics::record_metrics))
            // public
            .service(
                web::resource("/login")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::login)),
            )
            .service(web::resource("/health").route(web::get().to(attendance::health)))
            .service(web::resource("/metrics").route(web::get().to(metrics::metrics)))
            // token-bearing
            .service(
                web::resource("/logout")
                    .wrap(limiters.login.clone())
                    .route(web::post().to(handlers::logout)),
            )
            .service(
                web::resource("/attendance")
                    .wrap(protected.clone())
                    .route(web::post().to(attendance::attendance_summary)),
            )
            .service(
                web::resource("/all-attendance")
                    .wrap(protected.clone())
                    .route(web::get().to(attendance::all_attendance)),
            )
            .service(
                web::resource("/subject-attendance")
                    .wrap(protected.clone())
                    .route(web::post().to(attendance::subject_attendance))
                    .route(web::get().to(attendance::subject_attendance_query)),
            )
            .service(
                web::resource("/quiz")
                    .wrap(protected.clone())
                    .route(web::get().to(quiz::quizzes)),
            ),
    );
}
