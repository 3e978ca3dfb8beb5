//! Identity Service API
//!
//! HTTP surface for the multi-tenant identity/authorization/agent-memory
//! control plane (§6). Handlers depend only on `identity_service_core`
//! traits/DTOs and `identity_service_infra::Infra`'s trait objects.
//!
//! ## Architecture
//!
//! - `handlers/`: Axum HTTP handlers, one module per §3 entity family
//! - `extractors`: `CurrentPrincipal`/`ClientInfo` request extractors
//! - `state`: `AppState` (composition root + config slice)
//! - `worker`: C11 background jobs
//! - `openapi`: aggregate `utoipa::OpenApi` document

pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod openapi;
pub mod state;
pub mod worker;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::IntoResponse;
use axum::Router;
use identity_service_infra::Infra;
use metrics::ApiMetrics;
use shared_config::Config;
use shared_rate_limit::{RateLimitConfig, RateLimitExt, RateLimitState};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use state::AppState;

/// Records every request's method/status/latency into `state.metrics`
/// before the response is handed back. Labels are method and status class
/// only — the raw request path is left out to keep label cardinality
/// bounded.
async fn metrics_middleware(State(state): State<AppState>, req: Request, next: Next) -> impl IntoResponse {
    let method = req.method().to_string();
    let start = Instant::now();
    let response = next.run(req).await;
    state.metrics.record_request(&method, response.status().as_u16(), start.elapsed().as_secs_f64());
    response
}

/// Build the complete application router: every handler module's
/// `routes()` nested under `/v1`, `/healthz` at the root, rate limiting,
/// CORS, request tracing, and the Swagger UI.
pub async fn create_router(pool: PgPool, config: &Config) -> Router {
    let infra = Infra::new(pool.clone(), config);
    let metrics = Arc::new(ApiMetrics::new().expect("metrics registry has no duplicate label sets"));
    let state = AppState { infra: infra.clone(), config: config.clone(), pool: pool.clone(), metrics };

    let rate_limit_config = RateLimitConfig { redis_url: config.redis_url.clone(), ..RateLimitConfig::default() };
    let event_bus_for_hook = infra.event_bus.clone();
    let rate_limit_state = RateLimitState::from_config(rate_limit_config, Some(config.jwt_secret.clone()))
        .await
        .with_on_exceeded(Arc::new(move |principal_key, endpoint_class| {
            let event_bus = event_bus_for_hook.clone();
            tokio::spawn(async move {
                let payload = serde_json::json!({"principal_key": principal_key, "endpoint_class": endpoint_class});
                if let Err(e) = event_bus.publish(shared_types::Scope::System, "rate_limit.exceeded", None, None, payload).await {
                    tracing::warn!(%e, "failed to publish rate_limit.exceeded");
                }
            });
        }));

    let v1 = Router::new()
        .merge(handlers::identity::routes())
        .merge(handlers::sessions::routes())
        .merge(handlers::api_keys::routes())
        .merge(handlers::invitations::routes())
        .merge(handlers::memory::routes())
        .merge(handlers::policy::routes())
        .merge(handlers::webhooks::routes())
        .merge(handlers::usage::routes());

    let cors = CorsLayer::new()
        .allow_origin({
            if config.cors_origins.is_empty() {
                AllowOrigin::any()
            } else {
                let values: Result<Vec<_>, _> = config.cors_origins.iter().map(|o| axum::http::HeaderValue::from_str(o)).collect();
                match values {
                    Ok(values) => AllowOrigin::list(values),
                    Err(e) => panic!("invalid CORS origin configured: {e}"),
                }
            }
        })
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST, axum::http::Method::PUT, axum::http::Method::DELETE])
        .allow_headers([axum::http::header::CONTENT_TYPE, axum::http::header::AUTHORIZATION]);

    Router::new()
        .merge(handlers::health::routes())
        .nest("/v1", v1)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", openapi::ApiDoc::openapi()))
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(state, metrics_middleware))
        .rate_limit(rate_limit_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// Create the complete application with database initialization. Used by
/// integration tests.
pub async fn create_app(config: Config) -> Router {
    let pool = shared_db::init_pool(&config.database_url, 10).await.expect("failed to initialize database pool");
    create_router(pool, &config).await
}
