//! Application state: the composition root (`identity_service_infra::Infra`)
//! plus the slice of `Config` handlers need directly, following the
//! teacher's `AppState { auth_service: Arc<S> }` pattern — except `Infra`'s
//! fields are already trait objects, so this `AppState` is concrete rather
//! than generic over a service trait.

use crate::metrics::ApiMetrics;
use identity_service_infra::Infra;
use shared_auth::JwtSecretProvider;
use shared_config::Config;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub infra: Infra,
    pub config: Config,
    pub pool: PgPool,
    pub metrics: Arc<ApiMetrics>,
}

impl JwtSecretProvider for AppState {
    fn get_jwt_secret(&self) -> &str {
        &self.config.jwt_secret
    }
}
