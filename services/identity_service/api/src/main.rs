//! Identity Service Main Application
//!
//! Entry point for the multi-tenant identity/authorization/agent-memory
//! control plane service.

use identity_service_api::{create_router, worker};
use identity_service_infra::Infra;
use shared_config::Config;
use shared_db::init_pool;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[cfg(feature = "export-spec")]
    {
        identity_service_api::openapi::export_spec()?;
        println!("OpenAPI spec exported to shared/openapi/identity.yaml");
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "identity_service=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    let pool = init_pool(&config.database_url, 10).await?;

    let worker_infra = Infra::new(pool.clone(), &config);
    worker::spawn_all(worker_infra);
    tracing::info!("background worker jobs started");

    let app = create_router(pool, &config).await;

    let addr = SocketAddr::from((config.host.parse::<std::net::IpAddr>().unwrap_or([0, 0, 0, 0].into()), config.port));
    tracing::info!("identity service listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
