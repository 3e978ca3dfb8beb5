//! Database pool initialization and the handful of vector-search constants
//! every crate that queries `memories` needs to agree on.

use shared_error::AppError;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub use pgvector::Vector;

/// Initialize database connection pool.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<PgPool, AppError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| AppError::Transient(format!("failed to connect to database: {e}")))
}

/// `vector(384)` column parameters used by the `idx_memories_vector_hnsw` index
/// (`CREATE INDEX ... USING hnsw (vector vector_cosine_ops) WITH (m = HNSW_M,
/// ef_construction = HNSW_EF_CONSTRUCTION)`). Kept here, not buried in a
/// migration file, because the memory repository's search query and the
/// migration that creates the index must never drift apart.
pub const HNSW_M: u32 = 16;
pub const HNSW_EF_CONSTRUCTION: u32 = 64;

/// Run a lightweight query to confirm the pool can reach Postgres. Used by
/// the `/healthz` handler rather than trusting pool construction alone,
/// since a pool connects lazily.
pub async fn check_connection(pool: &PgPool) -> Result<(), AppError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| AppError::Transient(format!("database health check failed: {e}")))?;
    Ok(())
}
