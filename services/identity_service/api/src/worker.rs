//! Background Worker (C11, §4.11): seven cooperative periodic jobs, each
//! its own `tokio::time::interval` loop spawned onto the runtime started
//! in `main`. Grounded on the teacher's single-job outbox-poller shape
//! (`start_outbox_worker` in `inventory_service`), generalized to several
//! independent cadences instead of one.

use chrono::Utc;
use identity_service_infra::Infra;
use std::time::Duration;
use tokio::time;

const CLEANUP_SESSIONS_INTERVAL: Duration = Duration::from_secs(6 * 3600);
const CLEANUP_MEMORIES_INTERVAL: Duration = Duration::from_secs(24 * 3600);
const CLEANUP_RATE_LIMITS_INTERVAL: Duration = Duration::from_secs(2 * 3600);
const CLEANUP_WEBHOOK_DELIVERIES_INTERVAL: Duration = Duration::from_secs(24 * 3600);
const RETRY_WEBHOOK_DELIVERIES_INTERVAL: Duration = Duration::from_secs(15 * 60);
const BACKFILL_EMBEDDINGS_INTERVAL: Duration = Duration::from_secs(30 * 60);
const AGGREGATE_USAGE_INTERVAL: Duration = Duration::from_secs(3600);

const WEBHOOK_DELIVERY_RETENTION_DAYS: i64 = 30;
const EMBEDDING_BACKFILL_BATCH_SIZE: u32 = 100;
const RATE_LIMIT_WINDOW_RETENTION: Duration = Duration::from_secs(24 * 3600);

/// Spawns all seven jobs and returns immediately; each runs until the
/// process exits. A job's own error is logged and does not stop the
/// others or the loop itself — every tick is an independent attempt.
pub fn spawn_all(infra: Infra) {
    spawn_cleanup_sessions(infra.clone());
    spawn_cleanup_memories(infra.clone());
    spawn_cleanup_rate_limits(infra.clone());
    spawn_cleanup_webhook_deliveries(infra.clone());
    spawn_retry_webhook_deliveries(infra.clone());
    spawn_backfill_embeddings(infra.clone());
    spawn_aggregate_usage(infra);
}

fn spawn_cleanup_sessions(infra: Infra) {
    tokio::spawn(async move {
        let mut interval = time::interval(CLEANUP_SESSIONS_INTERVAL);
        loop {
            interval.tick().await;
            match infra.session_service.cleanup().await {
                Ok(count) => tracing::info!(count, "cleanup_sessions: deactivated expired sessions"),
                Err(e) => tracing::error!(%e, "cleanup_sessions failed"),
            }
        }
    });
}

fn spawn_cleanup_memories(infra: Infra) {
    tokio::spawn(async move {
        let mut interval = time::interval(CLEANUP_MEMORIES_INTERVAL);
        loop {
            interval.tick().await;
            match infra.memories.hard_delete_expired(Utc::now()).await {
                Ok(count) => tracing::info!(count, "cleanup_memories: hard-deleted TTL-expired rows"),
                Err(e) => tracing::error!(%e, "cleanup_memories failed"),
            }
        }
    });
}

fn spawn_cleanup_rate_limits(infra: Infra) {
    tokio::spawn(async move {
        let mut interval = time::interval(CLEANUP_RATE_LIMITS_INTERVAL);
        loop {
            interval.tick().await;
            let older_than = Utc::now() - chrono::Duration::from_std(RATE_LIMIT_WINDOW_RETENTION).expect("fixed duration");
            match infra.rate_limits.delete_older_than(older_than).await {
                Ok(count) => tracing::info!(count, "cleanup_rate_limits: dropped stale windows"),
                Err(e) => tracing::error!(%e, "cleanup_rate_limits failed"),
            }
        }
    });
}

fn spawn_cleanup_webhook_deliveries(infra: Infra) {
    tokio::spawn(async move {
        let mut interval = time::interval(CLEANUP_WEBHOOK_DELIVERIES_INTERVAL);
        loop {
            interval.tick().await;
            match infra.webhook_pipeline.sweep_terminal(WEBHOOK_DELIVERY_RETENTION_DAYS).await {
                Ok(count) => tracing::info!(count, "cleanup_webhook_deliveries: dropped terminal rows"),
                Err(e) => tracing::error!(%e, "cleanup_webhook_deliveries failed"),
            }
        }
    });
}

fn spawn_retry_webhook_deliveries(infra: Infra) {
    tokio::spawn(async move {
        let mut interval = time::interval(RETRY_WEBHOOK_DELIVERIES_INTERVAL);
        loop {
            interval.tick().await;
            match infra.webhook_pipeline.sweep_retries().await {
                Ok(count) => tracing::info!(count, "retry_webhook_deliveries: re-attempted due deliveries"),
                Err(e) => tracing::error!(%e, "retry_webhook_deliveries failed"),
            }
        }
    });
}

fn spawn_backfill_embeddings(infra: Infra) {
    tokio::spawn(async move {
        let mut interval = time::interval(BACKFILL_EMBEDDINGS_INTERVAL);
        loop {
            interval.tick().await;
            match infra.memory_core.backfill_embeddings(EMBEDDING_BACKFILL_BATCH_SIZE).await {
                Ok(count) => tracing::info!(count, "backfill_embeddings: filled missing vectors"),
                Err(e) => tracing::error!(%e, "backfill_embeddings failed"),
            }
        }
    });
}

fn spawn_aggregate_usage(infra: Infra) {
    tokio::spawn(async move {
        let mut interval = time::interval(AGGREGATE_USAGE_INTERVAL);
        loop {
            interval.tick().await;
            // Aggregates yesterday and today so a tick shortly after midnight
            // still closes out the prior day's totals (I5, P9: idempotent).
            let today = Utc::now().date_naive();
            let dates = [today - chrono::Duration::days(1), today];
            match infra.audit_usage.aggregate_usage(&dates).await {
                Ok(count) => tracing::info!(count, "aggregate_usage: upserted daily rows"),
                Err(e) => tracing::error!(%e, "aggregate_usage failed"),
            }
        }
    });
}
