//! Postgres-backed `Memory` repository. The `vector` column is
//! `vector(384)` (pgvector), decoded through `pgvector::Vector` and
//! converted to the plain `Vec<f32>` the domain model carries — `sqlx`'s
//! derived `FromRow` has no notion of that column type, so every query
//! here maps rows by hand via `sqlx::Row` rather than `query_as`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use identity_service_core::model::Memory;
use identity_service_core::repository::{MemoryFilters, MemoryRepository, Paging};
use pgvector::Vector;
use serde_json::Value;
use shared_error::AppError;
use shared_types::Scope;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Clone)]
pub struct PgMemoryRepository {
    pool: PgPool,
}

impl PgMemoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_memory(row: sqlx::postgres::PgRow) -> Result<Memory, AppError> {
    let vector: Option<Vector> = row.try_get("vector")?;
    let metadata: sqlx::types::Json<Value> = row.try_get("metadata")?;
    Ok(Memory {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        identity_id: row.try_get("identity_id")?,
        text: row.try_get("text")?,
        vector: vector.map(|v| v.to_vec()),
        r#type: row.try_get("memory_type")?,
        metadata,
        score: None,
        version: row.try_get("version")?,
        ttl_days: row.try_get("ttl_days")?,
        is_deleted: row.try_get("is_deleted")?,
        deleted_at: row.try_get("deleted_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Appends the optional `type`/`metadata_requirements` predicates shared by
/// `list`, `search_by_vector` and `search_by_text`; `$1`/`$2` are always
/// `(identity_id, tenant_id)`, so extra predicates start at `$3`. The
/// `metadata_requirements` map is matched as a single JSONB containment
/// predicate rather than per-key, so one bind always corresponds to one
/// appended predicate.
fn push_filters(sql: &mut String, filters: &MemoryFilters, next_param: &mut u32) -> Vec<String> {
    let mut binds = Vec::new();
    if filters.r#type.is_some() {
        sql.push_str(&format!(" AND memory_type = ${}", next_param));
        *next_param += 1;
        binds.push("type".to_string());
    }
    if filters.metadata_requirements.is_some() {
        sql.push_str(&format!(" AND metadata @> ${}", next_param));
        *next_param += 1;
        binds.push("metadata".to_string());
    }
    binds
}

#[async_trait]
impl MemoryRepository for PgMemoryRepository {
    async fn create(&self, memory: &Memory) -> Result<Memory, AppError> {
        let vector = memory.vector.clone().map(Vector::from);
        let row = sqlx::query(
            r#"
            INSERT INTO memories (id, tenant_id, identity_id, text, vector, memory_type, metadata, version, ttl_days, is_deleted, deleted_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(memory.id)
        .bind(memory.tenant_id)
        .bind(memory.identity_id)
        .bind(&memory.text)
        .bind(vector)
        .bind(&memory.r#type)
        .bind(&memory.metadata)
        .bind(memory.version)
        .bind(memory.ttl_days)
        .bind(memory.is_deleted)
        .bind(memory.deleted_at)
        .bind(memory.created_at)
        .bind(memory.updated_at)
        .fetch_one(&self.pool)
        .await?;
        row_to_memory(row)
    }

    async fn find_by_id(&self, scope: Scope, id: Uuid, include_deleted: bool) -> Result<Option<Memory>, AppError> {
        let sql = if include_deleted {
            "SELECT * FROM memories WHERE id = $1 AND tenant_id IS NOT DISTINCT FROM $2"
        } else {
            "SELECT * FROM memories WHERE id = $1 AND tenant_id IS NOT DISTINCT FROM $2 AND is_deleted = false"
        };
        let row = sqlx::query(sql)
            .bind(id)
            .bind(scope.tenant_id())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_memory).transpose()
    }

    async fn list(&self, scope: Scope, identity_id: Uuid, filters: &MemoryFilters, paging: Paging) -> Result<Vec<Memory>, AppError> {
        let mut sql = String::from(
            "SELECT * FROM memories WHERE identity_id = $1 AND tenant_id IS NOT DISTINCT FROM $2 AND is_deleted = false",
        );
        let mut next_param = 3;
        let filter_binds = push_filters(&mut sql, filters, &mut next_param);
        sql.push_str(&format!(" ORDER BY created_at DESC LIMIT ${} OFFSET ${}", next_param, next_param + 1));

        let mut query = sqlx::query(&sql).bind(identity_id).bind(scope.tenant_id());
        for bind in &filter_binds {
            query = bind_filter(query, bind, filters);
        }
        let rows = query.bind(paging.limit).bind(paging.offset).fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_memory).collect()
    }

    async fn update(&self, scope: Scope, memory: &Memory) -> Result<Memory, AppError> {
        let vector = memory.vector.clone().map(Vector::from);
        let row = sqlx::query(
            r#"
            UPDATE memories SET text = $3, vector = $4, memory_type = $5, metadata = $6, version = $7, ttl_days = $8, updated_at = $9
            WHERE id = $1 AND tenant_id IS NOT DISTINCT FROM $2
            RETURNING *
            "#,
        )
        .bind(memory.id)
        .bind(scope.tenant_id())
        .bind(&memory.text)
        .bind(vector)
        .bind(&memory.r#type)
        .bind(&memory.metadata)
        .bind(memory.version)
        .bind(memory.ttl_days)
        .bind(memory.updated_at)
        .fetch_one(&self.pool)
        .await?;
        row_to_memory(row)
    }

    async fn soft_delete(&self, scope: Scope, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE memories SET is_deleted = true, deleted_at = $3, updated_at = $3 WHERE id = $1 AND tenant_id IS NOT DISTINCT FROM $2",
        )
        .bind(id)
        .bind(scope.tenant_id())
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn hard_delete(&self, scope: Scope, id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM memories WHERE id = $1 AND tenant_id IS NOT DISTINCT FROM $2")
            .bind(id)
            .bind(scope.tenant_id())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn search_by_vector(
        &self,
        scope: Scope,
        identity_id: Uuid,
        query_vector: &[f32],
        filters: &MemoryFilters,
        k: u32,
    ) -> Result<Vec<Memory>, AppError> {
        let mut sql = String::from(
            "SELECT *, 1 - (vector <=> $3) AS similarity FROM memories \
             WHERE identity_id = $1 AND tenant_id IS NOT DISTINCT FROM $2 AND is_deleted = false AND vector IS NOT NULL",
        );
        let mut next_param = 4;
        let filter_binds = push_filters(&mut sql, filters, &mut next_param);
        sql.push_str(&format!(" ORDER BY vector <=> $3 LIMIT ${}", next_param));

        let vector = Vector::from(query_vector.to_vec());
        let mut query = sqlx::query(&sql).bind(identity_id).bind(scope.tenant_id()).bind(vector);
        for bind in &filter_binds {
            query = bind_filter(query, bind, filters);
        }
        let rows = query.bind(k as i64).fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| {
                let similarity: f32 = row.try_get("similarity")?;
                let mut memory = row_to_memory(row)?;
                memory.score = Some(similarity);
                Ok(memory)
            })
            .collect()
    }

    async fn search_by_text(
        &self,
        scope: Scope,
        identity_id: Uuid,
        query_text: &str,
        filters: &MemoryFilters,
        k: u32,
    ) -> Result<Vec<Memory>, AppError> {
        let mut sql = String::from(
            "SELECT * FROM memories \
             WHERE identity_id = $1 AND tenant_id IS NOT DISTINCT FROM $2 AND is_deleted = false AND text ILIKE $3",
        );
        let mut next_param = 4;
        let filter_binds = push_filters(&mut sql, filters, &mut next_param);
        sql.push_str(&format!(" ORDER BY created_at DESC LIMIT ${}", next_param));

        let pattern = format!("%{}%", query_text.replace('%', "\\%").replace('_', "\\_"));
        let mut query = sqlx::query(&sql).bind(identity_id).bind(scope.tenant_id()).bind(pattern);
        for bind in &filter_binds {
            query = bind_filter(query, bind, filters);
        }
        let rows = query.bind(k as i64).fetch_all(&self.pool).await?;
        // Every row here already matched the ILIKE predicate, i.e. a
        // substring hit; §4.7 step 4 fixes that case's score at 0.8.
        rows.into_iter()
            .map(|row| {
                let mut memory = row_to_memory(row)?;
                memory.score = Some(0.8);
                Ok(memory)
            })
            .collect()
    }

    async fn list_missing_vector(&self, batch_size: u32) -> Result<Vec<Memory>, AppError> {
        let rows = sqlx::query("SELECT * FROM memories WHERE is_deleted = false AND vector IS NULL ORDER BY created_at ASC LIMIT $1")
            .bind(batch_size as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_memory).collect()
    }

    async fn hard_delete_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "DELETE FROM memories WHERE ttl_days IS NOT NULL AND created_at + (ttl_days || ' days')::interval < $1",
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

/// Binds one extra predicate added by [`push_filters`], in the same order
/// it appended them, keeping the `$N` positions and the bind calls in lockstep.
fn bind_filter<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    bind: &str,
    filters: &'q MemoryFilters,
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    if bind == "type" {
        return query.bind(filters.r#type.as_ref().expect("type filter bound only when present"));
    }
    let requirements = filters
        .metadata_requirements
        .as_ref()
        .expect("metadata filter bound only when present");
    query.bind(sqlx::types::Json(Value::Object(requirements.clone())))
}
