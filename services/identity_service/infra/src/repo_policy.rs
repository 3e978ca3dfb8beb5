use async_trait::async_trait;
use identity_service_core::model::Policy;
use identity_service_core::repository::PolicyRepository;
use shared_error::AppError;
use shared_types::Scope;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgPolicyRepository {
    pool: PgPool,
}

impl PgPolicyRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PolicyRepository for PgPolicyRepository {
    async fn create(&self, policy: &Policy) -> Result<Policy, AppError> {
        let row = sqlx::query_as::<_, Policy>(
            r#"
            INSERT INTO policies (id, tenant_id, role, rule, description, priority, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(policy.id)
        .bind(policy.tenant_id)
        .bind(&policy.role)
        .bind(&policy.rule)
        .bind(&policy.description)
        .bind(policy.priority)
        .bind(policy.is_active)
        .bind(policy.created_at)
        .bind(policy.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, scope: Scope, id: Uuid) -> Result<Option<Policy>, AppError> {
        let row = sqlx::query_as::<_, Policy>("SELECT * FROM policies WHERE id = $1 AND tenant_id IS NOT DISTINCT FROM $2")
            .bind(id)
            .bind(scope.tenant_id())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_active_for_role(&self, scope: Scope, role: &str) -> Result<Vec<Policy>, AppError> {
        // §9 Open Question: tenant principals are restricted to their own
        // tenant_id, never implicitly merged with null-tenant rows.
        let query = if scope.is_system() {
            sqlx::query_as::<_, Policy>(
                "SELECT * FROM policies WHERE tenant_id IS NULL AND role = $1 AND is_active = true",
            )
            .bind(role)
        } else {
            sqlx::query_as::<_, Policy>(
                "SELECT * FROM policies WHERE tenant_id = $1 AND role = $2 AND is_active = true",
            )
            .bind(scope.tenant_id())
            .bind(role)
        };
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn list_for_tenant(&self, scope: Scope) -> Result<Vec<Policy>, AppError> {
        let rows = sqlx::query_as::<_, Policy>(
            "SELECT * FROM policies WHERE tenant_id IS NOT DISTINCT FROM $1 ORDER BY priority DESC, created_at ASC",
        )
        .bind(scope.tenant_id())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn update(&self, policy: &Policy) -> Result<Policy, AppError> {
        let row = sqlx::query_as::<_, Policy>(
            r#"
            UPDATE policies SET role = $2, rule = $3, description = $4, priority = $5, is_active = $6, updated_at = $7
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(policy.id)
        .bind(&policy.role)
        .bind(&policy.rule)
        .bind(&policy.description)
        .bind(policy.priority)
        .bind(policy.is_active)
        .bind(policy.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn delete(&self, scope: Scope, id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM policies WHERE id = $1 AND tenant_id IS NOT DISTINCT FROM $2")
            .bind(id)
            .bind(scope.tenant_id())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn bulk_delete(&self, scope: Scope, ids: &[Uuid]) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM policies WHERE id = ANY($1) AND tenant_id IS NOT DISTINCT FROM $2")
            .bind(ids)
            .bind(scope.tenant_id())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
