//! Postgres-backed `Tenant`/`Identity` repositories, grounded on
//! `infra/src/auth/repository.rs`'s `PgUserRepository` (runtime
//! `query_as::<_, T>` + `.bind()`, tenant-id filter on every read).

use async_trait::async_trait;
use identity_service_core::model::{Identity, Tenant};
use identity_service_core::repository::{IdentityRepository, TenantRepository};
use shared_error::AppError;
use shared_types::Scope;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgTenantRepository {
    pool: PgPool,
}

impl PgTenantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantRepository for PgTenantRepository {
    async fn create(&self, tenant: &Tenant) -> Result<Tenant, AppError> {
        let row = sqlx::query_as::<_, Tenant>(
            "INSERT INTO tenants (id, name, created_by, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING *",
        )
        .bind(tenant.id)
        .bind(&tenant.name)
        .bind(tenant.created_by)
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Tenant>, AppError> {
        let row = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

#[derive(Clone)]
pub struct PgIdentityRepository {
    pool: PgPool,
}

impl PgIdentityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// `scope` narrows every read/write to the caller's tenant; a system
/// scope sees rows with a null `tenant_id` (I1).
fn scope_tenant_id(scope: Scope) -> Option<Uuid> {
    scope.tenant_id()
}

#[async_trait]
impl IdentityRepository for PgIdentityRepository {
    async fn find_by_external_id(&self, scope: Scope, external_id: &str) -> Result<Option<Identity>, AppError> {
        let row = sqlx::query_as::<_, Identity>(
            "SELECT * FROM identities WHERE external_id = $1 AND tenant_id IS NOT DISTINCT FROM $2",
        )
        .bind(external_id)
        .bind(scope_tenant_id(scope))
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, scope: Scope, id: Uuid) -> Result<Option<Identity>, AppError> {
        let query = if scope.is_system() {
            sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE id = $1").bind(id)
        } else {
            sqlx::query_as::<_, Identity>("SELECT * FROM identities WHERE id = $1 AND tenant_id = $2")
                .bind(id)
                .bind(scope.tenant_id())
        };
        Ok(query.fetch_optional(&self.pool).await?)
    }

    async fn find_by_sso(&self, provider: &str, external_id: &str) -> Result<Option<Identity>, AppError> {
        let row = sqlx::query_as::<_, Identity>(
            "SELECT * FROM identities WHERE sso_provider = $1 AND sso_external_id = $2",
        )
        .bind(provider)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn upsert_by_external_id(&self, identity: &Identity) -> Result<Identity, AppError> {
        let row = sqlx::query_as::<_, Identity>(
            r#"
            INSERT INTO identities (id, tenant_id, external_id, role, claims, is_active, sso_provider, sso_external_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (external_id) DO UPDATE SET
                role = EXCLUDED.role,
                claims = EXCLUDED.claims,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            RETURNING *
            "#,
        )
        .bind(identity.id)
        .bind(identity.tenant_id)
        .bind(&identity.external_id)
        .bind(&identity.role)
        .bind(&identity.claims)
        .bind(identity.is_active)
        .bind(&identity.sso_provider)
        .bind(&identity.sso_external_id)
        .bind(identity.created_at)
        .bind(identity.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn update(&self, identity: &Identity) -> Result<Identity, AppError> {
        let row = sqlx::query_as::<_, Identity>(
            r#"
            UPDATE identities SET role = $2, claims = $3, is_active = $4, updated_at = $5
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(identity.id)
        .bind(&identity.role)
        .bind(&identity.claims)
        .bind(identity.is_active)
        .bind(identity.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn deactivate(&self, scope: Scope, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE identities SET is_active = false, updated_at = now() WHERE id = $1 AND tenant_id IS NOT DISTINCT FROM $2")
            .bind(id)
            .bind(scope_tenant_id(scope))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, scope: Scope, id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM identities WHERE id = $1 AND tenant_id IS NOT DISTINCT FROM $2")
            .bind(id)
            .bind(scope_tenant_id(scope))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
