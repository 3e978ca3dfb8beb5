use async_trait::async_trait;
use chrono::{DateTime, Utc};
use identity_service_core::model::Invitation;
use identity_service_core::repository::InvitationRepository;
use shared_error::AppError;
use shared_types::Scope;
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgInvitationRepository {
    pool: PgPool,
}

impl PgInvitationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InvitationRepository for PgInvitationRepository {
    async fn create(&self, invitation: &Invitation) -> Result<Invitation, AppError> {
        let row = sqlx::query_as::<_, Invitation>(
            r#"
            INSERT INTO invitations (id, tenant_id, email, role, claims, token_hash, invited_by, is_accepted, accepted_at, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(invitation.id)
        .bind(invitation.tenant_id)
        .bind(&invitation.email)
        .bind(&invitation.role)
        .bind(&invitation.claims)
        .bind(&invitation.token_hash)
        .bind(invitation.invited_by)
        .bind(invitation.is_accepted)
        .bind(invitation.accepted_at)
        .bind(invitation.expires_at)
        .bind(invitation.created_at)
        .bind(invitation.updated_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_by_id(&self, scope: Scope, id: Uuid) -> Result<Option<Invitation>, AppError> {
        let row = sqlx::query_as::<_, Invitation>("SELECT * FROM invitations WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(scope.tenant_id())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_by_token_hash(&self, token_hash: &str) -> Result<Option<Invitation>, AppError> {
        let row = sqlx::query_as::<_, Invitation>("SELECT * FROM invitations WHERE token_hash = $1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_for_tenant(&self, scope: Scope) -> Result<Vec<Invitation>, AppError> {
        let rows = sqlx::query_as::<_, Invitation>("SELECT * FROM invitations WHERE tenant_id = $1 ORDER BY created_at DESC")
            .bind(scope.tenant_id())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn mark_accepted(&self, scope: Scope, id: Uuid, at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE invitations SET is_accepted = true, accepted_at = $3, updated_at = $3 WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(scope.tenant_id())
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete(&self, scope: Scope, id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM invitations WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(scope.tenant_id())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
