//! # Tenant Repository
//!
//! Database operations for tenants. The submission service only ever needs
//! two things from here: the tenant row and its gateway credentials.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::{DbError, DbResult};
use kipu_core::Tenant;

const TENANT_COLUMNS: &str = "\
    id, business_name, ruc, address, provider_id, provider_token, \
    is_active, created_at, updated_at";

/// Repository for tenant database operations.
#[derive(Debug, Clone)]
pub struct TenantRepository {
    pool: SqlitePool,
}

impl TenantRepository {
    /// Creates a new TenantRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TenantRepository { pool }
    }

    /// Inserts a tenant.
    pub async fn insert(&self, tenant: &Tenant) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO tenants (
                id, business_name, ruc, address, provider_id, provider_token,
                is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&tenant.id)
        .bind(&tenant.business_name)
        .bind(&tenant.ruc)
        .bind(&tenant.address)
        .bind(&tenant.provider_id)
        .bind(&tenant.provider_token)
        .bind(tenant.is_active)
        .bind(tenant.created_at)
        .bind(tenant.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a tenant by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenants WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tenant)
    }

    /// Updates a tenant's gateway credentials.
    pub async fn update_credentials(
        &self,
        id: &str,
        provider_id: &str,
        provider_token: &str,
    ) -> DbResult<()> {
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE tenants SET
                provider_id = ?2,
                provider_token = ?3,
                updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(provider_id)
        .bind(provider_token)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Tenant", id));
        }

        Ok(())
    }
}
