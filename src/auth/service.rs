//! Principal resolution and account provisioning

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{Account, RegisterAccountRequest, UserRole};

use super::jwt::Claims;

/// Resolves verified token subjects to local accounts
#[derive(Clone)]
pub struct AuthService {
    db_pool: PgPool,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(db_pool: PgPool, jwt_secret: String) -> Self {
        Self {
            db_pool,
            jwt_secret,
        }
    }

    /// Shared secret used to verify identity-provider tokens
    pub fn jwt_secret(&self) -> &str {
        &self.jwt_secret
    }

    /// Load the account row backing a principal, if provisioned
    pub async fn load_account(&self, account_id: Uuid) -> ApiResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
            .bind(account_id)
            .fetch_optional(&self.db_pool)
            .await?;

        Ok(account)
    }

    /// Provision a local account for a verified principal.
    ///
    /// New accounts always start as role `user`, unblocked. Conflicts if the
    /// subject is already provisioned.
    pub async fn provision_account(
        &self,
        claims: &Claims,
        request: RegisterAccountRequest,
    ) -> ApiResult<Account> {
        let account_id = claims
            .account_id()
            .map_err(|e| ApiError::Unauthenticated(e.to_string()))?;

        if self.load_account(account_id).await?.is_some() {
            return Err(ApiError::Conflict("Account already registered".to_string()));
        }

        let account = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (id, email, name, role, blocked, created_at, updated_at)
            VALUES ($1, $2, $3, $4, false, now(), now())
            RETURNING *
            "#,
        )
        .bind(account_id)
        .bind(&request.email)
        .bind(&request.name)
        .bind(UserRole::User)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(account_id = %account.id, "Account provisioned");

        Ok(account)
    }
}
