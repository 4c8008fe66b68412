//! Account administration service

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{Account, PaginatedResponse, PaginationParams};

/// Service for admin-side account management
#[derive(Clone)]
pub struct UserService {
    db_pool: PgPool,
}

impl UserService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// List accounts, newest first
    pub async fn list_accounts(
        &self,
        params: &PaginationParams,
    ) -> ApiResult<PaginatedResponse<Account>> {
        let (page, limit, offset) = params.resolve();

        let accounts = sqlx::query_as::<_, Account>(
            "SELECT * FROM accounts ORDER BY created_at DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db_pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.db_pool)
            .await?;

        Ok(PaginatedResponse {
            data: accounts,
            total,
            page,
            limit,
        })
    }

    /// Set or clear the blocked flag on an account
    pub async fn set_blocked(&self, id: Uuid, blocked: bool) -> ApiResult<Account> {
        let account = sqlx::query_as::<_, Account>(
            "UPDATE accounts SET blocked = $1, updated_at = now() WHERE id = $2 RETURNING *",
        )
        .bind(blocked)
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await?;

        let account =
            account.ok_or_else(|| ApiError::NotFound(format!("Account {id} not found")))?;

        tracing::info!(account_id = %id, blocked, "Account blocked flag updated");

        Ok(account)
    }

    /// Remove an account
    pub async fn delete_account(&self, id: Uuid) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&self.db_pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound(format!("Account {id} not found")));
        }

        tracing::info!(account_id = %id, "Account deleted");

        Ok(())
    }
}
