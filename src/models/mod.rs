//! Data models for the LendFlow backend

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

/// Account model (mirror of the identity provider's user, plus local state)
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: UserRole,
    pub blocked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            email: account.email,
            name: account.name,
            role: account.role,
            blocked: account.blocked,
            created_at: account.created_at,
        }
    }
}

/// Account shape returned to API callers
#[derive(Debug, Serialize, Deserialize)]
pub struct AccountResponse {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: UserRole,
    pub blocked: bool,
    pub created_at: DateTime<Utc>,
}

/// User roles, ordered by privilege
///
/// The variant order is the role hierarchy: `User < Staff < Admin`. All role
/// checks go through [`UserRole::subsumes`]; nothing else compares roles.
#[derive(
    Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, PartialOrd, Ord,
)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Staff,
    Admin,
}

impl UserRole {
    /// Whether this role grants at least the privileges of `required`
    pub fn subsumes(self, required: UserRole) -> bool {
        self >= required
    }

    /// Role name as stored and serialized
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Staff => "staff",
            UserRole::Admin => "admin",
        }
    }

    /// Parse a role name, as carried in token claims
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(UserRole::User),
            "staff" => Some(UserRole::Staff),
            "admin" => Some(UserRole::Admin),
            _ => None,
        }
    }
}

/// Request to provision a local account for a verified principal
#[derive(Debug, Deserialize, validator::Validate)]
pub struct RegisterAccountRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
}

/// Document metadata model
///
/// The bytes themselves live in the external blob store; this row only keys
/// into it.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow)]
pub struct Document {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub owner_id: Uuid,
    pub file_name: String,
    pub content_type: String,
    pub storage_key: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Request to record uploaded document metadata
#[derive(Debug, Deserialize, validator::Validate)]
pub struct CreateDocumentRequest {
    #[validate(length(min = 1, max = 255))]
    pub file_name: String,
    #[validate(length(min = 1, max = 127))]
    pub content_type: String,
    #[validate(length(min = 1, max = 512))]
    pub storage_key: String,
}

/// Signed URL response for document retrieval
#[derive(Debug, Serialize, Deserialize)]
pub struct SignedUrlResponse {
    pub url: String,
    pub expires_in_seconds: u64,
}

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Successful response carrying `data`
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Pagination parameters
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl PaginationParams {
    /// Resolve to a concrete (page, limit, offset) triple with sane caps
    pub fn resolve(&self) -> (i64, i64, i64) {
        let page = self.page.unwrap_or(1).max(1);
        let limit = self.limit.unwrap_or(20).clamp(1, 100);
        (page, limit, (page - 1) * limit)
    }
}

/// Paginated response
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}
