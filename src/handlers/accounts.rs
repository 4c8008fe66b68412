//! Account-related API handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use uuid::Uuid;
use validator::Validate;

use crate::auth::{verify_token, JwtError};
use crate::authz;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AdminUser;
use crate::models::{
    Account, AccountResponse, ApiResponse, PaginatedResponse, PaginationParams,
    RegisterAccountRequest,
};
use crate::state::AppState;

/// Provision a local account for a verified bearer principal.
///
/// This is the one endpoint that accepts a token whose subject has no account
/// row yet, so it verifies the credential itself instead of going through the
/// principal extractor.
pub async fn register_account(
    State(app_state): State<AppState>,
    TypedHeader(Authorization(bearer)): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<RegisterAccountRequest>,
) -> ApiResult<Json<ApiResponse<AccountResponse>>> {
    request.validate()?;

    let claims = verify_token(bearer.token(), app_state.auth_service.jwt_secret()).map_err(
        |e| match e {
            JwtError::TokenExpired => ApiError::Unauthenticated("Token has expired".to_string()),
            _ => ApiError::Unauthenticated("Invalid token".to_string()),
        },
    )?;

    let account = app_state
        .auth_service
        .provision_account(&claims, request)
        .await?;

    Ok(Json(ApiResponse::ok(account.into())))
}

/// List accounts (admin)
pub async fn list_accounts(
    AdminUser(_admin): AdminUser,
    State(app_state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<ApiResponse<PaginatedResponse<AccountResponse>>>> {
    let page = app_state.user_service.list_accounts(&params).await?;

    Ok(Json(ApiResponse::ok(PaginatedResponse {
        data: page.data.into_iter().map(Account::into).collect(),
        total: page.total,
        page: page.page,
        limit: page.limit,
    })))
}

/// Block an account (admin). Admins cannot block themselves.
pub async fn block_account(
    AdminUser(admin): AdminUser,
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<AccountResponse>>> {
    authz::forbid_self_action(&admin, id)?;

    let account = app_state.user_service.set_blocked(id, true).await?;
    Ok(Json(ApiResponse::ok(account.into())))
}

/// Unblock an account (admin)
pub async fn unblock_account(
    AdminUser(_admin): AdminUser,
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<AccountResponse>>> {
    let account = app_state.user_service.set_blocked(id, false).await?;
    Ok(Json(ApiResponse::ok(account.into())))
}

/// Delete an account (admin). Admins cannot delete themselves.
pub async fn delete_account(
    AdminUser(admin): AdminUser,
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<()>>> {
    authz::forbid_self_action(&admin, id)?;

    app_state.user_service.delete_account(id).await?;
    Ok(Json(ApiResponse::ok(())))
}
