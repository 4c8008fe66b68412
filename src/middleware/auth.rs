//! Authentication middleware
//!
//! Extractors that resolve the bearer credential to an authenticated
//! principal. The identity provider issues the token; we verify it, then load
//! the local account row for the authoritative role and blocked flag.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    response::{IntoResponse, Response},
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{verify_token, AuthService, JwtError};
use crate::error::ApiError;
use crate::models::UserRole;

/// Authenticated principal resolved from a bearer token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| {
                    ApiError::Unauthenticated(
                        "Authorization header with Bearer token required".to_string(),
                    )
                    .into_response()
                })?;

        let auth_service = Arc::<AuthService>::from_ref(state);

        let claims = verify_token(bearer.token(), auth_service.jwt_secret()).map_err(|e| {
            let message = match e {
                JwtError::TokenExpired => "Token has expired",
                _ => "Invalid token",
            };
            ApiError::Unauthenticated(message.to_string()).into_response()
        })?;

        let user_id = claims
            .account_id()
            .map_err(|_| {
                ApiError::Unauthenticated("Invalid subject in token".to_string()).into_response()
            })?;

        // The account row is authoritative for role and blocked state; a
        // valid token without a provisioned account is still unauthenticated.
        let account = auth_service
            .load_account(user_id)
            .await
            .map_err(IntoResponse::into_response)?
            .ok_or_else(|| {
                ApiError::Unauthenticated("Account is not registered".to_string()).into_response()
            })?;

        if account.blocked {
            return Err(ApiError::Blocked.into_response());
        }

        Ok(AuthenticatedUser {
            user_id: account.id,
            email: account.email,
            role: account.role,
        })
    }
}

/// Extractor requiring at least the staff role
pub struct StaffUser(pub AuthenticatedUser);

#[async_trait]
impl<S> FromRequestParts<S> for StaffUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        crate::authz::require_role(&user, UserRole::Staff)
            .map_err(IntoResponse::into_response)?;
        Ok(StaffUser(user))
    }
}

/// Extractor requiring the admin role
pub struct AdminUser(pub AuthenticatedUser);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;
        crate::authz::require_role(&user, UserRole::Admin)
            .map_err(IntoResponse::into_response)?;
        Ok(AdminUser(user))
    }
}
