//! Document metadata API handlers

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::authz;
use crate::error::ApiResult;
use crate::middleware::AuthenticatedUser;
use crate::models::{
    ApiResponse, CreateDocumentRequest, Document, SignedUrlResponse, UserRole,
};
use crate::state::AppState;

/// Record uploaded document metadata; owner or staff
pub async fn create_document(
    user: AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(loan_id): Path<Uuid>,
    Json(request): Json<CreateDocumentRequest>,
) -> ApiResult<Json<ApiResponse<Document>>> {
    request.validate()?;

    let loan = app_state.loan_service.get_loan(loan_id).await?;
    authz::require_role_or_owner(&user, UserRole::Staff, loan.owner_id)?;

    let document = app_state
        .document_service
        .create_document(loan_id, loan.owner_id, request)
        .await?;

    Ok(Json(ApiResponse::ok(document)))
}

/// List a loan's documents; owner or staff
pub async fn list_documents(
    user: AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<Document>>>> {
    let loan = app_state.loan_service.get_loan(loan_id).await?;
    authz::require_role_or_owner(&user, UserRole::Staff, loan.owner_id)?;

    let documents = app_state.document_service.list_documents(loan_id).await?;

    Ok(Json(ApiResponse::ok(documents)))
}

/// Issue a signed retrieval URL for a document; owner or staff
pub async fn document_url(
    user: AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<SignedUrlResponse>>> {
    let document = app_state.document_service.get_document(id).await?;
    authz::require_role_or_owner(&user, UserRole::Staff, document.owner_id)?;

    let signed = app_state.document_service.signed_url(&document).await?;

    Ok(Json(ApiResponse::ok(signed)))
}
