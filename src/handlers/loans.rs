//! Loan, EMI, and penalty API handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;

use crate::authz;
use crate::emi::EmiSettings;
use crate::error::ApiResult;
use crate::loan::{
    CreateLoanRequest, ListLoansQuery, LoanView, PenaltyRecomputeResponse, RecordPaymentRequest,
    UpdateStatusRequest,
};
use crate::middleware::{AdminUser, AuthenticatedUser, StaffUser};
use crate::models::{ApiResponse, PaginatedResponse, UserRole};
use crate::state::AppState;

/// Submit a loan application
pub async fn create_loan(
    user: AuthenticatedUser,
    State(app_state): State<AppState>,
    Json(request): Json<CreateLoanRequest>,
) -> ApiResult<Json<ApiResponse<LoanView>>> {
    let loan = app_state
        .loan_service
        .create_loan(user.user_id, request)
        .await?;

    Ok(Json(ApiResponse::ok(loan.view_for(user.role))))
}

/// List loans.
///
/// Staff and admin see every record; a `user`-role caller sees only their
/// own, in owner projection.
pub async fn list_loans(
    user: AuthenticatedUser,
    State(app_state): State<AppState>,
    Query(query): Query<ListLoansQuery>,
) -> ApiResult<Json<ApiResponse<PaginatedResponse<LoanView>>>> {
    let owner_filter = if user.role.subsumes(UserRole::Staff) {
        None
    } else {
        Some(user.user_id)
    };

    let page = app_state.loan_service.list_loans(owner_filter, &query).await?;

    Ok(Json(ApiResponse::ok(PaginatedResponse {
        data: page
            .data
            .into_iter()
            .map(|loan| loan.view_for(user.role))
            .collect(),
        total: page.total,
        page: page.page,
        limit: page.limit,
    })))
}

/// Get one loan; owner or staff, projected per role
pub async fn get_loan(
    user: AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<LoanView>>> {
    let loan = app_state.loan_service.get_loan(id).await?;
    authz::require_role_or_owner(&user, UserRole::Staff, loan.owner_id)?;

    Ok(Json(ApiResponse::ok(loan.view_for(user.role))))
}

/// Move a loan through its review workflow (staff)
pub async fn update_loan_status(
    StaffUser(staff): StaffUser,
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> ApiResult<Json<ApiResponse<LoanView>>> {
    let loan = app_state.loan_service.update_status(id, request).await?;
    Ok(Json(ApiResponse::ok(loan.view_for(staff.role))))
}

/// Mark the service fee paid (staff)
pub async fn mark_service_fee_paid(
    StaffUser(staff): StaffUser,
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<LoanView>>> {
    let loan = app_state.loan_service.mark_service_fee_paid(id).await?;
    Ok(Json(ApiResponse::ok(loan.view_for(staff.role))))
}

/// Configure EMI schedule settings (staff)
pub async fn configure_emi(
    StaffUser(staff): StaffUser,
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(settings): Json<EmiSettings>,
) -> ApiResult<Json<ApiResponse<LoanView>>> {
    let loan = app_state.loan_service.configure_emi(id, settings).await?;
    Ok(Json(ApiResponse::ok(loan.view_for(staff.role))))
}

/// Start the EMI schedule (staff); requires the service fee to be paid
pub async fn start_emi(
    StaffUser(staff): StaffUser,
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(settings): Json<EmiSettings>,
) -> ApiResult<Json<ApiResponse<LoanView>>> {
    let loan = app_state.loan_service.start_emi(id, settings).await?;
    Ok(Json(ApiResponse::ok(loan.view_for(staff.role))))
}

/// Record one month's installment payment (staff)
pub async fn record_payment(
    StaffUser(staff): StaffUser,
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<RecordPaymentRequest>,
) -> ApiResult<Json<ApiResponse<LoanView>>> {
    let loan = app_state
        .loan_service
        .record_payment(id, request, staff.user_id)
        .await?;

    Ok(Json(ApiResponse::ok(loan.view_for(staff.role))))
}

/// Recompute the late penalty now.
///
/// Staff may trigger this for any loan; the record's owner may trigger it
/// for their own (ownership override).
pub async fn recompute_penalty(
    user: AuthenticatedUser,
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<PenaltyRecomputeResponse>>> {
    let loan = app_state.loan_service.get_loan(id).await?;
    authz::require_role_or_owner(&user, UserRole::Staff, loan.owner_id)?;

    let (penalty_amount, record) = app_state.loan_service.recompute_penalty(id).await?;

    Ok(Json(ApiResponse::ok(PenaltyRecomputeResponse {
        penalty_amount,
        record: record.view_for(user.role),
    })))
}

/// Waive an active penalty (admin)
pub async fn waive_penalty(
    AdminUser(admin): AdminUser,
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<LoanView>>> {
    let loan = app_state
        .loan_service
        .waive_penalty(id, admin.user_id)
        .await?;

    Ok(Json(ApiResponse::ok(loan.view_for(admin.role))))
}
