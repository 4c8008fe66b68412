//! Route definitions for the LendFlow API

use axum::{
    routing::{delete, get, post, put},
    Router,
};

use crate::handlers::*;
use crate::state::AppState;

// Account routes
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register_account))
        .route("/api/users", get(list_accounts))
        .route("/api/users/:id/block", post(block_account))
        .route("/api/users/:id/unblock", post(unblock_account))
        .route("/api/users/:id", delete(delete_account))
}

// Loan application and review routes
pub fn loan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/loans", post(create_loan))
        .route("/api/loans", get(list_loans))
        .route("/api/loans/:id", get(get_loan))
        .route("/api/loans/:id/status", post(update_loan_status))
        .route("/api/loans/:id/service-fee", post(mark_service_fee_paid))
}

// EMI schedule and penalty routes
pub fn emi_routes() -> Router<AppState> {
    Router::new()
        .route("/api/loans/:id/emi", put(configure_emi))
        .route("/api/loans/:id/emi/start", post(start_emi))
        .route("/api/loans/:id/payments", post(record_payment))
        .route("/api/loans/:id/penalty/recompute", post(recompute_penalty))
        .route("/api/loans/:id/penalty/waive", post(waive_penalty))
}

// Document metadata routes
pub fn document_routes() -> Router<AppState> {
    Router::new()
        .route("/api/loans/:id/documents", post(create_document))
        .route("/api/loans/:id/documents", get(list_documents))
        .route("/api/documents/:id/url", get(document_url))
}
