//! Application state shared across handlers

use std::sync::Arc;

use crate::auth::AuthService;
use crate::document_service::DocumentService;
use crate::loan_service::LoanService;
use crate::user_service::UserService;

use axum::extract::FromRef;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub loan_service: Arc<LoanService>,
    pub user_service: Arc<UserService>,
    pub document_service: Arc<DocumentService>,
}

impl AppState {
    pub fn new(
        auth_service: Arc<AuthService>,
        loan_service: Arc<LoanService>,
        user_service: Arc<UserService>,
        document_service: Arc<DocumentService>,
    ) -> Self {
        Self {
            auth_service,
            loan_service,
            user_service,
            document_service,
        }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}

impl FromRef<AppState> for Arc<LoanService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.loan_service.clone()
    }
}

impl FromRef<AppState> for Arc<UserService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.user_service.clone()
    }
}

impl FromRef<AppState> for Arc<DocumentService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.document_service.clone()
    }
}
