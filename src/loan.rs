//! Loan models for LendFlow
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use crate::models::UserRole;

/// Loan status enum
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    Pending,
    UnderReview,
    Approved,
    Rejected,
    Completed,
}

impl LoanStatus {
    /// Whether a staff-driven transition from `self` to `next` is legal.
    ///
    /// `Rejected` and `Completed` are terminal.
    pub fn can_transition_to(self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        matches!(
            (self, next),
            (Pending, UnderReview) | (UnderReview, Approved) | (UnderReview, Rejected) | (Approved, Completed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LoanStatus::Rejected | LoanStatus::Completed)
    }
}

/// One month's installment entry in the payment ledger
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PaymentRecord {
    pub amount: i64,
    pub paid_at: DateTime<Utc>,
    pub marked_by: Uuid,
    pub penalty_included: bool,
    pub penalty_amount: i64,
}

/// Keyed payment ledger, stored as a JSONB column
///
/// Keys are `"YYYY-MM-DD"` strings built by `emi::ledger::payment_key`;
/// insertion order is irrelevant, keys are unique.
pub type PaymentLedger = BTreeMap<String, PaymentRecord>;

/// Loan record model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LoanRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub status: LoanStatus,
    /// Requested amount, minor units
    pub amount: i64,
    pub purpose: String,
    pub internal_notes: Option<String>,
    pub service_fee_paid: bool,
    pub service_fee_paid_at: Option<DateTime<Utc>>,
    /// Due day of month, 1-31; unset until EMI is configured
    pub emi_date: Option<i32>,
    /// Monthly rate basis, percent
    pub emi_percent: Option<f64>,
    pub tenure_months: Option<i32>,
    /// Minor units; falls back to `amount` when the schedule starts
    pub principal_amount: Option<i64>,
    /// True once the first installment has been recorded
    pub emi_started: bool,
    /// First scheduled due date
    pub emi_started_at: Option<DateTime<Utc>>,
    pub emi_payments: Json<PaymentLedger>,
    pub penalty_amount: i64,
    pub penalty_started_at: Option<DateTime<Utc>>,
    pub penalty_waived: bool,
    pub penalty_waived_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request to submit a loan application
#[derive(Debug, Deserialize, validator::Validate)]
pub struct CreateLoanRequest {
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(length(min = 1, max = 500))]
    pub purpose: String,
}

/// Request to move a loan through its review workflow
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: LoanStatus,
    pub internal_note: Option<String>,
}

/// Request to record one month's installment payment
#[derive(Debug, Deserialize, validator::Validate)]
pub struct RecordPaymentRequest {
    /// Year and month of the installment, `"YYYY-MM"`
    #[validate(length(min = 7, max = 7))]
    pub month: String,
    #[validate(range(min = 1))]
    pub amount: i64,
}

/// Query for listing loans
#[derive(Debug, Deserialize)]
pub struct ListLoansQuery {
    pub status: Option<LoanStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Result of an explicit penalty recomputation
#[derive(Debug, Serialize)]
pub struct PenaltyRecomputeResponse {
    pub penalty_amount: i64,
    pub record: LoanView,
}

/// Loan detail as seen by its owner (role `user`)
///
/// This is the documented allow-list: internal staff notes, the penalty
/// bookkeeping trail, and audit identities never leave the service for a
/// `user`-role caller.
#[derive(Debug, Serialize, Deserialize)]
pub struct LoanOwnerView {
    pub id: Uuid,
    pub status: LoanStatus,
    pub amount: i64,
    pub purpose: String,
    pub service_fee_paid: bool,
    pub service_fee_paid_at: Option<DateTime<Utc>>,
    pub emi_date: Option<i32>,
    pub emi_percent: Option<f64>,
    pub tenure_months: Option<i32>,
    pub principal_amount: Option<i64>,
    pub emi_started: bool,
    pub emi_started_at: Option<DateTime<Utc>>,
    pub emi_payments: PaymentLedger,
    pub penalty_amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Full loan detail as seen by staff and admin callers
#[derive(Debug, Serialize, Deserialize)]
pub struct LoanStaffView {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub status: LoanStatus,
    pub amount: i64,
    pub purpose: String,
    pub internal_notes: Option<String>,
    pub service_fee_paid: bool,
    pub service_fee_paid_at: Option<DateTime<Utc>>,
    pub emi_date: Option<i32>,
    pub emi_percent: Option<f64>,
    pub tenure_months: Option<i32>,
    pub principal_amount: Option<i64>,
    pub emi_started: bool,
    pub emi_started_at: Option<DateTime<Utc>>,
    pub emi_payments: PaymentLedger,
    pub penalty_amount: i64,
    pub penalty_started_at: Option<DateTime<Utc>>,
    pub penalty_waived: bool,
    pub penalty_waived_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Role-filtered projection of a loan record
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoanView {
    Owner(Box<LoanOwnerView>),
    Staff(Box<LoanStaffView>),
}

impl LoanRecord {
    /// Project this record for a caller with the given role.
    ///
    /// Callers with role exactly `user` get the reduced owner view; staff and
    /// admin get everything.
    pub fn view_for(self, role: UserRole) -> LoanView {
        if role.subsumes(UserRole::Staff) {
            LoanView::Staff(Box::new(LoanStaffView {
                id: self.id,
                owner_id: self.owner_id,
                status: self.status,
                amount: self.amount,
                purpose: self.purpose,
                internal_notes: self.internal_notes,
                service_fee_paid: self.service_fee_paid,
                service_fee_paid_at: self.service_fee_paid_at,
                emi_date: self.emi_date,
                emi_percent: self.emi_percent,
                tenure_months: self.tenure_months,
                principal_amount: self.principal_amount,
                emi_started: self.emi_started,
                emi_started_at: self.emi_started_at,
                emi_payments: self.emi_payments.0,
                penalty_amount: self.penalty_amount,
                penalty_started_at: self.penalty_started_at,
                penalty_waived: self.penalty_waived,
                penalty_waived_by: self.penalty_waived_by,
                created_at: self.created_at,
                updated_at: self.updated_at,
            }))
        } else {
            LoanView::Owner(Box::new(LoanOwnerView {
                id: self.id,
                status: self.status,
                amount: self.amount,
                purpose: self.purpose,
                service_fee_paid: self.service_fee_paid,
                service_fee_paid_at: self.service_fee_paid_at,
                emi_date: self.emi_date,
                emi_percent: self.emi_percent,
                tenure_months: self.tenure_months,
                principal_amount: self.principal_amount,
                emi_started: self.emi_started,
                emi_started_at: self.emi_started_at,
                emi_payments: self.emi_payments.0,
                penalty_amount: self.penalty_amount,
                created_at: self.created_at,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_record() -> LoanRecord {
        LoanRecord {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            status: LoanStatus::Approved,
            amount: 500_000,
            purpose: "Working capital".to_string(),
            internal_notes: Some("income docs look thin".to_string()),
            service_fee_paid: true,
            service_fee_paid_at: Some(Utc::now()),
            emi_date: Some(7),
            emi_percent: Some(1.5),
            tenure_months: Some(12),
            principal_amount: Some(500_000),
            emi_started: false,
            emi_started_at: Some(Utc::now()),
            emi_payments: Json(PaymentLedger::new()),
            penalty_amount: 120,
            penalty_started_at: Some(Utc::now()),
            penalty_waived: false,
            penalty_waived_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_transitions() {
        use LoanStatus::*;
        assert!(Pending.can_transition_to(UnderReview));
        assert!(UnderReview.can_transition_to(Approved));
        assert!(UnderReview.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Completed));

        assert!(!Pending.can_transition_to(Approved));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Rejected.can_transition_to(UnderReview));
        assert!(!Completed.can_transition_to(Pending));
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(LoanStatus::Rejected.is_terminal());
        assert!(LoanStatus::Completed.is_terminal());
        assert!(!LoanStatus::Approved.is_terminal());
    }

    #[test]
    fn test_owner_view_omits_internal_fields() {
        let view = test_record().view_for(UserRole::User);
        let json = serde_json::to_value(&view).unwrap();
        let obj = json.as_object().unwrap();

        assert!(!obj.contains_key("internal_notes"));
        assert!(!obj.contains_key("owner_id"));
        assert!(!obj.contains_key("penalty_started_at"));
        assert!(!obj.contains_key("penalty_waived"));
        assert!(!obj.contains_key("penalty_waived_by"));
        // Owner still sees their own balance state
        assert_eq!(obj["penalty_amount"], 120);
    }

    #[test]
    fn test_staff_view_includes_internal_fields() {
        let view = test_record().view_for(UserRole::Staff);
        let json = serde_json::to_value(&view).unwrap();
        let obj = json.as_object().unwrap();

        assert_eq!(obj["internal_notes"], "income docs look thin");
        assert!(obj.contains_key("owner_id"));
        assert!(obj.contains_key("penalty_waived"));
    }

    #[test]
    fn test_admin_gets_staff_view() {
        let view = test_record().view_for(UserRole::Admin);
        assert!(matches!(view, LoanView::Staff(_)));
    }
}
