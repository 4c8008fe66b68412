//! Loan service layer - business logic for the loan lifecycle
//!
//! Every mutation is a read-modify-write under the row lock: the record is
//! fetched `FOR UPDATE`, mutated in memory by the emi/authz core, and written
//! back in a single `UPDATE` inside the same transaction. A reader can never
//! observe a payment recorded with penalty state not yet cleared.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::emi::{self, EmiSettings, PenaltyPolicy};
use crate::error::{ApiError, ApiResult};
use crate::loan::{
    CreateLoanRequest, ListLoansQuery, LoanRecord, LoanStatus, RecordPaymentRequest,
    UpdateStatusRequest,
};
use crate::models::PaginatedResponse;

/// Loan service for managing the loan lifecycle
#[derive(Clone)]
pub struct LoanService {
    db_pool: PgPool,
    penalty_policy: Arc<dyn PenaltyPolicy>,
}

impl LoanService {
    pub fn new(db_pool: PgPool, penalty_policy: Arc<dyn PenaltyPolicy>) -> Self {
        Self {
            db_pool,
            penalty_policy,
        }
    }

    /// Submit a new loan application
    pub async fn create_loan(
        &self,
        owner_id: Uuid,
        request: CreateLoanRequest,
    ) -> ApiResult<LoanRecord> {
        request.validate()?;

        let loan = sqlx::query_as::<_, LoanRecord>(
            r#"
            INSERT INTO loans (
                id, owner_id, status, amount, purpose, service_fee_paid,
                emi_started, emi_payments, penalty_amount, penalty_waived,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, false, false, '{}'::jsonb, 0, false, now(), now())
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(owner_id)
        .bind(LoanStatus::Pending)
        .bind(request.amount)
        .bind(&request.purpose)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(loan_id = %loan.id, owner_id = %owner_id, "Loan application created");

        Ok(loan)
    }

    /// Get a loan by ID
    pub async fn get_loan(&self, id: Uuid) -> ApiResult<LoanRecord> {
        let loan = sqlx::query_as::<_, LoanRecord>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;

        loan.ok_or_else(|| ApiError::NotFound(format!("Loan {id} not found")))
    }

    /// List loans, optionally filtered by status; `owner_id` restricts the
    /// listing to one customer's records.
    pub async fn list_loans(
        &self,
        owner_id: Option<Uuid>,
        query: &ListLoansQuery,
    ) -> ApiResult<PaginatedResponse<LoanRecord>> {
        let params = crate::models::PaginationParams {
            page: query.page,
            limit: query.limit,
        };
        let (page, limit, offset) = params.resolve();

        let loans = sqlx::query_as::<_, LoanRecord>(
            r#"
            SELECT * FROM loans
            WHERE ($1::uuid IS NULL OR owner_id = $1)
              AND ($2::loan_status IS NULL OR status = $2)
            ORDER BY created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(owner_id)
        .bind(query.status)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db_pool)
        .await?;

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM loans
            WHERE ($1::uuid IS NULL OR owner_id = $1)
              AND ($2::loan_status IS NULL OR status = $2)
            "#,
        )
        .bind(owner_id)
        .bind(query.status)
        .fetch_one(&self.db_pool)
        .await?;

        Ok(PaginatedResponse {
            data: loans,
            total,
            page,
            limit,
        })
    }

    /// Drive a loan through its review workflow
    pub async fn update_status(
        &self,
        id: Uuid,
        request: UpdateStatusRequest,
    ) -> ApiResult<LoanRecord> {
        let mut tx = self.db_pool.begin().await?;

        let loan = fetch_for_update(&mut tx, id).await?;

        if !loan.status.can_transition_to(request.status) {
            return Err(ApiError::Precondition(format!(
                "Cannot move loan from {:?} to {:?}",
                loan.status, request.status
            )));
        }

        let updated = sqlx::query_as::<_, LoanRecord>(
            r#"
            UPDATE loans
            SET status = $1, internal_notes = COALESCE($2, internal_notes), updated_at = now()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(request.status)
        .bind(&request.internal_note)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(loan_id = %id, status = ?updated.status, "Loan status updated");

        Ok(updated)
    }

    /// Mark the service fee as paid. Idempotent: marking twice keeps the
    /// original timestamp.
    pub async fn mark_service_fee_paid(&self, id: Uuid) -> ApiResult<LoanRecord> {
        let mut tx = self.db_pool.begin().await?;

        let loan = fetch_for_update(&mut tx, id).await?;
        if loan.service_fee_paid {
            tx.commit().await?;
            return Ok(loan);
        }

        let updated = sqlx::query_as::<_, LoanRecord>(
            r#"
            UPDATE loans
            SET service_fee_paid = true, service_fee_paid_at = now(), updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(updated)
    }

    /// Validate and apply repayment schedule settings without touching the
    /// schedule anchor.
    pub async fn configure_emi(&self, id: Uuid, settings: EmiSettings) -> ApiResult<LoanRecord> {
        let mut tx = self.db_pool.begin().await?;

        let mut loan = fetch_for_update(&mut tx, id).await?;
        ensure_not_terminal(&loan)?;

        settings.configure(&mut loan)?;

        let updated = sqlx::query_as::<_, LoanRecord>(
            r#"
            UPDATE loans
            SET emi_date = $1, emi_percent = $2, tenure_months = $3, updated_at = now()
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(loan.emi_date)
        .bind(loan.emi_percent)
        .bind(loan.tenure_months)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(updated)
    }

    /// Anchor the repayment schedule; requires the service fee to be paid.
    pub async fn start_emi(&self, id: Uuid, settings: EmiSettings) -> ApiResult<LoanRecord> {
        let mut tx = self.db_pool.begin().await?;

        let mut loan = fetch_for_update(&mut tx, id).await?;
        ensure_not_terminal(&loan)?;

        settings.start(&mut loan, Utc::now())?;

        let updated = sqlx::query_as::<_, LoanRecord>(
            r#"
            UPDATE loans
            SET emi_date = $1, emi_percent = $2, tenure_months = $3,
                emi_started = $4, emi_started_at = $5, principal_amount = $6,
                updated_at = now()
            WHERE id = $7
            RETURNING *
            "#,
        )
        .bind(loan.emi_date)
        .bind(loan.emi_percent)
        .bind(loan.tenure_months)
        .bind(loan.emi_started)
        .bind(loan.emi_started_at)
        .bind(loan.principal_amount)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(loan_id = %id, first_due = ?updated.emi_started_at, "EMI schedule started");

        Ok(updated)
    }

    /// Record one month's installment payment.
    ///
    /// The ledger write and the penalty reset land in one `UPDATE`; they are
    /// never observable separately.
    pub async fn record_payment(
        &self,
        id: Uuid,
        request: RecordPaymentRequest,
        actor: Uuid,
    ) -> ApiResult<LoanRecord> {
        request.validate()?;

        let mut tx = self.db_pool.begin().await?;

        let mut loan = fetch_for_update(&mut tx, id).await?;
        ensure_not_terminal(&loan)?;

        emi::apply_payment(&mut loan, &request.month, request.amount, actor, Utc::now())?;

        let updated = sqlx::query_as::<_, LoanRecord>(
            r#"
            UPDATE loans
            SET emi_payments = $1, emi_started = $2,
                penalty_amount = 0, penalty_started_at = NULL,
                penalty_waived = false, penalty_waived_by = NULL,
                updated_at = now()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(&loan.emi_payments)
        .bind(loan.emi_started)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(loan_id = %id, month = %request.month, "Installment payment recorded");

        Ok(updated)
    }

    /// Recompute the late penalty for a loan now. Returns the new amount and
    /// the updated record.
    pub async fn recompute_penalty(&self, id: Uuid) -> ApiResult<(i64, LoanRecord)> {
        let mut tx = self.db_pool.begin().await?;

        let mut loan = fetch_for_update(&mut tx, id).await?;

        let amount = emi::accrue(&mut loan, self.penalty_policy.as_ref(), Utc::now());

        let updated = sqlx::query_as::<_, LoanRecord>(
            r#"
            UPDATE loans
            SET penalty_amount = $1, penalty_started_at = $2, updated_at = now()
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(loan.penalty_amount)
        .bind(loan.penalty_started_at)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((amount, updated))
    }

    /// Waive an active penalty. A waive with nothing outstanding succeeds
    /// without changing state.
    pub async fn waive_penalty(&self, id: Uuid, actor: Uuid) -> ApiResult<LoanRecord> {
        let mut tx = self.db_pool.begin().await?;

        let mut loan = fetch_for_update(&mut tx, id).await?;

        if !emi::waive(&mut loan, actor) {
            tx.commit().await?;
            return Ok(loan);
        }

        let updated = sqlx::query_as::<_, LoanRecord>(
            r#"
            UPDATE loans
            SET penalty_amount = 0, penalty_waived = true, penalty_waived_by = $1,
                updated_at = now()
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(actor)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(loan_id = %id, waived_by = %actor, "Penalty waived");

        Ok(updated)
    }

    /// IDs of loans with an anchored schedule that may be accruing penalties
    async fn accruable_loan_ids(&self) -> ApiResult<Vec<Uuid>> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT id FROM loans
            WHERE emi_started_at IS NOT NULL
              AND status = 'approved'
              AND penalty_waived = false
            "#,
        )
        .fetch_all(&self.db_pool)
        .await?;

        Ok(ids)
    }
}

fn ensure_not_terminal(loan: &LoanRecord) -> ApiResult<()> {
    if loan.status.is_terminal() {
        Err(ApiError::Precondition(format!(
            "Loan is {:?} and can no longer be serviced",
            loan.status
        )))
    } else {
        Ok(())
    }
}

async fn fetch_for_update(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    id: Uuid,
) -> ApiResult<LoanRecord> {
    let loan = sqlx::query_as::<_, LoanRecord>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?;

    loan.ok_or_else(|| ApiError::NotFound(format!("Loan {id} not found")))
}

/// Recurring penalty sweep.
///
/// Every `interval` the sweep re-runs accrual over loans in active
/// repayment. Each loan is its own
/// transaction; one failure is logged and skipped, never retried within the
/// tick.
pub async fn penalty_sweep(service: Arc<LoanService>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let ids = match service.accruable_loan_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(error = %e, "Penalty sweep could not list loans");
                continue;
            }
        };

        for id in ids {
            match service.recompute_penalty(id).await {
                Ok((amount, _)) if amount > 0 => {
                    tracing::debug!(loan_id = %id, penalty = amount, "Penalty accrued");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(loan_id = %id, error = %e, "Penalty accrual failed");
                }
            }
        }
    }
}
