//! Late-payment penalty engine
//!
//! The accrual formula is a pluggable strategy behind [`PenaltyPolicy`]; the
//! engine itself only manages the penalty state transitions on the record.
//! A policy must be idempotent for a fixed `now`.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use uuid::Uuid;

use crate::emi::ledger::payment_key;
use crate::emi::settings::days_in_month;
use crate::loan::LoanRecord;

/// Strategy computing the penalty outstanding on a record at `now`.
pub trait PenaltyPolicy: Send + Sync {
    /// The full penalty amount for the current overdue installment, or 0 when
    /// nothing is overdue. Repeated calls with the same `now` must agree.
    fn compute(&self, record: &LoanRecord, now: DateTime<Utc>) -> i64;
}

/// Default policy: a flat daily basis-point charge on the principal for each
/// full day the current installment is overdue.
#[derive(Debug, Clone, Copy)]
pub struct DailyRatePolicy {
    daily_rate_bps: i64,
}

impl DailyRatePolicy {
    pub fn new(daily_rate_bps: i64) -> Self {
        Self { daily_rate_bps }
    }
}

impl PenaltyPolicy for DailyRatePolicy {
    fn compute(&self, record: &LoanRecord, now: DateTime<Utc>) -> i64 {
        let (Some(emi_date), Some(anchor), Some(principal)) = (
            record.emi_date,
            record.emi_started_at,
            record.principal_amount,
        ) else {
            return 0;
        };

        // Due date for the current calendar month, day clamped for short
        // months.
        let day = (emi_date as u32).min(days_in_month(now.year(), now.month()));
        let Some(due) = Utc
            .with_ymd_and_hms(now.year(), now.month(), day, 0, 0, 0)
            .single()
        else {
            return 0;
        };

        // Repayment hasn't reached this period yet
        if due < anchor || now <= due {
            return 0;
        }

        // Installment already recorded for this period
        let month = format!("{:04}-{:02}", now.year(), now.month());
        if record.emi_payments.0.contains_key(&payment_key(&month, emi_date)) {
            return 0;
        }

        let days_late = (now - due).num_days();
        if days_late <= 0 {
            return 0;
        }

        principal * self.daily_rate_bps * days_late / 10_000
    }
}

/// Recompute the penalty on a record at `now`.
///
/// Sets `penalty_started_at` on the first accrual and leaves it untouched
/// while a penalty remains active. A waived penalty stays waived until the
/// next payment clears the flag; the recurring sweep must not resurrect it.
/// Returns the new penalty amount.
pub fn accrue(record: &mut LoanRecord, policy: &dyn PenaltyPolicy, now: DateTime<Utc>) -> i64 {
    if record.penalty_waived {
        return record.penalty_amount;
    }

    let amount = policy.compute(record, now).max(0);
    if amount > 0 && record.penalty_started_at.is_none() {
        record.penalty_started_at = Some(now);
    }
    record.penalty_amount = amount;
    amount
}

/// Waive an active penalty.
///
/// A call with no active penalty succeeds but changes nothing; returns
/// whether state changed. `penalty_started_at` is deliberately left as the
/// last accrual set it — only a payment clears it.
pub fn waive(record: &mut LoanRecord, actor: Uuid) -> bool {
    if record.penalty_amount <= 0 {
        return false;
    }

    record.penalty_amount = 0;
    record.penalty_waived = true;
    record.penalty_waived_by = Some(actor);
    true
}
