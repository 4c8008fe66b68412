//! EMI payment ledger
//!
//! Records one installment per (month, due-day) key and discharges any
//! outstanding penalty as part of the same logical update.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::loan::{LoanRecord, PaymentRecord};

/// Build the ledger key for an installment: `"{month}-{emi_date:02}"`.
///
/// `month` is caller-supplied and already encodes the year, e.g. `"2024-03"`;
/// the key becomes `"2024-03-07"` for a due-day of 7.
pub fn payment_key(month: &str, emi_date: i32) -> String {
    format!("{month}-{emi_date:02}")
}

/// Record one month's payment against the schedule.
///
/// Captures whether a penalty was outstanding before this call and folds its
/// amount into the new entry, then unconditionally clears all penalty state.
/// An existing entry at the same key is overwritten; re-marking a month's
/// payment replaces history for that key and is not idempotent-safe against
/// double submission with different amounts.
pub fn apply_payment(
    record: &mut LoanRecord,
    month: &str,
    amount: i64,
    actor: Uuid,
    now: DateTime<Utc>,
) -> ApiResult<PaymentRecord> {
    let emi_date = record.emi_date.ok_or_else(|| {
        ApiError::Precondition("EMI schedule is not configured for this loan".to_string())
    })?;

    if !is_year_month(month) {
        return Err(ApiError::Validation(format!(
            "month must be \"YYYY-MM\", got {month:?}"
        )));
    }

    let key = payment_key(month, emi_date);

    let penalty_included = record.penalty_amount > 0;
    let entry = PaymentRecord {
        amount,
        paid_at: now,
        marked_by: actor,
        penalty_included,
        penalty_amount: if penalty_included {
            record.penalty_amount
        } else {
            0
        },
    };

    record.emi_payments.0.insert(key, entry.clone());
    record.emi_started = true;

    // A payment fully discharges whatever penalty was outstanding at that
    // due date, whether or not one existed.
    record.penalty_amount = 0;
    record.penalty_started_at = None;
    record.penalty_waived = false;
    record.penalty_waived_by = None;

    Ok(entry)
}

fn is_year_month(month: &str) -> bool {
    let bytes = month.as_bytes();
    bytes.len() == 7
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4] == b'-'
        && bytes[5..].iter().all(u8::is_ascii_digit)
        && matches!(month[5..7].parse::<u8>(), Ok(1..=12))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::{LoanStatus, PaymentLedger};
    use sqlx::types::Json;

    fn record(emi_date: Option<i32>, penalty_amount: i64) -> LoanRecord {
        LoanRecord {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            status: LoanStatus::Approved,
            amount: 100_000,
            purpose: "inventory".to_string(),
            internal_notes: None,
            service_fee_paid: true,
            service_fee_paid_at: Some(Utc::now()),
            emi_date,
            emi_percent: Some(1.0),
            tenure_months: Some(12),
            principal_amount: Some(100_000),
            emi_started: false,
            emi_started_at: Some(Utc::now()),
            emi_payments: Json(PaymentLedger::new()),
            penalty_amount,
            penalty_started_at: (penalty_amount > 0).then(Utc::now),
            penalty_waived: false,
            penalty_waived_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_payment_key_zero_pads() {
        assert_eq!(payment_key("2024-03", 7), "2024-03-07");
        assert_eq!(payment_key("2024-03", 15), "2024-03-15");
        assert_eq!(payment_key("2025-11", 1), "2025-11-01");
    }

    #[test]
    fn test_payment_clears_penalty_state() {
        let mut rec = record(Some(7), 50);
        let actor = Uuid::new_v4();

        let entry = apply_payment(&mut rec, "2024-03", 1000, actor, Utc::now()).unwrap();

        assert!(entry.penalty_included);
        assert_eq!(entry.penalty_amount, 50);
        assert_eq!(entry.marked_by, actor);

        assert_eq!(rec.penalty_amount, 0);
        assert!(rec.penalty_started_at.is_none());
        assert!(!rec.penalty_waived);
        assert!(rec.penalty_waived_by.is_none());
        assert!(rec.emi_started);
        assert_eq!(rec.emi_payments.0["2024-03-07"].amount, 1000);
    }

    #[test]
    fn test_payment_without_penalty() {
        let mut rec = record(Some(7), 0);
        let entry = apply_payment(&mut rec, "2024-04", 1000, Uuid::new_v4(), Utc::now()).unwrap();

        assert!(!entry.penalty_included);
        assert_eq!(entry.penalty_amount, 0);
        assert_eq!(rec.penalty_amount, 0);
        assert!(rec.penalty_started_at.is_none());
    }

    #[test]
    fn test_payment_resets_waiver_bookkeeping() {
        let mut rec = record(Some(7), 0);
        rec.penalty_waived = true;
        rec.penalty_waived_by = Some(Uuid::new_v4());

        apply_payment(&mut rec, "2024-05", 1000, Uuid::new_v4(), Utc::now()).unwrap();

        assert!(!rec.penalty_waived);
        assert!(rec.penalty_waived_by.is_none());
    }

    #[test]
    fn test_payment_overwrites_existing_key() {
        let mut rec = record(Some(7), 0);
        apply_payment(&mut rec, "2024-03", 1000, Uuid::new_v4(), Utc::now()).unwrap();
        apply_payment(&mut rec, "2024-03", 1500, Uuid::new_v4(), Utc::now()).unwrap();

        assert_eq!(rec.emi_payments.0.len(), 1);
        assert_eq!(rec.emi_payments.0["2024-03-07"].amount, 1500);
    }

    #[test]
    fn test_payment_requires_configured_schedule() {
        let mut rec = record(None, 0);
        let err = apply_payment(&mut rec, "2024-03", 1000, Uuid::new_v4(), Utc::now()).unwrap_err();
        assert_eq!(err.error_code(), "PRECONDITION_FAILED");
        assert!(rec.emi_payments.0.is_empty());
    }

    #[test]
    fn test_payment_rejects_malformed_month() {
        let mut rec = record(Some(7), 0);
        for bad in ["2024-3", "202403", "2024-13", "2024-00", "24-03-01", "march"] {
            let err =
                apply_payment(&mut rec, bad, 1000, Uuid::new_v4(), Utc::now()).unwrap_err();
            assert_eq!(err.error_code(), "VALIDATION_ERROR", "{bad}");
        }
        assert!(rec.emi_payments.0.is_empty());
    }
}
