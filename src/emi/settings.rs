//! EMI schedule settings: validation and schedule anchoring

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use validator::Validate;

use crate::error::{ApiError, ApiResult};
use crate::loan::LoanRecord;

/// Repayment schedule parameters for a loan record
///
/// Bounds: `emi_date` 1-31, `emi_percent` greater than zero and at most 100,
/// `tenure_months` 1-60. A zero percentage is rejected the same way a missing
/// one is.
#[derive(Debug, Clone, Copy, Deserialize, Validate)]
pub struct EmiSettings {
    #[validate(range(min = 1, max = 31))]
    pub emi_date: i32,
    pub emi_percent: f64,
    #[validate(range(min = 1, max = 60))]
    pub tenure_months: i32,
}

impl EmiSettings {
    /// Apply validated settings to a record.
    ///
    /// Reconfiguring an already-anchored schedule corrects rate and tenure
    /// without resetting the payment calendar: `emi_started_at` is never
    /// touched here.
    pub fn configure(&self, record: &mut LoanRecord) -> ApiResult<()> {
        self.validate()
            .map_err(|e| ApiError::Validation(e.to_string()))?;
        if !(self.emi_percent > 0.0 && self.emi_percent <= 100.0) {
            return Err(ApiError::Validation(
                "emi_percent must be greater than 0 and at most 100".to_string(),
            ));
        }

        record.emi_date = Some(self.emi_date);
        record.emi_percent = Some(self.emi_percent);
        record.tenure_months = Some(self.tenure_months);
        Ok(())
    }

    /// Anchor the repayment schedule on a record.
    ///
    /// Requires the service fee to have been paid. The first due date is day
    /// `emi_date` of the month following `now`; `emi_started` stays false
    /// until the first installment is actually recorded.
    pub fn start(&self, record: &mut LoanRecord, now: DateTime<Utc>) -> ApiResult<()> {
        if !record.service_fee_paid {
            return Err(ApiError::Precondition(
                "Service fee must be paid before the EMI schedule can start".to_string(),
            ));
        }

        self.configure(record)?;

        record.emi_started_at = Some(first_due_date(now, self.emi_date as u32)?);
        record.emi_started = false;
        record.principal_amount = Some(record.principal_amount.unwrap_or(record.amount));
        Ok(())
    }
}

/// Day `emi_date` of the calendar month following `now`.
///
/// The day is clamped to the target month's length, so a due-day of 31 lands
/// on Feb 28/29 when the next month is February.
pub fn first_due_date(now: DateTime<Utc>, emi_date: u32) -> ApiResult<DateTime<Utc>> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };

    let day = emi_date.min(days_in_month(year, month));
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| ApiError::Internal(format!("invalid due date {year}-{month}-{day}")))?;

    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| ApiError::Internal("invalid due timestamp".to_string()))?;

    Ok(Utc.from_utc_datetime(&midnight))
}

pub(crate) fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    // First of the next month minus one day
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::{LoanStatus, PaymentLedger};
    use sqlx::types::Json;
    use uuid::Uuid;

    fn record(service_fee_paid: bool) -> LoanRecord {
        LoanRecord {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            status: LoanStatus::Approved,
            amount: 250_000,
            purpose: "equipment".to_string(),
            internal_notes: None,
            service_fee_paid,
            service_fee_paid_at: None,
            emi_date: None,
            emi_percent: None,
            tenure_months: None,
            principal_amount: None,
            emi_started: false,
            emi_started_at: None,
            emi_payments: Json(PaymentLedger::new()),
            penalty_amount: 0,
            penalty_started_at: None,
            penalty_waived: false,
            penalty_waived_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn settings(emi_date: i32, emi_percent: f64, tenure_months: i32) -> EmiSettings {
        EmiSettings {
            emi_date,
            emi_percent,
            tenure_months,
        }
    }

    #[test]
    fn test_configure_stores_fields_exactly() {
        let mut rec = record(false);
        settings(7, 1.25, 24).configure(&mut rec).unwrap();
        assert_eq!(rec.emi_date, Some(7));
        assert_eq!(rec.emi_percent, Some(1.25));
        assert_eq!(rec.tenure_months, Some(24));
    }

    #[test]
    fn test_configure_accepts_bounds() {
        let mut rec = record(false);
        assert!(settings(1, 0.01, 1).configure(&mut rec).is_ok());
        assert!(settings(31, 100.0, 60).configure(&mut rec).is_ok());
    }

    #[test]
    fn test_configure_rejects_out_of_bounds() {
        let mut rec = record(false);
        for bad in [
            settings(0, 1.0, 12),
            settings(32, 1.0, 12),
            settings(7, 0.0, 12),
            settings(7, -1.0, 12),
            settings(7, 100.5, 12),
            settings(7, 1.0, 0),
            settings(7, 1.0, 61),
        ] {
            let err = bad.configure(&mut rec).unwrap_err();
            assert_eq!(err.error_code(), "VALIDATION_ERROR", "{:?}", bad);
        }
    }

    #[test]
    fn test_configure_preserves_anchor_date() {
        let mut rec = record(true);
        let now = Utc.with_ymd_and_hms(2024, 2, 10, 12, 0, 0).unwrap();
        settings(7, 1.0, 12).start(&mut rec, now).unwrap();
        let anchor = rec.emi_started_at;

        settings(7, 2.0, 18).configure(&mut rec).unwrap();
        assert_eq!(rec.emi_started_at, anchor);
        assert_eq!(rec.emi_percent, Some(2.0));
    }

    #[test]
    fn test_start_requires_service_fee() {
        let mut rec = record(false);
        let err = settings(7, 1.0, 12)
            .start(&mut rec, Utc::now())
            .unwrap_err();
        assert_eq!(err.error_code(), "PRECONDITION_FAILED");
        assert!(rec.emi_started_at.is_none());
    }

    #[test]
    fn test_start_sets_first_due_date_next_month() {
        let mut rec = record(true);
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 9, 30, 0).unwrap();
        settings(7, 1.0, 12).start(&mut rec, now).unwrap();

        assert_eq!(
            rec.emi_started_at,
            Some(Utc.with_ymd_and_hms(2024, 4, 7, 0, 0, 0).unwrap())
        );
        assert!(!rec.emi_started);
        assert_eq!(rec.principal_amount, Some(250_000));
    }

    #[test]
    fn test_start_keeps_existing_principal() {
        let mut rec = record(true);
        rec.principal_amount = Some(240_000);
        settings(7, 1.0, 12).start(&mut rec, Utc::now()).unwrap();
        assert_eq!(rec.principal_amount, Some(240_000));
    }

    #[test]
    fn test_first_due_date_rolls_over_year() {
        let now = Utc.with_ymd_and_hms(2024, 12, 20, 0, 0, 0).unwrap();
        let due = first_due_date(now, 5).unwrap();
        assert_eq!(due, Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_first_due_date_clamps_short_months() {
        // Due-day 31 starting in January points at February
        let now = Utc.with_ymd_and_hms(2023, 1, 10, 0, 0, 0).unwrap();
        let due = first_due_date(now, 31).unwrap();
        assert_eq!(due, Utc.with_ymd_and_hms(2023, 2, 28, 0, 0, 0).unwrap());

        // Leap year February keeps the 29th
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let due = first_due_date(now, 31).unwrap();
        assert_eq!(due, Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2024, 4), 30);
        assert_eq!(days_in_month(2024, 12), 31);
    }
}
