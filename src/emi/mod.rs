//! EMI scheduling, payment ledger, and penalty engine
//!
//! Pure record-level logic for the repayment core. Persistence of the
//! resulting state is the loan service's job; everything here is
//! deterministic in `now` and unit-tested without a database.

pub mod ledger;
pub mod penalty;
pub mod settings;

pub use ledger::{apply_payment, payment_key};
pub use penalty::{accrue, waive, DailyRatePolicy, PenaltyPolicy};
pub use settings::{first_due_date, EmiSettings};
