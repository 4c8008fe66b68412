//! API handlers, grouped by resource

mod accounts;
mod documents;
mod loans;

pub use accounts::*;
pub use documents::*;
pub use loans::*;
