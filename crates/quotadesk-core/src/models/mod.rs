//! Data models for the quota service.
//!
//! - `User`: the signed-in identity, plus the menu label helpers
//! - Quota types: `QuotaBalance`, `QuotaTransaction`, `QuotaCheck`

pub mod quota;
pub mod user;

pub use quota::{Pagination, QuotaBalance, QuotaCheck, QuotaTransaction, TransactionPage};
pub use user::User;
