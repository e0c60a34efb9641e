// Allow dead code: API response structs have fields for completeness
#![allow(dead_code)]

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct QuotaBalance {
    pub balance: u64,
}

/// One entry of the quota ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaTransaction {
    #[serde(default)]
    pub id: Option<i64>,
    /// Signed change applied to the balance (grants are positive).
    pub amount: i64,
    #[serde(default)]
    pub balance_after: Option<i64>,
    #[serde(default, alias = "type")]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl QuotaTransaction {
    pub fn amount_display(&self) -> String {
        if self.amount > 0 {
            format!("+{}", self.amount)
        } else {
            self.amount.to_string()
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub pages: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionPage {
    pub transactions: Vec<QuotaTransaction>,
    #[serde(default)]
    pub pagination: Pagination,
}

/// Answer to "can I afford `count` of `action`?"
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaCheck {
    pub sufficient: bool,
    pub current_balance: i64,
    pub required: i64,
    pub action: String,
    pub count: u32,
}
