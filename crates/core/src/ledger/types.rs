//! Account and transaction types.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transaction reasons written to the audit trail.
pub mod reasons {
    /// Charge taken when a job is accepted.
    pub const JOB_CREATED: &str = "job_created";
    /// Refund after a job failed.
    pub const JOB_FAILED: &str = "job_failed";
    /// Refund after a pending job was cancelled.
    pub const JOB_CANCELLED: &str = "job_cancelled";
    /// Refund of a reservation whose job record could not be written.
    pub const JOB_CREATE_FAILED: &str = "job_create_failed";
}

/// Account tier. Determines the request rate limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    #[default]
    FreeTrial,
    Curator,
    Studio,
    Gallery,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::FreeTrial => "FREE_TRIAL",
            Tier::Curator => "CURATOR",
            Tier::Studio => "STUDIO",
            Tier::Gallery => "GALLERY",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FREE_TRIAL" => Ok(Tier::FreeTrial),
            "CURATOR" => Ok(Tier::Curator),
            "STUDIO" => Ok(Tier::Studio),
            "GALLERY" => Ok(Tier::Gallery),
            other => Err(format!("unknown tier: {}", other)),
        }
    }
}

/// A credit account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub tier: Tier,
    /// Current balance in credits.
    pub balance: i64,
    /// Net credits spent (deductions minus refunds).
    pub total_spent: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Deduction,
    Refund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deduction => "deduction",
            TransactionKind::Refund => "refund",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deduction" => Ok(TransactionKind::Deduction),
            "refund" => Ok(TransactionKind::Refund),
            other => Err(format!("unknown transaction kind: {}", other)),
        }
    }
}

/// Immutable audit record of one balance mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: i64,
    pub account_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: i64,
    pub reason: String,
    pub job_id: Option<String>,
    pub balance_after: i64,
    pub created_at: DateTime<Utc>,
}

/// One page of an account's transaction history.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionPage {
    pub transactions: Vec<LedgerTransaction>,
    pub total: i64,
}
