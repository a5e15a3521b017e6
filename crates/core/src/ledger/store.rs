//! Ledger trait and error type.

use thiserror::Error;

use super::{Account, Tier, TransactionPage};

/// Errors from ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The reservation exceeds the current balance. Nothing was mutated.
    #[error("insufficient credits: balance {balance}, required {required}")]
    InsufficientFunds { balance: i64, required: i64 },

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("database error: {0}")]
    Database(String),
}

/// Atomic per-account credit storage.
///
/// `reserve` and `release` are read-modify-write operations that must
/// serialize against each other for the same account.
pub trait Ledger: Send + Sync {
    /// Create the account if it does not exist. An existing account is left
    /// untouched and returned as-is.
    fn open_account(
        &self,
        account_id: &str,
        tier: Tier,
        initial_balance: i64,
    ) -> Result<Account, LedgerError>;

    /// Look up an account.
    fn account(&self, account_id: &str) -> Result<Option<Account>, LedgerError>;

    /// Deduct `amount` and return the new balance.
    ///
    /// Fails with [`LedgerError::InsufficientFunds`] when `amount` exceeds the
    /// balance, leaving the account unchanged.
    fn reserve(
        &self,
        account_id: &str,
        amount: i64,
        reason: &str,
        job_id: Option<&str>,
    ) -> Result<i64, LedgerError>;

    /// Credit `amount` back and return the new balance.
    ///
    /// Each call is additive; callers are responsible for releasing a charge
    /// only once.
    fn release(
        &self,
        account_id: &str,
        amount: i64,
        reason: &str,
        job_id: Option<&str>,
    ) -> Result<i64, LedgerError>;

    /// Refund a job's charge at most once.
    ///
    /// Returns the new balance, or `None` if a refund for `job_id` is already
    /// on record, in which case nothing is written.
    fn refund_job(
        &self,
        account_id: &str,
        job_id: &str,
        amount: i64,
        reason: &str,
    ) -> Result<Option<i64>, LedgerError>;

    /// Transaction history, newest first.
    fn transactions(
        &self,
        account_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<TransactionPage, LedgerError>;
}
