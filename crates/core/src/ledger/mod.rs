//! Credit ledger.
//!
//! Accounts hold an integer credit balance. Work is paid for up front with
//! [`Ledger::reserve`] and compensated with [`Ledger::release`]; every
//! mutation appends an immutable [`LedgerTransaction`].

mod sqlite;
mod store;
mod types;

pub use sqlite::SqliteLedger;
pub use store::{Ledger, LedgerError};
pub use types::{reasons, Account, LedgerTransaction, Tier, TransactionKind, TransactionPage};
