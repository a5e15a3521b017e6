//! SQLite-backed ledger implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use super::{
    Account, Ledger, LedgerError, LedgerTransaction, Tier, TransactionKind, TransactionPage,
};
use crate::metrics::{CREDITS_REFUNDED, CREDITS_RESERVED};

/// SQLite-backed ledger.
///
/// Every mutation runs inside an immediate transaction on a single mutex-guarded
/// connection, so reserves and releases against one account never interleave.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) the ledger tables in the database at `path`.
    pub fn new(path: &Path) -> Result<Self, LedgerError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory ledger (useful for testing).
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), LedgerError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                tier TEXT NOT NULL,
                balance INTEGER NOT NULL,
                total_spent INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS ledger_transactions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                amount INTEGER NOT NULL,
                reason TEXT NOT NULL,
                job_id TEXT,
                balance_after INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_ledger_tx_account ON ledger_transactions(account_id, id DESC);
            CREATE INDEX IF NOT EXISTS idx_ledger_tx_job ON ledger_transactions(job_id);
            "#,
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, LedgerError> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Database("ledger connection lock poisoned".to_string()))
    }

    fn row_to_account(row: &rusqlite::Row) -> rusqlite::Result<Account> {
        let tier_str: String = row.get(1)?;
        let created_at_str: String = row.get(4)?;
        Ok(Account {
            id: row.get(0)?,
            tier: tier_str.parse().unwrap_or_default(),
            balance: row.get(2)?,
            total_spent: row.get(3)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }

    fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<LedgerTransaction> {
        let kind_str: String = row.get(2)?;
        let created_at_str: String = row.get(7)?;
        Ok(LedgerTransaction {
            id: row.get(0)?,
            account_id: row.get(1)?,
            kind: kind_str.parse().unwrap_or(TransactionKind::Deduction),
            amount: row.get(3)?,
            reason: row.get(4)?,
            job_id: row.get(5)?,
            balance_after: row.get(6)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn append_transaction(
        conn: &Connection,
        account_id: &str,
        kind: TransactionKind,
        amount: i64,
        reason: &str,
        job_id: Option<&str>,
        balance_after: i64,
        now: &str,
    ) -> Result<(), LedgerError> {
        conn.execute(
            "INSERT INTO ledger_transactions (account_id, kind, amount, reason, job_id, balance_after, created_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![account_id, kind.as_str(), amount, reason, job_id, balance_after, now],
        )
        .map_err(db_err)?;
        Ok(())
    }

    /// Add `amount` to the account and record a refund. An unknown account is
    /// opened with the credit.
    fn credit(
        conn: &Connection,
        account_id: &str,
        amount: i64,
        reason: &str,
        job_id: Option<&str>,
    ) -> Result<i64, LedgerError> {
        let now = format_timestamp(Utc::now());
        let new_balance = match Self::current_balance(conn, account_id)? {
            Some(balance) => {
                let new_balance = balance + amount;
                conn.execute(
                    "UPDATE accounts SET balance = ?, total_spent = MAX(total_spent - ?, 0) WHERE id = ?",
                    params![new_balance, amount, account_id],
                )
                .map_err(db_err)?;
                new_balance
            }
            None => {
                conn.execute(
                    "INSERT INTO accounts (id, tier, balance, total_spent, created_at) VALUES (?, ?, ?, 0, ?)",
                    params![account_id, Tier::default().as_str(), amount, now],
                )
                .map_err(db_err)?;
                amount
            }
        };

        Self::append_transaction(
            conn,
            account_id,
            TransactionKind::Refund,
            amount,
            reason,
            job_id,
            new_balance,
            &now,
        )?;
        Ok(new_balance)
    }

    fn current_balance(conn: &Connection, account_id: &str) -> Result<Option<i64>, LedgerError> {
        conn.query_row(
            "SELECT balance FROM accounts WHERE id = ?",
            params![account_id],
            |row| row.get(0),
        )
        .optional()
        .map_err(db_err)
    }
}

impl Ledger for SqliteLedger {
    fn open_account(
        &self,
        account_id: &str,
        tier: Tier,
        initial_balance: i64,
    ) -> Result<Account, LedgerError> {
        let conn = self.lock()?;

        conn.execute(
            "INSERT OR IGNORE INTO accounts (id, tier, balance, total_spent, created_at) VALUES (?, ?, ?, 0, ?)",
            params![account_id, tier.as_str(), initial_balance, format_timestamp(Utc::now())],
        )
        .map_err(db_err)?;

        conn.query_row(
            "SELECT id, tier, balance, total_spent, created_at FROM accounts WHERE id = ?",
            params![account_id],
            Self::row_to_account,
        )
        .map_err(db_err)
    }

    fn account(&self, account_id: &str) -> Result<Option<Account>, LedgerError> {
        let conn = self.lock()?;

        conn.query_row(
            "SELECT id, tier, balance, total_spent, created_at FROM accounts WHERE id = ?",
            params![account_id],
            Self::row_to_account,
        )
        .optional()
        .map_err(db_err)
    }

    fn reserve(
        &self,
        account_id: &str,
        amount: i64,
        reason: &str,
        job_id: Option<&str>,
    ) -> Result<i64, LedgerError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let balance = Self::current_balance(&tx, account_id)?
            .ok_or_else(|| LedgerError::AccountNotFound(account_id.to_string()))?;

        if amount <= 0 {
            return Ok(balance);
        }

        if amount > balance {
            return Err(LedgerError::InsufficientFunds {
                balance,
                required: amount,
            });
        }

        let new_balance = balance - amount;
        tx.execute(
            "UPDATE accounts SET balance = ?, total_spent = total_spent + ? WHERE id = ?",
            params![new_balance, amount, account_id],
        )
        .map_err(db_err)?;

        Self::append_transaction(
            &tx,
            account_id,
            TransactionKind::Deduction,
            amount,
            reason,
            job_id,
            new_balance,
            &format_timestamp(Utc::now()),
        )?;

        tx.commit().map_err(db_err)?;

        CREDITS_RESERVED.inc_by(amount as u64);
        debug!(account_id, amount, new_balance, reason, "Reserved credits");
        Ok(new_balance)
    }

    fn release(
        &self,
        account_id: &str,
        amount: i64,
        reason: &str,
        job_id: Option<&str>,
    ) -> Result<i64, LedgerError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        if amount <= 0 {
            return Ok(Self::current_balance(&tx, account_id)?.unwrap_or(0));
        }

        let new_balance = Self::credit(&tx, account_id, amount, reason, job_id)?;
        tx.commit().map_err(db_err)?;

        CREDITS_REFUNDED.inc_by(amount as u64);
        debug!(account_id, amount, new_balance, reason, "Released credits");
        Ok(new_balance)
    }

    fn refund_job(
        &self,
        account_id: &str,
        job_id: &str,
        amount: i64,
        reason: &str,
    ) -> Result<Option<i64>, LedgerError> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let already_refunded: bool = tx
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM ledger_transactions WHERE job_id = ? AND kind = ?)",
                params![job_id, TransactionKind::Refund.as_str()],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        if already_refunded {
            debug!(account_id, job_id, "Job already refunded");
            return Ok(None);
        }

        if amount <= 0 {
            return Ok(Some(Self::current_balance(&tx, account_id)?.unwrap_or(0)));
        }

        let new_balance = Self::credit(&tx, account_id, amount, reason, Some(job_id))?;
        tx.commit().map_err(db_err)?;

        CREDITS_REFUNDED.inc_by(amount as u64);
        debug!(account_id, job_id, amount, new_balance, reason, "Refunded job");
        Ok(Some(new_balance))
    }

    fn transactions(
        &self,
        account_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<TransactionPage, LedgerError> {
        let conn = self.lock()?;

        let total: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM ledger_transactions WHERE account_id = ?",
                params![account_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        let mut stmt = conn
            .prepare(
                "SELECT id, account_id, kind, amount, reason, job_id, balance_after, created_at FROM ledger_transactions WHERE account_id = ? ORDER BY id DESC LIMIT ? OFFSET ?",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![account_id, limit, offset], Self::row_to_transaction)
            .map_err(db_err)?;

        let mut transactions = Vec::new();
        for row in rows {
            transactions.push(row.map_err(db_err)?);
        }

        Ok(TransactionPage {
            transactions,
            total,
        })
    }
}

fn db_err(e: rusqlite::Error) -> LedgerError {
    LedgerError::Database(e.to_string())
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
