//! SQLite-backed job store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::{
    Job, JobCost, JobFilter, JobPage, JobProgress, JobStatus, JobStore, JobStoreError, JobUpdate,
    UsageStats,
};
use crate::pipeline::{Stage, StageStatus};

const JOB_COLUMNS: &str = "id, account_id, image_url, operations, options, status, \
    progress_enrich, progress_upscale, progress_infuse, \
    cost_estimated, cost_charged, cost_refunded, cost_breakdown, \
    results, error, idempotency_key, webhook_url, metadata, \
    created_at, started_at, completed_at";

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Create a new SQLite job store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, JobStoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.busy_timeout(Duration::from_secs(5)).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite job store (useful for testing).
    pub fn in_memory() -> Result<Self, JobStoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobStoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                account_id TEXT NOT NULL,
                image_url TEXT NOT NULL,
                operations TEXT NOT NULL,
                options TEXT NOT NULL,
                status TEXT NOT NULL,
                progress_enrich TEXT,
                progress_upscale TEXT,
                progress_infuse TEXT,
                cost_estimated INTEGER NOT NULL,
                cost_charged INTEGER NOT NULL,
                cost_refunded INTEGER NOT NULL DEFAULT 0,
                cost_breakdown TEXT NOT NULL,
                results TEXT,
                error TEXT,
                idempotency_key TEXT,
                webhook_url TEXT,
                metadata TEXT,
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_idempotency ON jobs(account_id, idempotency_key);
            CREATE INDEX IF NOT EXISTS idx_jobs_account_created ON jobs(account_id, created_at DESC);
            "#,
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, JobStoreError> {
        self.conn
            .lock()
            .map_err(|_| JobStoreError::Database("job store connection lock poisoned".to_string()))
    }

    fn progress_column(stage: Stage) -> &'static str {
        match stage {
            Stage::Enrich => "progress_enrich = ?",
            Stage::Upscale => "progress_upscale = ?",
            Stage::Infuse => "progress_infuse = ?",
        }
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<Job> {
        let operations_json: String = row.get(3)?;
        let options_json: String = row.get(4)?;
        let status_str: String = row.get(5)?;
        let progress_enrich: Option<String> = row.get(6)?;
        let progress_upscale: Option<String> = row.get(7)?;
        let progress_infuse: Option<String> = row.get(8)?;
        let breakdown_json: String = row.get(12)?;
        let results_json: Option<String> = row.get(13)?;
        let error_json: Option<String> = row.get(14)?;
        let metadata_json: Option<String> = row.get(17)?;
        let created_at_str: String = row.get(18)?;
        let started_at_str: Option<String> = row.get(19)?;
        let completed_at_str: Option<String> = row.get(20)?;

        let parse_stage_status =
            |s: Option<String>| s.and_then(|s| s.parse::<StageStatus>().ok());

        Ok(Job {
            id: row.get(0)?,
            account_id: row.get(1)?,
            image_url: row.get(2)?,
            operations: serde_json::from_str(&operations_json).unwrap_or_default(),
            options: serde_json::from_str(&options_json).unwrap_or_default(),
            status: status_str.parse().unwrap_or(JobStatus::Pending),
            progress: JobProgress {
                enrich: parse_stage_status(progress_enrich),
                upscale: parse_stage_status(progress_upscale),
                infuse: parse_stage_status(progress_infuse),
            },
            cost: JobCost {
                estimated: row.get(9)?,
                charged: row.get(10)?,
                refunded: row.get(11)?,
                breakdown: serde_json::from_str(&breakdown_json).unwrap_or_default(),
            },
            results: results_json.and_then(|json| serde_json::from_str(&json).ok()),
            error: error_json.and_then(|json| serde_json::from_str(&json).ok()),
            idempotency_key: row.get(15)?,
            webhook_url: row.get(16)?,
            metadata: metadata_json.and_then(|json| serde_json::from_str(&json).ok()),
            created_at: parse_timestamp(&created_at_str),
            started_at: started_at_str.as_deref().map(parse_timestamp),
            completed_at: completed_at_str.as_deref().map(parse_timestamp),
        })
    }

    fn job_exists(conn: &Connection, job_id: &str) -> Result<bool, JobStoreError> {
        conn.query_row("SELECT 1 FROM jobs WHERE id = ?", params![job_id], |_| Ok(()))
            .optional()
            .map(|found| found.is_some())
            .map_err(db_err)
    }
}

impl JobStore for SqliteJobStore {
    fn insert(&self, job: &Job) -> Result<(), JobStoreError> {
        let conn = self.lock()?;

        let operations_json = to_json(&job.operations)?;
        let options_json = to_json(&job.options)?;
        let breakdown_json = to_json(&job.cost.breakdown)?;
        let results_json = job.results.as_ref().map(to_json).transpose()?;
        let error_json = job.error.as_ref().map(to_json).transpose()?;
        let metadata_json = job.metadata.as_ref().map(to_json).transpose()?;

        let result = conn.execute(
            &format!(
                "INSERT INTO jobs ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                JOB_COLUMNS
            ),
            params![
                job.id,
                job.account_id,
                job.image_url,
                operations_json,
                options_json,
                job.status.as_str(),
                job.progress.enrich.map(|s| s.as_str()),
                job.progress.upscale.map(|s| s.as_str()),
                job.progress.infuse.map(|s| s.as_str()),
                job.cost.estimated,
                job.cost.charged,
                job.cost.refunded,
                breakdown_json,
                results_json,
                error_json,
                job.idempotency_key,
                job.webhook_url,
                metadata_json,
                format_timestamp(job.created_at),
                job.started_at.map(format_timestamp),
                job.completed_at.map(format_timestamp),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(failure, Some(ref message)))
                if failure.code == ErrorCode::ConstraintViolation
                    && message.contains("idempotency_key") =>
            {
                Err(JobStoreError::Conflict {
                    account_id: job.account_id.clone(),
                    idempotency_key: job.idempotency_key.clone().unwrap_or_default(),
                })
            }
            Err(e) => Err(db_err(e)),
        }
    }

    fn find_by_idempotency_key(
        &self,
        account_id: &str,
        key: &str,
    ) -> Result<Option<Job>, JobStoreError> {
        let conn = self.lock()?;

        conn.query_row(
            &format!(
                "SELECT {} FROM jobs WHERE account_id = ? AND idempotency_key = ?",
                JOB_COLUMNS
            ),
            params![account_id, key],
            Self::row_to_job,
        )
        .optional()
        .map_err(db_err)
    }

    fn get(&self, job_id: &str, account_id: &str) -> Result<Option<Job>, JobStoreError> {
        let conn = self.lock()?;

        let result = conn.query_row(
            &format!(
                "SELECT {} FROM jobs WHERE id = ? AND account_id = ?",
                JOB_COLUMNS
            ),
            params![job_id, account_id],
            Self::row_to_job,
        );

        match result {
            Ok(job) => Ok(Some(job)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    fn list(&self, account_id: &str, filter: &JobFilter) -> Result<JobPage, JobStoreError> {
        let conn = self.lock()?;

        let mut where_clause = String::from("WHERE account_id = ?");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(account_id.to_string())];
        if let Some(status) = filter.status {
            where_clause.push_str(" AND status = ?");
            params.push(Box::new(status.as_str()));
        }

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let total: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM jobs {}", where_clause),
                param_refs.as_slice(),
                |row| row.get(0),
            )
            .map_err(db_err)?;

        // rowid breaks ties between jobs created in the same microsecond.
        let sql = format!(
            "SELECT {} FROM jobs {} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            JOB_COLUMNS, where_clause
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;

        let mut all_params = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_job)
            .map_err(db_err)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row.map_err(db_err)?);
        }

        Ok(JobPage { jobs, total })
    }

    fn update(&self, job_id: &str, update: &JobUpdate) -> Result<bool, JobStoreError> {
        let conn = self.lock()?;

        if update.is_empty() {
            return Self::job_exists(&conn, job_id);
        }

        let mut sets: Vec<&str> = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = update.status {
            sets.push("status = ?");
            params.push(Box::new(status.as_str()));
        }
        for (stage, status) in &update.progress {
            sets.push(Self::progress_column(*stage));
            params.push(Box::new(status.as_str()));
        }
        if let Some(refunded) = update.refunded {
            sets.push("cost_refunded = ?");
            params.push(Box::new(refunded));
        }
        if let Some(ref results) = update.results {
            sets.push("results = ?");
            params.push(Box::new(to_json(results)?));
        }
        if let Some(ref error) = update.error {
            sets.push("error = ?");
            params.push(Box::new(to_json(error)?));
        }
        if let Some(started_at) = update.started_at {
            sets.push("started_at = ?");
            params.push(Box::new(format_timestamp(started_at)));
        }
        if let Some(completed_at) = update.completed_at {
            sets.push("completed_at = ?");
            params.push(Box::new(format_timestamp(completed_at)));
        }

        let mut sql = format!("UPDATE jobs SET {} WHERE id = ?", sets.join(", "));
        params.push(Box::new(job_id.to_string()));

        if let Some(status) = update.status {
            let predecessors = status.predecessors();
            if predecessors.is_empty() {
                return Ok(false);
            }
            sql.push_str(&format!(
                " AND status IN ({})",
                vec!["?"; predecessors.len()].join(", ")
            ));
            for predecessor in predecessors {
                params.push(Box::new(predecessor.as_str()));
            }
        }

        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let changed = conn.execute(&sql, param_refs.as_slice()).map_err(db_err)?;

        Ok(changed > 0)
    }

    fn list_unfinished(&self) -> Result<Vec<Job>, JobStoreError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM jobs WHERE status IN (?, ?) ORDER BY created_at ASC, rowid ASC",
                JOB_COLUMNS
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(
                params![JobStatus::Pending.as_str(), JobStatus::Processing.as_str()],
                Self::row_to_job,
            )
            .map_err(db_err)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row.map_err(db_err)?);
        }
        Ok(jobs)
    }

    fn usage(&self, account_id: &str, since: DateTime<Utc>) -> Result<UsageStats, JobStoreError> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM jobs WHERE account_id = ? AND created_at >= ?",
                JOB_COLUMNS
            ))
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![account_id, format_timestamp(since)], Self::row_to_job)
            .map_err(db_err)?;

        let mut stats = UsageStats {
            period_start: since,
            period_end: Utc::now(),
            ..UsageStats::default()
        };

        for row in rows {
            let job = row.map_err(db_err)?;
            stats.jobs_total += 1;
            match job.status {
                JobStatus::Completed => stats.jobs_completed += 1,
                JobStatus::Failed => stats.jobs_failed += 1,
                JobStatus::Cancelled => stats.jobs_cancelled += 1,
                JobStatus::Pending | JobStatus::Processing => {}
            }

            stats.credits_spent += job.cost.net();
            if job.cost.net() > 0 {
                for item in &job.cost.breakdown {
                    *stats
                        .credits_by_stage
                        .entry(item.stage.as_str().to_string())
                        .or_insert(0) += item.cost;
                }
            }
        }

        Ok(stats)
    }
}

fn db_err(e: rusqlite::Error) -> JobStoreError {
    JobStoreError::Database(e.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JobStoreError> {
    serde_json::to_string(value).map_err(|e| JobStoreError::Serialization(e.to_string()))
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
