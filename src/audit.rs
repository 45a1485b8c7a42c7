//! Append-only audit log.
//!
//! Every security-relevant action ends up as one row in `audit_log`.
//! Timestamps are assigned here, not by callers: each append takes
//! `max(now, last + 1)` in Unix microseconds under a mutex that is held
//! until the row is committed, so timestamp order equals commit order.
//! Rows are never updated or deleted.
//!
//! Components call [`AuditLog::record`], which retries and, if the log
//! stays unwritable, reports on the `lexvault::audit` tracing target
//! instead of failing the user's action.

use std::time::Duration;

use serde_json::Value;
use sqlx::{Row, SqlitePool};
use tokio::sync::Mutex;
use tracing::{error, warn};

use lexvault_core::models::{ActionKind, AuditEntry, Identity};

use crate::config::AuditConfig;
use crate::error::{VaultError, VaultResult};

pub struct AuditLog {
    pool: SqlitePool,
    last_ts: Mutex<i64>,
    max_list: usize,
    write_attempts: u32,
}

impl AuditLog {
    /// Open the log, resuming the timestamp sequence from the newest row.
    pub async fn open(pool: SqlitePool, config: &AuditConfig) -> VaultResult<Self> {
        let last: Option<i64> = sqlx::query_scalar("SELECT MAX(ts) FROM audit_log")
            .fetch_one(&pool)
            .await?;

        Ok(Self {
            pool,
            last_ts: Mutex::new(last.unwrap_or(0)),
            max_list: config.max_list.max(1),
            write_attempts: config.write_attempts.max(1),
        })
    }

    /// Store one entry and return its id.
    pub async fn append(&self, actor_id: &str, action: ActionKind, details: &Value) -> VaultResult<i64> {
        let details_json =
            serde_json::to_string(details).map_err(|e| VaultError::AuditWrite(e.to_string()))?;

        let mut last = self.last_ts.lock().await;
        let ts = chrono::Utc::now().timestamp_micros().max(*last + 1);

        let result = sqlx::query(
            "INSERT INTO audit_log (ts, actor_id, action, details_json) VALUES (?, ?, ?, ?)",
        )
        .bind(ts)
        .bind(actor_id)
        .bind(action.as_str())
        .bind(&details_json)
        .execute(&self.pool)
        .await
        .map_err(|e| VaultError::AuditWrite(e.to_string()))?;

        *last = ts;
        Ok(result.last_insert_rowid())
    }

    /// Append with bounded retries. Never fails the caller; a lost entry is
    /// reported on the operator channel.
    pub async fn record(&self, actor_id: &str, action: ActionKind, details: Value) -> Option<i64> {
        let mut last_err = None;
        for attempt in 0..self.write_attempts {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(50 << attempt.min(4))).await;
            }
            match self.append(actor_id, action, &details).await {
                Ok(id) => return Some(id),
                Err(e) => last_err = Some(e),
            }
        }

        error!(
            target: "lexvault::audit",
            actor_id,
            action = action.as_str(),
            details = %details,
            error = ?last_err,
            "Audit entry could not be written"
        );
        None
    }

    /// At most `limit` entries (capped at `audit.max_list`), newest first
    /// when `descending`, oldest first otherwise.
    pub async fn list(&self, limit: usize, descending: bool) -> VaultResult<Vec<AuditEntry>> {
        self.select(None, limit, descending).await
    }

    /// Like [`AuditLog::list`], restricted to entries by `actor_id`.
    pub async fn list_for_actor(
        &self,
        actor_id: &str,
        limit: usize,
        descending: bool,
    ) -> VaultResult<Vec<AuditEntry>> {
        self.select(Some(actor_id), limit, descending).await
    }

    /// Entries visible to `requester`: all of them for admins, otherwise
    /// only the requester's own.
    pub async fn visible_to(
        &self,
        requester: &Identity,
        limit: usize,
        descending: bool,
    ) -> VaultResult<Vec<AuditEntry>> {
        if requester.is_admin() {
            self.list(limit, descending).await
        } else {
            self.list_for_actor(&requester.user_id, limit, descending).await
        }
    }

    async fn select(
        &self,
        actor_id: Option<&str>,
        limit: usize,
        descending: bool,
    ) -> VaultResult<Vec<AuditEntry>> {
        let limit = limit.min(self.max_list);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let order = if descending {
            "ts DESC, id DESC"
        } else {
            "ts ASC, id ASC"
        };
        let sql = format!(
            r#"
            SELECT id, ts, actor_id, action, details_json
            FROM audit_log
            WHERE (? IS NULL OR actor_id = ?)
            ORDER BY {}
            LIMIT ?
            "#,
            order
        );
        let rows = sqlx::query(&sql)
            .bind(actor_id)
            .bind(actor_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_entry).collect()
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> VaultResult<AuditEntry> {
    let action: String = row.get("action");
    let details_json: String = row.get("details_json");
    Ok(AuditEntry {
        id: row.get("id"),
        timestamp: row.get("ts"),
        actor_id: row.get("actor_id"),
        action: action
            .parse::<ActionKind>()
            .map_err(VaultError::Configuration)?,
        details: parse_details(row.get("id"), &details_json),
    })
}

fn parse_details(id: i64, details_json: &str) -> Value {
    serde_json::from_str(details_json).unwrap_or_else(|e| {
        warn!(target: "lexvault::audit", entry_id = id, error = %e, "Audit entry has unreadable details");
        Value::Null
    })
}
