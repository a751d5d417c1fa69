//! Relationship ledger
//!
//! Append-mostly log of team requests and notifications between two users;
//! the single source of truth for pending/accepted/rejected state. Entries
//! are mutated only to flip `processed` and deleted only by explicit user
//! action.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{conflict_on_unique, AppError, Result};
use crate::models::{EntryKind, LedgerEntry};
use crate::store::EntryRow;
use crate::team::membership;

const ENTRY_COLUMNS: &str =
    "id, to_user, from_user, kind, official, processed, linked_task, message, created_at";

/// Ledger of team requests and notifications
#[derive(Clone)]
pub struct TeamLedger {
    pool: SqlitePool,
}

impl TeamLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Send a team request from `acting` to `target`.
    ///
    /// Fails if the two are the same user, already teammates, or an
    /// unprocessed request already exists in either direction. The whole
    /// check-then-insert runs in one transaction; the partial unique index on
    /// pending requests catches racing duplicates at commit.
    pub async fn send_request(&self, acting: Uuid, target: Uuid) -> Result<LedgerEntry> {
        if acting == target {
            return Err(AppError::Validation(
                "Cannot send a team request to yourself".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        for user in [acting, target] {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE id = ?")
                .bind(user.to_string())
                .fetch_optional(&mut *tx)
                .await?;
            if exists.is_none() {
                return Err(AppError::NotFound(format!("User {} not found", user)));
            }
        }

        let edge: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM team_edges WHERE user_id = ? AND teammate_id = ?")
                .bind(acting.to_string())
                .bind(target.to_string())
                .fetch_optional(&mut *tx)
                .await?;
        if edge.is_some() {
            return Err(AppError::Conflict(format!(
                "User {} is already a teammate",
                target
            )));
        }

        let pending: Option<(i64,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM ledger_entries
            WHERE kind = 'request' AND processed = 0
              AND ((from_user = ? AND to_user = ?) OR (from_user = ? AND to_user = ?))
            "#,
        )
        .bind(acting.to_string())
        .bind(target.to_string())
        .bind(target.to_string())
        .bind(acting.to_string())
        .fetch_optional(&mut *tx)
        .await?;
        if pending.is_some() {
            return Err(AppError::Conflict(
                "A team request between these users is already pending".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, to_user, from_user, kind, official, processed, created_at)
            VALUES (?, ?, ?, 'request', 0, 0, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(target.to_string())
        .bind(acting.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            conflict_on_unique(e, "A team request between these users is already pending")
        })?;

        tx.commit().await?;

        Ok(LedgerEntry {
            id,
            to_user: target,
            from_user: acting,
            kind: EntryKind::Request,
            processed: false,
            linked_task: None,
            message: None,
            created_at: now,
        })
    }

    /// Team requests addressed to `user`, newest first. Pure fetch; for
    /// requests the `processed` flag flips only through accept/reject.
    pub async fn requests_for(&self, user: Uuid) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM ledger_entries
            WHERE to_user = ? AND kind = 'request'
            ORDER BY created_at DESC
            "#
        ))
        .bind(user.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// Notifications addressed to `user`: unread first, newest first within
    /// each partition.
    pub async fn notifications_for(&self, user: Uuid) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query_as::<_, EntryRow>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM ledger_entries
            WHERE to_user = ? AND kind = 'notification'
            ORDER BY processed ASC, created_at DESC
            "#
        ))
        .bind(user.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// Explicit mark-as-read step for notifications, kept separate from the
    /// fetch. Returns how many entries flipped.
    pub async fn mark_notifications_seen(&self, user: Uuid) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE ledger_entries SET processed = 1
            WHERE to_user = ? AND kind = 'notification' AND processed = 0
            "#,
        )
        .bind(user.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Accept a team request addressed to `acting`: links the symmetric team
    /// edge, marks the request processed and notifies the sender.
    pub async fn accept_request(&self, acting: Uuid, request_id: Uuid) -> Result<LedgerEntry> {
        self.resolve_request(acting, request_id, true).await
    }

    /// Reject a team request: marks it processed and notifies the sender.
    /// No membership change.
    pub async fn reject_request(&self, acting: Uuid, request_id: Uuid) -> Result<LedgerEntry> {
        self.resolve_request(acting, request_id, false).await
    }

    async fn resolve_request(
        &self,
        acting: Uuid,
        request_id: Uuid,
        accept: bool,
    ) -> Result<LedgerEntry> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, EntryRow>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM ledger_entries
            WHERE id = ?
            "#
        ))
        .bind(request_id.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Request {} not found", request_id)))?;

        let mut entry: LedgerEntry = row.try_into()?;

        if !entry.kind.is_request() {
            return Err(AppError::Validation(format!(
                "Entry {} is not a team request",
                request_id
            )));
        }
        if entry.to_user != acting {
            return Err(AppError::Validation(
                "Only the recipient of a request can accept or reject it".to_string(),
            ));
        }
        // A processed request was already accepted or rejected; retries must
        // not reapply membership.
        if entry.processed {
            return Err(AppError::Conflict(format!(
                "Request {} has already been processed",
                request_id
            )));
        }

        if accept {
            membership::link(&mut tx, acting, entry.from_user).await?;
        }

        sqlx::query("UPDATE ledger_entries SET processed = 1 WHERE id = ?")
            .bind(request_id.to_string())
            .execute(&mut *tx)
            .await?;

        let confirmation = if accept {
            "accepted your team request"
        } else {
            "declined your team request"
        };
        sqlx::query(
            r#"
            INSERT INTO ledger_entries (id, to_user, from_user, kind, official, processed, message, created_at)
            VALUES (?, ?, ?, 'notification', 1, 0, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(entry.from_user.to_string())
        .bind(acting.to_string())
        .bind(confirmation)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        entry.processed = true;
        Ok(entry)
    }

    /// Hard-delete a ledger entry addressed to `acting` (dismiss it).
    pub async fn delete_entry(&self, acting: Uuid, entry_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let row: Option<(String,)> =
            sqlx::query_as("SELECT to_user FROM ledger_entries WHERE id = ?")
                .bind(entry_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
        let to_user = row
            .ok_or_else(|| AppError::NotFound(format!("Entry {} not found", entry_id)))?
            .0;

        if to_user != acting.to_string() {
            return Err(AppError::Validation(
                "Only the recipient of an entry can delete it".to_string(),
            ));
        }

        sqlx::query("DELETE FROM ledger_entries WHERE id = ?")
            .bind(entry_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}
