//! Assignment fan-out engine
//!
//! Expands one delegation intent into N independent per-recipient task
//! copies, each with its own completion flag, correlated by an assignment
//! row. All writes of one call commit together or not at all: the full
//! recipient set is validated inside the transaction before anything is
//! inserted.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Assignment, Group, Task, TaskTemplate};
use crate::store::TaskRow;

/// The outcome of one delegation call: the assignment and its task copies,
/// in recipient order.
#[derive(Debug, Clone, Serialize)]
pub struct Delegation {
    pub assignment: Assignment,
    pub tasks: Vec<Task>,
}

/// Engine for delegating tasks to teammates
#[derive(Clone)]
pub struct AssignmentEngine {
    pool: SqlitePool,
}

impl AssignmentEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Delegate one task to a set of teammates.
    ///
    /// Per recipient: a task copy owned by the recipient in their
    /// "Delegated to me" group, the recipient's task counter bumped, and a
    /// notification linking the copy. Any invalid recipient fails the whole
    /// call with zero side effects. Duplicate recipients collapse to one
    /// copy.
    pub async fn delegate(
        &self,
        acting: Uuid,
        recipients: &[Uuid],
        template: &TaskTemplate,
    ) -> Result<Delegation> {
        if recipients.is_empty() {
            return Err(AppError::Validation(
                "At least one recipient is required".to_string(),
            ));
        }
        if template.description.trim().is_empty() {
            return Err(AppError::Validation(
                "Task description must not be empty".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await?;

        let team: Vec<(String,)> =
            sqlx::query_as("SELECT teammate_id FROM team_edges WHERE user_id = ?")
                .bind(acting.to_string())
                .fetch_all(&mut *tx)
                .await?;
        let team: HashSet<Uuid> = team
            .into_iter()
            .map(|(s,)| {
                Uuid::parse_str(&s).map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))
            })
            .collect::<Result<_>>()?;

        if team.is_empty() {
            return Err(AppError::Conflict(
                "You have no teammates to delegate to".to_string(),
            ));
        }

        // Validate the entire recipient set before committing any write
        let strangers: Vec<String> = recipients
            .iter()
            .filter(|r| !team.contains(r))
            .map(|r| r.to_string())
            .collect();
        if !strangers.is_empty() {
            return Err(AppError::Conflict(format!(
                "Recipients are not teammates: {}",
                strangers.join(", ")
            )));
        }

        let mut seen = HashSet::new();
        let recipients: Vec<Uuid> = recipients
            .iter()
            .copied()
            .filter(|r| seen.insert(*r))
            .collect();

        let assignment_id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO assignments (id, owner_id, description, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(assignment_id.to_string())
        .bind(acting.to_string())
        .bind(&template.description)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let mut tasks = Vec::with_capacity(recipients.len());
        for recipient in &recipients {
            let group: Option<(String,)> =
                sqlx::query_as("SELECT id FROM groups WHERE owner_id = ? AND position = ?")
                    .bind(recipient.to_string())
                    .bind(Group::DELEGATED_TO_ME)
                    .fetch_optional(&mut *tx)
                    .await?;
            let group_id = group
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "Reserved group {} missing for user {}",
                        Group::DELEGATED_TO_ME,
                        recipient
                    ))
                })?
                .0;
            let group_id = Uuid::parse_str(&group_id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?;

            let task_id = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO tasks (id, owner_id, group_id, description, completed, important,
                                   due, message, assignment_id, created_at)
                VALUES (?, ?, ?, ?, 0, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(task_id.to_string())
            .bind(recipient.to_string())
            .bind(group_id.to_string())
            .bind(&template.description)
            .bind(template.important)
            .bind(template.due)
            .bind(&template.message)
            .bind(assignment_id.to_string())
            .bind(now)
            .execute(&mut *tx)
            .await?;

            sqlx::query("UPDATE users SET total_tasks = total_tasks + 1 WHERE id = ?")
                .bind(recipient.to_string())
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                r#"
                INSERT INTO ledger_entries (id, to_user, from_user, kind, official, processed,
                                            linked_task, message, created_at)
                VALUES (?, ?, ?, 'notification', 0, 0, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(recipient.to_string())
            .bind(acting.to_string())
            .bind(task_id.to_string())
            .bind(&template.message)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            tasks.push(Task {
                id: task_id,
                description: template.description.clone(),
                completed: false,
                important: template.important,
                due: template.due,
                message: template.message.clone(),
                owner: *recipient,
                group_id,
                assignment_id: Some(assignment_id),
                created_at: now,
            });
        }

        tx.commit().await?;

        Ok(Delegation {
            assignment: Assignment {
                id: assignment_id,
                owner: acting,
                description: template.description.clone(),
                created_at: now,
            },
            tasks,
        })
    }

    /// Withdraw one recipient's copy of an assignment. Siblings are left
    /// untouched; removing the last copy deletes the assignment itself.
    pub async fn withdraw_single(
        &self,
        acting: Uuid,
        assignment_id: Uuid,
        recipient: Uuid,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        self.load_owned_assignment(&mut tx, acting, assignment_id)
            .await?;

        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, description, completed, important, due, message,
                   owner_id, group_id, assignment_id, created_at
            FROM tasks
            WHERE assignment_id = ? AND owner_id = ?
            "#,
        )
        .bind(assignment_id.to_string())
        .bind(recipient.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No task for recipient {} in assignment {}",
                recipient, assignment_id
            ))
        })?;
        let task: Task = row.try_into()?;

        remove_copy(&mut tx, &task).await?;

        let (remaining,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tasks WHERE assignment_id = ?")
                .bind(assignment_id.to_string())
                .fetch_one(&mut *tx)
                .await?;
        if remaining == 0 {
            sqlx::query("DELETE FROM assignments WHERE id = ?")
                .bind(assignment_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Withdraw every copy of an assignment, atomically.
    pub async fn withdraw_all(&self, acting: Uuid, assignment_id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        self.load_owned_assignment(&mut tx, acting, assignment_id)
            .await?;

        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, description, completed, important, due, message,
                   owner_id, group_id, assignment_id, created_at
            FROM tasks
            WHERE assignment_id = ?
            "#,
        )
        .bind(assignment_id.to_string())
        .fetch_all(&mut *tx)
        .await?;

        for row in rows {
            let task: Task = row.try_into()?;
            remove_copy(&mut tx, &task).await?;
        }

        sqlx::query("DELETE FROM assignments WHERE id = ?")
            .bind(assignment_id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Per-copy completion flags of an assignment, keyed by task id, so the
    /// delegator can follow progress without seeing unrelated task data.
    pub async fn status(&self, acting: Uuid, assignment_id: Uuid) -> Result<HashMap<Uuid, bool>> {
        let mut tx = self.pool.begin().await?;

        self.load_owned_assignment(&mut tx, acting, assignment_id)
            .await?;

        let rows: Vec<(String, bool)> =
            sqlx::query_as("SELECT id, completed FROM tasks WHERE assignment_id = ?")
                .bind(assignment_id.to_string())
                .fetch_all(&mut *tx)
                .await?;

        rows.into_iter()
            .map(|(id, completed)| {
                Ok((
                    Uuid::parse_str(&id)
                        .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
                    completed,
                ))
            })
            .collect()
    }

    async fn load_owned_assignment(
        &self,
        conn: &mut SqliteConnection,
        acting: Uuid,
        assignment_id: Uuid,
    ) -> Result<()> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT owner_id FROM assignments WHERE id = ?")
                .bind(assignment_id.to_string())
                .fetch_optional(&mut *conn)
                .await?;
        let owner = row
            .ok_or_else(|| {
                AppError::NotFound(format!("Assignment {} not found", assignment_id))
            })?
            .0;

        if owner != acting.to_string() {
            return Err(AppError::Validation(
                "Only the delegator can operate on an assignment".to_string(),
            ));
        }
        Ok(())
    }
}

/// Delete one recipient copy with its linked notifications, keeping the
/// recipient's counters in step.
async fn remove_copy(conn: &mut SqliteConnection, task: &Task) -> Result<()> {
    sqlx::query("DELETE FROM ledger_entries WHERE linked_task = ?")
        .bind(task.id.to_string())
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM tasks WHERE id = ?")
        .bind(task.id.to_string())
        .execute(&mut *conn)
        .await?;

    let completed_delta: i64 = if task.completed { 1 } else { 0 };
    sqlx::query(
        "UPDATE users SET total_tasks = total_tasks - 1, completed_tasks = completed_tasks - ? WHERE id = ?",
    )
    .bind(completed_delta)
    .bind(task.owner.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(())
}
