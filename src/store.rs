//! Database store for users, groups, tasks and assignments

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Assignment, Group, GroupKind, Task, TaskTemplate, User};

/// Database store
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // User operations

    /// Create a user and its five reserved groups in one transaction.
    pub async fn create_user(&self, name: &str) -> Result<User> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("User name must not be empty".to_string()));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (id, name, total_tasks, completed_tasks, created_at)
            VALUES (?, ?, 0, 0, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(name)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (group_name, position, kind) in Group::reserved() {
            sqlx::query(
                r#"
                INSERT INTO groups (id, owner_id, name, position, kind, created_at)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(id.to_string())
            .bind(group_name)
            .bind(position)
            .bind(kind.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(User {
            id,
            name: name.to_string(),
            team: Vec::new(),
            total_tasks: 0,
            completed_tasks: 0,
            created_at: now,
        })
    }

    pub async fn get_user(&self, id: Uuid) -> Result<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, total_tasks, completed_tasks, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

        let mut user: User = row.try_into()?;

        let edges: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT teammate_id FROM team_edges WHERE user_id = ? ORDER BY created_at ASC
            "#,
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        user.team = edges
            .into_iter()
            .map(|(s,)| {
                Uuid::parse_str(&s).map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(user)
    }

    // Group operations

    /// Create a user group at the next free position (always >= 5).
    pub async fn create_group(&self, owner: Uuid, name: &str) -> Result<Group> {
        if name.trim().is_empty() {
            return Err(AppError::Validation("Group name must not be empty".to_string()));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        let (max_position,): (Option<i64>,) =
            sqlx::query_as("SELECT MAX(position) FROM groups WHERE owner_id = ?")
                .bind(owner.to_string())
                .fetch_one(&mut *tx)
                .await?;
        let position = match max_position {
            None => return Err(AppError::NotFound(format!("User {} not found", owner))),
            Some(p) => (p + 1).max(Group::FIRST_USER_POSITION),
        };

        sqlx::query(
            r#"
            INSERT INTO groups (id, owner_id, name, position, kind, created_at)
            VALUES (?, ?, ?, ?, 'real', ?)
            "#,
        )
        .bind(id.to_string())
        .bind(owner.to_string())
        .bind(name)
        .bind(position)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Group {
            id,
            name: name.to_string(),
            owner,
            position,
            kind: GroupKind::Real,
            created_at: now,
        })
    }

    pub async fn get_group(&self, id: Uuid) -> Result<Group> {
        let row = sqlx::query_as::<_, GroupRow>(
            r#"
            SELECT id, owner_id, name, position, kind, created_at
            FROM groups
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Group {} not found", id)))?;

        row.try_into()
    }

    /// Look up one of a user's reserved groups by position.
    pub async fn reserved_group(&self, owner: Uuid, position: i64) -> Result<Group> {
        let row = sqlx::query_as::<_, GroupRow>(
            r#"
            SELECT id, owner_id, name, position, kind, created_at
            FROM groups
            WHERE owner_id = ? AND position = ?
            "#,
        )
        .bind(owner.to_string())
        .bind(position)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| {
            AppError::Internal(format!(
                "Reserved group {} missing for user {}",
                position, owner
            ))
        })?;

        row.try_into()
    }

    pub async fn tasks_for_group(&self, group_id: Uuid) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, description, completed, important, due, message,
                   owner_id, group_id, assignment_id, created_at
            FROM tasks
            WHERE group_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(group_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    // Task operations

    /// Create a task in one of the owner's real groups.
    ///
    /// Virtual groups never own tasks, and "Delegated by me" is resolved from
    /// assignments, so both are rejected as targets.
    pub async fn create_task(
        &self,
        owner: Uuid,
        group_id: Uuid,
        template: &TaskTemplate,
    ) -> Result<Task> {
        if template.description.trim().is_empty() {
            return Err(AppError::Validation(
                "Task description must not be empty".to_string(),
            ));
        }

        let group = self.get_group(group_id).await?;
        if group.owner != owner {
            return Err(AppError::Validation(format!(
                "Group {} does not belong to user {}",
                group_id, owner
            )));
        }
        if group.kind == GroupKind::Virtual {
            return Err(AppError::Validation(
                "Virtual groups cannot own tasks".to_string(),
            ));
        }
        if group.position == Group::DELEGATED_BY_ME {
            return Err(AppError::Validation(
                "The Delegated by me group is resolved from assignments".to_string(),
            ));
        }

        let id = Uuid::new_v4();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tasks (id, owner_id, group_id, description, completed, important,
                               due, message, assignment_id, created_at)
            VALUES (?, ?, ?, ?, 0, ?, ?, ?, NULL, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(owner.to_string())
        .bind(group_id.to_string())
        .bind(&template.description)
        .bind(template.important)
        .bind(template.due)
        .bind(&template.message)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE users SET total_tasks = total_tasks + 1 WHERE id = ?")
            .bind(owner.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Task {
            id,
            description: template.description.clone(),
            completed: false,
            important: template.important,
            due: template.due,
            message: template.message.clone(),
            owner,
            group_id,
            assignment_id: None,
            created_at: now,
        })
    }

    pub async fn get_task(&self, id: Uuid) -> Result<Task> {
        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, description, completed, important, due, message,
                   owner_id, group_id, assignment_id, created_at
            FROM tasks
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task {} not found", id)))?;

        row.try_into()
    }

    /// Flip a task's completion flag, keeping the owner's counter in step.
    pub async fn set_task_completed(&self, id: Uuid, completed: bool) -> Result<Task> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, description, completed, important, due, message,
                   owner_id, group_id, assignment_id, created_at
            FROM tasks
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Task {} not found", id)))?;

        let mut task: Task = row.try_into()?;
        if task.completed == completed {
            return Ok(task);
        }

        sqlx::query("UPDATE tasks SET completed = ? WHERE id = ?")
            .bind(completed)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        let delta = if completed { 1 } else { -1 };
        sqlx::query("UPDATE users SET completed_tasks = completed_tasks + ? WHERE id = ?")
            .bind(delta)
            .bind(task.owner.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        task.completed = completed;
        Ok(task)
    }

    // Fetch helpers for the virtual group resolver

    /// All tasks a user owns across real groups, excluding "Delegated by me".
    pub async fn tasks_in_real_groups(&self, owner: Uuid) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT t.id, t.description, t.completed, t.important, t.due, t.message,
                   t.owner_id, t.group_id, t.assignment_id, t.created_at
            FROM tasks t
            JOIN groups g ON g.id = t.group_id
            WHERE t.owner_id = ? AND g.position <> ?
            ORDER BY t.created_at ASC
            "#,
        )
        .bind(owner.to_string())
        .bind(Group::DELEGATED_BY_ME)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    pub async fn assignments_for_owner(&self, owner: Uuid) -> Result<Vec<Assignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(
            r#"
            SELECT id, owner_id, description, created_at
            FROM assignments
            WHERE owner_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(owner.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }

    /// The recipient-owned sibling copies of every assignment a user delegated.
    pub async fn tasks_for_owner_assignments(&self, owner: Uuid) -> Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT t.id, t.description, t.completed, t.important, t.due, t.message,
                   t.owner_id, t.group_id, t.assignment_id, t.created_at
            FROM tasks t
            JOIN assignments a ON a.id = t.assignment_id
            WHERE a.owner_id = ?
            ORDER BY t.created_at ASC, t.id ASC
            "#,
        )
        .bind(owner.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(|r| r.try_into()).collect()
    }
}

// Internal row types for sqlx

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    id: String,
    name: String,
    total_tasks: i64,
    completed_tasks: i64,
    created_at: chrono::DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            name: row.name,
            team: Vec::new(),
            total_tasks: row.total_tasks,
            completed_tasks: row.completed_tasks,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct GroupRow {
    id: String,
    owner_id: String,
    name: String,
    position: i64,
    kind: String,
    created_at: chrono::DateTime<Utc>,
}

impl TryFrom<GroupRow> for Group {
    type Error = AppError;

    fn try_from(row: GroupRow) -> Result<Self> {
        Ok(Group {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            owner: Uuid::parse_str(&row.owner_id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            name: row.name,
            position: row.position,
            kind: row
                .kind
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid group kind: {}", e)))?,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct TaskRow {
    id: String,
    description: String,
    completed: bool,
    important: bool,
    due: Option<chrono::DateTime<Utc>>,
    message: Option<String>,
    owner_id: String,
    group_id: String,
    assignment_id: Option<String>,
    created_at: chrono::DateTime<Utc>,
}

impl TryFrom<TaskRow> for Task {
    type Error = AppError;

    fn try_from(row: TaskRow) -> Result<Self> {
        let assignment_id = row
            .assignment_id
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| AppError::Internal(format!("Invalid assignment_id UUID: {}", e)))?;

        Ok(Task {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            description: row.description,
            completed: row.completed,
            important: row.important,
            due: row.due,
            message: row.message,
            owner: Uuid::parse_str(&row.owner_id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            group_id: Uuid::parse_str(&row.group_id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            assignment_id,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct AssignmentRow {
    id: String,
    owner_id: String,
    description: String,
    created_at: chrono::DateTime<Utc>,
}

impl TryFrom<AssignmentRow> for Assignment {
    type Error = AppError;

    fn try_from(row: AssignmentRow) -> Result<Self> {
        Ok(Assignment {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            owner: Uuid::parse_str(&row.owner_id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            description: row.description,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct EntryRow {
    id: String,
    to_user: String,
    from_user: String,
    kind: String,
    official: bool,
    processed: bool,
    linked_task: Option<String>,
    message: Option<String>,
    created_at: chrono::DateTime<Utc>,
}

impl TryFrom<EntryRow> for crate::models::LedgerEntry {
    type Error = AppError;

    fn try_from(row: EntryRow) -> Result<Self> {
        use crate::models::EntryKind;

        let kind = match row.kind.as_str() {
            "request" => EntryKind::Request,
            "notification" => EntryKind::Notification {
                official: row.official,
            },
            other => {
                return Err(AppError::Internal(format!("Invalid entry kind: {}", other)));
            }
        };

        let linked_task = row
            .linked_task
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| AppError::Internal(format!("Invalid linked_task UUID: {}", e)))?;

        Ok(crate::models::LedgerEntry {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            to_user: Uuid::parse_str(&row.to_user)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            from_user: Uuid::parse_str(&row.from_user)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            kind,
            processed: row.processed,
            linked_task,
            message: row.message,
            created_at: row.created_at,
        })
    }
}
