//! Symmetric teammate graph
//!
//! Applies ledger decisions to the team edge set. Every edge is stored in
//! both directions; asymmetry is a defect.

use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::Teammate;

/// Manager for the symmetric teammate graph
#[derive(Clone)]
pub struct Membership {
    pool: SqlitePool,
}

impl Membership {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List a user's current teammates, oldest relationship first.
    pub async fn teammates_of(&self, user: Uuid) -> Result<Vec<Teammate>> {
        let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM users WHERE id = ?")
            .bind(user.to_string())
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!("User {} not found", user)));
        }

        let rows: Vec<(String, String)> = sqlx::query_as(
            r#"
            SELECT u.id, u.name
            FROM team_edges e
            JOIN users u ON u.id = e.teammate_id
            WHERE e.user_id = ?
            ORDER BY e.created_at ASC
            "#,
        )
        .bind(user.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, name)| {
                Ok(Teammate {
                    id: Uuid::parse_str(&id)
                        .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
                    name,
                })
            })
            .collect()
    }

    pub async fn are_teammates(&self, a: Uuid, b: Uuid) -> Result<bool> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM team_edges WHERE user_id = ? AND teammate_id = ?")
                .bind(a.to_string())
                .bind(b.to_string())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Remove a teammate relationship, both directions. No ledger side effect.
    pub async fn remove_teammate(&self, acting: Uuid, teammate: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let removed = unlink(&mut tx, acting, teammate).await?;
        if removed == 0 {
            return Err(AppError::NotFound(format!(
                "User {} is not a teammate",
                teammate
            )));
        }

        tx.commit().await?;
        Ok(())
    }
}

/// Insert the symmetric edge pair inside an open transaction.
///
/// Tolerates an existing edge so that accepting a stale request for users who
/// are already teammates cannot break symmetry.
pub(crate) async fn link(conn: &mut SqliteConnection, a: Uuid, b: Uuid) -> Result<()> {
    let now = chrono::Utc::now();
    for (user, teammate) in [(a, b), (b, a)] {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO team_edges (user_id, teammate_id, created_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(user.to_string())
        .bind(teammate.to_string())
        .bind(now)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

/// Delete the symmetric edge pair; returns the number of rows removed.
pub(crate) async fn unlink(conn: &mut SqliteConnection, a: Uuid, b: Uuid) -> Result<u64> {
    let mut removed = 0;
    for (user, teammate) in [(a, b), (b, a)] {
        let result =
            sqlx::query("DELETE FROM team_edges WHERE user_id = ? AND teammate_id = ?")
                .bind(user.to_string())
                .bind(teammate.to_string())
                .execute(&mut *conn)
                .await?;
        removed += result.rows_affected();
    }
    Ok(removed)
}
