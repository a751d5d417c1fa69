//! Data models for users, tasks, groups and the relationship ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    /// Teammate ids; the edge set is symmetric
    pub team: Vec<Uuid>,
    pub total_tasks: i64,
    pub completed_tasks: i64,
    pub created_at: DateTime<Utc>,
}

/// Kind of a ledger entry.
///
/// Requests carry no `official` flag, so an "official request" is
/// unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryKind {
    /// A team-relationship request awaiting accept/reject
    Request,
    /// A notification; `official` marks system-generated confirmations
    Notification { official: bool },
}

impl EntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryKind::Request => "request",
            EntryKind::Notification { .. } => "notification",
        }
    }

    pub fn is_request(&self) -> bool {
        matches!(self, EntryKind::Request)
    }

    pub fn is_official(&self) -> bool {
        matches!(self, EntryKind::Notification { official: true })
    }
}

/// A single request-or-notification record between two users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub to_user: Uuid,
    pub from_user: Uuid,
    #[serde(flatten)]
    pub kind: EntryKind,
    pub processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_task: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A task owned by exactly one real group
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub description: String,
    pub completed: bool,
    pub important: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub owner: Uuid,
    pub group_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Whether a group stores tasks or is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    Virtual,
    Real,
}

impl GroupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupKind::Virtual => "virtual",
            GroupKind::Real => "real",
        }
    }
}

impl std::str::FromStr for GroupKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "virtual" => Ok(GroupKind::Virtual),
            "real" => Ok(GroupKind::Real),
            _ => Err(format!("Invalid group kind: {}", s)),
        }
    }
}

/// A task group. Positions 0-4 are system-reserved and created at signup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub owner: Uuid,
    pub position: i64,
    pub kind: GroupKind,
    pub created_at: DateTime<Utc>,
}

impl Group {
    /// Reserved position of the "Delegated to me" group (receives fan-out copies)
    pub const DELEGATED_TO_ME: i64 = 3;
    /// Reserved position of the "Delegated by me" group (resolved from assignments)
    pub const DELEGATED_BY_ME: i64 = 4;
    /// First position available to user-created groups
    pub const FIRST_USER_POSITION: i64 = 5;

    /// The five reserved groups created at signup, in fixed order
    pub fn reserved() -> [(&'static str, i64, GroupKind); 5] {
        [
            ("Today", 0, GroupKind::Virtual),
            ("Important", 1, GroupKind::Virtual),
            ("Planned", 2, GroupKind::Virtual),
            ("Delegated to me", Self::DELEGATED_TO_ME, GroupKind::Real),
            ("Delegated by me", Self::DELEGATED_BY_ME, GroupKind::Real),
        ]
    }
}

/// The sibling task copies produced by one delegation call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub owner: Uuid,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Template a delegation call stamps out per recipient
#[derive(Debug, Clone, Deserialize)]
pub struct TaskTemplate {
    pub description: String,
    #[serde(default)]
    pub important: bool,
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,
    #[serde(default)]
    pub message: Option<String>,
}

impl TaskTemplate {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            important: false,
            due: None,
            message: None,
        }
    }

    pub fn important(mut self) -> Self {
        self.important = true;
        self
    }

    pub fn with_due(mut self, due: DateTime<Utc>) -> Self {
        self.due = Some(due);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// A teammate as seen from another user's team listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Teammate {
    pub id: Uuid,
    pub name: String,
}

/// Request to create a new user
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: String,
}

/// Request to send a team request
#[derive(Debug, Deserialize)]
pub struct SendTeamRequest {
    pub target: Uuid,
}

/// Request to delegate a task to teammates
#[derive(Debug, Deserialize)]
pub struct DelegateRequest {
    pub recipients: Vec<Uuid>,
    pub task: TaskTemplate,
}
