//! Virtual group resolver
//!
//! Pure query functions computing the non-persisted task views. Virtual
//! groups never own task references: "Today", "Important" and "Planned" are
//! predicates over the tasks a user owns in real groups, and "Delegated by
//! me" is an aggregation of assignments over their recipient-owned copies.
//! No function here touches the store; callers fetch, these filter and sort.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Assignment, Task};

/// The predicate-based virtual groups, by reserved position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VirtualView {
    Today,
    Important,
    Planned,
}

impl VirtualView {
    pub fn from_index(index: i64) -> Option<Self> {
        match index {
            0 => Some(VirtualView::Today),
            1 => Some(VirtualView::Important),
            2 => Some(VirtualView::Planned),
            _ => None,
        }
    }

    pub fn index(&self) -> i64 {
        match self {
            VirtualView::Today => 0,
            VirtualView::Important => 1,
            VirtualView::Planned => 2,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            VirtualView::Today => "Today",
            VirtualView::Important => "Important",
            VirtualView::Planned => "Planned",
        }
    }

    fn admits(&self, task: &Task, now: DateTime<Utc>) -> bool {
        match self {
            VirtualView::Today => now.signed_duration_since(task.created_at) < Duration::hours(24),
            VirtualView::Important => task.important,
            VirtualView::Planned => task.due.is_some(),
        }
    }
}

/// A resolved virtual view: the surfaced tasks plus a mapping from each task
/// back to its real owning group, so edits made from the view land on real
/// storage.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedView {
    pub index: i64,
    pub name: &'static str,
    pub tasks: Vec<Task>,
    pub sources: HashMap<Uuid, Uuid>,
}

/// Resolve one predicate view over the tasks a user owns in real groups
/// (the caller excludes "Delegated by me" when fetching).
pub fn resolve(view: VirtualView, tasks: Vec<Task>, now: DateTime<Utc>) -> ResolvedView {
    let mut tasks: Vec<Task> = tasks
        .into_iter()
        .filter(|t| view.admits(t, now))
        .collect();
    sort_for_display(&mut tasks);

    let sources = tasks.iter().map(|t| (t.id, t.group_id)).collect();

    ResolvedView {
        index: view.index(),
        name: view.name(),
        tasks,
        sources,
    }
}

/// Incomplete before completed; newest-created first within each partition.
pub fn sort_for_display(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        a.completed
            .cmp(&b.completed)
            .then(b.created_at.cmp(&a.created_at))
    });
}

/// One display record per assignment in the "Delegated by me" view.
/// Position `i` in `assigned_to` corresponds to position `i` in
/// `original_task_ids`.
#[derive(Debug, Clone, Serialize)]
pub struct AssignmentView {
    pub assignment_id: Uuid,
    pub description: String,
    pub assigned_to: Vec<Uuid>,
    pub original_task_ids: Vec<Uuid>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

/// Aggregate the per-recipient sibling copies back into one row per
/// assignment. `completed` is true only when every sibling is completed.
pub fn aggregate_assignments(assignments: &[Assignment], tasks: &[Task]) -> Vec<AssignmentView> {
    let mut siblings: HashMap<Uuid, Vec<&Task>> = HashMap::new();
    for task in tasks {
        if let Some(assignment_id) = task.assignment_id {
            siblings.entry(assignment_id).or_default().push(task);
        }
    }

    let mut views = Vec::with_capacity(assignments.len());
    for assignment in assignments {
        let mut copies = siblings.remove(&assignment.id).unwrap_or_default();
        // A fully-withdrawn assignment is deleted with its last copy, so an
        // empty sibling set only appears transiently; skip it.
        if copies.is_empty() {
            continue;
        }
        copies.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        views.push(AssignmentView {
            assignment_id: assignment.id,
            description: assignment.description.clone(),
            assigned_to: copies.iter().map(|t| t.owner).collect(),
            original_task_ids: copies.iter().map(|t| t.id).collect(),
            completed: copies.iter().all(|t| t.completed),
            created_at: assignment.created_at,
        });
    }

    views.sort_by(|a, b| {
        a.completed
            .cmp(&b.completed)
            .then(b.created_at.cmp(&a.created_at))
    });
    views
}
