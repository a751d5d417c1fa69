//! HTTP API
//!
//! Thin axum handlers over the ledger, membership, fan-out and resolver
//! components. Identity verification is an external concern: the acting
//! user arrives pre-verified in the `x-user-id` header.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::assignment::Delegation;
use crate::error::{AppError, Result};
use crate::models::{
    CreateUserRequest, DelegateRequest, Group, GroupKind, LedgerEntry, SendTeamRequest, Task,
    Teammate, User,
};
use crate::views::{self, AssignmentView, ResolvedView, VirtualView};
use crate::AppState;

/// The acting user, extracted from the `x-user-id` header
pub struct ActingUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for ActingUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let value = parts
            .headers
            .get("x-user-id")
            .ok_or_else(|| AppError::Validation("Missing x-user-id header".to_string()))?
            .to_str()
            .map_err(|_| AppError::Validation("Malformed x-user-id header".to_string()))?;
        let id = Uuid::parse_str(value)
            .map_err(|_| AppError::Validation(format!("Malformed user id: {}", value)))?;
        Ok(ActingUser(id))
    }
}

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/users", post(create_user))
        .route("/team", get(list_teammates))
        .route("/team/:id", delete(remove_teammate))
        .route("/team/requests", post(send_request).get(list_requests))
        .route("/team/requests/:id/accept", post(accept_request))
        .route("/team/requests/:id/reject", post(reject_request))
        .route("/team/notifications", get(list_notifications))
        .route("/ledger/:id", delete(delete_entry))
        .route("/assignments", post(delegate))
        .route("/assignments/:id", delete(withdraw_all))
        .route("/assignments/:id/status", get(assignment_status))
        .route(
            "/assignments/:id/recipients/:recipient_id",
            delete(withdraw_single),
        )
        .route("/groups/virtual/:index", get(get_virtual_group))
        .route("/groups/:id", get(get_real_group))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>)> {
    let user = state.store.create_user(&body.name).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

// Team relationships

async fn send_request(
    State(state): State<Arc<AppState>>,
    ActingUser(acting): ActingUser,
    Json(body): Json<SendTeamRequest>,
) -> Result<(StatusCode, Json<LedgerEntry>)> {
    let entry = state.ledger.send_request(acting, body.target).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

async fn list_requests(
    State(state): State<Arc<AppState>>,
    ActingUser(acting): ActingUser,
) -> Result<Json<Vec<LedgerEntry>>> {
    let entries = state.ledger.requests_for(acting).await?;
    Ok(Json(entries))
}

async fn accept_request(
    State(state): State<Arc<AppState>>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LedgerEntry>> {
    let entry = state.ledger.accept_request(acting, id).await?;
    Ok(Json(entry))
}

async fn reject_request(
    State(state): State<Arc<AppState>>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LedgerEntry>> {
    let entry = state.ledger.reject_request(acting, id).await?;
    Ok(Json(entry))
}

/// Fetch notifications, then mark them seen: the response shows each entry's
/// read state as of before this call ("new since last read").
async fn list_notifications(
    State(state): State<Arc<AppState>>,
    ActingUser(acting): ActingUser,
) -> Result<Json<Vec<LedgerEntry>>> {
    let entries = state.ledger.notifications_for(acting).await?;
    state.ledger.mark_notifications_seen(acting).await?;
    Ok(Json(entries))
}

async fn delete_entry(
    State(state): State<Arc<AppState>>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.ledger.delete_entry(acting, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_teammates(
    State(state): State<Arc<AppState>>,
    ActingUser(acting): ActingUser,
) -> Result<Json<Vec<Teammate>>> {
    let teammates = state.membership.teammates_of(acting).await?;
    Ok(Json(teammates))
}

async fn remove_teammate(
    State(state): State<Arc<AppState>>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.membership.remove_teammate(acting, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Delegation

async fn delegate(
    State(state): State<Arc<AppState>>,
    ActingUser(acting): ActingUser,
    Json(body): Json<DelegateRequest>,
) -> Result<(StatusCode, Json<Delegation>)> {
    let delegation = state
        .assignments
        .delegate(acting, &body.recipients, &body.task)
        .await?;
    Ok((StatusCode::CREATED, Json(delegation)))
}

async fn withdraw_all(
    State(state): State<Arc<AppState>>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.assignments.withdraw_all(acting, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn withdraw_single(
    State(state): State<Arc<AppState>>,
    ActingUser(acting): ActingUser,
    Path((id, recipient_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode> {
    state
        .assignments
        .withdraw_single(acting, id, recipient_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn assignment_status(
    State(state): State<Arc<AppState>>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<HashMap<Uuid, bool>>> {
    let status = state.assignments.status(acting, id).await?;
    Ok(Json(status))
}

// Groups

/// A resolved virtual group: either a predicate view or the delegated-by-me
/// aggregation, depending on the index.
#[derive(Serialize)]
#[serde(untagged)]
enum VirtualGroupResponse {
    Predicate(ResolvedView),
    Delegations {
        index: i64,
        name: &'static str,
        assignments: Vec<AssignmentView>,
    },
}

async fn get_virtual_group(
    State(state): State<Arc<AppState>>,
    ActingUser(acting): ActingUser,
    Path(index): Path<i64>,
) -> Result<Json<VirtualGroupResponse>> {
    if let Some(view) = VirtualView::from_index(index) {
        let tasks = state.store.tasks_in_real_groups(acting).await?;
        let resolved = views::resolve(view, tasks, Utc::now());
        return Ok(Json(VirtualGroupResponse::Predicate(resolved)));
    }

    if index == Group::DELEGATED_BY_ME {
        let assignments = state.store.assignments_for_owner(acting).await?;
        let tasks = state.store.tasks_for_owner_assignments(acting).await?;
        return Ok(Json(VirtualGroupResponse::Delegations {
            index,
            name: "Delegated by me",
            assignments: views::aggregate_assignments(&assignments, &tasks),
        }));
    }

    Err(AppError::Validation(format!(
        "Group index {} is not a virtual group",
        index
    )))
}

#[derive(Serialize)]
struct GroupWithTasks {
    group: Group,
    tasks: Vec<Task>,
}

async fn get_real_group(
    State(state): State<Arc<AppState>>,
    ActingUser(acting): ActingUser,
    Path(id): Path<Uuid>,
) -> Result<Json<GroupWithTasks>> {
    let group = state.store.get_group(id).await?;
    if group.owner != acting {
        return Err(AppError::NotFound(format!("Group {} not found", id)));
    }
    if group.kind == GroupKind::Virtual {
        return Err(AppError::Validation(
            "Virtual groups are resolved by index, not fetched by id".to_string(),
        ));
    }

    let mut tasks = state.store.tasks_for_group(id).await?;
    views::sort_for_display(&mut tasks);

    Ok(Json(GroupWithTasks { group, tasks }))
}
