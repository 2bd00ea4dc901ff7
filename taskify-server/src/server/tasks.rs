use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
};
use taskify_shared::api::{OccurrenceReq, TransitionReq};
use taskify_shared::auth::Actor;
use taskify_shared::domain::{CommentPatch, NewComment, NewTask, TaskAction, TaskFilter, TaskPatch};
use tracing::info;

use super::auth::AuthCtx;
use super::{AppError, AppState, ensure_member, ensure_owner, found};
use crate::storage::models::{Task, TaskComment};

/// Children only see tasks assigned to them.
fn ensure_visible(actor: &Actor, task: &Task) -> Result<(), AppError> {
    ensure_member(actor, &task.parent_id)?;
    match actor {
        Actor::Parent(_) => Ok(()),
        Actor::Child { child, .. } if task.child_id.as_deref() == Some(child.0.as_str()) => Ok(()),
        Actor::Child { .. } => Err(AppError::forbidden()),
    }
}

async fn load_task(state: &AppState, auth: &AuthCtx, id: &str) -> Result<Task, AppError> {
    let task = found(state.store.get_task(id).await?, "task", id)?;
    ensure_visible(&auth.actor, &task)?;
    Ok(task)
}

pub(super) async fn list_parent_tasks(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(filter): Query<TaskFilter>,
) -> Result<Json<Vec<Task>>, AppError> {
    Ok(Json(state.store.list_tasks(&id, filter).await?))
}

pub(super) async fn create_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NewTask>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    let task = state.store.create_task(&id, body).await?;
    info!(task_id = %task.task_id, parent_id = %id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

pub(super) async fn list_child_tasks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Task>>, AppError> {
    let child = found(state.store.get_child(&id).await?, "child", &id)?;
    ensure_member(&auth.actor, &child.parent_id)?;
    Ok(Json(state.store.list_tasks_for_child(&id).await?))
}

pub(super) async fn get_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<Task>, AppError> {
    Ok(Json(load_task(&state, &auth, &id).await?))
}

pub(super) async fn update_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<Task>, AppError> {
    let task = load_task(&state, &auth, &id).await?;
    ensure_owner(&auth.actor, &task.parent_id)?;
    Ok(Json(state.store.update_task(&id, patch).await?))
}

pub(super) async fn delete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let task = load_task(&state, &auth, &id).await?;
    ensure_owner(&auth.actor, &task.parent_id)?;
    state.store.delete_task(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn list_occurrences(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Task>>, AppError> {
    load_task(&state, &auth, &id).await?;
    let series = state.store.list_occurrences(&id).await?;
    let visible = series
        .into_iter()
        .filter(|t| ensure_visible(&auth.actor, t).is_ok())
        .collect();
    Ok(Json(visible))
}

pub(super) async fn create_occurrence(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    body: Option<Json<OccurrenceReq>>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    let task = load_task(&state, &auth, &id).await?;
    ensure_owner(&auth.actor, &task.parent_id)?;
    let Json(body) = body.unwrap_or_default();
    let occurrence = state.store.create_occurrence(&id, body.due_date).await?;
    Ok((StatusCode::CREATED, Json(occurrence)))
}

pub(super) async fn task_action(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((id, action)): Path<(String, String)>,
    body: Option<Json<TransitionReq>>,
) -> Result<Json<Task>, AppError> {
    let action: TaskAction = action
        .parse()
        .map_err(|e: taskify_shared::domain::UnknownVariant| AppError::not_found(e.to_string()))?;
    let Json(body) = body.unwrap_or_default();
    let actor = &auth.actor;
    let store = &state.store;
    let task = match action {
        TaskAction::Start => store.start_task(actor, &id).await?,
        TaskAction::Complete => store.complete_task(actor, &id, body.notes).await?,
        TaskAction::Verify => store.verify_task(actor, &id, body.notes).await?,
        TaskAction::Reject => store.reject_task(actor, &id, body.notes).await?,
        TaskAction::Reopen => store.reopen_task(actor, &id).await?,
    };
    info!(task_id = %id, action = %action, status = %task.status, "task transition");
    Ok(Json(task))
}

pub(super) async fn list_comments(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<Vec<TaskComment>>, AppError> {
    load_task(&state, &auth, &id).await?;
    let include_private = matches!(auth.actor, Actor::Parent(_));
    Ok(Json(state.store.list_comments(&id, include_private).await?))
}

pub(super) async fn add_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(body): Json<NewComment>,
) -> Result<(StatusCode, Json<TaskComment>), AppError> {
    load_task(&state, &auth, &id).await?;
    let comment = state
        .store
        .add_comment(&id, auth.actor.as_party(), body)
        .await?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn load_comment(
    state: &AppState,
    auth: &AuthCtx,
    id: &str,
) -> Result<(TaskComment, Task), AppError> {
    let comment = found(state.store.get_comment(id).await?, "comment", id)?;
    let task = found(
        state.store.get_task(&comment.task_id).await?,
        "task",
        &comment.task_id,
    )?;
    ensure_member(&auth.actor, &task.parent_id)?;
    Ok((comment, task))
}

fn is_author(actor: &Actor, comment: &TaskComment) -> bool {
    comment
        .author()
        .is_ok_and(|author| author == actor.as_party())
}

pub(super) async fn update_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(patch): Json<CommentPatch>,
) -> Result<Json<TaskComment>, AppError> {
    let (comment, _) = load_comment(&state, &auth, &id).await?;
    if !is_author(&auth.actor, &comment) {
        return Err(AppError::forbidden());
    }
    Ok(Json(state.store.update_comment(&id, patch).await?))
}

/// Authors may delete their own comments; the owning parent may delete any.
pub(super) async fn delete_comment(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let (comment, task) = load_comment(&state, &auth, &id).await?;
    if !is_author(&auth.actor, &comment) && !auth.actor.is_parent(&task.parent_id) {
        return Err(AppError::forbidden());
    }
    state.store.delete_comment(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
