use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use taskify_shared::api::CountDto;
use taskify_shared::domain::{NewNotification, PartyRef};

use super::auth::AuthCtx;
use super::{AppError, AppState, ensure_owner, found};
use crate::storage::models::Notification;

#[derive(Debug, Default, Deserialize)]
pub(super) struct ListParams {
    #[serde(default)]
    unread: Option<bool>,
}

/// The caller's own inbox.
pub(super) async fn list(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Notification>>, AppError> {
    let items = state
        .store
        .list_notifications(&auth.actor.as_party(), params.unread.unwrap_or(false))
        .await?;
    Ok(Json(items))
}

pub(super) async fn count(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
) -> Result<Json<CountDto>, AppError> {
    let count = state
        .store
        .unread_notification_count(&auth.actor.as_party())
        .await?;
    Ok(Json(CountDto { count }))
}

/// Parents may notify themselves or any of their children.
pub(super) async fn create(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Json(body): Json<NewNotification>,
) -> Result<(StatusCode, Json<Notification>), AppError> {
    match &body.recipient {
        PartyRef::Parent(p) => ensure_owner(&auth.actor, &p.0)?,
        PartyRef::Child(c) => {
            let child = found(state.store.get_child(&c.0).await?, "child", &c.0)?;
            ensure_owner(&auth.actor, &child.parent_id)?;
        }
    }
    let created = state.store.create_notification(body).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn load_own(state: &AppState, auth: &AuthCtx, id: &str) -> Result<Notification, AppError> {
    let item = found(state.store.get_notification(id).await?, "notification", id)?;
    let mine = item
        .recipient()
        .is_ok_and(|recipient| recipient == auth.actor.as_party());
    if !mine {
        // Do not reveal notifications addressed to someone else
        return Err(AppError::not_found(format!("notification not found: {id}")));
    }
    Ok(item)
}

pub(super) async fn mark_read(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<Notification>, AppError> {
    load_own(&state, &auth, &id).await?;
    Ok(Json(state.store.mark_notification_read(&id).await?))
}

pub(super) async fn delete(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    load_own(&state, &auth, &id).await?;
    state.store.delete_notification(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
