//! Parents, children and categories.

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
};
use taskify_shared::api::{
    AccountStatusReq, ConsumeTokenReq, EmailVerifiedDto, IssuedTokenDto, PointsSummaryDto,
    SignupReq,
};
use taskify_shared::domain::{
    CategoryPatch, ChildPatch, NewCategory, NewChild, NewParent, ParentPatch,
};
use tracing::{error, info};

use super::auth::AuthCtx;
use super::{AppError, AppState, ensure_member, ensure_owner, found};
use crate::storage::models::{Category, Child, Parent};

const MIN_PASSWORD_LEN: usize = 8;

pub(super) async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupReq>,
) -> Result<(StatusCode, Json<Parent>), AppError> {
    if body.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::bad_request(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let password_hash = bcrypt::hash(&body.password, bcrypt::DEFAULT_COST).map_err(|e| {
        error!(error = %e, "signup: bcrypt hash failed");
        AppError::internal(e)
    })?;
    let parent = state
        .store
        .create_parent(NewParent {
            email: body.email,
            password_hash,
            first_name: body.first_name,
            last_name: body.last_name,
            timezone: body.timezone,
            language: body.language,
            privacy_consent: body.privacy_consent,
            marketing_consent: body.marketing_consent,
            data_retention_consent: body.data_retention_consent,
        })
        .await?;
    info!(parent_id = %parent.parent_id, "signup");
    Ok((StatusCode::CREATED, Json(parent)))
}

pub(super) async fn get_parent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Parent>, AppError> {
    // ACL pins the path to the caller
    let parent = found(state.store.get_parent(&id).await?, "parent", &id)?;
    Ok(Json(parent))
}

pub(super) async fn update_parent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(patch): Json<ParentPatch>,
) -> Result<Json<Parent>, AppError> {
    Ok(Json(state.store.update_parent(&id, patch).await?))
}

pub(super) async fn delete_parent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.delete_parent(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn set_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AccountStatusReq>,
) -> Result<Json<Parent>, AppError> {
    Ok(Json(state.store.set_account_status(&id, body.status).await?))
}

/// The plaintext token is returned once, for the mail dispatcher to send.
pub(super) async fn issue_email_verification(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<IssuedTokenDto>), AppError> {
    let issued = state
        .store
        .issue_email_verification(&id, state.config.email_token_ttl())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(IssuedTokenDto {
            token_id: issued.token.token_id,
            token: issued.plaintext,
            expires_at: issued.token.expires_at,
        }),
    ))
}

pub(super) async fn consume_email_verification(
    State(state): State<AppState>,
    Json(body): Json<ConsumeTokenReq>,
) -> Result<Json<EmailVerifiedDto>, AppError> {
    if body.token.trim().is_empty() {
        return Err(AppError::bad_request("token is required"));
    }
    let parent = state.store.consume_email_verification(&body.token).await?;
    Ok(Json(EmailVerifiedDto {
        parent_id: parent.parent_id,
        email: parent.email,
        email_verified_at: parent.email_verified_at,
    }))
}

pub(super) async fn list_children(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Child>>, AppError> {
    Ok(Json(state.store.list_children(&id).await?))
}

pub(super) async fn create_child(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NewChild>,
) -> Result<(StatusCode, Json<Child>), AppError> {
    let child = state.store.create_child(&id, body).await?;
    Ok((StatusCode::CREATED, Json(child)))
}

async fn load_child(state: &AppState, auth: &AuthCtx, id: &str) -> Result<Child, AppError> {
    let child = found(state.store.get_child(id).await?, "child", id)?;
    ensure_member(&auth.actor, &child.parent_id)?;
    Ok(child)
}

pub(super) async fn get_child(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<Child>, AppError> {
    Ok(Json(load_child(&state, &auth, &id).await?))
}

pub(super) async fn update_child(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(patch): Json<ChildPatch>,
) -> Result<Json<Child>, AppError> {
    let child = load_child(&state, &auth, &id).await?;
    ensure_owner(&auth.actor, &child.parent_id)?;
    Ok(Json(state.store.update_child(&id, patch).await?))
}

pub(super) async fn delete_child(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let child = load_child(&state, &auth, &id).await?;
    ensure_owner(&auth.actor, &child.parent_id)?;
    state.store.delete_child(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn child_points(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<PointsSummaryDto>, AppError> {
    load_child(&state, &auth, &id).await?;
    let summary = state.store.points_summary(&id).await?;
    if !summary.consistent {
        tracing::warn!(
            child_id = %id,
            balance = summary.balance,
            earned = summary.lifetime_earned,
            spent = summary.total_spent,
            "points: balance differs from task and redemption history"
        );
    }
    Ok(Json(summary))
}

pub(super) async fn list_categories(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Category>>, AppError> {
    Ok(Json(state.store.list_categories(&id).await?))
}

pub(super) async fn create_category(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NewCategory>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    let category = state.store.create_category(&id, body).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn load_category(state: &AppState, auth: &AuthCtx, id: &str) -> Result<Category, AppError> {
    let category = found(state.store.get_category(id).await?, "category", id)?;
    ensure_owner(&auth.actor, &category.parent_id)?;
    Ok(category)
}

pub(super) async fn get_category(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<Category>, AppError> {
    Ok(Json(load_category(&state, &auth, &id).await?))
}

pub(super) async fn update_category(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(patch): Json<CategoryPatch>,
) -> Result<Json<Category>, AppError> {
    load_category(&state, &auth, &id).await?;
    Ok(Json(state.store.update_category(&id, patch).await?))
}

pub(super) async fn delete_category(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    load_category(&state, &auth, &id).await?;
    state.store.delete_category(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
