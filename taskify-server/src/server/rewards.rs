use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
};
use taskify_shared::api::{EligibilityDto, RedeemReq, TransitionReq};
use taskify_shared::auth::Actor;
use taskify_shared::domain::{NewReward, RedemptionAction, RedemptionRequest, RewardPatch};
use tracing::info;

use super::auth::AuthCtx;
use super::{AppError, AppState, ensure_member, ensure_owner, found};
use crate::storage::models::{Reward, RewardRedemption};

/// A child may only look at rewards it could redeem.
fn ensure_visible(actor: &Actor, reward: &Reward) -> Result<(), AppError> {
    ensure_member(actor, &reward.parent_id)?;
    match (actor, &reward.child_id) {
        (Actor::Child { child, .. }, Some(scoped)) if child.0 != *scoped => {
            Err(AppError::forbidden())
        }
        _ => Ok(()),
    }
}

async fn load_reward(state: &AppState, auth: &AuthCtx, id: &str) -> Result<Reward, AppError> {
    let reward = found(state.store.get_reward(id).await?, "reward", id)?;
    ensure_visible(&auth.actor, &reward)?;
    Ok(reward)
}

async fn load_child_in_family(state: &AppState, auth: &AuthCtx, id: &str) -> Result<(), AppError> {
    let child = found(state.store.get_child(id).await?, "child", id)?;
    ensure_member(&auth.actor, &child.parent_id)
}

pub(super) async fn list_parent_rewards(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Reward>>, AppError> {
    Ok(Json(state.store.list_rewards(&id).await?))
}

pub(super) async fn create_reward(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NewReward>,
) -> Result<(StatusCode, Json<Reward>), AppError> {
    let reward = state.store.create_reward(&id, body).await?;
    info!(reward_id = %reward.reward_id, parent_id = %id, cost = reward.cost_points, "reward created");
    Ok((StatusCode::CREATED, Json(reward)))
}

pub(super) async fn list_child_rewards(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Reward>>, AppError> {
    load_child_in_family(&state, &auth, &id).await?;
    Ok(Json(state.store.list_rewards_for_child(&id).await?))
}

pub(super) async fn list_child_redemptions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<Vec<RewardRedemption>>, AppError> {
    load_child_in_family(&state, &auth, &id).await?;
    Ok(Json(state.store.list_redemptions_for_child(&id).await?))
}

pub(super) async fn get_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<Reward>, AppError> {
    Ok(Json(load_reward(&state, &auth, &id).await?))
}

pub(super) async fn update_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(patch): Json<RewardPatch>,
) -> Result<Json<Reward>, AppError> {
    let reward = load_reward(&state, &auth, &id).await?;
    ensure_owner(&auth.actor, &reward.parent_id)?;
    Ok(Json(state.store.update_reward(&id, patch).await?))
}

pub(super) async fn delete_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let reward = load_reward(&state, &auth, &id).await?;
    ensure_owner(&auth.actor, &reward.parent_id)?;
    state.store.delete_reward(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn list_reward_redemptions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<Vec<RewardRedemption>>, AppError> {
    let reward = load_reward(&state, &auth, &id).await?;
    ensure_owner(&auth.actor, &reward.parent_id)?;
    Ok(Json(state.store.list_redemptions_for_reward(&id).await?))
}

pub(super) async fn request_redemption(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
    Json(body): Json<RedeemReq>,
) -> Result<(StatusCode, Json<RewardRedemption>), AppError> {
    load_reward(&state, &auth, &id).await?;
    if let Actor::Child { child, .. } = &auth.actor
        && child.0 != body.child_id
    {
        return Err(AppError::forbidden());
    }
    let redemption = state
        .store
        .request_redemption(
            &auth.actor,
            RedemptionRequest {
                reward_id: id,
                child_id: body.child_id,
                request_key: body.request_key,
                notes: body.notes,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(redemption)))
}

pub(super) async fn eligibility(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((id, child_id)): Path<(String, String)>,
) -> Result<Json<EligibilityDto>, AppError> {
    load_reward(&state, &auth, &id).await?;
    load_child_in_family(&state, &auth, &child_id).await?;
    Ok(Json(
        state.store.redemption_eligibility(&child_id, &id).await?,
    ))
}

pub(super) async fn get_redemption(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path(id): Path<String>,
) -> Result<Json<RewardRedemption>, AppError> {
    let redemption = found(state.store.get_redemption(&id).await?, "redemption", &id)?;
    match &auth.actor {
        Actor::Child { child, .. } if child.0 != redemption.child_id => {
            return Err(AppError::forbidden());
        }
        _ => load_child_in_family(&state, &auth, &redemption.child_id).await?,
    }
    Ok(Json(redemption))
}

pub(super) async fn redemption_action(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthCtx>,
    Path((id, action)): Path<(String, String)>,
    body: Option<Json<TransitionReq>>,
) -> Result<Json<RewardRedemption>, AppError> {
    let action: RedemptionAction = action
        .parse()
        .map_err(|e: taskify_shared::domain::UnknownVariant| AppError::not_found(e.to_string()))?;
    let Json(body) = body.unwrap_or_default();
    let actor = &auth.actor;
    let store = &state.store;
    let redemption = match action {
        RedemptionAction::Approve => store.approve_redemption(actor, &id, body.notes).await?,
        RedemptionAction::Reject => store.reject_redemption(actor, &id, body.notes).await?,
        RedemptionAction::Fulfill => store.fulfill_redemption(actor, &id).await?,
    };
    info!(redemption_id = %id, action = %action, status = %redemption.status, "redemption transition");
    Ok(Json(redemption))
}
