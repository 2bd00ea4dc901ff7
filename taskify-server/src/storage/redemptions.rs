use diesel::prelude::*;
use taskify_shared::api::EligibilityDto;
use taskify_shared::auth::Actor;
use taskify_shared::domain::{
    NewNotification, NotificationKind, PartyRef, RedemptionAction, RedemptionRequest,
    RedemptionStatus,
};
use tracing::info;

use super::models::{Child, Reward, RewardRedemption};
use super::schema::{reward_redemptions, rewards};
use super::rewards as reward_store;
use super::{StorageError, Store, children, new_id, notifications, now_iso, parents};

fn find(conn: &mut SqliteConnection, id: &str) -> Result<Option<RewardRedemption>, StorageError> {
    Ok(reward_redemptions::table
        .find(id)
        .select(RewardRedemption::as_select())
        .first(conn)
        .optional()?)
}

/// Whether `child` may redeem `reward` at `now`, leaving the balance aside.
fn check_available(reward: &Reward, child: &Child, now: &str) -> Result<(), StorageError> {
    if reward.parent_id != child.parent_id {
        return Err(StorageError::constraint(format!(
            "reward {} belongs to another family",
            reward.reward_id
        )));
    }
    if !reward.is_active {
        return Err(StorageError::RewardUnavailable("reward is not active".into()));
    }
    if let Some(from) = &reward.available_from
        && now < from.as_str()
    {
        return Err(StorageError::RewardUnavailable(format!(
            "reward is available from {from}"
        )));
    }
    if let Some(until) = &reward.available_until
        && now > until.as_str()
    {
        return Err(StorageError::RewardUnavailable(format!(
            "reward was available until {until}"
        )));
    }
    if let Some(scope) = &reward.child_id
        && scope != &child.child_id
    {
        return Err(StorageError::RewardUnavailable(
            "reward is reserved for another child".into(),
        ));
    }
    if let Some(cap) = reward.max_redemptions
        && reward.redemption_count >= cap
    {
        return Err(StorageError::RewardUnavailable(format!(
            "reward already redeemed {cap} times"
        )));
    }
    Ok(())
}

fn step(
    redemption: &RewardRedemption,
    action: RedemptionAction,
) -> Result<RedemptionStatus, StorageError> {
    let from = redemption.redemption_status()?;
    action
        .target(from)
        .ok_or_else(|| StorageError::InvalidTransition {
            entity: "redemption",
            from: from.to_string(),
            action: action.as_str(),
        })
}

/// Loads a redemption for a parent decision: the actor must own the child's
/// family and have an active account.
fn load_for_decision(
    conn: &mut SqliteConnection,
    actor: &Actor,
    id: &str,
) -> Result<(RewardRedemption, Reward), StorageError> {
    let redemption = find(conn, id)?.ok_or_else(|| StorageError::not_found("redemption", id))?;
    let child = children::require(conn, &redemption.child_id)?;
    parents::authorize_owner(conn, actor, &child.parent_id)?;
    let reward = reward_store::require(conn, &redemption.reward_id)?;
    Ok((redemption, reward))
}

fn notify_child(
    conn: &mut SqliteConnection,
    redemption: &RewardRedemption,
    reward: &Reward,
    kind: NotificationKind,
    title: &str,
    message: String,
) -> Result<(), StorageError> {
    notifications::insert(
        conn,
        NewNotification::new(
            PartyRef::Child(redemption.child_id.as_str().into()),
            kind,
            title,
            message,
        )
        .reward(&reward.reward_id)
        .child(&redemption.child_id),
    )?;
    Ok(())
}

impl Store {
    /// Creates a pending redemption and debits its cost from the child's
    /// balance in one transaction.
    ///
    /// When `request_key` matches an earlier request of the same child, that
    /// redemption is returned and nothing is debited again.
    pub async fn request_redemption(
        &self,
        actor: &Actor,
        req: RedemptionRequest,
    ) -> Result<RewardRedemption, StorageError> {
        let actor = actor.clone();
        if let Some(key) = &req.request_key
            && key.trim().is_empty()
        {
            return Err(StorageError::invalid("request_key must not be blank"));
        }
        self.with_tx(move |conn| {
            let child = children::require(conn, &req.child_id)?;
            if !actor.is_child(&child.child_id) && !actor.is_parent(&child.parent_id) {
                return Err(StorageError::unauthorized(
                    "only the child or its parent may request a redemption",
                ));
            }
            let parent = parents::require(conn, &child.parent_id)?;
            parents::ensure_active(&parent)?;

            if let Some(key) = &req.request_key {
                let existing = reward_redemptions::table
                    .filter(reward_redemptions::child_id.eq(&child.child_id))
                    .filter(reward_redemptions::request_key.eq(key))
                    .select(RewardRedemption::as_select())
                    .first(conn)
                    .optional()?;
                if let Some(existing) = existing {
                    if existing.reward_id != req.reward_id {
                        return Err(StorageError::constraint(
                            "request_key was already used for a different reward",
                        ));
                    }
                    info!(redemption_id = %existing.redemption_id, "redemption request replayed");
                    return Ok(existing);
                }
            }

            let reward = reward_store::require(conn, &req.reward_id)?;
            let now = now_iso();
            check_available(&reward, &child, &now)?;
            let balance = children::adjust_points(conn, &child.child_id, -reward.cost_points)?;
            diesel::update(rewards::table.find(&reward.reward_id))
                .set((
                    rewards::redemption_count.eq(rewards::redemption_count + 1),
                    rewards::updated_at.eq(&now),
                ))
                .execute(conn)?;

            let row = RewardRedemption {
                redemption_id: new_id(),
                reward_id: reward.reward_id.clone(),
                child_id: child.child_id.clone(),
                points_spent: reward.cost_points,
                redeemed_at: now,
                status: RedemptionStatus::Pending.as_str().to_string(),
                approved_by: None,
                approved_at: None,
                fulfilled_at: None,
                notes: req.notes,
                request_key: req.request_key,
            };
            diesel::insert_into(reward_redemptions::table)
                .values(&row)
                .execute(conn)?;
            notifications::insert(
                conn,
                NewNotification::new(
                    PartyRef::Parent(parent.parent_id.as_str().into()),
                    NotificationKind::RedemptionRequested,
                    "Reward requested",
                    format!("{} wants to redeem \"{}\"", child.first_name, reward.name),
                )
                .reward(&reward.reward_id)
                .child(&child.child_id),
            )?;
            info!(
                redemption_id = %row.redemption_id,
                child_id = %row.child_id,
                reward_id = %row.reward_id,
                points = row.points_spent,
                balance,
                "redemption requested"
            );
            Ok(row)
        })
        .await
    }

    /// `pending -> approved`.
    pub async fn approve_redemption(
        &self,
        actor: &Actor,
        id: &str,
        notes: Option<String>,
    ) -> Result<RewardRedemption, StorageError> {
        let actor = actor.clone();
        let id = id.to_string();
        self.with_tx(move |conn| {
            let (redemption, reward) = load_for_decision(conn, &actor, &id)?;
            let next = step(&redemption, RedemptionAction::Approve)?;
            let now = now_iso();
            let updated = diesel::update(reward_redemptions::table.find(&id))
                .set((
                    reward_redemptions::status.eq(next.as_str()),
                    reward_redemptions::approved_by.eq(Some(actor.family().0.clone())),
                    reward_redemptions::approved_at.eq(Some(now)),
                    reward_redemptions::notes.eq(notes.or(redemption.notes.clone())),
                ))
                .returning(RewardRedemption::as_returning())
                .get_result(conn)?;
            notify_child(
                conn,
                &updated,
                &reward,
                NotificationKind::RedemptionApproved,
                "Reward approved",
                format!("\"{}\" was approved", reward.name),
            )?;
            info!(redemption_id = %id, "redemption approved");
            Ok(updated)
        })
        .await
    }

    /// `pending -> rejected`; the points go back to the child and the reward's
    /// redemption count is released.
    pub async fn reject_redemption(
        &self,
        actor: &Actor,
        id: &str,
        notes: Option<String>,
    ) -> Result<RewardRedemption, StorageError> {
        let actor = actor.clone();
        let id = id.to_string();
        self.with_tx(move |conn| {
            let (redemption, reward) = load_for_decision(conn, &actor, &id)?;
            let next = step(&redemption, RedemptionAction::Reject)?;
            let now = now_iso();
            let balance =
                children::adjust_points(conn, &redemption.child_id, redemption.points_spent)?;
            diesel::update(
                rewards::table
                    .find(&reward.reward_id)
                    .filter(rewards::redemption_count.gt(0)),
            )
            .set((
                rewards::redemption_count.eq(rewards::redemption_count - 1),
                rewards::updated_at.eq(&now),
            ))
            .execute(conn)?;
            let updated = diesel::update(reward_redemptions::table.find(&id))
                .set((
                    reward_redemptions::status.eq(next.as_str()),
                    reward_redemptions::notes.eq(notes.or(redemption.notes.clone())),
                ))
                .returning(RewardRedemption::as_returning())
                .get_result(conn)?;
            notify_child(
                conn,
                &updated,
                &reward,
                NotificationKind::RedemptionRejected,
                "Reward declined",
                format!(
                    "\"{}\" was declined; {} points were returned",
                    reward.name, redemption.points_spent
                ),
            )?;
            info!(
                redemption_id = %id,
                refunded = redemption.points_spent,
                balance,
                "redemption rejected"
            );
            Ok(updated)
        })
        .await
    }

    /// `approved -> fulfilled`.
    pub async fn fulfill_redemption(
        &self,
        actor: &Actor,
        id: &str,
    ) -> Result<RewardRedemption, StorageError> {
        let actor = actor.clone();
        let id = id.to_string();
        self.with_tx(move |conn| {
            let (redemption, reward) = load_for_decision(conn, &actor, &id)?;
            let next = step(&redemption, RedemptionAction::Fulfill)?;
            let updated = diesel::update(reward_redemptions::table.find(&id))
                .set((
                    reward_redemptions::status.eq(next.as_str()),
                    reward_redemptions::fulfilled_at.eq(Some(now_iso())),
                ))
                .returning(RewardRedemption::as_returning())
                .get_result(conn)?;
            notify_child(
                conn,
                &updated,
                &reward,
                NotificationKind::RedemptionFulfilled,
                "Reward delivered",
                format!("Enjoy \"{}\"!", reward.name),
            )?;
            info!(redemption_id = %id, "redemption fulfilled");
            Ok(updated)
        })
        .await
    }

    pub async fn get_redemption(&self, id: &str) -> Result<Option<RewardRedemption>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| find(conn, &id)).await
    }

    /// Newest first.
    pub async fn list_redemptions_for_child(
        &self,
        child_id: &str,
    ) -> Result<Vec<RewardRedemption>, StorageError> {
        let child_id = child_id.to_string();
        self.with_conn(move |conn| {
            Ok(reward_redemptions::table
                .filter(reward_redemptions::child_id.eq(&child_id))
                .order((
                    reward_redemptions::redeemed_at.desc(),
                    reward_redemptions::redemption_id.asc(),
                ))
                .select(RewardRedemption::as_select())
                .load(conn)?)
        })
        .await
    }

    pub async fn list_redemptions_for_reward(
        &self,
        reward_id: &str,
    ) -> Result<Vec<RewardRedemption>, StorageError> {
        let reward_id = reward_id.to_string();
        self.with_conn(move |conn| {
            Ok(reward_redemptions::table
                .filter(reward_redemptions::reward_id.eq(&reward_id))
                .order((
                    reward_redemptions::redeemed_at.desc(),
                    reward_redemptions::redemption_id.asc(),
                ))
                .select(RewardRedemption::as_select())
                .load(conn)?)
        })
        .await
    }

    /// Would a redemption of `reward_id` by `child_id` succeed right now?
    pub async fn redemption_eligibility(
        &self,
        child_id: &str,
        reward_id: &str,
    ) -> Result<EligibilityDto, StorageError> {
        let child_id = child_id.to_string();
        let reward_id = reward_id.to_string();
        self.with_conn(move |conn| {
            let child = children::require(conn, &child_id)?;
            let reward = reward_store::require(conn, &reward_id)?;
            let reason = match check_available(&reward, &child, &now_iso()) {
                Ok(()) if child.reward_points < reward.cost_points => Some(format!(
                    "needs {} more points",
                    reward.cost_points - child.reward_points
                )),
                Ok(()) => None,
                Err(
                    e @ (StorageError::RewardUnavailable(_)
                    | StorageError::ConstraintViolation(_)),
                ) => Some(e.to_string()),
                Err(e) => return Err(e),
            };
            Ok(EligibilityDto {
                child_id: child.child_id,
                reward_id: reward.reward_id,
                eligible: reason.is_none(),
                cost_points: reward.cost_points,
                balance: child.reward_points,
                reason,
            })
        })
        .await
    }
}
