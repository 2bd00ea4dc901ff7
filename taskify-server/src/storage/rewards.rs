use diesel::prelude::*;
use taskify_shared::domain::{
    NewNotification, NewReward, NotificationKind, PartyRef, RedemptionStatus, RewardPatch,
};
use tracing::info;

use super::models::{Reward, RewardChanges, RewardRedemption};
use super::schema::{reward_redemptions, rewards};
use super::{
    StorageError, Store, children, new_id, normalize_ts, notifications, now_iso, parents, required,
};

pub(crate) fn find(conn: &mut SqliteConnection, id: &str) -> Result<Option<Reward>, StorageError> {
    Ok(rewards::table
        .find(id)
        .select(Reward::as_select())
        .first(conn)
        .optional()?)
}

pub(crate) fn require(conn: &mut SqliteConnection, id: &str) -> Result<Reward, StorageError> {
    find(conn, id)?.ok_or_else(|| StorageError::not_found("reward", id))
}

fn positive(field: &'static str, value: i32) -> Result<i32, StorageError> {
    if value <= 0 {
        return Err(StorageError::constraint(format!("{field} must be positive")));
    }
    Ok(value)
}

fn check_window(from: Option<&str>, until: Option<&str>) -> Result<(), StorageError> {
    if let (Some(from), Some(until)) = (from, until)
        && from > until
    {
        return Err(StorageError::constraint(
            "available_from must not be after available_until",
        ));
    }
    Ok(())
}

impl Store {
    pub async fn create_reward(
        &self,
        parent_id: &str,
        input: NewReward,
    ) -> Result<Reward, StorageError> {
        let name = required("name", &input.name)?;
        let cost_points = positive("cost_points", input.cost_points)?;
        if let Some(cap) = input.max_redemptions {
            positive("max_redemptions", cap)?;
        }
        let available_from = normalize_ts(input.available_from.as_deref())?;
        let available_until = normalize_ts(input.available_until.as_deref())?;
        check_window(available_from.as_deref(), available_until.as_deref())?;
        let now = now_iso();
        let row = Reward {
            reward_id: new_id(),
            parent_id: parent_id.to_string(),
            child_id: input.child_id,
            name,
            description: input.description,
            cost_points,
            category: input.category.unwrap_or_else(|| "general".into()),
            icon: input.icon.unwrap_or_else(|| "gift".into()),
            color: input.color.unwrap_or_else(|| "#10B981".into()),
            is_active: true,
            max_redemptions: input.max_redemptions,
            redemption_count: 0,
            available_from,
            available_until,
            created_at: now.clone(),
            updated_at: now,
        };
        self.with_tx(move |conn| {
            parents::require(conn, &row.parent_id)?;
            if let Some(child_id) = &row.child_id {
                children::require_in_family(conn, child_id, &row.parent_id)?;
            }
            diesel::insert_into(rewards::table).values(&row).execute(conn)?;
            info!(reward_id = %row.reward_id, cost = row.cost_points, "reward created");
            Ok(row)
        })
        .await
    }

    pub async fn get_reward(&self, id: &str) -> Result<Option<Reward>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| find(conn, &id)).await
    }

    pub async fn list_rewards(&self, parent_id: &str) -> Result<Vec<Reward>, StorageError> {
        let parent_id = parent_id.to_string();
        self.with_conn(move |conn| {
            Ok(rewards::table
                .filter(rewards::parent_id.eq(&parent_id))
                .order((rewards::cost_points.asc(), rewards::name.asc()))
                .select(Reward::as_select())
                .load(conn)?)
        })
        .await
    }

    /// Active family-wide rewards plus those scoped to the child.
    pub async fn list_rewards_for_child(&self, child_id: &str) -> Result<Vec<Reward>, StorageError> {
        let child_id = child_id.to_string();
        self.with_conn(move |conn| {
            let child = children::require(conn, &child_id)?;
            Ok(rewards::table
                .filter(rewards::parent_id.eq(&child.parent_id))
                .filter(rewards::is_active.eq(true))
                .filter(
                    rewards::child_id
                        .is_null()
                        .or(rewards::child_id.eq(&child.child_id)),
                )
                .order((rewards::cost_points.asc(), rewards::name.asc()))
                .select(Reward::as_select())
                .load(conn)?)
        })
        .await
    }

    /// Changing `cost_points` does not touch existing redemptions; they keep
    /// the price paid.
    pub async fn update_reward(&self, id: &str, patch: RewardPatch) -> Result<Reward, StorageError> {
        let id = id.to_string();
        let name = patch
            .name
            .as_deref()
            .map(|v| required("name", v))
            .transpose()?;
        if let Some(cost) = patch.cost_points {
            positive("cost_points", cost)?;
        }
        if let Some(Some(cap)) = patch.max_redemptions {
            positive("max_redemptions", cap)?;
        }
        let available_from = match patch.available_from {
            Some(v) => Some(normalize_ts(v.as_deref())?),
            None => None,
        };
        let available_until = match patch.available_until {
            Some(v) => Some(normalize_ts(v.as_deref())?),
            None => None,
        };
        self.with_tx(move |conn| {
            let reward = require(conn, &id)?;
            let from = available_from.clone().unwrap_or(reward.available_from);
            let until = available_until.clone().unwrap_or(reward.available_until);
            check_window(from.as_deref(), until.as_deref())?;
            if let Some(Some(child_id)) = &patch.child_id {
                children::require_in_family(conn, child_id, &reward.parent_id)?;
            }
            let changes = RewardChanges {
                name,
                description: patch.description,
                cost_points: patch.cost_points,
                child_id: patch.child_id,
                category: patch.category,
                icon: patch.icon,
                color: patch.color,
                is_active: patch.is_active,
                max_redemptions: patch.max_redemptions,
                available_from,
                available_until,
                updated_at: now_iso(),
            };
            Ok(diesel::update(rewards::table.find(&id))
                .set(&changes)
                .returning(Reward::as_returning())
                .get_result(conn)?)
        })
        .await
    }

    /// Removes the reward together with its redemption history. Points held
    /// by pending redemptions go back to the children first, each of whom is
    /// told about it.
    pub async fn delete_reward(&self, id: &str) -> Result<(), StorageError> {
        let id = id.to_string();
        self.with_tx(move |conn| {
            let reward = require(conn, &id)?;
            let pending: Vec<RewardRedemption> = reward_redemptions::table
                .filter(reward_redemptions::reward_id.eq(&id))
                .filter(reward_redemptions::status.eq(RedemptionStatus::Pending.as_str()))
                .select(RewardRedemption::as_select())
                .load(conn)?;
            for redemption in &pending {
                let balance =
                    children::adjust_points(conn, &redemption.child_id, redemption.points_spent)?;
                notifications::insert(
                    conn,
                    NewNotification::new(
                        PartyRef::Child(redemption.child_id.as_str().into()),
                        NotificationKind::RedemptionRejected,
                        "Reward withdrawn",
                        format!(
                            "\"{}\" is no longer offered; {} points were returned",
                            reward.name, redemption.points_spent
                        ),
                    )
                    .child(&redemption.child_id),
                )?;
                info!(
                    redemption_id = %redemption.redemption_id,
                    refunded = redemption.points_spent,
                    balance,
                    "pending redemption refunded"
                );
            }
            diesel::delete(rewards::table.find(&id)).execute(conn)?;
            info!(reward_id = %id, refunded = pending.len(), "reward deleted");
            Ok(())
        })
        .await
    }
}
