use diesel::dsl::sum;
use diesel::prelude::*;
use taskify_shared::api::PointsSummaryDto;
use taskify_shared::domain::{
    ChildPatch, Difficulty, NewChild, PartyKind, RedemptionStatus, TaskStatus,
};
use tracing::info;

use super::models::{Child, ChildChanges};
use super::schema::{children, notifications, reward_redemptions, rewards, tasks};
use super::{StorageError, Store, new_id, normalize_ts, now_iso, parents, required};

pub(crate) fn find(conn: &mut SqliteConnection, id: &str) -> Result<Option<Child>, StorageError> {
    Ok(children::table
        .find(id)
        .select(Child::as_select())
        .first(conn)
        .optional()?)
}

pub(crate) fn require(conn: &mut SqliteConnection, id: &str) -> Result<Child, StorageError> {
    find(conn, id)?.ok_or_else(|| StorageError::not_found("child", id))
}

/// Loads `child_id` and checks it belongs to `parent_id`.
pub(crate) fn require_in_family(
    conn: &mut SqliteConnection,
    child_id: &str,
    parent_id: &str,
) -> Result<Child, StorageError> {
    let child = require(conn, child_id)?;
    if child.parent_id != parent_id {
        return Err(StorageError::constraint(format!(
            "child {child_id} belongs to another family"
        )));
    }
    Ok(child)
}

/// Adds `delta` (may be negative) to the balance. A debit larger than the
/// balance changes nothing and reports `InsufficientBalance`; a credit that
/// would not fit the column is a constraint violation.
pub(crate) fn adjust_points(
    conn: &mut SqliteConnection,
    child_id: &str,
    delta: i32,
) -> Result<i32, StorageError> {
    let now = now_iso();
    if delta >= 0 {
        let child = require(conn, child_id)?;
        let balance = child.reward_points.checked_add(delta).ok_or_else(|| {
            StorageError::constraint(format!(
                "crediting {delta} points would overflow the balance of child {child_id}"
            ))
        })?;
        diesel::update(children::table.find(child_id))
            .set((
                children::reward_points.eq(balance),
                children::updated_at.eq(&now),
            ))
            .execute(conn)?;
        return Ok(balance);
    }
    let updated = diesel::update(
        children::table
            .find(child_id)
            .filter(children::reward_points.ge(-delta)),
    )
    .set((
        children::reward_points.eq(children::reward_points + delta),
        children::updated_at.eq(&now),
    ))
    .returning(children::reward_points)
    .get_result::<i32>(conn)
    .optional()?;
    match updated {
        Some(balance) => Ok(balance),
        None => {
            let child = require(conn, child_id)?;
            Err(StorageError::InsufficientBalance {
                required: -delta,
                available: child.reward_points,
            })
        }
    }
}

/// Status texts of redemptions that still hold their debited points.
pub(crate) fn holding_statuses() -> Vec<&'static str> {
    RedemptionStatus::ALL
        .iter()
        .filter(|s| s.holds_points())
        .map(|s| s.as_str())
        .collect()
}

impl Store {
    pub async fn create_child(&self, parent_id: &str, input: NewChild) -> Result<Child, StorageError> {
        let parent_id = parent_id.to_string();
        let row = Child {
            child_id: new_id(),
            parent_id: parent_id.clone(),
            first_name: required("first_name", &input.first_name)?,
            birth_date: normalize_date(input.birth_date)?,
            avatar_url: input.avatar_url,
            reward_points: 0,
            level: 1,
            preferred_difficulty: input
                .preferred_difficulty
                .unwrap_or(Difficulty::Medium)
                .as_str()
                .to_string(),
            is_active: true,
            created_at: now_iso(),
            updated_at: now_iso(),
        };
        self.with_tx(move |conn| {
            parents::require(conn, &parent_id)?;
            diesel::insert_into(children::table)
                .values(&row)
                .execute(conn)?;
            info!(child_id = %row.child_id, parent_id = %parent_id, "child created");
            Ok(row)
        })
        .await
    }

    pub async fn get_child(&self, id: &str) -> Result<Option<Child>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| find(conn, &id)).await
    }

    pub async fn list_children(&self, parent_id: &str) -> Result<Vec<Child>, StorageError> {
        let parent_id = parent_id.to_string();
        self.with_conn(move |conn| {
            Ok(children::table
                .filter(children::parent_id.eq(&parent_id))
                .order((children::created_at.asc(), children::child_id.asc()))
                .select(Child::as_select())
                .load(conn)?)
        })
        .await
    }

    /// The balance is not patchable; it only moves through task verification
    /// and redemptions.
    pub async fn update_child(&self, id: &str, patch: ChildPatch) -> Result<Child, StorageError> {
        let id = id.to_string();
        let first_name = patch
            .first_name
            .as_deref()
            .map(|v| required("first_name", v))
            .transpose()?;
        if let Some(level) = patch.level
            && level < 1
        {
            return Err(StorageError::constraint("level must be at least 1"));
        }
        let birth_date = match patch.birth_date {
            Some(v) => Some(normalize_date(v)?),
            None => None,
        };
        self.with_conn(move |conn| {
            let changes = ChildChanges {
                first_name,
                birth_date,
                avatar_url: patch.avatar_url,
                level: patch.level,
                preferred_difficulty: patch.preferred_difficulty.map(|d| d.as_str().to_string()),
                is_active: patch.is_active,
                updated_at: now_iso(),
            };
            diesel::update(children::table.find(&id))
                .set(&changes)
                .returning(Child::as_returning())
                .get_result(conn)
                .optional()?
                .ok_or_else(|| StorageError::not_found("child", &id))
        })
        .await
    }

    /// Tasks assigned to the child become unassigned, child-scoped rewards and
    /// the child's redemptions are removed, notifications addressed to the
    /// child are removed. Comments the child wrote stay.
    ///
    /// Redemptions that still count against a reward's cap release their slot
    /// before they go.
    pub async fn delete_child(&self, id: &str) -> Result<(), StorageError> {
        let id = id.to_string();
        self.with_tx(move |conn| {
            require(conn, &id)?;
            let held: Vec<String> = reward_redemptions::table
                .filter(reward_redemptions::child_id.eq(&id))
                .filter(reward_redemptions::status.eq_any(holding_statuses()))
                .select(reward_redemptions::reward_id)
                .load(conn)?;
            let now = now_iso();
            for reward_id in &held {
                diesel::update(
                    rewards::table
                        .find(reward_id)
                        .filter(rewards::redemption_count.gt(0)),
                )
                .set((
                    rewards::redemption_count.eq(rewards::redemption_count - 1),
                    rewards::updated_at.eq(&now),
                ))
                .execute(conn)?;
            }
            diesel::delete(
                notifications::table
                    .filter(notifications::recipient_type.eq(PartyKind::Child.as_str()))
                    .filter(notifications::recipient_id.eq(&id)),
            )
            .execute(conn)?;
            diesel::delete(children::table.find(&id)).execute(conn)?;
            info!(child_id = %id, released = held.len(), "child deleted");
            Ok(())
        })
        .await
    }

    /// Balance together with the totals it is derived from.
    pub async fn points_summary(&self, child_id: &str) -> Result<PointsSummaryDto, StorageError> {
        let child_id = child_id.to_string();
        self.with_conn(move |conn| {
            let child = require(conn, &child_id)?;
            let earned: Option<i64> = tasks::table
                .filter(tasks::child_id.eq(&child_id))
                .filter(tasks::status.eq(TaskStatus::Verified.as_str()))
                .select(sum(tasks::credited_points))
                .first(conn)?;
            let spent: Option<i64> = reward_redemptions::table
                .filter(reward_redemptions::child_id.eq(&child_id))
                .filter(reward_redemptions::status.eq_any(holding_statuses()))
                .select(sum(reward_redemptions::points_spent))
                .first(conn)?;
            let pending: i64 = reward_redemptions::table
                .filter(reward_redemptions::child_id.eq(&child_id))
                .filter(reward_redemptions::status.eq(RedemptionStatus::Pending.as_str()))
                .count()
                .get_result(conn)?;
            let balance = i64::from(child.reward_points);
            let lifetime_earned = earned.unwrap_or(0);
            let total_spent = spent.unwrap_or(0);
            Ok(PointsSummaryDto {
                child_id: child.child_id,
                balance,
                lifetime_earned,
                total_spent,
                pending_redemptions: pending,
                consistent: balance == lifetime_earned - total_spent,
            })
        })
        .await
    }
}

fn normalize_date(value: Option<String>) -> Result<Option<String>, StorageError> {
    match value {
        Some(v) if v.len() == 10 => chrono::NaiveDate::parse_from_str(&v, "%Y-%m-%d")
            .map(|d| Some(d.format("%Y-%m-%d").to_string()))
            .map_err(|e| StorageError::invalid(format!("date {v:?}: {e}"))),
        other => normalize_ts(other.as_deref()),
    }
}
