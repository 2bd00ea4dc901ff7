use crate::storage::schema::{
    categories, children, email_verification_tokens, notifications, parents, reward_redemptions,
    rewards, task_comments, tasks,
};
use diesel::prelude::*;
use serde::Serialize;
use taskify_shared::domain::{
    AccountStatus, PartyRef, RedemptionStatus, TaskStatus, UnknownVariant,
};

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Serialize)]
#[diesel(table_name = parents)]
#[diesel(primary_key(parent_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Parent {
    pub parent_id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub email_verified: bool,
    pub email_verified_at: Option<String>,
    #[serde(skip_serializing)]
    pub password_reset_token_hash: Option<String>,
    pub password_reset_expires: Option<String>,
    pub account_status: String,
    pub timezone: String,
    pub language: String,
    pub privacy_consent: bool,
    pub marketing_consent: bool,
    pub data_retention_consent: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Parent {
    pub fn account_status(&self) -> Result<AccountStatus, UnknownVariant> {
        self.account_status.parse()
    }
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = parents)]
pub struct ParentChanges {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email_verified: Option<bool>,
    pub email_verified_at: Option<Option<String>>,
    pub account_status: Option<String>,
    pub timezone: Option<String>,
    pub language: Option<String>,
    pub privacy_consent: Option<bool>,
    pub marketing_consent: Option<bool>,
    pub data_retention_consent: Option<bool>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Associations, Serialize)]
#[diesel(table_name = children)]
#[diesel(primary_key(child_id))]
#[diesel(belongs_to(Parent, foreign_key = parent_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Child {
    pub child_id: String,
    pub parent_id: String,
    pub first_name: String,
    pub birth_date: Option<String>,
    pub avatar_url: Option<String>,
    pub reward_points: i32,
    pub level: i32,
    pub preferred_difficulty: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = children)]
pub struct ChildChanges {
    pub first_name: Option<String>,
    pub birth_date: Option<Option<String>>,
    pub avatar_url: Option<Option<String>>,
    pub level: Option<i32>,
    pub preferred_difficulty: Option<String>,
    pub is_active: Option<bool>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Associations, Serialize)]
#[diesel(table_name = categories)]
#[diesel(primary_key(category_id))]
#[diesel(belongs_to(Parent, foreign_key = parent_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Category {
    pub category_id: String,
    pub parent_id: String,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub icon: String,
    pub is_default: bool,
    pub sort_order: i32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = categories)]
pub struct CategoryChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub is_default: Option<bool>,
    pub sort_order: Option<i32>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Serialize)]
#[diesel(table_name = tasks)]
#[diesel(primary_key(task_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Task {
    pub task_id: String,
    pub parent_id: String,
    pub child_id: Option<String>,
    pub category_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<String>,
    pub recurrence_pattern: Option<String>,
    pub priority: String,
    pub difficulty: String,
    pub estimated_duration: Option<i32>,
    pub reward_points: i32,
    pub status: String,
    pub completion_date: Option<String>,
    pub completion_notes: Option<String>,
    pub assigned_at: Option<String>,
    pub requires_verification: bool,
    pub verification_notes: Option<String>,
    pub verified_by: Option<String>,
    pub verified_at: Option<String>,
    pub credited_points: Option<i32>,
    pub parent_task_id: Option<String>,
    pub sequence_number: i32,
    pub created_at: String,
    pub updated_at: String,
}

impl Task {
    pub fn task_status(&self) -> Result<TaskStatus, UnknownVariant> {
        self.status.parse()
    }

    /// Id of the first task of the recurring series this task belongs to.
    pub fn series_root(&self) -> &str {
        self.parent_task_id.as_deref().unwrap_or(&self.task_id)
    }
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = tasks)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub child_id: Option<Option<String>>,
    pub category_id: Option<Option<String>>,
    pub due_date: Option<Option<String>>,
    pub recurrence_pattern: Option<Option<String>>,
    pub priority: Option<String>,
    pub difficulty: Option<String>,
    pub estimated_duration: Option<Option<i32>>,
    pub reward_points: Option<i32>,
    pub requires_verification: Option<bool>,
    pub assigned_at: Option<Option<String>>,
    pub status: Option<String>,
    pub completion_date: Option<Option<String>>,
    pub completion_notes: Option<Option<String>>,
    pub verification_notes: Option<Option<String>>,
    pub verified_by: Option<Option<String>>,
    pub verified_at: Option<Option<String>>,
    pub credited_points: Option<Option<i32>>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Associations, Serialize)]
#[diesel(table_name = task_comments)]
#[diesel(primary_key(comment_id))]
#[diesel(belongs_to(Task, foreign_key = task_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TaskComment {
    pub comment_id: String,
    pub task_id: String,
    pub author_id: String,
    pub author_type: String,
    pub content: String,
    pub is_private: bool,
    pub attachment_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl TaskComment {
    pub fn author(&self) -> Result<PartyRef, UnknownVariant> {
        PartyRef::from_parts(&self.author_type, &self.author_id)
    }
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = task_comments)]
pub struct TaskCommentChanges {
    pub content: Option<String>,
    pub is_private: Option<bool>,
    pub attachment_url: Option<Option<String>>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Associations, Serialize)]
#[diesel(table_name = rewards)]
#[diesel(primary_key(reward_id))]
#[diesel(belongs_to(Parent, foreign_key = parent_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Reward {
    pub reward_id: String,
    pub parent_id: String,
    pub child_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub cost_points: i32,
    pub category: String,
    pub icon: String,
    pub color: String,
    pub is_active: bool,
    pub max_redemptions: Option<i32>,
    pub redemption_count: i32,
    pub available_from: Option<String>,
    pub available_until: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(AsChangeset, Default)]
#[diesel(table_name = rewards)]
pub struct RewardChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub cost_points: Option<i32>,
    pub child_id: Option<Option<String>>,
    pub category: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
    pub max_redemptions: Option<Option<i32>>,
    pub available_from: Option<Option<String>>,
    pub available_until: Option<Option<String>>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Associations, Serialize)]
#[diesel(table_name = reward_redemptions)]
#[diesel(primary_key(redemption_id))]
#[diesel(belongs_to(Reward, foreign_key = reward_id))]
#[diesel(belongs_to(Child, foreign_key = child_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RewardRedemption {
    pub redemption_id: String,
    pub reward_id: String,
    pub child_id: String,
    pub points_spent: i32,
    pub redeemed_at: String,
    pub status: String,
    pub approved_by: Option<String>,
    pub approved_at: Option<String>,
    pub fulfilled_at: Option<String>,
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_key: Option<String>,
}

impl RewardRedemption {
    pub fn redemption_status(&self) -> Result<RedemptionStatus, UnknownVariant> {
        self.status.parse()
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Serialize)]
#[diesel(table_name = notifications)]
#[diesel(primary_key(notification_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Notification {
    pub notification_id: String,
    pub recipient_id: String,
    pub recipient_type: String,
    pub title: String,
    pub message: String,
    pub kind: String,
    pub priority: String,
    pub is_read: bool,
    pub read_at: Option<String>,
    pub related_task_id: Option<String>,
    pub related_reward_id: Option<String>,
    pub related_child_id: Option<String>,
    pub delivery_method: String,
    pub delivered_at: Option<String>,
    pub created_at: String,
}

impl Notification {
    pub fn recipient(&self) -> Result<PartyRef, UnknownVariant> {
        PartyRef::from_parts(&self.recipient_type, &self.recipient_id)
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, Identifiable, Associations, Serialize)]
#[diesel(table_name = email_verification_tokens)]
#[diesel(primary_key(token_id))]
#[diesel(belongs_to(Parent, foreign_key = parent_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EmailVerificationToken {
    pub token_id: String,
    pub parent_id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub expires_at: String,
    pub used_at: Option<String>,
    pub invalidated_at: Option<String>,
    pub created_at: String,
}
