use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParentId(pub String);

impl fmt::Display for ParentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ParentId {
    fn from(value: &str) -> Self {
        ParentId(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChildId(pub String);

impl fmt::Display for ChildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ChildId {
    fn from(value: &str) -> Self {
        ChildId(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Enums persisted as lowercase text columns.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum!(
    /// Lifecycle of a task. See [`TaskAction`] for the allowed moves.
    TaskStatus, "task status" {
        Pending => "pending",
        InProgress => "in_progress",
        Completed => "completed",
        Verified => "verified",
        Rejected => "rejected",
    }
);

text_enum!(
    TaskAction, "task action" {
        Start => "start",
        Complete => "complete",
        Verify => "verify",
        Reject => "reject",
        Reopen => "reopen",
    }
);

text_enum!(
    /// Where a rejected task goes when it is reopened.
    RejectionReentry, "rejection re-entry state" {
        Pending => "pending",
        InProgress => "in_progress",
    }
);

impl Default for RejectionReentry {
    fn default() -> Self {
        RejectionReentry::InProgress
    }
}

impl From<RejectionReentry> for TaskStatus {
    fn from(value: RejectionReentry) -> Self {
        match value {
            RejectionReentry::Pending => TaskStatus::Pending,
            RejectionReentry::InProgress => TaskStatus::InProgress,
        }
    }
}

impl TaskAction {
    /// Status reached by applying `self` to a task currently in `from`,
    /// or `None` when the move is not part of the workflow.
    pub fn target(self, from: TaskStatus, reentry: RejectionReentry) -> Option<TaskStatus> {
        use TaskAction::*;
        use TaskStatus::*;
        match (self, from) {
            (Start, Pending) => Some(InProgress),
            (Complete, InProgress) => Some(Completed),
            (Verify, Completed) => Some(Verified),
            (Reject, Completed) => Some(Rejected),
            (Reopen, Rejected) => Some(reentry.into()),
            _ => None,
        }
    }
}

impl TaskStatus {
    /// Whether the assignee may still be changed.
    pub fn allows_reassignment(self) -> bool {
        matches!(
            self,
            TaskStatus::Pending | TaskStatus::InProgress | TaskStatus::Rejected
        )
    }
}

text_enum!(
    RedemptionStatus, "redemption status" {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Fulfilled => "fulfilled",
    }
);

text_enum!(
    RedemptionAction, "redemption action" {
        Approve => "approve",
        Reject => "reject",
        Fulfill => "fulfill",
    }
);

impl RedemptionAction {
    pub fn target(self, from: RedemptionStatus) -> Option<RedemptionStatus> {
        use RedemptionAction::*;
        use RedemptionStatus::*;
        match (self, from) {
            (Approve, Pending) => Some(Approved),
            (Reject, Pending) => Some(Rejected),
            (Fulfill, Approved) => Some(Fulfilled),
            _ => None,
        }
    }
}

impl RedemptionStatus {
    /// Redemptions in these states hold the points that were debited for them.
    pub fn holds_points(self) -> bool {
        !matches!(self, RedemptionStatus::Rejected)
    }
}

text_enum!(
    AccountStatus, "account status" {
        Active => "active",
        Locked => "locked",
        Suspended => "suspended",
    }
);

text_enum!(
    Priority, "priority" {
        Low => "low",
        Medium => "medium",
        High => "high",
    }
);

text_enum!(
    Difficulty, "difficulty" {
        Easy => "easy",
        Medium => "medium",
        Hard => "hard",
    }
);

text_enum!(
    NotificationPriority, "notification priority" {
        Low => "low",
        Normal => "normal",
        High => "high",
    }
);

text_enum!(
    NotificationKind, "notification kind" {
        General => "general",
        TaskAssigned => "task_assigned",
        TaskCompleted => "task_completed",
        TaskVerified => "task_verified",
        TaskRejected => "task_rejected",
        RedemptionRequested => "redemption_requested",
        RedemptionApproved => "redemption_approved",
        RedemptionRejected => "redemption_rejected",
        RedemptionFulfilled => "redemption_fulfilled",
    }
);

text_enum!(
    PartyKind, "party kind" {
        Parent => "parent",
        Child => "child",
    }
);

/// Reference to either kind of family member, used for comment authors and
/// notification recipients. Storage cannot enforce these as foreign keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum PartyRef {
    Parent(ParentId),
    Child(ChildId),
}

impl PartyRef {
    pub fn kind(&self) -> PartyKind {
        match self {
            PartyRef::Parent(_) => PartyKind::Parent,
            PartyRef::Child(_) => PartyKind::Child,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            PartyRef::Parent(p) => &p.0,
            PartyRef::Child(c) => &c.0,
        }
    }

    pub fn from_parts(kind: &str, id: &str) -> Result<Self, UnknownVariant> {
        Ok(match kind.parse::<PartyKind>()? {
            PartyKind::Parent => PartyRef::Parent(id.into()),
            PartyKind::Child => PartyRef::Child(id.into()),
        })
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null`
/// (`Some(None)`) in patch bodies.
pub fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewParent {
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub timezone: Option<String>,
    pub language: Option<String>,
    #[serde(default)]
    pub privacy_consent: bool,
    #[serde(default)]
    pub marketing_consent: bool,
    pub data_retention_consent: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParentPatch {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub timezone: Option<String>,
    pub language: Option<String>,
    pub privacy_consent: Option<bool>,
    pub marketing_consent: Option<bool>,
    pub data_retention_consent: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewChild {
    pub first_name: String,
    pub birth_date: Option<String>,
    pub avatar_url: Option<String>,
    pub preferred_difficulty: Option<Difficulty>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChildPatch {
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub birth_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub avatar_url: Option<Option<String>>,
    pub level: Option<i32>,
    pub preferred_difficulty: Option<Difficulty>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub is_default: Option<bool>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryPatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub color: Option<String>,
    pub icon: Option<String>,
    pub is_default: Option<bool>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub child_id: Option<String>,
    pub category_id: Option<String>,
    pub due_date: Option<String>,
    pub recurrence_pattern: Option<String>,
    pub priority: Option<Priority>,
    pub difficulty: Option<Difficulty>,
    pub estimated_duration: Option<i32>,
    pub reward_points: Option<i32>,
    pub requires_verification: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub child_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub category_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub due_date: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub recurrence_pattern: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub difficulty: Option<Difficulty>,
    #[serde(default, deserialize_with = "double_option")]
    pub estimated_duration: Option<Option<i32>>,
    pub reward_points: Option<i32>,
    pub requires_verification: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFilter {
    pub child_id: Option<String>,
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewComment {
    pub content: String,
    pub is_private: Option<bool>,
    pub attachment_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommentPatch {
    pub content: Option<String>,
    pub is_private: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub attachment_url: Option<Option<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewReward {
    pub name: String,
    pub description: Option<String>,
    pub cost_points: i32,
    pub child_id: Option<String>,
    pub category: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub max_redemptions: Option<i32>,
    pub available_from: Option<String>,
    pub available_until: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RewardPatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub cost_points: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    pub child_id: Option<Option<String>>,
    pub category: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
    #[serde(default, deserialize_with = "double_option")]
    pub max_redemptions: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub available_from: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub available_until: Option<Option<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionRequest {
    pub reward_id: String,
    pub child_id: String,
    /// Retrying with the same key returns the original redemption.
    pub request_key: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewNotification {
    pub recipient: PartyRef,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub priority: Option<NotificationPriority>,
    pub related_task_id: Option<String>,
    pub related_reward_id: Option<String>,
    pub related_child_id: Option<String>,
    pub delivery_method: Option<String>,
}

impl NewNotification {
    pub fn new(
        recipient: PartyRef,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            recipient,
            title: title.into(),
            message: message.into(),
            kind,
            priority: None,
            related_task_id: None,
            related_reward_id: None,
            related_child_id: None,
            delivery_method: None,
        }
    }

    pub fn task(mut self, task_id: &str) -> Self {
        self.related_task_id = Some(task_id.to_string());
        self
    }

    pub fn reward(mut self, reward_id: &str) -> Self {
        self.related_reward_id = Some(reward_id.to_string());
        self
    }

    pub fn child(mut self, child_id: &str) -> Self {
        self.related_child_id = Some(child_id.to_string());
        self
    }
}
