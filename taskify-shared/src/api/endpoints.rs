use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use super::API_V1_PREFIX;

fn base_join(base: &str, path: &str) -> String {
    let b = base.trim_end_matches('/');
    let p = path.trim_start_matches('/');
    format!("{}/{}", b, p)
}

fn enc(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

fn v1(base: &str, rest: &str) -> String {
    base_join(base, &format!("{}/{}", API_V1_PREFIX, rest))
}

pub fn version(base: &str) -> String {
    v1(base, "version")
}

pub fn parents(base: &str) -> String {
    v1(base, "parents")
}
pub fn parent(base: &str, parent_id: &str) -> String {
    v1(base, &format!("parents/{}", enc(parent_id)))
}
pub fn parent_status(base: &str, parent_id: &str) -> String {
    v1(base, &format!("parents/{}/status", enc(parent_id)))
}
pub fn parent_children(base: &str, parent_id: &str) -> String {
    v1(base, &format!("parents/{}/children", enc(parent_id)))
}
pub fn parent_categories(base: &str, parent_id: &str) -> String {
    v1(base, &format!("parents/{}/categories", enc(parent_id)))
}
pub fn parent_tasks(base: &str, parent_id: &str) -> String {
    v1(base, &format!("parents/{}/tasks", enc(parent_id)))
}
pub fn parent_rewards(base: &str, parent_id: &str) -> String {
    v1(base, &format!("parents/{}/rewards", enc(parent_id)))
}
pub fn email_verification_issue(base: &str, parent_id: &str) -> String {
    v1(base, &format!("parents/{}/email-verification", enc(parent_id)))
}
pub fn email_verification_consume(base: &str) -> String {
    v1(base, "email-verification/consume")
}

pub fn child(base: &str, child_id: &str) -> String {
    v1(base, &format!("children/{}", enc(child_id)))
}
pub fn child_points(base: &str, child_id: &str) -> String {
    v1(base, &format!("children/{}/points", enc(child_id)))
}
pub fn child_tasks(base: &str, child_id: &str) -> String {
    v1(base, &format!("children/{}/tasks", enc(child_id)))
}
pub fn child_redemptions(base: &str, child_id: &str) -> String {
    v1(base, &format!("children/{}/redemptions", enc(child_id)))
}
pub fn child_rewards(base: &str, child_id: &str) -> String {
    v1(base, &format!("children/{}/rewards", enc(child_id)))
}

pub fn category(base: &str, category_id: &str) -> String {
    v1(base, &format!("categories/{}", enc(category_id)))
}

pub fn task(base: &str, task_id: &str) -> String {
    v1(base, &format!("tasks/{}", enc(task_id)))
}
pub fn task_action(base: &str, task_id: &str, action: &str) -> String {
    v1(base, &format!("tasks/{}/{}", enc(task_id), enc(action)))
}
pub fn task_occurrences(base: &str, task_id: &str) -> String {
    v1(base, &format!("tasks/{}/occurrences", enc(task_id)))
}
pub fn task_comments(base: &str, task_id: &str) -> String {
    v1(base, &format!("tasks/{}/comments", enc(task_id)))
}
pub fn comment(base: &str, comment_id: &str) -> String {
    v1(base, &format!("comments/{}", enc(comment_id)))
}

pub fn reward(base: &str, reward_id: &str) -> String {
    v1(base, &format!("rewards/{}", enc(reward_id)))
}
pub fn reward_redemptions(base: &str, reward_id: &str) -> String {
    v1(base, &format!("rewards/{}/redemptions", enc(reward_id)))
}
pub fn reward_eligibility(base: &str, reward_id: &str, child_id: &str) -> String {
    v1(
        base,
        &format!(
            "rewards/{}/eligibility/{}",
            enc(reward_id),
            enc(child_id)
        ),
    )
}
pub fn redemption(base: &str, redemption_id: &str) -> String {
    v1(base, &format!("redemptions/{}", enc(redemption_id)))
}
pub fn redemption_action(base: &str, redemption_id: &str, action: &str) -> String {
    v1(
        base,
        &format!("redemptions/{}/{}", enc(redemption_id), enc(action)),
    )
}

pub fn notifications(base: &str) -> String {
    v1(base, "notifications")
}
pub fn notifications_count(base: &str) -> String {
    v1(base, "notifications/count")
}
pub fn notification_read(base: &str, notification_id: &str) -> String {
    v1(base, &format!("notifications/{}/read", enc(notification_id)))
}
pub fn notification(base: &str, notification_id: &str) -> String {
    v1(base, &format!("notifications/{}", enc(notification_id)))
}
