use chrono::{Duration, Utc};
use taskify_server::storage::{StorageError, Store};
use taskify_shared::auth::Actor;
use taskify_shared::domain::{
    AccountStatus, NewCategory, NewChild, NewComment, NewParent, NewReward, NewTask,
    NotificationKind, ParentPatch, PartyRef, RedemptionRequest, RejectionReentry, TaskFilter,
    TaskPatch, TaskStatus,
};

struct Fixture {
    store: Store,
    _dir: tempfile::TempDir,
}

async fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("taskify.db");
    let store = Store::connect_sqlite(db.to_str().unwrap()).await.unwrap();
    Fixture { store, _dir: dir }
}

async fn parent(store: &Store, email: &str) -> Actor {
    let p = store
        .create_parent(NewParent {
            email: email.into(),
            password_hash: "$2b$04$notarealhashnotarealhashnotarealhashnotarealhash".into(),
            first_name: "Pat".into(),
            last_name: "Doe".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    Actor::Parent(p.parent_id.as_str().into())
}

async fn child(store: &Store, parent: &Actor, name: &str) -> Actor {
    let c = store
        .create_child(
            &parent.family().0,
            NewChild {
                first_name: name.into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(c.reward_points, 0);
    Actor::Child {
        child: c.child_id.as_str().into(),
        family: parent.family().clone(),
    }
}

fn id(actor: &Actor) -> String {
    actor.as_party().id().to_string()
}

async fn task_for(store: &Store, parent: &Actor, kid: &Actor, points: i32, verify: bool) -> String {
    store
        .create_task(
            &parent.family().0,
            NewTask {
                title: "Tidy room".into(),
                child_id: Some(id(kid)),
                reward_points: Some(points),
                requires_verification: Some(verify),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .task_id
}

/// Runs a task through the child's side of the workflow.
async fn start_and_complete(store: &Store, kid: &Actor, task_id: &str) {
    store.start_task(kid, task_id).await.unwrap();
    store
        .complete_task(kid, task_id, Some("done".into()))
        .await
        .unwrap();
}

/// Earns `points` for the child through a task that needs no verification.
async fn earn(store: &Store, parent: &Actor, kid: &Actor, points: i32) {
    let t = task_for(store, parent, kid, points, false).await;
    start_and_complete(store, kid, &t).await;
}

async fn balance(store: &Store, kid: &Actor) -> i32 {
    store
        .get_child(&id(kid))
        .await
        .unwrap()
        .unwrap()
        .reward_points
}

async fn reward(store: &Store, parent: &Actor, cost: i32) -> String {
    store
        .create_reward(
            &parent.family().0,
            NewReward {
                name: "Ice cream".into(),
                cost_points: cost,
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .reward_id
}

fn redeem(kid: &Actor, reward_id: &str, key: Option<&str>) -> RedemptionRequest {
    RedemptionRequest {
        reward_id: reward_id.into(),
        child_id: id(kid),
        request_key: key.map(str::to_string),
        notes: None,
    }
}

#[tokio::test]
async fn verified_task_credits_the_assigned_child() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    let t = task_for(&f.store, &p, &c, 10, true).await;

    start_and_complete(&f.store, &c, &t).await;
    assert_eq!(balance(&f.store, &c).await, 0, "no credit before verification");

    let task = f.store.verify_task(&p, &t, None).await.unwrap();
    assert_eq!(task.status, TaskStatus::Verified.as_str());
    assert_eq!(task.verified_by.as_deref(), Some(id(&p).as_str()));
    assert_eq!(task.credited_points, Some(10));
    assert_eq!(balance(&f.store, &c).await, 10);

    // Verifying twice never credits twice
    let err = f.store.verify_task(&p, &t, None).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidTransition { .. }));
    assert_eq!(balance(&f.store, &c).await, 10);

    let kinds: Vec<String> = f
        .store
        .list_notifications(&c.as_party(), false)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.kind)
        .collect();
    assert!(kinds.contains(&NotificationKind::TaskAssigned.as_str().to_string()));
    assert!(kinds.contains(&NotificationKind::TaskVerified.as_str().to_string()));
    let parent_inbox = f
        .store
        .list_notifications(&p.as_party(), true)
        .await
        .unwrap();
    assert_eq!(parent_inbox.len(), 1);
    assert_eq!(parent_inbox[0].kind, NotificationKind::TaskCompleted.as_str());
}

#[tokio::test]
async fn workflow_guards_check_actor_and_state() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    let sibling = child(&f.store, &p, "Sam").await;
    let t = task_for(&f.store, &p, &c, 5, true).await;

    // Only the assignee may start it
    let err = f.store.start_task(&sibling, &t).await.unwrap_err();
    assert!(matches!(err, StorageError::Unauthorized(_)));
    let err = f.store.start_task(&p, &t).await.unwrap_err();
    assert!(matches!(err, StorageError::Unauthorized(_)));

    // Cannot complete before starting
    let err = f.store.complete_task(&c, &t, None).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidTransition { .. }));

    start_and_complete(&f.store, &c, &t).await;

    // Children cannot verify
    let err = f.store.verify_task(&c, &t, None).await.unwrap_err();
    assert!(matches!(err, StorageError::Unauthorized(_)));

    // Another family cannot touch it
    let other = parent(&f.store, "other@example.com").await;
    let err = f.store.verify_task(&other, &t, None).await.unwrap_err();
    assert!(matches!(err, StorageError::Unauthorized(_)));
}

#[tokio::test]
async fn rejected_task_reopens_into_configured_state() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    let t = task_for(&f.store, &p, &c, 5, true).await;
    start_and_complete(&f.store, &c, &t).await;

    let task = f
        .store
        .reject_task(&p, &t, Some("bed not made".into()))
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Rejected.as_str());
    assert_eq!(balance(&f.store, &c).await, 0);

    let task = f.store.reopen_task(&c, &t).await.unwrap();
    assert_eq!(task.status, TaskStatus::InProgress.as_str());
    assert!(task.completion_date.is_none());
    assert_eq!(task.verification_notes.as_deref(), Some("bed not made"));

    // Same flow with the other policy
    let store = f.store.clone().with_rejection_reentry(RejectionReentry::Pending);
    store.complete_task(&c, &t, None).await.unwrap();
    store.reject_task(&p, &t, None).await.unwrap();
    let task = store.reopen_task(&p, &t).await.unwrap();
    assert_eq!(task.status, TaskStatus::Pending.as_str());
}

#[tokio::test]
async fn task_without_verification_is_credited_on_completion() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    let t = task_for(&f.store, &p, &c, 7, false).await;
    start_and_complete(&f.store, &c, &t).await;
    let task = f.store.get_task(&t).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Verified.as_str());
    assert!(task.verified_by.is_none());
    assert_eq!(balance(&f.store, &c).await, 7);
}

#[tokio::test]
async fn redemption_needs_enough_points() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    earn(&f.store, &p, &c, 10).await;
    let r = reward(&f.store, &p, 15).await;

    let err = f
        .store
        .request_redemption(&c, redeem(&c, &r, None))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::InsufficientBalance {
            required: 15,
            available: 10
        }
    ));
    assert_eq!(balance(&f.store, &c).await, 10);
    let reward = f.store.get_reward(&r).await.unwrap().unwrap();
    assert_eq!(reward.redemption_count, 0);

    let eligibility = f.store.redemption_eligibility(&id(&c), &r).await.unwrap();
    assert!(!eligibility.eligible);
    assert_eq!(eligibility.reason.as_deref(), Some("needs 5 more points"));
}

#[tokio::test]
async fn rejected_redemption_refunds_points() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    earn(&f.store, &p, &c, 20).await;
    let r = reward(&f.store, &p, 15).await;

    let red = f
        .store
        .request_redemption(&c, redeem(&c, &r, None))
        .await
        .unwrap();
    assert_eq!(red.status, "pending");
    assert_eq!(red.points_spent, 15);
    assert_eq!(balance(&f.store, &c).await, 5);

    let summary = f.store.points_summary(&id(&c)).await.unwrap();
    assert_eq!(summary.lifetime_earned, 20);
    assert_eq!(summary.total_spent, 15);
    assert_eq!(summary.pending_redemptions, 1);
    assert!(summary.consistent);

    let err = f.store.reject_redemption(&c, &red.redemption_id, None).await.unwrap_err();
    assert!(matches!(err, StorageError::Unauthorized(_)));

    let red = f
        .store
        .reject_redemption(&p, &red.redemption_id, Some("not today".into()))
        .await
        .unwrap();
    assert_eq!(red.status, "rejected");
    assert_eq!(balance(&f.store, &c).await, 20);
    let reward = f.store.get_reward(&r).await.unwrap().unwrap();
    assert_eq!(reward.redemption_count, 0);

    // Terminal
    let err = f
        .store
        .approve_redemption(&p, &red.redemption_id, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidTransition { .. }));
    assert!(f.store.points_summary(&id(&c)).await.unwrap().consistent);
}

#[tokio::test]
async fn approved_redemption_is_fulfilled_without_balance_change() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    earn(&f.store, &p, &c, 20).await;
    let r = reward(&f.store, &p, 15).await;
    let red = f
        .store
        .request_redemption(&c, redeem(&c, &r, None))
        .await
        .unwrap();

    // Fulfilling requires approval first
    let err = f.store.fulfill_redemption(&p, &red.redemption_id).await.unwrap_err();
    assert!(matches!(err, StorageError::InvalidTransition { .. }));

    let red = f
        .store
        .approve_redemption(&p, &red.redemption_id, None)
        .await
        .unwrap();
    assert_eq!(red.status, "approved");
    assert_eq!(red.approved_by.as_deref(), Some(id(&p).as_str()));
    assert!(red.approved_at.is_some());
    let red = f.store.fulfill_redemption(&p, &red.redemption_id).await.unwrap();
    assert_eq!(red.status, "fulfilled");
    assert!(red.fulfilled_at.is_some());
    assert_eq!(balance(&f.store, &c).await, 5);
}

#[tokio::test]
async fn redemption_retry_with_same_key_debits_once() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    earn(&f.store, &p, &c, 30).await;
    let r = reward(&f.store, &p, 10).await;
    let other = reward(&f.store, &p, 5).await;

    let first = f
        .store
        .request_redemption(&c, redeem(&c, &r, Some("tap-1")))
        .await
        .unwrap();
    let again = f
        .store
        .request_redemption(&c, redeem(&c, &r, Some("tap-1")))
        .await
        .unwrap();
    assert_eq!(first.redemption_id, again.redemption_id);
    assert_eq!(balance(&f.store, &c).await, 20);

    let err = f
        .store
        .request_redemption(&c, redeem(&c, &other, Some("tap-1")))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ConstraintViolation(_)));

    let err = f
        .store
        .request_redemption(&c, redeem(&c, &r, Some("  ")))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidInput(_)));
}

#[tokio::test]
async fn reward_cap_and_scope_are_enforced() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    let sibling = child(&f.store, &p, "Sam").await;
    earn(&f.store, &p, &c, 50).await;
    earn(&f.store, &p, &sibling, 50).await;

    let capped = f
        .store
        .create_reward(
            &p.family().0,
            NewReward {
                name: "Movie night".into(),
                cost_points: 5,
                max_redemptions: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    f.store
        .request_redemption(&c, redeem(&c, &capped.reward_id, None))
        .await
        .unwrap();
    let err = f
        .store
        .request_redemption(&sibling, redeem(&sibling, &capped.reward_id, None))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::RewardUnavailable(_)));

    let scoped = f
        .store
        .create_reward(
            &p.family().0,
            NewReward {
                name: "Casey's pick".into(),
                cost_points: 5,
                child_id: Some(id(&c)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let err = f
        .store
        .request_redemption(&sibling, redeem(&sibling, &scoped.reward_id, None))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::RewardUnavailable(_)));
    let visible = f.store.list_rewards_for_child(&id(&sibling)).await.unwrap();
    assert!(visible.iter().all(|r| r.reward_id != scoped.reward_id));

    let future = f
        .store
        .create_reward(
            &p.family().0,
            NewReward {
                name: "Summer camp".into(),
                cost_points: 5,
                available_from: Some((Utc::now() + Duration::days(30)).to_rfc3339()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let err = f
        .store
        .request_redemption(&c, redeem(&c, &future.reward_id, None))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::RewardUnavailable(_)));

    let err = f
        .store
        .create_reward(
            &p.family().0,
            NewReward {
                name: "Free".into(),
                cost_points: 0,
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ConstraintViolation(_)));
}

#[tokio::test]
async fn cross_family_references_are_rejected() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let other = parent(&f.store, "other@example.com").await;
    let foreign_kid = child(&f.store, &other, "Ollie").await;
    let foreign_category = f
        .store
        .create_category(
            &other.family().0,
            NewCategory {
                name: "Chores".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = f
        .store
        .create_task(
            &p.family().0,
            NewTask {
                title: "Dishes".into(),
                child_id: Some(id(&foreign_kid)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ConstraintViolation(_)));

    let err = f
        .store
        .create_task(
            &p.family().0,
            NewTask {
                title: "Dishes".into(),
                category_id: Some(foreign_category.category_id.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ConstraintViolation(_)));

    let t = f
        .store
        .create_task(
            &p.family().0,
            NewTask {
                title: "Dishes".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let err = f
        .store
        .update_task(
            &t.task_id,
            TaskPatch {
                child_id: Some(Some(id(&foreign_kid))),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ConstraintViolation(_)));

    let err = f
        .store
        .create_reward(
            &p.family().0,
            NewReward {
                name: "Toy".into(),
                cost_points: 5,
                child_id: Some(id(&foreign_kid)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ConstraintViolation(_)));

    let err = f
        .store
        .add_comment(
            &t.task_id,
            foreign_kid.as_party(),
            NewComment {
                content: "hi".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ConstraintViolation(_)));
}

#[tokio::test]
async fn reassignment_is_frozen_once_completed() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    let sibling = child(&f.store, &p, "Sam").await;
    let t = task_for(&f.store, &p, &c, 5, true).await;

    let moved = f
        .store
        .update_task(
            &t,
            TaskPatch {
                child_id: Some(Some(id(&sibling))),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(moved.child_id.as_deref(), Some(id(&sibling).as_str()));

    start_and_complete(&f.store, &sibling, &t).await;
    let err = f
        .store
        .update_task(
            &t,
            TaskPatch {
                child_id: Some(Some(id(&c))),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidTransition { .. }));
}

#[tokio::test]
async fn occurrences_extend_the_series_and_die_with_the_root() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    let root = f
        .store
        .create_task(
            &p.family().0,
            NewTask {
                title: "Feed the cat".into(),
                child_id: Some(id(&c)),
                recurrence_pattern: Some("daily".into()),
                reward_points: Some(3),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let second = f
        .store
        .create_occurrence(&root.task_id, Some("2026-01-02T08:00:00Z".into()))
        .await
        .unwrap();
    // Created from an occurrence, still appended to the root's series
    let third = f
        .store
        .create_occurrence(&second.task_id, None)
        .await
        .unwrap();
    assert_eq!(second.sequence_number, 2);
    assert_eq!(third.sequence_number, 3);
    assert_eq!(third.parent_task_id.as_deref(), Some(root.task_id.as_str()));
    assert_eq!(second.due_date.as_deref(), Some("2026-01-02T08:00:00.000Z"));
    assert_eq!(third.reward_points, 3);
    assert_eq!(third.status, TaskStatus::Pending.as_str());

    let series = f.store.list_occurrences(&third.task_id).await.unwrap();
    let seq: Vec<i32> = series.iter().map(|t| t.sequence_number).collect();
    assert_eq!(seq, vec![1, 2, 3]);

    f.store.delete_task(&root.task_id).await.unwrap();
    assert!(f.store.get_task(&second.task_id).await.unwrap().is_none());
    assert!(f.store.get_task(&third.task_id).await.unwrap().is_none());
}

#[tokio::test]
async fn second_token_invalidates_the_first() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let first = f
        .store
        .issue_email_verification(&id(&p), Duration::hours(1))
        .await
        .unwrap();
    let second = f
        .store
        .issue_email_verification(&id(&p), Duration::hours(1))
        .await
        .unwrap();
    assert_ne!(first.plaintext, second.plaintext);
    assert_ne!(first.token.token_hash, first.plaintext);

    let err = f
        .store
        .consume_email_verification(&first.plaintext)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Invalidated));

    let parent = f
        .store
        .consume_email_verification(&second.plaintext)
        .await
        .unwrap();
    assert!(parent.email_verified);
    assert!(parent.email_verified_at.is_some());

    let err = f
        .store
        .consume_email_verification(&second.plaintext)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::AlreadyUsed));

    let err = f
        .store
        .consume_email_verification("no-such-token")
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
}

#[tokio::test]
async fn expired_and_stale_tokens() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let short = f
        .store
        .issue_email_verification(&id(&p), Duration::milliseconds(1))
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let err = f
        .store
        .consume_email_verification(&short.plaintext)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Expired));

    let err = f
        .store
        .issue_email_verification(&id(&p), Duration::zero())
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidInput(_)));

    // A token issued for an address the parent no longer has stops working
    let live = f
        .store
        .issue_email_verification(&id(&p), Duration::hours(1))
        .await
        .unwrap();
    f.store
        .update_parent(
            &id(&p),
            ParentPatch {
                email: Some("new@example.com".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let err = f
        .store
        .consume_email_verification(&live.plaintext)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Invalidated));

    assert_eq!(f.store.list_email_tokens(&id(&p)).await.unwrap().len(), 2);
    let removed = f
        .store
        .purge_stale_tokens(Utc::now() + Duration::hours(2))
        .await
        .unwrap();
    assert_eq!(removed, 2);
    assert!(f.store.list_email_tokens(&id(&p)).await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_a_child_detaches_tasks_and_drops_rewards() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    earn(&f.store, &p, &c, 20).await;
    let t = task_for(&f.store, &p, &c, 5, true).await;
    let scoped = f
        .store
        .create_reward(
            &p.family().0,
            NewReward {
                name: "Casey's pick".into(),
                cost_points: 5,
                child_id: Some(id(&c)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let shared = reward(&f.store, &p, 5).await;
    let red = f
        .store
        .request_redemption(&c, redeem(&c, &shared, None))
        .await
        .unwrap();

    assert_eq!(
        f.store.get_reward(&shared).await.unwrap().unwrap().redemption_count,
        1
    );

    f.store.delete_child(&id(&c)).await.unwrap();

    let task = f.store.get_task(&t).await.unwrap().unwrap();
    assert!(task.child_id.is_none());
    assert!(f.store.get_reward(&scoped.reward_id).await.unwrap().is_none());
    let shared = f.store.get_reward(&shared).await.unwrap().unwrap();
    assert_eq!(shared.redemption_count, 0, "the deleted child's slot is released");
    let shared = shared.reward_id;
    assert!(
        f.store
            .get_redemption(&red.redemption_id)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        f.store
            .list_notifications(&c.as_party(), false)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn deleting_a_parent_removes_the_whole_family() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    let t = task_for(&f.store, &p, &c, 5, true).await;
    start_and_complete(&f.store, &c, &t).await;
    f.store
        .add_comment(
            &t,
            c.as_party(),
            NewComment {
                content: "all done".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let r = reward(&f.store, &p, 5).await;
    f.store
        .issue_email_verification(&id(&p), Duration::hours(1))
        .await
        .unwrap();

    let survivor = parent(&f.store, "other@example.com").await;
    let survivor_kid = child(&f.store, &survivor, "Ollie").await;

    f.store.delete_parent(&id(&p)).await.unwrap();

    assert!(f.store.get_parent(&id(&p)).await.unwrap().is_none());
    assert!(f.store.get_child(&id(&c)).await.unwrap().is_none());
    assert!(f.store.get_task(&t).await.unwrap().is_none());
    assert!(f.store.get_reward(&r).await.unwrap().is_none());
    assert!(f.store.list_email_tokens(&id(&p)).await.unwrap().is_empty());
    assert!(
        f.store
            .list_notifications(&p.as_party(), false)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(
        f.store
            .list_notifications(&c.as_party(), false)
            .await
            .unwrap()
            .is_empty()
    );
    assert!(f.store.get_child(&id(&survivor_kid)).await.unwrap().is_some());
}

#[tokio::test]
async fn suspended_family_cannot_run_workflows() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    let t = task_for(&f.store, &p, &c, 5, true).await;
    f.store
        .set_account_status(&id(&p), AccountStatus::Suspended)
        .await
        .unwrap();
    let err = f.store.start_task(&c, &t).await.unwrap_err();
    assert!(matches!(err, StorageError::Unauthorized(_)));

    f.store
        .set_account_status(&id(&p), AccountStatus::Active)
        .await
        .unwrap();
    f.store.start_task(&c, &t).await.unwrap();
}

#[tokio::test]
async fn parents_and_children_validation() {
    let f = fixture().await;
    parent(&f.store, "Pat@Example.com").await;
    let err = f
        .store
        .create_parent(NewParent {
            email: "pat@example.com".into(),
            password_hash: "x".into(),
            first_name: "Dup".into(),
            last_name: "Licate".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ConstraintViolation(_)));

    let err = f
        .store
        .create_parent(NewParent {
            email: "not-an-email".into(),
            password_hash: "x".into(),
            first_name: "No".into(),
            last_name: "Mail".into(),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidInput(_)));

    let found = f
        .store
        .get_parent_by_email("PAT@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.email, "pat@example.com");
    assert_eq!(found.account_status, "active");
    assert!(found.data_retention_consent);
}

#[tokio::test]
async fn notifications_are_read_once_and_counted() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    task_for(&f.store, &p, &c, 5, true).await;
    task_for(&f.store, &p, &c, 5, true).await;

    let inbox = c.as_party();
    assert_eq!(f.store.unread_notification_count(&inbox).await.unwrap(), 2);
    let first = f.store.list_notifications(&inbox, true).await.unwrap()[0].clone();

    let read = f
        .store
        .mark_notification_read(&first.notification_id)
        .await
        .unwrap();
    assert!(read.is_read);
    let again = f
        .store
        .mark_notification_read(&first.notification_id)
        .await
        .unwrap();
    assert_eq!(read.read_at, again.read_at);
    assert_eq!(f.store.unread_notification_count(&inbox).await.unwrap(), 1);

    let err = f
        .store
        .create_notification(taskify_shared::domain::NewNotification::new(
            PartyRef::Child("ghost".into()),
            NotificationKind::General,
            "Hello",
            "Anyone there?",
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::NotFound { .. }));
}

#[tokio::test]
async fn private_comments_are_filtered() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    let t = task_for(&f.store, &p, &c, 5, true).await;
    f.store
        .add_comment(
            &t,
            p.as_party(),
            NewComment {
                content: "check under the bed".into(),
                is_private: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    f.store
        .add_comment(
            &t,
            c.as_party(),
            NewComment {
                content: "on it".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(f.store.list_comments(&t, true).await.unwrap().len(), 2);
    let public = f.store.list_comments(&t, false).await.unwrap();
    assert_eq!(public.len(), 1);
    assert_eq!(public[0].author().unwrap(), c.as_party());
}

#[tokio::test]
async fn task_listing_filters_by_status_and_child() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    let sibling = child(&f.store, &p, "Sam").await;
    let t = task_for(&f.store, &p, &c, 5, true).await;
    task_for(&f.store, &p, &sibling, 5, true).await;
    f.store.start_task(&c, &t).await.unwrap();

    let all = f
        .store
        .list_tasks(&p.family().0, TaskFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    let started = f
        .store
        .list_tasks(
            &p.family().0,
            TaskFilter {
                status: Some(TaskStatus::InProgress),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].task_id, t);
    let casey = f.store.list_tasks_for_child(&id(&c)).await.unwrap();
    assert_eq!(casey.len(), 1);
}

#[tokio::test]
async fn credit_that_would_overflow_the_balance_is_refused() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    earn(&f.store, &p, &c, i32::MAX).await;
    assert_eq!(balance(&f.store, &c).await, i32::MAX);

    let t = task_for(&f.store, &p, &c, 1, false).await;
    f.store.start_task(&c, &t).await.unwrap();
    let err = f
        .store
        .complete_task(&c, &t, None)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::ConstraintViolation(_)), "{err:?}");

    // The whole completion rolled back
    assert_eq!(balance(&f.store, &c).await, i32::MAX);
    let task = f.store.get_task(&t).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::InProgress.as_str());
    assert!(task.credited_points.is_none());
}

#[tokio::test]
async fn deleting_a_reward_refunds_pending_redemptions() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    earn(&f.store, &p, &c, 40).await;
    let r = reward(&f.store, &p, 15).await;

    let pending = f
        .store
        .request_redemption(&c, redeem(&c, &r, None))
        .await
        .unwrap();
    let approved = f
        .store
        .request_redemption(&c, redeem(&c, &r, None))
        .await
        .unwrap();
    f.store
        .approve_redemption(&p, &approved.redemption_id, None)
        .await
        .unwrap();
    assert_eq!(balance(&f.store, &c).await, 10);

    f.store.delete_reward(&r).await.unwrap();

    // Only the pending reservation comes back; the approved one was spent
    assert_eq!(balance(&f.store, &c).await, 25);
    assert!(f.store.get_reward(&r).await.unwrap().is_none());
    assert!(
        f.store
            .get_redemption(&pending.redemption_id)
            .await
            .unwrap()
            .is_none()
    );
    let summary = f.store.points_summary(&id(&c)).await.unwrap();
    assert_eq!(summary.balance, 25);
    assert_eq!(summary.pending_redemptions, 0);

    let withdrawn = f
        .store
        .list_notifications(&c.as_party(), true)
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::RedemptionRejected.as_str())
        .count();
    assert_eq!(withdrawn, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redemptions_cannot_overspend() {
    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    earn(&f.store, &p, &c, 20).await;
    let first = reward(&f.store, &p, 15).await;
    let second = reward(&f.store, &p, 15).await;

    let (a, b) = tokio::join!(
        f.store.request_redemption(&c, redeem(&c, &first, None)),
        f.store.request_redemption(&c, redeem(&c, &second, None)),
    );
    let results = [a, b];
    let ok = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(ok, 1, "{results:?}");
    assert!(results.iter().any(|r| matches!(
        r,
        Err(StorageError::InsufficientBalance {
            required: 15,
            available: 5
        })
    )));
    assert_eq!(balance(&f.store, &c).await, 5);
    assert!(f.store.points_summary(&id(&c)).await.unwrap().consistent);
}

#[tokio::test]
async fn balance_never_goes_negative_over_mixed_sequences() {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    let f = fixture().await;
    let p = parent(&f.store, "pat@example.com").await;
    let c = child(&f.store, &p, "Casey").await;
    let rewards = [
        reward(&f.store, &p, 5).await,
        reward(&f.store, &p, 12).await,
        reward(&f.store, &p, 30).await,
    ];
    let mut rng = StdRng::seed_from_u64(0x7a5c);
    let mut pending: Vec<String> = Vec::new();

    for step in 0..80 {
        match rng.gen_range(0..4) {
            0 => {
                let t = task_for(&f.store, &p, &c, rng.gen_range(0..20), true).await;
                start_and_complete(&f.store, &c, &t).await;
                f.store.verify_task(&p, &t, None).await.unwrap();
            }
            1 => {
                let r = &rewards[rng.gen_range(0..rewards.len())];
                match f.store.request_redemption(&c, redeem(&c, r, None)).await {
                    Ok(red) => pending.push(red.redemption_id),
                    Err(StorageError::InsufficientBalance { .. }) => {}
                    Err(e) => panic!("step {step}: {e:?}"),
                }
            }
            2 if !pending.is_empty() => {
                let red = pending.swap_remove(rng.gen_range(0..pending.len()));
                f.store.reject_redemption(&p, &red, None).await.unwrap();
            }
            _ if !pending.is_empty() => {
                let red = pending.swap_remove(rng.gen_range(0..pending.len()));
                f.store.approve_redemption(&p, &red, None).await.unwrap();
            }
            _ => {}
        }
        let points = balance(&f.store, &c).await;
        assert!(points >= 0, "step {step}: balance {points}");
        let summary = f.store.points_summary(&id(&c)).await.unwrap();
        assert!(summary.consistent, "step {step}: {summary:?}");
    }
}
