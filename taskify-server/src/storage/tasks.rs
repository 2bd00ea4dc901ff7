use diesel::dsl::max;
use diesel::prelude::*;
use taskify_shared::auth::Actor;
use taskify_shared::domain::{
    Difficulty, NewNotification, NewTask, NotificationKind, PartyRef, Priority, RejectionReentry,
    TaskAction, TaskFilter, TaskPatch, TaskStatus,
};
use tracing::info;

use super::models::{Parent, Task, TaskChanges};
use super::schema::tasks;
use super::{
    StorageError, Store, categories, children, new_id, non_negative, normalize_ts, notifications,
    now_iso, parents, required,
};

pub(crate) fn find(conn: &mut SqliteConnection, id: &str) -> Result<Option<Task>, StorageError> {
    Ok(tasks::table
        .find(id)
        .select(Task::as_select())
        .first(conn)
        .optional()?)
}

pub(crate) fn require(conn: &mut SqliteConnection, id: &str) -> Result<Task, StorageError> {
    find(conn, id)?.ok_or_else(|| StorageError::not_found("task", id))
}

fn step(
    task: &Task,
    action: TaskAction,
    reentry: RejectionReentry,
) -> Result<TaskStatus, StorageError> {
    let from = task.task_status()?;
    action
        .target(from, reentry)
        .ok_or_else(|| StorageError::InvalidTransition {
            entity: "task",
            from: from.to_string(),
            action: action.as_str(),
        })
}

/// Loads the task for a workflow step and checks the actor is a member of
/// its family and that the family account is active.
fn load_for(
    conn: &mut SqliteConnection,
    actor: &Actor,
    id: &str,
) -> Result<(Task, Parent), StorageError> {
    let task = require(conn, id)?;
    if actor.family().0 != task.parent_id {
        return Err(StorageError::unauthorized("task belongs to another family"));
    }
    let parent = parents::require(conn, &task.parent_id)?;
    parents::ensure_active(&parent)?;
    Ok((task, parent))
}

fn is_assignee(actor: &Actor, task: &Task) -> bool {
    task.child_id
        .as_deref()
        .is_some_and(|child| actor.is_child(child))
}

fn require_owner(actor: &Actor, task: &Task) -> Result<(), StorageError> {
    if actor.is_parent(&task.parent_id) {
        Ok(())
    } else {
        Err(StorageError::unauthorized("only the owning parent may do this"))
    }
}

fn assignee(task: &Task) -> Result<&str, StorageError> {
    task.child_id.as_deref().ok_or_else(|| {
        StorageError::constraint(format!("task {} has no assigned child", task.task_id))
    })
}

fn save(conn: &mut SqliteConnection, id: &str, changes: &TaskChanges) -> Result<Task, StorageError> {
    Ok(diesel::update(tasks::table.find(id))
        .set(changes)
        .returning(Task::as_returning())
        .get_result(conn)?)
}

/// Credits the assignee and stamps the task verified, in the caller's
/// transaction.
fn credit(
    conn: &mut SqliteConnection,
    task: &Task,
    verified_by: Option<&str>,
    notes: Option<String>,
    now: &str,
) -> Result<Task, StorageError> {
    let child_id = assignee(task)?;
    let points = non_negative("reward_points", task.reward_points)?;
    let balance = children::adjust_points(conn, child_id, points)?;
    let mut changes = TaskChanges {
        status: Some(TaskStatus::Verified.as_str().to_string()),
        verified_by: Some(verified_by.map(str::to_string)),
        verified_at: Some(Some(now.to_string())),
        credited_points: Some(Some(points)),
        updated_at: now.to_string(),
        ..Default::default()
    };
    if notes.is_some() {
        changes.verification_notes = Some(notes);
    }
    let task = save(conn, &task.task_id, &changes)?;
    notifications::insert(
        conn,
        NewNotification::new(
            PartyRef::Child(child_id.into()),
            NotificationKind::TaskVerified,
            "Task approved",
            format!("\"{}\" was approved: +{points} points", task.title),
        )
        .task(&task.task_id)
        .child(child_id),
    )?;
    info!(
        task_id = %task.task_id,
        child_id = %child_id,
        points,
        balance,
        "task verified"
    );
    Ok(task)
}

impl Store {
    pub async fn create_task(&self, parent_id: &str, input: NewTask) -> Result<Task, StorageError> {
        let parent_id = parent_id.to_string();
        let title = required("title", &input.title)?;
        let reward_points = non_negative("reward_points", input.reward_points.unwrap_or(10))?;
        if let Some(minutes) = input.estimated_duration {
            non_negative("estimated_duration", minutes)?;
        }
        let due_date = normalize_ts(input.due_date.as_deref())?;
        self.with_tx(move |conn| {
            parents::require(conn, &parent_id)?;
            if let Some(child_id) = &input.child_id {
                children::require_in_family(conn, child_id, &parent_id)?;
            }
            if let Some(category_id) = &input.category_id {
                categories::require_in_family(conn, category_id, &parent_id)?;
            }
            let now = now_iso();
            let row = Task {
                task_id: new_id(),
                parent_id,
                assigned_at: input.child_id.as_ref().map(|_| now.clone()),
                child_id: input.child_id,
                category_id: input.category_id,
                title,
                description: input.description,
                due_date,
                recurrence_pattern: input.recurrence_pattern,
                priority: input.priority.unwrap_or(Priority::Medium).as_str().into(),
                difficulty: input.difficulty.unwrap_or(Difficulty::Medium).as_str().into(),
                estimated_duration: input.estimated_duration,
                reward_points,
                status: TaskStatus::Pending.as_str().into(),
                completion_date: None,
                completion_notes: None,
                requires_verification: input.requires_verification.unwrap_or(true),
                verification_notes: None,
                verified_by: None,
                verified_at: None,
                credited_points: None,
                parent_task_id: None,
                sequence_number: 1,
                created_at: now.clone(),
                updated_at: now,
            };
            diesel::insert_into(tasks::table).values(&row).execute(conn)?;
            if let Some(child_id) = &row.child_id {
                notifications::insert(
                    conn,
                    NewNotification::new(
                        PartyRef::Child(child_id.as_str().into()),
                        NotificationKind::TaskAssigned,
                        "New task",
                        format!("You have a new task: \"{}\"", row.title),
                    )
                    .task(&row.task_id)
                    .child(child_id),
                )?;
            }
            info!(task_id = %row.task_id, parent_id = %row.parent_id, "task created");
            Ok(row)
        })
        .await
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<Task>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| find(conn, &id)).await
    }

    pub async fn list_tasks(
        &self,
        parent_id: &str,
        filter: TaskFilter,
    ) -> Result<Vec<Task>, StorageError> {
        let parent_id = parent_id.to_string();
        self.with_conn(move |conn| {
            let mut query = tasks::table
                .filter(tasks::parent_id.eq(&parent_id))
                .into_boxed();
            if let Some(child_id) = filter.child_id {
                query = query.filter(tasks::child_id.eq(child_id));
            }
            if let Some(status) = filter.status {
                query = query.filter(tasks::status.eq(status.as_str()));
            }
            Ok(query
                .order((tasks::created_at.asc(), tasks::sequence_number.asc()))
                .select(Task::as_select())
                .load(conn)?)
        })
        .await
    }

    pub async fn list_tasks_for_child(&self, child_id: &str) -> Result<Vec<Task>, StorageError> {
        let child_id = child_id.to_string();
        self.with_conn(move |conn| {
            Ok(tasks::table
                .filter(tasks::child_id.eq(&child_id))
                .order((tasks::created_at.asc(), tasks::sequence_number.asc()))
                .select(Task::as_select())
                .load(conn)?)
        })
        .await
    }

    /// Field edits only; status moves go through the workflow methods.
    pub async fn update_task(&self, id: &str, patch: TaskPatch) -> Result<Task, StorageError> {
        let id = id.to_string();
        let title = patch
            .title
            .as_deref()
            .map(|v| required("title", v))
            .transpose()?;
        if let Some(points) = patch.reward_points {
            non_negative("reward_points", points)?;
        }
        if let Some(Some(minutes)) = patch.estimated_duration {
            non_negative("estimated_duration", minutes)?;
        }
        let due_date = match patch.due_date {
            Some(v) => Some(normalize_ts(v.as_deref())?),
            None => None,
        };
        self.with_tx(move |conn| {
            let task = require(conn, &id)?;
            let now = now_iso();
            let mut changes = TaskChanges {
                title,
                description: patch.description,
                due_date,
                recurrence_pattern: patch.recurrence_pattern,
                priority: patch.priority.map(|p| p.as_str().to_string()),
                difficulty: patch.difficulty.map(|d| d.as_str().to_string()),
                estimated_duration: patch.estimated_duration,
                reward_points: patch.reward_points,
                requires_verification: patch.requires_verification,
                updated_at: now.clone(),
                ..Default::default()
            };
            if let Some(child_id) = patch.child_id
                && child_id != task.child_id
            {
                let status = task.task_status()?;
                if !status.allows_reassignment() {
                    return Err(StorageError::InvalidTransition {
                        entity: "task",
                        from: status.to_string(),
                        action: "reassign",
                    });
                }
                if let Some(child) = &child_id {
                    children::require_in_family(conn, child, &task.parent_id)?;
                }
                changes.assigned_at = Some(child_id.as_ref().map(|_| now.clone()));
                changes.child_id = Some(child_id);
            }
            if let Some(Some(category_id)) = &patch.category_id {
                categories::require_in_family(conn, category_id, &task.parent_id)?;
            }
            changes.category_id = patch.category_id;
            save(conn, &id, &changes)
        })
        .await
    }

    /// Removes the task, its comments and, for a series root, every
    /// occurrence.
    pub async fn delete_task(&self, id: &str) -> Result<(), StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let n = diesel::delete(tasks::table.find(&id)).execute(conn)?;
            if n == 0 {
                return Err(StorageError::not_found("task", &id));
            }
            info!(task_id = %id, "task deleted");
            Ok(())
        })
        .await
    }

    /// Appends an occurrence to the series `id` belongs to.
    pub async fn create_occurrence(
        &self,
        id: &str,
        due_date: Option<String>,
    ) -> Result<Task, StorageError> {
        let id = id.to_string();
        let due_date = normalize_ts(due_date.as_deref())?;
        self.with_tx(move |conn| {
            let task = require(conn, &id)?;
            let root = match &task.parent_task_id {
                Some(root_id) => require(conn, root_id)?,
                None => task,
            };
            let last: Option<i32> = tasks::table
                .filter(
                    tasks::task_id
                        .eq(&root.task_id)
                        .or(tasks::parent_task_id.eq(&root.task_id)),
                )
                .select(max(tasks::sequence_number))
                .first(conn)?;
            let now = now_iso();
            let row = Task {
                task_id: new_id(),
                assigned_at: root.child_id.as_ref().map(|_| now.clone()),
                due_date,
                status: TaskStatus::Pending.as_str().into(),
                completion_date: None,
                completion_notes: None,
                verification_notes: None,
                verified_by: None,
                verified_at: None,
                credited_points: None,
                parent_task_id: Some(root.task_id.clone()),
                sequence_number: last.unwrap_or(root.sequence_number) + 1,
                created_at: now.clone(),
                updated_at: now,
                ..root
            };
            diesel::insert_into(tasks::table).values(&row).execute(conn)?;
            info!(
                task_id = %row.task_id,
                root = ?row.parent_task_id,
                sequence = row.sequence_number,
                "occurrence created"
            );
            Ok(row)
        })
        .await
    }

    /// The series root followed by its occurrences, by sequence number.
    pub async fn list_occurrences(&self, id: &str) -> Result<Vec<Task>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let task = require(conn, &id)?;
            let root_id = task.series_root().to_string();
            Ok(tasks::table
                .filter(
                    tasks::task_id
                        .eq(&root_id)
                        .or(tasks::parent_task_id.eq(&root_id)),
                )
                .order(tasks::sequence_number.asc())
                .select(Task::as_select())
                .load(conn)?)
        })
        .await
    }

    /// `pending -> in_progress`; only the assigned child.
    pub async fn start_task(&self, actor: &Actor, id: &str) -> Result<Task, StorageError> {
        let actor = actor.clone();
        let id = id.to_string();
        let reentry = self.reentry;
        self.with_tx(move |conn| {
            let (task, _) = load_for(conn, &actor, &id)?;
            if !is_assignee(&actor, &task) {
                return Err(StorageError::unauthorized(
                    "only the assigned child may start a task",
                ));
            }
            let next = step(&task, TaskAction::Start, reentry)?;
            let task = save(
                conn,
                &id,
                &TaskChanges {
                    status: Some(next.as_str().to_string()),
                    updated_at: now_iso(),
                    ..Default::default()
                },
            )?;
            info!(task_id = %id, "task started");
            Ok(task)
        })
        .await
    }

    /// `in_progress -> completed`, or straight to `verified` with the credit
    /// applied when the task does not require verification.
    pub async fn complete_task(
        &self,
        actor: &Actor,
        id: &str,
        notes: Option<String>,
    ) -> Result<Task, StorageError> {
        let actor = actor.clone();
        let id = id.to_string();
        let reentry = self.reentry;
        self.with_tx(move |conn| {
            let (task, _) = load_for(conn, &actor, &id)?;
            if !is_assignee(&actor, &task) && !actor.is_parent(&task.parent_id) {
                return Err(StorageError::unauthorized(
                    "only the assigned child or the owning parent may complete a task",
                ));
            }
            let next = step(&task, TaskAction::Complete, reentry)?;
            let child_id = assignee(&task)?.to_string();
            let now = now_iso();
            let task = save(
                conn,
                &id,
                &TaskChanges {
                    status: Some(next.as_str().to_string()),
                    completion_date: Some(Some(now.clone())),
                    completion_notes: Some(notes),
                    updated_at: now.clone(),
                    ..Default::default()
                },
            )?;
            if !task.requires_verification {
                return credit(conn, &task, None, None, &now);
            }
            notifications::insert(
                conn,
                NewNotification::new(
                    PartyRef::Parent(task.parent_id.as_str().into()),
                    NotificationKind::TaskCompleted,
                    "Task completed",
                    format!("\"{}\" is waiting for your review", task.title),
                )
                .task(&task.task_id)
                .child(&child_id),
            )?;
            info!(task_id = %id, child_id = %child_id, "task completed");
            Ok(task)
        })
        .await
    }

    /// `completed -> verified`; credits the task's points to the assignee in
    /// the same transaction. Calling it again fails instead of crediting twice.
    pub async fn verify_task(
        &self,
        actor: &Actor,
        id: &str,
        notes: Option<String>,
    ) -> Result<Task, StorageError> {
        let actor = actor.clone();
        let id = id.to_string();
        let reentry = self.reentry;
        self.with_tx(move |conn| {
            let (task, parent) = load_for(conn, &actor, &id)?;
            require_owner(&actor, &task)?;
            step(&task, TaskAction::Verify, reentry)?;
            credit(conn, &task, Some(&parent.parent_id), notes, &now_iso())
        })
        .await
    }

    /// `completed -> rejected`; no credit.
    pub async fn reject_task(
        &self,
        actor: &Actor,
        id: &str,
        notes: Option<String>,
    ) -> Result<Task, StorageError> {
        let actor = actor.clone();
        let id = id.to_string();
        let reentry = self.reentry;
        self.with_tx(move |conn| {
            let (task, _) = load_for(conn, &actor, &id)?;
            require_owner(&actor, &task)?;
            let next = step(&task, TaskAction::Reject, reentry)?;
            let task = save(
                conn,
                &id,
                &TaskChanges {
                    status: Some(next.as_str().to_string()),
                    verification_notes: Some(notes.clone()),
                    updated_at: now_iso(),
                    ..Default::default()
                },
            )?;
            if let Some(child_id) = &task.child_id {
                let message = match &notes {
                    Some(reason) => format!("\"{}\" needs another try: {reason}", task.title),
                    None => format!("\"{}\" needs another try", task.title),
                };
                notifications::insert(
                    conn,
                    NewNotification::new(
                        PartyRef::Child(child_id.as_str().into()),
                        NotificationKind::TaskRejected,
                        "Task returned",
                        message,
                    )
                    .task(&task.task_id)
                    .child(child_id),
                )?;
            }
            info!(task_id = %id, "task rejected");
            Ok(task)
        })
        .await
    }

    /// `rejected -> pending | in_progress`, depending on the configured
    /// re-entry state. The rejection notes are kept.
    pub async fn reopen_task(&self, actor: &Actor, id: &str) -> Result<Task, StorageError> {
        let actor = actor.clone();
        let id = id.to_string();
        let reentry = self.reentry;
        self.with_tx(move |conn| {
            let (task, _) = load_for(conn, &actor, &id)?;
            if !is_assignee(&actor, &task) && !actor.is_parent(&task.parent_id) {
                return Err(StorageError::unauthorized(
                    "only the assigned child or the owning parent may reopen a task",
                ));
            }
            let next = step(&task, TaskAction::Reopen, reentry)?;
            let task = save(
                conn,
                &id,
                &TaskChanges {
                    status: Some(next.as_str().to_string()),
                    completion_date: Some(None),
                    completion_notes: Some(None),
                    updated_at: now_iso(),
                    ..Default::default()
                },
            )?;
            info!(task_id = %id, status = %next, "task reopened");
            Ok(task)
        })
        .await
    }
}
