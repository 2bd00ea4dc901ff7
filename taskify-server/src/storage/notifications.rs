use diesel::prelude::*;
use taskify_shared::domain::{NewNotification, NotificationPriority, PartyRef};
use tracing::debug;

use super::models::Notification;
use super::schema::{children, notifications, parents};
use super::{StorageError, Store, new_id, now_iso, required};

/// Fails with `NotFound` unless the referenced parent or child exists.
pub(crate) fn ensure_party(conn: &mut SqliteConnection, party: &PartyRef) -> Result<(), StorageError> {
    let count: i64 = match party {
        PartyRef::Parent(p) => parents::table.find(&p.0).count().get_result(conn)?,
        PartyRef::Child(c) => children::table.find(&c.0).count().get_result(conn)?,
    };
    if count == 0 {
        return Err(StorageError::not_found(party.kind().as_str(), party.id()));
    }
    Ok(())
}

/// Id of the parent that owns `party`.
pub(crate) fn family_of(conn: &mut SqliteConnection, party: &PartyRef) -> Result<String, StorageError> {
    match party {
        PartyRef::Parent(p) => {
            ensure_party(conn, party)?;
            Ok(p.0.clone())
        }
        PartyRef::Child(c) => children::table
            .find(&c.0)
            .select(children::parent_id)
            .first(conn)
            .optional()?
            .ok_or_else(|| StorageError::not_found("child", &c.0)),
    }
}

pub(crate) fn insert(
    conn: &mut SqliteConnection,
    input: NewNotification,
) -> Result<Notification, StorageError> {
    ensure_party(conn, &input.recipient)?;
    let row = Notification {
        notification_id: new_id(),
        recipient_id: input.recipient.id().to_string(),
        recipient_type: input.recipient.kind().as_str().to_string(),
        title: required("title", &input.title)?,
        message: required("message", &input.message)?,
        kind: input.kind.as_str().to_string(),
        priority: input
            .priority
            .unwrap_or(NotificationPriority::Normal)
            .as_str()
            .to_string(),
        is_read: false,
        read_at: None,
        related_task_id: input.related_task_id,
        related_reward_id: input.related_reward_id,
        related_child_id: input.related_child_id,
        delivery_method: input.delivery_method.unwrap_or_else(|| "in_app".into()),
        delivered_at: None,
        created_at: now_iso(),
    };
    diesel::insert_into(notifications::table)
        .values(&row)
        .execute(conn)?;
    debug!(
        notification_id = %row.notification_id,
        recipient = %row.recipient_id,
        kind = %row.kind,
        "notification queued"
    );
    Ok(row)
}

impl Store {
    pub async fn create_notification(
        &self,
        input: NewNotification,
    ) -> Result<Notification, StorageError> {
        self.with_conn(move |conn| insert(conn, input)).await
    }

    pub async fn get_notification(&self, id: &str) -> Result<Option<Notification>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            Ok(notifications::table
                .find(&id)
                .select(Notification::as_select())
                .first(conn)
                .optional()?)
        })
        .await
    }

    /// Newest first.
    pub async fn list_notifications(
        &self,
        recipient: &PartyRef,
        unread_only: bool,
    ) -> Result<Vec<Notification>, StorageError> {
        let recipient = recipient.clone();
        self.with_conn(move |conn| {
            let mut query = notifications::table
                .filter(notifications::recipient_type.eq(recipient.kind().as_str()))
                .filter(notifications::recipient_id.eq(recipient.id()))
                .into_boxed();
            if unread_only {
                query = query.filter(notifications::is_read.eq(false));
            }
            Ok(query
                .order((
                    notifications::created_at.desc(),
                    notifications::notification_id.asc(),
                ))
                .select(Notification::as_select())
                .load(conn)?)
        })
        .await
    }

    pub async fn unread_notification_count(&self, recipient: &PartyRef) -> Result<i64, StorageError> {
        let recipient = recipient.clone();
        self.with_conn(move |conn| {
            Ok(notifications::table
                .filter(notifications::recipient_type.eq(recipient.kind().as_str()))
                .filter(notifications::recipient_id.eq(recipient.id()))
                .filter(notifications::is_read.eq(false))
                .count()
                .get_result(conn)?)
        })
        .await
    }

    /// Marking an already read notification keeps its original `read_at`.
    pub async fn mark_notification_read(&self, id: &str) -> Result<Notification, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            diesel::update(
                notifications::table
                    .find(&id)
                    .filter(notifications::is_read.eq(false)),
            )
            .set((
                notifications::is_read.eq(true),
                notifications::read_at.eq(Some(now_iso())),
            ))
            .execute(conn)?;
            notifications::table
                .find(&id)
                .select(Notification::as_select())
                .first(conn)
                .optional()?
                .ok_or_else(|| StorageError::not_found("notification", &id))
        })
        .await
    }

    pub async fn delete_notification(&self, id: &str) -> Result<(), StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let n = diesel::delete(notifications::table.find(&id)).execute(conn)?;
            if n == 0 {
                return Err(StorageError::not_found("notification", &id));
            }
            Ok(())
        })
        .await
    }
}
