use diesel::prelude::*;
use taskify_shared::domain::{CommentPatch, NewComment, PartyRef};

use super::models::{TaskComment, TaskCommentChanges};
use super::schema::task_comments;
use super::{StorageError, Store, new_id, notifications, now_iso, required, tasks};

impl Store {
    /// The author must exist and belong to the task's family.
    pub async fn add_comment(
        &self,
        task_id: &str,
        author: PartyRef,
        input: NewComment,
    ) -> Result<TaskComment, StorageError> {
        let task_id = task_id.to_string();
        let content = required("content", &input.content)?;
        self.with_conn(move |conn| {
            let task = tasks::require(conn, &task_id)?;
            let family = notifications::family_of(conn, &author)?;
            if family != task.parent_id {
                return Err(StorageError::constraint(format!(
                    "{} {} is not a member of the task's family",
                    author.kind(),
                    author.id()
                )));
            }
            let row = TaskComment {
                comment_id: new_id(),
                task_id,
                author_id: author.id().to_string(),
                author_type: author.kind().as_str().to_string(),
                content,
                is_private: input.is_private.unwrap_or(false),
                attachment_url: input.attachment_url,
                created_at: now_iso(),
                updated_at: now_iso(),
            };
            diesel::insert_into(task_comments::table)
                .values(&row)
                .execute(conn)?;
            Ok(row)
        })
        .await
    }

    pub async fn get_comment(&self, id: &str) -> Result<Option<TaskComment>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            Ok(task_comments::table
                .find(&id)
                .select(TaskComment::as_select())
                .first(conn)
                .optional()?)
        })
        .await
    }

    /// Oldest first. Private comments are only returned when asked for.
    pub async fn list_comments(
        &self,
        task_id: &str,
        include_private: bool,
    ) -> Result<Vec<TaskComment>, StorageError> {
        let task_id = task_id.to_string();
        self.with_conn(move |conn| {
            tasks::require(conn, &task_id)?;
            let mut query = task_comments::table
                .filter(task_comments::task_id.eq(&task_id))
                .into_boxed();
            if !include_private {
                query = query.filter(task_comments::is_private.eq(false));
            }
            Ok(query
                .order((task_comments::created_at.asc(), task_comments::comment_id.asc()))
                .select(TaskComment::as_select())
                .load(conn)?)
        })
        .await
    }

    pub async fn update_comment(
        &self,
        id: &str,
        patch: CommentPatch,
    ) -> Result<TaskComment, StorageError> {
        let id = id.to_string();
        let content = patch
            .content
            .as_deref()
            .map(|v| required("content", v))
            .transpose()?;
        self.with_conn(move |conn| {
            let changes = TaskCommentChanges {
                content,
                is_private: patch.is_private,
                attachment_url: patch.attachment_url,
                updated_at: now_iso(),
            };
            diesel::update(task_comments::table.find(&id))
                .set(&changes)
                .returning(TaskComment::as_returning())
                .get_result(conn)
                .optional()?
                .ok_or_else(|| StorageError::not_found("comment", &id))
        })
        .await
    }

    pub async fn delete_comment(&self, id: &str) -> Result<(), StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let n = diesel::delete(task_comments::table.find(&id)).execute(conn)?;
            if n == 0 {
                return Err(StorageError::not_found("comment", &id));
            }
            Ok(())
        })
        .await
    }
}
