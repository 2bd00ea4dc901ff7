use diesel::prelude::*;
use taskify_shared::auth::Actor;
use taskify_shared::domain::{AccountStatus, NewParent, ParentPatch, PartyKind};
use tracing::info;

use super::models::{Parent, ParentChanges};
use super::schema::{children, notifications, parents};
use super::{StorageError, Store, new_id, now_iso, required};

pub(crate) fn normalize_email(raw: &str) -> Result<String, StorageError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        }
        None => false,
    };
    if !valid {
        return Err(StorageError::invalid(format!("malformed email: {raw:?}")));
    }
    Ok(email)
}

pub(crate) fn find(conn: &mut SqliteConnection, id: &str) -> Result<Option<Parent>, StorageError> {
    Ok(parents::table
        .find(id)
        .select(Parent::as_select())
        .first(conn)
        .optional()?)
}

pub(crate) fn require(conn: &mut SqliteConnection, id: &str) -> Result<Parent, StorageError> {
    find(conn, id)?.ok_or_else(|| StorageError::not_found("parent", id))
}

/// The actor must be `parent_id` itself, with an active account.
pub(crate) fn authorize_owner(
    conn: &mut SqliteConnection,
    actor: &Actor,
    parent_id: &str,
) -> Result<Parent, StorageError> {
    if !actor.is_parent(parent_id) {
        return Err(StorageError::unauthorized(
            "only the owning parent may do this",
        ));
    }
    let parent = require(conn, parent_id)?;
    ensure_active(&parent)?;
    Ok(parent)
}

pub(crate) fn ensure_active(parent: &Parent) -> Result<(), StorageError> {
    match parent.account_status()? {
        AccountStatus::Active => Ok(()),
        other => Err(StorageError::unauthorized(format!(
            "parent account is {other}"
        ))),
    }
}

fn email_taken(
    conn: &mut SqliteConnection,
    email: &str,
    except: Option<&str>,
) -> Result<bool, StorageError> {
    let mut query = parents::table
        .filter(parents::email.eq(email))
        .into_boxed();
    if let Some(id) = except {
        query = query.filter(parents::parent_id.ne(id));
    }
    let count: i64 = query.count().get_result(conn)?;
    Ok(count > 0)
}

impl Store {
    pub async fn create_parent(&self, input: NewParent) -> Result<Parent, StorageError> {
        let email = normalize_email(&input.email)?;
        let row = Parent {
            parent_id: new_id(),
            email,
            password_hash: required("password_hash", &input.password_hash)?,
            first_name: required("first_name", &input.first_name)?,
            last_name: required("last_name", &input.last_name)?,
            email_verified: false,
            email_verified_at: None,
            password_reset_token_hash: None,
            password_reset_expires: None,
            account_status: AccountStatus::Active.as_str().to_string(),
            timezone: input.timezone.unwrap_or_else(|| "UTC".into()),
            language: input.language.unwrap_or_else(|| "en".into()),
            privacy_consent: input.privacy_consent,
            marketing_consent: input.marketing_consent,
            data_retention_consent: input.data_retention_consent.unwrap_or(true),
            created_at: now_iso(),
            updated_at: now_iso(),
        };
        self.with_tx(move |conn| {
            if email_taken(conn, &row.email, None)? {
                return Err(StorageError::constraint(format!(
                    "email already registered: {}",
                    row.email
                )));
            }
            diesel::insert_into(parents::table)
                .values(&row)
                .execute(conn)?;
            info!(parent_id = %row.parent_id, "parent created");
            Ok(row)
        })
        .await
    }

    pub async fn get_parent(&self, id: &str) -> Result<Option<Parent>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| find(conn, &id)).await
    }

    pub async fn get_parent_by_email(&self, email: &str) -> Result<Option<Parent>, StorageError> {
        let email = email.trim().to_lowercase();
        self.with_conn(move |conn| {
            Ok(parents::table
                .filter(parents::email.eq(&email))
                .select(Parent::as_select())
                .first(conn)
                .optional()?)
        })
        .await
    }

    /// Changing the email resets `email_verified`; tokens issued for the old
    /// address stop working.
    pub async fn update_parent(&self, id: &str, patch: ParentPatch) -> Result<Parent, StorageError> {
        let id = id.to_string();
        let email = patch.email.as_deref().map(normalize_email).transpose()?;
        let first_name = patch
            .first_name
            .as_deref()
            .map(|v| required("first_name", v))
            .transpose()?;
        let last_name = patch
            .last_name
            .as_deref()
            .map(|v| required("last_name", v))
            .transpose()?;
        self.with_tx(move |conn| {
            let current = require(conn, &id)?;
            let mut changes = ParentChanges {
                first_name,
                last_name,
                timezone: patch.timezone,
                language: patch.language,
                privacy_consent: patch.privacy_consent,
                marketing_consent: patch.marketing_consent,
                data_retention_consent: patch.data_retention_consent,
                updated_at: now_iso(),
                ..Default::default()
            };
            if let Some(email) = email
                && email != current.email
            {
                if email_taken(conn, &email, Some(&id))? {
                    return Err(StorageError::constraint(format!(
                        "email already registered: {email}"
                    )));
                }
                changes.email = Some(email);
                changes.email_verified = Some(false);
                changes.email_verified_at = Some(None);
            }
            Ok(diesel::update(parents::table.find(&id))
                .set(&changes)
                .returning(Parent::as_returning())
                .get_result(conn)?)
        })
        .await
    }

    pub async fn set_account_status(
        &self,
        id: &str,
        status: AccountStatus,
    ) -> Result<Parent, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let changes = ParentChanges {
                account_status: Some(status.as_str().to_string()),
                updated_at: now_iso(),
                ..Default::default()
            };
            let updated = diesel::update(parents::table.find(&id))
                .set(&changes)
                .returning(Parent::as_returning())
                .get_result(conn)
                .optional()?;
            let parent = updated.ok_or_else(|| StorageError::not_found("parent", &id))?;
            info!(parent_id = %id, status = %status, "account status changed");
            Ok(parent)
        })
        .await
    }

    /// Deletes the parent and, through the foreign keys, everything the family
    /// owns. Notifications addressed to family members are removed explicitly
    /// since their recipient column is not a foreign key.
    pub async fn delete_parent(&self, id: &str) -> Result<(), StorageError> {
        let id = id.to_string();
        self.with_tx(move |conn| {
            require(conn, &id)?;
            let child_ids: Vec<String> = children::table
                .filter(children::parent_id.eq(&id))
                .select(children::child_id)
                .load(conn)?;
            diesel::delete(
                notifications::table
                    .filter(notifications::recipient_type.eq(PartyKind::Parent.as_str()))
                    .filter(notifications::recipient_id.eq(&id)),
            )
            .execute(conn)?;
            diesel::delete(
                notifications::table
                    .filter(notifications::recipient_type.eq(PartyKind::Child.as_str()))
                    .filter(notifications::recipient_id.eq_any(&child_ids)),
            )
            .execute(conn)?;
            diesel::delete(parents::table.find(&id)).execute(conn)?;
            info!(parent_id = %id, children = child_ids.len(), "parent deleted");
            Ok(())
        })
        .await
    }
}
