use diesel::prelude::*;
use taskify_shared::domain::{CategoryPatch, NewCategory};
use tracing::info;

use super::models::{Category, CategoryChanges};
use super::schema::categories;
use super::{StorageError, Store, new_id, now_iso, parents, required};

pub(crate) fn find(conn: &mut SqliteConnection, id: &str) -> Result<Option<Category>, StorageError> {
    Ok(categories::table
        .find(id)
        .select(Category::as_select())
        .first(conn)
        .optional()?)
}

pub(crate) fn require_in_family(
    conn: &mut SqliteConnection,
    category_id: &str,
    parent_id: &str,
) -> Result<Category, StorageError> {
    let category =
        find(conn, category_id)?.ok_or_else(|| StorageError::not_found("category", category_id))?;
    if category.parent_id != parent_id {
        return Err(StorageError::constraint(format!(
            "category {category_id} belongs to another family"
        )));
    }
    Ok(category)
}

impl Store {
    pub async fn create_category(
        &self,
        parent_id: &str,
        input: NewCategory,
    ) -> Result<Category, StorageError> {
        let row = Category {
            category_id: new_id(),
            parent_id: parent_id.to_string(),
            name: required("name", &input.name)?,
            description: input.description,
            color: input.color.unwrap_or_else(|| "#3B82F6".into()),
            icon: input.icon.unwrap_or_else(|| "task".into()),
            is_default: input.is_default.unwrap_or(false),
            sort_order: input.sort_order.unwrap_or(0),
            created_at: now_iso(),
            updated_at: now_iso(),
        };
        self.with_tx(move |conn| {
            parents::require(conn, &row.parent_id)?;
            diesel::insert_into(categories::table)
                .values(&row)
                .execute(conn)?;
            info!(category_id = %row.category_id, "category created");
            Ok(row)
        })
        .await
    }

    pub async fn get_category(&self, id: &str) -> Result<Option<Category>, StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| find(conn, &id)).await
    }

    pub async fn list_categories(&self, parent_id: &str) -> Result<Vec<Category>, StorageError> {
        let parent_id = parent_id.to_string();
        self.with_conn(move |conn| {
            Ok(categories::table
                .filter(categories::parent_id.eq(&parent_id))
                .order((categories::sort_order.asc(), categories::name.asc()))
                .select(Category::as_select())
                .load(conn)?)
        })
        .await
    }

    pub async fn update_category(
        &self,
        id: &str,
        patch: CategoryPatch,
    ) -> Result<Category, StorageError> {
        let id = id.to_string();
        let name = patch
            .name
            .as_deref()
            .map(|v| required("name", v))
            .transpose()?;
        self.with_conn(move |conn| {
            let changes = CategoryChanges {
                name,
                description: patch.description,
                color: patch.color,
                icon: patch.icon,
                is_default: patch.is_default,
                sort_order: patch.sort_order,
                updated_at: now_iso(),
            };
            diesel::update(categories::table.find(&id))
                .set(&changes)
                .returning(Category::as_returning())
                .get_result(conn)
                .optional()?
                .ok_or_else(|| StorageError::not_found("category", &id))
        })
        .await
    }

    /// Tasks filed under the category keep existing without one.
    pub async fn delete_category(&self, id: &str) -> Result<(), StorageError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let n = diesel::delete(categories::table.find(&id)).execute(conn)?;
            if n == 0 {
                return Err(StorageError::not_found("category", &id));
            }
            Ok(())
        })
        .await
    }
}
