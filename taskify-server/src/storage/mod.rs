pub mod migrate;
pub mod models;
pub mod schema;

mod categories;
mod children;
mod comments;
mod notifications;
mod parents;
mod redemptions;
mod rewards;
mod tasks;
mod tokens;

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use taskify_shared::domain::{RejectionReentry, UnknownVariant};

pub use tokens::IssuedToken;

/// Structured error type for all storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness, foreign-key or cross-family rule was broken.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// A workflow guard rejected a status change.
    #[error("cannot {action} {entity} in status {from}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        action: &'static str,
    },

    #[error("insufficient balance: need {required} points, have {available}")]
    InsufficientBalance { required: i32, available: i32 },

    /// The reward cannot be redeemed right now (inactive, outside its window, cap reached).
    #[error("reward unavailable: {0}")]
    RewardUnavailable(String),

    #[error("token expired")]
    Expired,

    #[error("token already used")]
    AlreadyUsed,

    #[error("token invalidated")]
    Invalidated,

    /// The actor lacks the role or ownership the operation requires.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// An atomic unit could not be committed; nothing was applied and the call may be retried.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    /// The caller supplied invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A stored enum column holds a value this build does not understand.
    #[error("unexpected stored value: {0}")]
    Corrupt(#[from] UnknownVariant),

    /// A Diesel ORM error that is not a constraint violation.
    #[error("database error: {0}")]
    Database(DieselError),

    /// Failed to acquire or build a connection from the pool.
    #[error("pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),

    /// A `spawn_blocking` task panicked or was cancelled.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// A database migration failed to apply.
    #[error("migration error: {0}")]
    Migration(#[from] migrate::MigrationError),
}

impl From<DieselError> for StorageError {
    fn from(e: DieselError) -> Self {
        match &e {
            DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation
                | DatabaseErrorKind::ForeignKeyViolation
                | DatabaseErrorKind::CheckViolation
                | DatabaseErrorKind::NotNullViolation,
                info,
            ) => StorageError::ConstraintViolation(info.message().to_string()),
            _ => StorageError::Database(e),
        }
    }
}

impl StorageError {
    pub(crate) fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StorageError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub(crate) fn constraint(msg: impl Into<String>) -> Self {
        StorageError::ConstraintViolation(msg.into())
    }

    pub(crate) fn unauthorized(msg: impl Into<String>) -> Self {
        StorageError::Unauthorized(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        StorageError::InvalidInput(msg.into())
    }
}

#[derive(Clone)]
pub struct Store {
    pool: Pool<ConnectionManager<SqliteConnection>>,
    reentry: RejectionReentry,
}

impl Store {
    pub async fn connect_sqlite(path: &str) -> Result<Self, StorageError> {
        let store = Self::open_sqlite(path)?;
        // Apply pending migrations on startup (auto-init empty DBs)
        store.migrate().await?;
        Ok(store)
    }

    /// Opens the pool without touching the schema.
    pub fn open_sqlite(path: &str) -> Result<Self, StorageError> {
        let url = path.to_string();
        let manager = ConnectionManager::<SqliteConnection>::new(url);
        let pool = Pool::builder().max_size(8).build(manager)?;
        Ok(Store {
            pool,
            reentry: RejectionReentry::default(),
        })
    }

    /// Sets where a rejected task goes when it is reopened.
    pub fn with_rejection_reentry(mut self, reentry: RejectionReentry) -> Self {
        self.reentry = reentry;
        self
    }

    /// Runs the embedded migrations that have not been applied yet.
    pub async fn migrate(&self) -> Result<Vec<i64>, StorageError> {
        self.with_conn(|conn| {
            let mut exec = migrate::SqliteExecutor::new(conn);
            Ok(migrate::run_pending(migrate::EMBEDDED, &mut exec)?)
        })
        .await
    }

    /// Runs `f` on a pooled connection on the blocking thread pool.
    pub(crate) async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<T, StorageError> {
            let mut conn = pool.get()?;
            configure_sqlite_conn(&mut conn)?;
            f(&mut conn)
        })
        .await?
    }

    /// Like [`Store::with_conn`], but inside `BEGIN IMMEDIATE`. The write lock
    /// is taken before the first read, so read-check-write sequences cannot
    /// interleave with other writers.
    pub(crate) async fn with_tx<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&mut SqliteConnection) -> Result<T, StorageError> + Send + 'static,
    {
        self.with_conn(move |conn| {
            conn.immediate_transaction(f).map_err(|e| match e {
                StorageError::Database(db) => StorageError::TransactionFailed(db.to_string()),
                other => other,
            })
        })
        .await
    }
}

fn configure_sqlite_conn(conn: &mut SqliteConnection) -> Result<(), diesel::result::Error> {
    // Enable WAL for better read/write concurrency and set a busy timeout
    // Ignore the result rows; Diesel's execute is fine for PRAGMAs
    diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
    diesel::sql_query("PRAGMA synchronous=NORMAL;").execute(conn)?;
    diesel::sql_query("PRAGMA busy_timeout=5000;").execute(conn)?;
    // Off by default in SQLite; cascade/set-null rules depend on it
    diesel::sql_query("PRAGMA foreign_keys=ON;").execute(conn)?;
    Ok(())
}

/// Current time as stored in every timestamp column.
pub(crate) fn now_iso() -> String {
    format_ts(Utc::now())
}

pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::invalid(format!("timestamp {value:?}: {e}")))
}

/// Accepts an optional caller-supplied timestamp and normalizes it.
pub(crate) fn normalize_ts(value: Option<&str>) -> Result<Option<String>, StorageError> {
    value.map(|v| parse_ts(v).map(format_ts)).transpose()
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub(crate) fn required(field: &'static str, value: &str) -> Result<String, StorageError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StorageError::invalid(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn non_negative(field: &'static str, value: i32) -> Result<i32, StorageError> {
    if value < 0 {
        return Err(StorageError::constraint(format!(
            "{field} must not be negative"
        )));
    }
    Ok(value)
}
