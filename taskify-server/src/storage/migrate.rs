//! Schema migrations.
//!
//! Migrations are plain SQL descriptors compiled into the binary. Applying
//! them is an explicit call: [`run_pending`] takes the descriptor list and a
//! [`MigrationExecutor`] capability, so the planning logic never touches a
//! connection or the filesystem itself.

use std::collections::HashMap;
use std::fmt;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use sha2::{Digest, Sha256};
use tracing::info;

use super::schema::schema_migrations;

/// One forward-only schema change.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

impl Migration {
    /// SHA-256 of the SQL text, hex encoded.
    pub fn checksum(&self) -> String {
        hex::encode(Sha256::digest(self.sql.as_bytes()))
    }
}

/// A row of the `schema_migrations` bookkeeping table.
#[derive(Debug, Clone, PartialEq, Eq, Queryable)]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
    pub checksum: String,
    pub applied_at: String,
}

pub const EMBEDDED: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_families",
        sql: include_str!("../../migrations/0001_create_families.sql"),
    },
    Migration {
        version: 2,
        name: "create_tasks",
        sql: include_str!("../../migrations/0002_create_tasks.sql"),
    },
    Migration {
        version: 3,
        name: "create_rewards",
        sql: include_str!("../../migrations/0003_create_rewards.sql"),
    },
    Migration {
        version: 4,
        name: "create_notifications",
        sql: include_str!("../../migrations/0004_create_notifications.sql"),
    },
];

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("migration versions must be strictly increasing (saw {0} after {1})")]
    Unordered(i64, i64),

    #[error("migration {version} ({name}) was modified after being applied")]
    ChecksumMismatch { version: i64, name: String },

    #[error("database has migration {0} applied that this build does not know about")]
    UnknownApplied(i64),

    #[error("migration {version} is pending but newer migration {latest} is already applied")]
    OutOfOrder { version: i64, latest: i64 },

    #[error("migration executor failed: {0}")]
    Executor(String),
}

/// Capability to inspect and extend the applied-migrations record.
pub trait MigrationExecutor {
    type Error: fmt::Display;

    fn applied(&mut self) -> Result<Vec<AppliedMigration>, Self::Error>;

    /// Runs `migration` and records it; both must take effect or neither.
    fn apply(&mut self, migration: &Migration, checksum: &str) -> Result<(), Self::Error>;
}

/// Works out which of `available` still need to run, in order.
pub fn plan<'a>(
    available: &'a [Migration],
    applied: &[AppliedMigration],
) -> Result<Vec<&'a Migration>, MigrationError> {
    for pair in available.windows(2) {
        if pair[1].version <= pair[0].version {
            return Err(MigrationError::Unordered(pair[1].version, pair[0].version));
        }
    }

    let known: HashMap<i64, &Migration> = available.iter().map(|m| (m.version, m)).collect();
    for record in applied {
        let Some(m) = known.get(&record.version) else {
            return Err(MigrationError::UnknownApplied(record.version));
        };
        if m.checksum() != record.checksum {
            return Err(MigrationError::ChecksumMismatch {
                version: m.version,
                name: m.name.to_string(),
            });
        }
    }

    let latest = applied.iter().map(|r| r.version).max();
    let done: std::collections::HashSet<i64> = applied.iter().map(|r| r.version).collect();
    let pending: Vec<&Migration> = available
        .iter()
        .filter(|m| !done.contains(&m.version))
        .collect();

    if let (Some(latest), Some(first)) = (latest, pending.first())
        && first.version < latest
    {
        return Err(MigrationError::OutOfOrder {
            version: first.version,
            latest,
        });
    }
    Ok(pending)
}

/// Applies every pending migration through `executor` and returns the
/// versions that ran.
pub fn run_pending<E: MigrationExecutor>(
    available: &[Migration],
    executor: &mut E,
) -> Result<Vec<i64>, MigrationError> {
    let applied = executor
        .applied()
        .map_err(|e| MigrationError::Executor(e.to_string()))?;
    let pending = plan(available, &applied)?;
    let mut ran = Vec::with_capacity(pending.len());
    for m in pending {
        executor
            .apply(m, &m.checksum())
            .map_err(|e| MigrationError::Executor(format!("{} ({}): {e}", m.version, m.name)))?;
        info!(version = m.version, name = m.name, "migration applied");
        ran.push(m.version);
    }
    Ok(ran)
}

/// Executor backed by a diesel SQLite connection.
pub struct SqliteExecutor<'a> {
    conn: &'a mut SqliteConnection,
}

impl<'a> SqliteExecutor<'a> {
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        Self { conn }
    }

    fn ensure_table(&mut self) -> Result<(), diesel::result::Error> {
        self.conn.batch_execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version BIGINT PRIMARY KEY NOT NULL,
                name TEXT NOT NULL,
                checksum TEXT NOT NULL,
                applied_at TEXT NOT NULL
            );",
        )
    }
}

impl MigrationExecutor for SqliteExecutor<'_> {
    type Error = diesel::result::Error;

    fn applied(&mut self) -> Result<Vec<AppliedMigration>, Self::Error> {
        use schema_migrations::dsl as sm;
        self.ensure_table()?;
        sm::schema_migrations
            .order(sm::version.asc())
            .select((sm::version, sm::name, sm::checksum, sm::applied_at))
            .load::<AppliedMigration>(self.conn)
    }

    fn apply(&mut self, migration: &Migration, checksum: &str) -> Result<(), Self::Error> {
        use schema_migrations::dsl as sm;
        self.conn.immediate_transaction(|conn| {
            conn.batch_execute(migration.sql)?;
            diesel::insert_into(sm::schema_migrations)
                .values((
                    sm::version.eq(migration.version),
                    sm::name.eq(migration.name),
                    sm::checksum.eq(checksum),
                    sm::applied_at.eq(super::now_iso()),
                ))
                .execute(conn)?;
            Ok(())
        })
    }
}
