//! Embedded SQL migration runner.
//!
//! Migrations are SQL files embedded at compile time and applied in order,
//! each inside its own transaction. Applied migrations are recorded in the
//! `_eventful_migrations` table and skipped on later runs.

use rusqlite::Connection;
use thiserror::Error;

/// A single embedded migration.
struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. New migrations are appended here.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_init",
        sql: include_str!("migrations/000_init.sql"),
    },
    Migration {
        name: "001_users",
        sql: include_str!("migrations/001_users.sql"),
    },
    Migration {
        name: "002_events",
        sql: include_str!("migrations/002_events.sql"),
    },
    Migration {
        name: "003_invitations",
        sql: include_str!("migrations/003_invitations.sql"),
    },
];

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A SQL statement within a migration failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        /// The name of the migration that failed.
        name: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// Failed to query migration state.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Runs all pending migrations against the given connection.
///
/// Returns the number of migrations applied by this call.
///
/// # Errors
///
/// Returns `MigrationError` if any migration fails to execute or if the
/// migration tracking table cannot be queried.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    run_migrations_from_list(conn, MIGRATIONS)
}

fn run_migrations_from_list(
    conn: &Connection,
    migrations: &[Migration],
) -> Result<usize, MigrationError> {
    let failed = |name: &str| {
        let name = name.to_string();
        move |source| MigrationError::ExecutionFailed { name, source }
    };

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _eventful_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(failed("_eventful_migrations_bootstrap"))?;

    let mut applied = 0;

    for migration in migrations {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _eventful_migrations WHERE name = ?1",
                [migration.name],
                |row| row.get(0),
            )
            .map_err(MigrationError::StateQuery)?;

        if already_applied {
            tracing::debug!(migration = migration.name, "migration already applied, skipping");
            continue;
        }

        tracing::info!(migration = migration.name, "applying migration");

        let tx = conn
            .unchecked_transaction()
            .map_err(failed(migration.name))?;
        tx.execute_batch(migration.sql)
            .map_err(failed(migration.name))?;
        tx.execute(
            "INSERT INTO _eventful_migrations (name) VALUES (?1)",
            [migration.name],
        )
        .map_err(failed(migration.name))?;
        tx.commit().map_err(failed(migration.name))?;

        applied += 1;
    }

    Ok(applied)
}
