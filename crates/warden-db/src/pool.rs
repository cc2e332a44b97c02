// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::Utc;
use sqlx::sqlite::{
	SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use crate::error::DbError;

/// How long a writer waits for the database lock before failing.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Schema versions, applied in order. Each entry runs in its own transaction.
const MIGRATIONS: &[(i64, &str, &[&str])] = &[
	(
		1,
		"create_roles",
		&[r#"
		CREATE TABLE IF NOT EXISTS roles (
			name TEXT PRIMARY KEY,
			description TEXT,
			rules TEXT NOT NULL,
			unmatched TEXT NOT NULL,
			builtin INTEGER NOT NULL DEFAULT 0,
			created_at TEXT NOT NULL,
			updated_at TEXT NOT NULL
		)
		"#],
	),
	(
		2,
		"create_role_assignments",
		&[
			r#"
			CREATE TABLE IF NOT EXISTS role_assignments (
				id TEXT PRIMARY KEY,
				subject_type TEXT NOT NULL,
				subject_id INTEGER NOT NULL,
				role_name TEXT NOT NULL,
				scope_type TEXT NOT NULL,
				scope_instance_id INTEGER NOT NULL,
				expires_at TEXT,
				created_at TEXT NOT NULL,
				UNIQUE(subject_type, subject_id, scope_type, scope_instance_id)
			)
			"#,
			r#"
			CREATE INDEX IF NOT EXISTS idx_role_assignments_scope
			ON role_assignments (scope_type, scope_instance_id)
			"#,
			r#"
			CREATE INDEX IF NOT EXISTS idx_role_assignments_role
			ON role_assignments (role_name)
			"#,
		],
	),
];

/// Create a SqlitePool with WAL mode and common settings.
///
/// # Arguments
/// * `database_url` - SQLite connection string (e.g., "sqlite:./warden.db")
/// * `max_connections` - Upper bound on pooled connections
///
/// # Errors
/// Returns `DbError::Internal` if the URL is invalid or connection fails.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool, DbError> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| DbError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.busy_timeout(BUSY_TIMEOUT)
		.create_if_missing(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(max_connections)
		.connect_with(options)
		.await?;

	tracing::debug!(max_connections, "database pool created");
	Ok(pool)
}

/// Apply every migration not yet recorded in `schema_migrations`.
///
/// Returns the versions applied by this call.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<Vec<i64>, DbError> {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS schema_migrations (
			version INTEGER PRIMARY KEY,
			name TEXT NOT NULL,
			applied_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	let applied: HashSet<i64> = sqlx::query_scalar("SELECT version FROM schema_migrations")
		.fetch_all(pool)
		.await?
		.into_iter()
		.collect();

	let mut newly_applied = Vec::new();
	for (version, name, statements) in MIGRATIONS {
		if applied.contains(version) {
			continue;
		}

		let mut tx = pool.begin().await?;
		for statement in *statements {
			sqlx::query(statement)
				.execute(&mut *tx)
				.await
				.map_err(|source| DbError::Migration {
					version: *version,
					source,
				})?;
		}
		sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)")
			.bind(*version)
			.bind(*name)
			.bind(Utc::now().to_rfc3339())
			.execute(&mut *tx)
			.await?;
		tx.commit().await?;

		tracing::info!(version = *version, name = *name, "migration applied");
		newly_applied.push(*version);
	}

	Ok(newly_applied)
}
