// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::error::DbError;
use crate::pool::run_migrations;

/// In-memory database with the schema applied.
///
/// Limited to one connection: every `:memory:` connection is its own database.
pub async fn create_memory_pool() -> Result<SqlitePool, DbError> {
	let options = SqliteConnectOptions::from_str(":memory:")?.create_if_missing(true);

	let pool = SqlitePoolOptions::new()
		.max_connections(1)
		.connect_with(options)
		.await?;

	run_migrations(&pool).await?;
	Ok(pool)
}

#[cfg(test)]
pub(crate) async fn create_test_pool() -> SqlitePool {
	create_memory_pool()
		.await
		.expect("Failed to create test pool")
}
