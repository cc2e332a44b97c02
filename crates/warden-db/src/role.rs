// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Role repository.
//!
//! Rules are stored as a JSON array in the `rules` column, in evaluation order.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqlitePool, Row};
use warden_core::{Role, RoleRule, RoleStore, StoreError, Unmatched};

use crate::error::DbError;

/// SQLite-backed [`RoleStore`].
#[derive(Clone)]
pub struct RoleRepository {
	pool: SqlitePool,
}

impl RoleRepository {
	/// Create a new repository with the given pool.
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self), fields(role = %name))]
	pub async fn find_role(&self, name: &str) -> Result<Option<Role>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT name, description, rules, unmatched
			FROM roles
			WHERE name = ?
			"#,
		)
		.bind(name)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| row_to_role(&r)).transpose()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_all_roles(&self) -> Result<Vec<Role>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT name, description, rules, unmatched
			FROM roles
			ORDER BY name ASC
			"#,
		)
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(row_to_role).collect()
	}

	#[tracing::instrument(skip(self, role), fields(role = %role.name))]
	pub async fn upsert_role(&self, role: &Role) -> Result<(), DbError> {
		let rules_json = serde_json::to_string(&role.rules)?;
		let now = Utc::now().to_rfc3339();

		sqlx::query(
			r#"
			INSERT INTO roles (name, description, rules, unmatched, builtin, created_at, updated_at)
			VALUES (?, ?, ?, ?, ?, ?, ?)
			ON CONFLICT(name) DO UPDATE SET
				description = excluded.description,
				rules = excluded.rules,
				unmatched = excluded.unmatched,
				builtin = excluded.builtin,
				updated_at = excluded.updated_at
			"#,
		)
		.bind(&role.name)
		.bind(&role.description)
		.bind(rules_json)
		.bind(role.unmatched.to_string())
		.bind(role.is_builtin())
		.bind(&now)
		.bind(&now)
		.execute(&self.pool)
		.await?;

		tracing::debug!(rules = role.rules.len(), "role stored");
		Ok(())
	}

	#[tracing::instrument(skip(self), fields(role = %name))]
	pub async fn remove_role(&self, name: &str) -> Result<bool, DbError> {
		let result = sqlx::query("DELETE FROM roles WHERE name = ?")
			.bind(name)
			.execute(&self.pool)
			.await?;

		Ok(result.rows_affected() > 0)
	}
}

fn row_to_role(row: &sqlx::sqlite::SqliteRow) -> Result<Role, DbError> {
	let name: String = row.get("name");
	let rules_json: String = row.get("rules");
	let unmatched_str: String = row.get("unmatched");

	let rules: Vec<RoleRule> = serde_json::from_str(&rules_json)
		.map_err(|e| DbError::Corrupt(format!("Invalid rules for role '{name}': {e}")))?;
	let unmatched: Unmatched = unmatched_str
		.parse()
		.map_err(|_| DbError::Corrupt(format!("Invalid unmatched policy '{unmatched_str}' for role '{name}'")))?;

	Ok(Role {
		name,
		description: row.get("description"),
		rules,
		unmatched,
	})
}

#[async_trait]
impl RoleStore for RoleRepository {
	async fn get_role(&self, name: &str) -> Result<Option<Role>, StoreError> {
		Ok(self.find_role(name).await?)
	}

	async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
		Ok(self.list_all_roles().await?)
	}

	async fn put_role(&self, role: &Role) -> Result<(), StoreError> {
		Ok(self.upsert_role(role).await?)
	}

	async fn delete_role(&self, name: &str) -> Result<bool, StoreError> {
		Ok(self.remove_role(name).await?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_test_pool;
	use warden_core::{builtin, OperationId, OperationMatcher};

	async fn make_repo() -> RoleRepository {
		RoleRepository::new(create_test_pool().await)
	}

	fn custom() -> Role {
		Role::new("NO_DELETE")
			.with_description("Everything but deletes")
			.with_rule(RoleRule::deny(OperationMatcher::Exact(OperationId::from(
				"database.table.delete",
			))))
			.with_rule(RoleRule::allow(OperationMatcher::Any))
	}

	#[tokio::test]
	async fn round_trips_rules_in_order() {
		let repo = make_repo().await;
		repo.put_role(&custom()).await.unwrap();

		let stored = repo.get_role("NO_DELETE").await.unwrap().unwrap();
		assert_eq!(stored, custom());
	}

	#[tokio::test]
	async fn put_replaces_existing_role() {
		let repo = make_repo().await;
		repo.put_role(&custom()).await.unwrap();
		repo
			.put_role(&custom().with_unmatched(Unmatched::Deny))
			.await
			.unwrap();

		let roles = repo.list_roles().await.unwrap();
		assert_eq!(roles.len(), 1);
		assert_eq!(roles[0].unmatched, Unmatched::Deny);
	}

	#[tokio::test]
	async fn builtin_roles_are_flagged() {
		let repo = make_repo().await;
		for role in builtin::roles() {
			repo.put_role(&role).await.unwrap();
		}

		let flagged: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM roles WHERE builtin = 1")
			.fetch_one(&repo.pool)
			.await
			.unwrap();
		assert_eq!(flagged, builtin::NAMES.len() as i64);
	}

	#[tokio::test]
	async fn delete_reports_whether_a_row_was_removed() {
		let repo = make_repo().await;
		repo.put_role(&custom()).await.unwrap();
		assert!(repo.delete_role("NO_DELETE").await.unwrap());
		assert!(!repo.delete_role("NO_DELETE").await.unwrap());
		assert!(repo.get_role("NO_DELETE").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn corrupt_rules_are_reported() {
		let repo = make_repo().await;
		sqlx::query(
			r#"
			INSERT INTO roles (name, rules, unmatched, created_at, updated_at)
			VALUES ('BROKEN', 'not json', 'inherit', '', '')
			"#,
		)
		.execute(&repo.pool)
		.await
		.unwrap();

		assert!(matches!(
			repo.get_role("BROKEN").await,
			Err(StoreError::Corrupt(_))
		));
	}
}
