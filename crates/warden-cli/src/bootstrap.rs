// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Assembles an [`AccessControl`] backed by SQLite from the resolved configuration.
//!
//! Scope instances are not persisted: every run rebuilds the hierarchy from the
//! policy file before the registry is frozen.

use std::sync::Arc;

use anyhow::Context;
use sqlx::sqlite::SqlitePool;
use warden_config::WardenConfig;
use warden_core::{AccessControl, EventBus, OperationRegistry, Policy, ScopeHierarchy};
use warden_db::{AssignmentRepository, RoleRepository};

/// Open the configured database, apply migrations and build the service.
pub async fn open(config: &WardenConfig) -> anyhow::Result<AccessControl> {
	let pool = warden_db::create_pool(&config.database.url, config.database.max_connections)
		.await
		.with_context(|| format!("opening database {}", config.database.url))?;
	warden_db::run_migrations(&pool)
		.await
		.context("running database migrations")?;

	build(pool, config).await
}

/// Build the service on an existing, migrated pool.
pub async fn build(pool: SqlitePool, config: &WardenConfig) -> anyhow::Result<AccessControl> {
	let hierarchy = if config.policy.builtin_operations {
		ScopeHierarchy::with_default_types()
	} else {
		ScopeHierarchy::new()
	};
	let registry = OperationRegistry::new(Arc::new(hierarchy));
	if config.policy.builtin_operations {
		registry.register_defaults()?;
	}

	let access = AccessControl::new(
		Arc::new(registry),
		Arc::new(RoleRepository::new(pool.clone())),
		Arc::new(AssignmentRepository::new(pool)),
		EventBus::new(config.events.capacity),
	);

	if config.policy.builtin_roles {
		access.install_builtin_roles().await?;
	}

	if let Some(path) = &config.policy.path {
		let policy = Policy::load(path)?;
		let summary = policy
			.apply(&access)
			.await
			.with_context(|| format!("applying policy {}", path.display()))?;
		tracing::debug!(?summary, path = %path.display(), "policy loaded");
	}

	access.freeze();
	Ok(access)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::policy_file;
	use warden_core::{builtin, ScopeRef};

	fn config_with_policy(policy: &tempfile::NamedTempFile) -> WardenConfig {
		let mut config = WardenConfig::default();
		config.policy.path = Some(policy.path().to_path_buf());
		config
	}

	#[tokio::test]
	async fn builds_a_frozen_service_from_policy() {
		let policy = policy_file();
		let pool = warden_db::testing::create_memory_pool().await.unwrap();
		let access = build(pool, &config_with_policy(&policy)).await.unwrap();

		assert!(access.registry().is_frozen());
		assert!(access.hierarchy().contains(&ScopeRef::new("database_table", 10)));
		assert!(access.get_role(builtin::VIEWER).await.is_ok());
		assert!(access.get_role("TABLE_READER").await.is_ok());
	}

	#[tokio::test]
	async fn rebuilding_on_the_same_database_is_idempotent() {
		let policy = policy_file();
		let pool = warden_db::testing::create_memory_pool().await.unwrap();
		let config = config_with_policy(&policy);

		build(pool.clone(), &config).await.unwrap();
		let access = build(pool, &config).await.unwrap();

		let at_workspace = access
			.assignments_at(&ScopeRef::new("workspace", 1))
			.await
			.unwrap();
		assert_eq!(at_workspace.len(), 1);
	}

	#[tokio::test]
	async fn missing_policy_file_is_an_error() {
		let mut config = WardenConfig::default();
		config.policy.path = Some("/nonexistent/warden-policy.toml".into());
		let pool = warden_db::testing::create_memory_pool().await.unwrap();

		assert!(build(pool, &config).await.is_err());
	}

	#[tokio::test]
	async fn builtin_roles_can_be_skipped() {
		let mut config = WardenConfig::default();
		config.policy.builtin_roles = false;
		let pool = warden_db::testing::create_memory_pool().await.unwrap();
		let access = build(pool, &config).await.unwrap();

		assert!(access.list_roles().await.unwrap().is_empty());
	}
}
