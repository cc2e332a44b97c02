// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The access-control service running on the SQLite stores.

use std::sync::Arc;

use warden_core::{
	builtin, AccessControl, Actor, EventBus, OperationRegistry, ScopeHierarchy, ScopeRef,
	SubjectRef, TeamId, UserId,
};
use warden_db::{testing::create_memory_pool, AssignmentRepository, RoleRepository};

async fn service() -> AccessControl {
	let pool = create_memory_pool().await.unwrap();
	let registry = OperationRegistry::new(Arc::new(ScopeHierarchy::with_default_types()));
	registry.register_defaults().unwrap();
	registry.freeze();

	let access = AccessControl::new(
		Arc::new(registry),
		Arc::new(RoleRepository::new(pool.clone())),
		Arc::new(AssignmentRepository::new(pool)),
		EventBus::default(),
	);
	access.install_builtin_roles().await.unwrap();

	access.insert_scope(workspace(), None).unwrap();
	access.insert_scope(database(), Some(workspace())).unwrap();
	access.insert_scope(table(), Some(database())).unwrap();
	access.insert_scope(sibling_table(), Some(database())).unwrap();
	access
}

fn workspace() -> ScopeRef {
	ScopeRef::new("workspace", 1)
}

fn database() -> ScopeRef {
	ScopeRef::new("application", 2)
}

fn table() -> ScopeRef {
	ScopeRef::new("database_table", 10)
}

fn sibling_table() -> ScopeRef {
	ScopeRef::new("database_table", 11)
}

fn alice() -> Actor {
	Actor::new(UserId::new(1))
}

#[tokio::test]
async fn viewer_at_workspace_reads_but_cannot_update_tables() {
	let access = service().await;
	access
		.assign_role(SubjectRef::user(UserId::new(1)), builtin::VIEWER, &workspace(), None)
		.await
		.unwrap();

	assert!(access
		.can_perform(&alice(), "database.table.read", &table())
		.await
		.unwrap()
		.is_allowed());
	assert!(!access
		.can_perform(&alice(), "database.table.update", &table())
		.await
		.unwrap()
		.is_allowed());
}

#[tokio::test]
async fn table_override_applies_to_that_table_only() {
	let access = service().await;
	let subject = SubjectRef::user(UserId::new(1));
	access
		.assign_role(subject, builtin::EDITOR, &workspace(), None)
		.await
		.unwrap();
	access
		.assign_role(subject, builtin::NO_ACCESS, &table(), None)
		.await
		.unwrap();

	let mut session = access.session(&alice());
	let permitted = session
		.filter_permitted("database.table.create_row", &[table(), sibling_table()])
		.await
		.unwrap();
	assert_eq!(permitted, vec![sibling_table()]);
}

#[tokio::test]
async fn team_grants_and_scope_removal() {
	let access = service().await;
	access
		.assign_role(SubjectRef::team(TeamId::new(5)), builtin::BUILDER, &database(), None)
		.await
		.unwrap();

	let member = alice().with_team(TeamId::new(5));
	assert!(access
		.can_perform(&member, "database.table.create_field", &table())
		.await
		.unwrap()
		.is_allowed());

	access.remove_scope(&database()).await.unwrap();
	let remaining = access
		.assignments_of(&SubjectRef::team(TeamId::new(5)))
		.await
		.unwrap();
	assert!(remaining.is_empty());
}
