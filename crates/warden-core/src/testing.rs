// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared fixtures for unit tests.
//!
//! Layout:
//!
//! ```text
//! workspace:1
//! └── application:2
//!     ├── database_table:10
//!     │   └── database_row:100
//!     └── database_table:11
//! workspace:3
//! ```

use std::sync::Arc;

use crate::assignment::{AssignmentStore, InMemoryAssignmentStore};
use crate::evaluator::Evaluator;
use crate::operation::OperationRegistry;
use crate::role::InMemoryRoleStore;
use crate::scope::{names, ScopeHierarchy};
use crate::types::{ScopeRef, SubjectRef};

pub(crate) fn workspace() -> ScopeRef {
	ScopeRef::new(names::WORKSPACE, 1)
}

pub(crate) fn database() -> ScopeRef {
	ScopeRef::new(names::APPLICATION, 2)
}

pub(crate) fn table() -> ScopeRef {
	ScopeRef::new(names::DATABASE_TABLE, 10)
}

pub(crate) fn sibling_table() -> ScopeRef {
	ScopeRef::new(names::DATABASE_TABLE, 11)
}

pub(crate) fn row() -> ScopeRef {
	ScopeRef::new(names::DATABASE_ROW, 100)
}

pub(crate) fn other_workspace() -> ScopeRef {
	ScopeRef::new(names::WORKSPACE, 3)
}

pub(crate) fn hierarchy() -> Arc<ScopeHierarchy> {
	let hierarchy = ScopeHierarchy::with_default_types();
	hierarchy.insert(workspace(), None).unwrap();
	hierarchy.insert(database(), Some(workspace())).unwrap();
	hierarchy.insert(table(), Some(database())).unwrap();
	hierarchy.insert(sibling_table(), Some(database())).unwrap();
	hierarchy.insert(row(), Some(table())).unwrap();
	hierarchy.insert(other_workspace(), None).unwrap();
	Arc::new(hierarchy)
}

pub(crate) struct Fixture {
	pub registry: Arc<OperationRegistry>,
	pub roles: Arc<InMemoryRoleStore>,
	pub assignments: Arc<InMemoryAssignmentStore>,
}

impl Fixture {
	pub fn new() -> Self {
		let registry = OperationRegistry::new(hierarchy());
		registry.register_defaults().unwrap();
		registry.freeze();
		Self {
			registry: Arc::new(registry),
			roles: Arc::new(InMemoryRoleStore::with_builtin_roles()),
			assignments: Arc::new(InMemoryAssignmentStore::new()),
		}
	}

	pub fn evaluator(&self) -> Evaluator {
		Evaluator::new(
			self.registry.clone(),
			self.roles.clone(),
			self.assignments.clone(),
		)
	}

	pub async fn assign(&self, subject: SubjectRef, role: &str, scope: &ScopeRef) {
		self
			.assignments
			.assign(subject, role, scope, None)
			.await
			.unwrap();
	}
}
