// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Operation registry.
//!
//! Feature modules register the operations they guard once at startup. The
//! registry is then frozen: later registration fails and lookups read an
//! immutable snapshot without taking a lock.
//!
//! Duplicate policy: registering an id that already exists with the same scope
//! type and capability is a no-op; any difference is a
//! [`RegistryError::DuplicateOperation`].

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use crate::scope::{names, ScopeHierarchy};
use crate::types::{is_valid_operation_id, Capability, OperationId, ScopeType};

/// A guarded action, the scope type it acts on and the capability it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationType {
	pub id: OperationId,
	pub scope_type: ScopeType,
	pub capability: Capability,
}

impl OperationType {
	pub fn new(
		id: impl Into<OperationId>,
		scope_type: impl Into<ScopeType>,
		capability: Capability,
	) -> Self {
		Self {
			id: id.into(),
			scope_type: scope_type.into(),
			capability,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
	#[error("operation '{0}' is not registered")]
	UnknownOperation(OperationId),

	#[error("invalid operation id '{0}'")]
	InvalidOperationId(String),

	#[error("operation '{id}' is already registered on scope '{existing_scope}' ({existing_capability})")]
	DuplicateOperation {
		id: OperationId,
		existing_scope: ScopeType,
		existing_capability: Capability,
	},

	#[error("operation '{operation}' names unknown scope type '{scope_type}'")]
	UnknownScopeType {
		operation: OperationId,
		scope_type: ScopeType,
	},

	#[error("operation registry is frozen")]
	Frozen,
}

type Catalog = HashMap<OperationId, Arc<OperationType>>;

/// The platform's built-in operations as `(id, scope type, capability)`.
pub const DEFAULT_OPERATIONS: &[(&str, &str, Capability)] = &[
	// Workspace
	("workspace.read", names::WORKSPACE, Capability::Read),
	("workspace.list_applications", names::WORKSPACE, Capability::Read),
	("workspace.list_members", names::WORKSPACE, Capability::Read),
	("workspace.create_application", names::WORKSPACE, Capability::Manage),
	("workspace.update", names::WORKSPACE, Capability::Admin),
	("workspace.delete", names::WORKSPACE, Capability::Admin),
	("workspace.invite_user", names::WORKSPACE, Capability::Admin),
	("workspace.assign_role", names::WORKSPACE, Capability::Admin),
	// Application
	("application.read", names::APPLICATION, Capability::Read),
	("application.update", names::APPLICATION, Capability::Manage),
	("application.duplicate", names::APPLICATION, Capability::Manage),
	("application.delete", names::APPLICATION, Capability::Manage),
	("database.list_tables", names::APPLICATION, Capability::Read),
	("database.create_table", names::APPLICATION, Capability::Manage),
	// Table
	("database.table.read", names::DATABASE_TABLE, Capability::Read),
	("database.table.list_rows", names::DATABASE_TABLE, Capability::Read),
	("database.table.export", names::DATABASE_TABLE, Capability::Read),
	("database.table.create_row", names::DATABASE_TABLE, Capability::Write),
	("database.table.import_rows", names::DATABASE_TABLE, Capability::Write),
	("database.table.update", names::DATABASE_TABLE, Capability::Manage),
	("database.table.delete", names::DATABASE_TABLE, Capability::Manage),
	("database.table.create_field", names::DATABASE_TABLE, Capability::Manage),
	("database.table.create_view", names::DATABASE_TABLE, Capability::Manage),
	// Field
	("database.table.field.read", names::DATABASE_FIELD, Capability::Read),
	("database.table.field.update", names::DATABASE_FIELD, Capability::Manage),
	("database.table.field.delete", names::DATABASE_FIELD, Capability::Manage),
	// View
	("database.table.view.read", names::DATABASE_VIEW, Capability::Read),
	("database.table.view.update", names::DATABASE_VIEW, Capability::Manage),
	("database.table.view.delete", names::DATABASE_VIEW, Capability::Manage),
	// Row
	("database.table.row.read", names::DATABASE_ROW, Capability::Read),
	("database.table.row.create_comment", names::DATABASE_ROW, Capability::Comment),
	("database.table.row.update", names::DATABASE_ROW, Capability::Write),
	("database.table.row.delete", names::DATABASE_ROW, Capability::Write),
	// Dashboard
	("dashboard.widget.read", names::DASHBOARD_WIDGET, Capability::Read),
	("dashboard.widget.update", names::DASHBOARD_WIDGET, Capability::Manage),
	("dashboard.widget.delete", names::DASHBOARD_WIDGET, Capability::Manage),
	// Builder
	("builder.page.read", names::BUILDER_PAGE, Capability::Read),
	("builder.page.update", names::BUILDER_PAGE, Capability::Manage),
	("builder.page.delete", names::BUILDER_PAGE, Capability::Manage),
];

/// Catalog of registered operations.
#[derive(Debug)]
pub struct OperationRegistry {
	hierarchy: Arc<ScopeHierarchy>,
	pending: RwLock<Catalog>,
	frozen: OnceLock<Arc<Catalog>>,
}

impl OperationRegistry {
	pub fn new(hierarchy: Arc<ScopeHierarchy>) -> Self {
		Self {
			hierarchy,
			pending: RwLock::new(HashMap::new()),
			frozen: OnceLock::new(),
		}
	}

	/// Register an operation on a known scope type.
	pub fn register(
		&self,
		id: impl Into<OperationId>,
		scope_type: impl Into<ScopeType>,
		capability: Capability,
	) -> Result<Arc<OperationType>, RegistryError> {
		let operation = OperationType::new(id, scope_type, capability);
		if !is_valid_operation_id(operation.id.as_str()) {
			return Err(RegistryError::InvalidOperationId(operation.id.to_string()));
		}
		if !self.hierarchy.has_scope_type(operation.scope_type.as_str()) {
			return Err(RegistryError::UnknownScopeType {
				operation: operation.id,
				scope_type: operation.scope_type,
			});
		}

		let mut pending = self.pending.write();
		if self.frozen.get().is_some() {
			return Err(RegistryError::Frozen);
		}

		if let Some(existing) = pending.get(&operation.id) {
			if **existing == operation {
				return Ok(Arc::clone(existing));
			}
			return Err(RegistryError::DuplicateOperation {
				id: operation.id,
				existing_scope: existing.scope_type.clone(),
				existing_capability: existing.capability,
			});
		}

		tracing::debug!(
			operation = %operation.id,
			scope_type = %operation.scope_type,
			capability = %operation.capability,
			"operation registered"
		);
		let operation = Arc::new(operation);
		pending.insert(operation.id.clone(), Arc::clone(&operation));
		Ok(operation)
	}

	/// Register every entry of [`DEFAULT_OPERATIONS`].
	pub fn register_defaults(&self) -> Result<(), RegistryError> {
		for (id, scope_type, capability) in DEFAULT_OPERATIONS {
			self.register(*id, *scope_type, *capability)?;
		}
		Ok(())
	}

	/// Seal the registry. Idempotent.
	pub fn freeze(&self) {
		let pending = self.pending.write();
		if self.frozen.get().is_none() {
			tracing::info!(operations = pending.len(), "operation registry frozen");
			let _ = self.frozen.set(Arc::new(pending.clone()));
		}
	}

	pub fn is_frozen(&self) -> bool {
		self.frozen.get().is_some()
	}

	pub fn lookup(&self, id: &str) -> Result<Arc<OperationType>, RegistryError> {
		let found = match self.frozen.get() {
			Some(catalog) => catalog.get(id).cloned(),
			None => self.pending.read().get(id).cloned(),
		};
		found.ok_or_else(|| RegistryError::UnknownOperation(OperationId::from(id)))
	}

	/// All registered operations, sorted by id.
	pub fn all(&self) -> Vec<Arc<OperationType>> {
		let mut operations: Vec<_> = match self.frozen.get() {
			Some(catalog) => catalog.values().cloned().collect(),
			None => self.pending.read().values().cloned().collect(),
		};
		operations.sort_by(|a, b| a.id.cmp(&b.id));
		operations
	}

	/// Operations that can be evaluated against an instance of `scope_type`:
	/// those declared on that type or on one of its ancestor types.
	pub fn operations_for_scope(&self, scope_type: &str) -> Vec<Arc<OperationType>> {
		self
			.all()
			.into_iter()
			.filter(|op| {
				self
					.hierarchy
					.is_descendant_type(scope_type, op.scope_type.as_str())
			})
			.collect()
	}

	pub fn hierarchy(&self) -> &Arc<ScopeHierarchy> {
		&self.hierarchy
	}

	pub fn len(&self) -> usize {
		match self.frozen.get() {
			Some(catalog) => catalog.len(),
			None => self.pending.read().len(),
		}
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
