// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scope hierarchy: the tree of scope types and the forest of scope instances.
//!
//! Scope types form an acyclic graph by construction: a type can only name a
//! parent that is already registered. Instances are inserted under a parent of
//! the declared parent type, so every instance is reachable from a root.
//! [`ScopeHierarchy::chain`] still guards against cycles because it is the one
//! walk every permission check depends on.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::types::{is_valid_scope_type_name, ScopeRef, ScopeType};

/// Names of the scope types registered by [`ScopeHierarchy::with_default_types`].
pub mod names {
	pub const WORKSPACE: &str = "workspace";
	pub const APPLICATION: &str = "application";
	pub const DATABASE_TABLE: &str = "database_table";
	pub const DATABASE_FIELD: &str = "database_field";
	pub const DATABASE_VIEW: &str = "database_view";
	pub const DATABASE_ROW: &str = "database_row";
	pub const DASHBOARD_WIDGET: &str = "dashboard_widget";
	pub const BUILDER_PAGE: &str = "builder_page";
}

/// Default scope types as `(name, parent)`, parents listed before children.
pub const DEFAULT_SCOPE_TYPES: &[(&str, Option<&str>)] = &[
	(names::WORKSPACE, None),
	(names::APPLICATION, Some(names::WORKSPACE)),
	(names::DATABASE_TABLE, Some(names::APPLICATION)),
	(names::DATABASE_FIELD, Some(names::DATABASE_TABLE)),
	(names::DATABASE_VIEW, Some(names::DATABASE_TABLE)),
	(names::DATABASE_ROW, Some(names::DATABASE_TABLE)),
	(names::DASHBOARD_WIDGET, Some(names::APPLICATION)),
	(names::BUILDER_PAGE, Some(names::APPLICATION)),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScopeError {
	#[error("unknown scope type '{0}'")]
	UnknownScopeType(ScopeType),

	#[error("invalid scope type name '{0}'")]
	InvalidScopeType(String),

	#[error("scope type '{0}' is already registered with a different parent")]
	ScopeTypeConflict(ScopeType),

	#[error("scope '{0}' not found")]
	NotFound(ScopeRef),

	#[error("scope '{0}' already exists under a different parent")]
	AlreadyExists(ScopeRef),

	#[error("scope '{scope}' requires a parent of type {expected:?}, got {actual:?}")]
	ParentMismatch {
		scope: ScopeRef,
		expected: Option<ScopeType>,
		actual: Option<ScopeType>,
	},

	#[error("cycle detected while resolving the ancestors of '{0}'")]
	CycleDetected(ScopeRef),
}

/// Implemented by every domain entity that participates in the hierarchy.
pub trait HasScope {
	fn scope_type(&self) -> ScopeType;

	fn scope_instance_id(&self) -> i64;

	/// The enclosing scope instance, `None` for roots such as workspaces.
	fn parent(&self) -> Option<ScopeRef>;

	fn scope_ref(&self) -> ScopeRef {
		ScopeRef::new(self.scope_type(), self.scope_instance_id())
	}
}

#[derive(Debug, Default)]
struct Tree {
	types: HashMap<ScopeType, Option<ScopeType>>,
	parents: HashMap<ScopeRef, Option<ScopeRef>>,
	children: HashMap<ScopeRef, Vec<ScopeRef>>,
}

impl Tree {
	fn depth_bound(&self) -> usize {
		self.types.len() + 1
	}

	fn is_descendant_type(&self, scope_type: &str, ancestor: &str) -> bool {
		let mut current = Some(scope_type);
		for _ in 0..self.depth_bound() {
			match current {
				Some(name) if name == ancestor => return true,
				Some(name) => {
					current = self
						.types
						.get(name)
						.and_then(|parent| parent.as_ref().map(ScopeType::as_str));
				}
				None => return false,
			}
		}
		false
	}

	/// `scope` followed by its descendants in breadth-first order.
	fn subtree(&self, scope: &ScopeRef) -> Vec<ScopeRef> {
		let mut found = Vec::new();
		let mut queue = VecDeque::from([scope.clone()]);
		while let Some(next) = queue.pop_front() {
			if let Some(children) = self.children.get(&next) {
				queue.extend(children.iter().cloned());
			}
			if self.parents.contains_key(&next) {
				found.push(next);
			}
		}
		found
	}
}

/// Thread-safe registry of scope types and scope instances.
#[derive(Debug, Default)]
pub struct ScopeHierarchy {
	tree: RwLock<Tree>,
}

impl ScopeHierarchy {
	/// Creates an empty hierarchy with no scope types.
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a hierarchy with the platform's [`DEFAULT_SCOPE_TYPES`].
	pub fn with_default_types() -> Self {
		let mut tree = Tree::default();
		for (name, parent) in DEFAULT_SCOPE_TYPES {
			tree
				.types
				.insert(ScopeType::from(*name), parent.map(ScopeType::from));
		}
		Self {
			tree: RwLock::new(tree),
		}
	}

	// =========================================================================
	// Scope types
	// =========================================================================

	/// Register a scope type under an already registered parent type.
	///
	/// Registering the same type again with the same parent is a no-op.
	pub fn register_scope_type(
		&self,
		name: impl Into<ScopeType>,
		parent: Option<&str>,
	) -> Result<(), ScopeError> {
		let name = name.into();
		if !is_valid_scope_type_name(name.as_str()) {
			return Err(ScopeError::InvalidScopeType(name.to_string()));
		}

		let mut tree = self.tree.write();
		let parent = match parent {
			Some(parent) if !tree.types.contains_key(parent) => {
				return Err(ScopeError::UnknownScopeType(ScopeType::from(parent)));
			}
			Some(parent) => Some(ScopeType::from(parent)),
			None => None,
		};

		if let Some(existing) = tree.types.get(&name) {
			if *existing == parent {
				return Ok(());
			}
			return Err(ScopeError::ScopeTypeConflict(name));
		}

		tracing::debug!(scope_type = %name, parent = ?parent, "scope type registered");
		tree.types.insert(name, parent);
		Ok(())
	}

	pub fn has_scope_type(&self, name: &str) -> bool {
		self.tree.read().types.contains_key(name)
	}

	/// Returns the parent type of `name`, `None` for root types.
	pub fn parent_type(&self, name: &str) -> Result<Option<ScopeType>, ScopeError> {
		self
			.tree
			.read()
			.types
			.get(name)
			.cloned()
			.ok_or_else(|| ScopeError::UnknownScopeType(ScopeType::from(name)))
	}

	/// All registered scope types, sorted by name.
	pub fn scope_types(&self) -> Vec<ScopeType> {
		let mut types: Vec<_> = self.tree.read().types.keys().cloned().collect();
		types.sort();
		types
	}

	/// Returns true if `scope_type` is `ancestor` or lies below it.
	pub fn is_descendant_type(&self, scope_type: &str, ancestor: &str) -> bool {
		self.tree.read().is_descendant_type(scope_type, ancestor)
	}

	// =========================================================================
	// Scope instances
	// =========================================================================

	/// Insert a scope instance under `parent`.
	///
	/// Re-inserting an existing instance with the same parent is a no-op.
	pub fn insert(&self, scope: ScopeRef, parent: Option<ScopeRef>) -> Result<(), ScopeError> {
		let mut tree = self.tree.write();

		let expected = tree
			.types
			.get(&scope.scope_type)
			.cloned()
			.ok_or_else(|| ScopeError::UnknownScopeType(scope.scope_type.clone()))?;
		let actual = parent.as_ref().map(|p| p.scope_type.clone());
		if expected != actual {
			return Err(ScopeError::ParentMismatch {
				scope,
				expected,
				actual,
			});
		}

		if let Some(parent) = &parent {
			if !tree.parents.contains_key(parent) {
				return Err(ScopeError::NotFound(parent.clone()));
			}
		}

		if let Some(existing) = tree.parents.get(&scope) {
			if *existing == parent {
				return Ok(());
			}
			return Err(ScopeError::AlreadyExists(scope));
		}

		if let Some(parent) = &parent {
			tree
				.children
				.entry(parent.clone())
				.or_default()
				.push(scope.clone());
		}
		tracing::debug!(scope = %scope, parent = ?parent.as_ref().map(ToString::to_string), "scope inserted");
		tree.parents.insert(scope, parent);
		Ok(())
	}

	/// Insert a domain entity using its [`HasScope`] description.
	pub fn insert_entity<E: HasScope + ?Sized>(&self, entity: &E) -> Result<ScopeRef, ScopeError> {
		let scope = entity.scope_ref();
		self.insert(scope.clone(), entity.parent())?;
		Ok(scope)
	}

	pub fn contains(&self, scope: &ScopeRef) -> bool {
		self.tree.read().parents.contains_key(scope)
	}

	pub fn len(&self) -> usize {
		self.tree.read().parents.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn parent_of(&self, scope: &ScopeRef) -> Result<Option<ScopeRef>, ScopeError> {
		self
			.tree
			.read()
			.parents
			.get(scope)
			.cloned()
			.ok_or_else(|| ScopeError::NotFound(scope.clone()))
	}

	/// The scope followed by its ancestors, ending at a root.
	pub fn chain(&self, scope: &ScopeRef) -> Result<Vec<ScopeRef>, ScopeError> {
		let tree = self.tree.read();
		if !tree.parents.contains_key(scope) {
			return Err(ScopeError::NotFound(scope.clone()));
		}

		let bound = tree.depth_bound();
		let mut chain = Vec::new();
		let mut seen = HashSet::new();
		let mut current = Some(scope.clone());

		while let Some(scope_ref) = current {
			if chain.len() >= bound || !seen.insert(scope_ref.clone()) {
				tracing::error!(scope = %scope, "scope chain does not terminate");
				return Err(ScopeError::CycleDetected(scope.clone()));
			}
			current = match tree.parents.get(&scope_ref) {
				Some(parent) => parent.clone(),
				None => return Err(ScopeError::NotFound(scope_ref)),
			};
			chain.push(scope_ref);
		}

		Ok(chain)
	}

	/// The scope and every descendant, with the given scope first.
	pub fn subtree(&self, scope: &ScopeRef) -> Result<Vec<ScopeRef>, ScopeError> {
		let tree = self.tree.read();
		if !tree.parents.contains_key(scope) {
			return Err(ScopeError::NotFound(scope.clone()));
		}
		Ok(tree.subtree(scope))
	}

	/// Remove a scope and every descendant, returning all removed refs with
	/// the given scope first.
	pub fn remove(&self, scope: &ScopeRef) -> Result<Vec<ScopeRef>, ScopeError> {
		let mut tree = self.tree.write();
		let parent = tree
			.parents
			.get(scope)
			.cloned()
			.ok_or_else(|| ScopeError::NotFound(scope.clone()))?;

		if let Some(parent) = parent {
			if let Some(siblings) = tree.children.get_mut(&parent) {
				siblings.retain(|s| s != scope);
			}
		}

		let removed = tree.subtree(scope);
		for scope_ref in &removed {
			tree.children.remove(scope_ref);
			tree.parents.remove(scope_ref);
		}

		tracing::debug!(scope = %scope, removed = removed.len(), "scope removed");
		Ok(removed)
	}

	#[cfg(test)]
	pub(crate) fn force_parent(&self, scope: ScopeRef, parent: Option<ScopeRef>) {
		self.tree.write().parents.insert(scope, parent);
	}
}
