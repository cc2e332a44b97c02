// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Role definitions and the role store.
//!
//! A [`Role`] is an ordered list of [`RoleRule`]s. Rules match operations by
//! pattern rather than by enumeration, so operations registered later are
//! covered without touching role definitions. The first matching rule decides;
//! when nothing matches, [`Unmatched`] says whether the role denies or defers
//! to assignments at ancestor scopes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::operation::{OperationRegistry, OperationType};
use crate::scope::ScopeHierarchy;
use crate::types::{Capability, OperationId, ScopeType};

/// Outcome a matching rule produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
	Allow,
	Deny,
}

/// Selects the operations a rule applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationMatcher {
	/// Every operation.
	Any,
	/// A single operation id.
	Exact(OperationId),
	/// Operation ids starting with the prefix, e.g. `database.table.row.`.
	Prefix(String),
	/// Operations declared on the scope type or any type below it.
	Scope(ScopeType),
	/// Operations requiring at most the given capability.
	Capability(Capability),
}

impl OperationMatcher {
	pub fn matches(&self, operation: &OperationType, hierarchy: &ScopeHierarchy) -> bool {
		match self {
			OperationMatcher::Any => true,
			OperationMatcher::Exact(id) => operation.id == *id,
			OperationMatcher::Prefix(prefix) => operation.id.as_str().starts_with(prefix.as_str()),
			OperationMatcher::Scope(scope_type) => {
				hierarchy.is_descendant_type(operation.scope_type.as_str(), scope_type.as_str())
			}
			OperationMatcher::Capability(max) => operation.capability <= *max,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRule {
	pub effect: Effect,
	#[serde(rename = "match")]
	pub matcher: OperationMatcher,
}

impl RoleRule {
	pub fn allow(matcher: OperationMatcher) -> Self {
		Self {
			effect: Effect::Allow,
			matcher,
		}
	}

	pub fn deny(matcher: OperationMatcher) -> Self {
		Self {
			effect: Effect::Deny,
			matcher,
		}
	}
}

/// What a role says about operations none of its rules match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unmatched {
	/// No opinion: evaluation continues at the next ancestor scope.
	#[default]
	Inherit,
	/// Deny, overriding anything granted at ancestor scopes.
	Deny,
}

impl std::fmt::Display for Unmatched {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Unmatched::Inherit => write!(f, "inherit"),
			Unmatched::Deny => write!(f, "deny"),
		}
	}
}

impl std::str::FromStr for Unmatched {
	type Err = RoleError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"inherit" => Ok(Unmatched::Inherit),
			"deny" => Ok(Unmatched::Deny),
			other => Err(RoleError::InvalidDefinition(format!(
				"unknown unmatched policy '{other}'"
			))),
		}
	}
}

/// A named bundle of operation rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
	pub name: String,
	#[serde(default)]
	pub description: Option<String>,
	#[serde(default)]
	pub rules: Vec<RoleRule>,
	#[serde(default)]
	pub unmatched: Unmatched,
}

impl Role {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			description: None,
			rules: Vec::new(),
			unmatched: Unmatched::Inherit,
		}
	}

	/// Builder: append a rule.
	pub fn with_rule(mut self, rule: RoleRule) -> Self {
		self.rules.push(rule);
		self
	}

	/// Builder: set the unmatched policy.
	pub fn with_unmatched(mut self, unmatched: Unmatched) -> Self {
		self.unmatched = unmatched;
		self
	}

	/// Builder: set the description.
	pub fn with_description(mut self, description: impl Into<String>) -> Self {
		self.description = Some(description.into());
		self
	}

	pub fn is_builtin(&self) -> bool {
		builtin::is_builtin(&self.name)
	}

	/// The role's verdict on one operation, `None` when it defers upward.
	pub fn decide(&self, operation: &OperationType, hierarchy: &ScopeHierarchy) -> Option<Effect> {
		self
			.rules
			.iter()
			.find(|rule| rule.matcher.matches(operation, hierarchy))
			.map(|rule| rule.effect)
			.or(match self.unmatched {
				Unmatched::Inherit => None,
				Unmatched::Deny => Some(Effect::Deny),
			})
	}

	/// Ids of every registered operation this role allows.
	pub fn operations_granted(&self, registry: &OperationRegistry) -> BTreeSet<OperationId> {
		registry
			.all()
			.into_iter()
			.filter(|op| self.decide(op, registry.hierarchy()) == Some(Effect::Allow))
			.map(|op| op.id.clone())
			.collect()
	}

	/// Check the name and rule set of a role definition.
	pub fn validate(&self) -> Result<(), RoleError> {
		if !is_valid_role_name(&self.name) {
			return Err(RoleError::InvalidName(self.name.clone()));
		}
		for rule in &self.rules {
			if let OperationMatcher::Prefix(prefix) = &rule.matcher {
				if prefix.is_empty() {
					return Err(RoleError::InvalidDefinition(format!(
						"role '{}' has an empty prefix matcher; use 'any'",
						self.name
					)));
				}
			}
		}
		Ok(())
	}
}

/// Role names are 1-64 ASCII letters, digits or underscores.
pub fn is_valid_role_name(name: &str) -> bool {
	!name.is_empty()
		&& name.len() <= 64
		&& name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Debug, thiserror::Error)]
pub enum RoleError {
	#[error("role '{0}' does not exist")]
	UnknownRole(String),

	#[error("role '{0}' is built in and cannot be changed")]
	ReadOnlyRole(String),

	#[error("invalid role name '{0}'")]
	InvalidName(String),

	#[error("invalid role definition: {0}")]
	InvalidDefinition(String),

	#[error("role '{role}' is still held by {assignments} assignment(s)")]
	InUse { role: String, assignments: u64 },

	#[error(transparent)]
	Store(#[from] StoreError),
}

/// Built-in roles, from most to least privileged.
///
/// Built-ins deny what they do not grant, so a role assigned at a closer scope
/// replaces whatever an ancestor scope granted.
pub mod builtin {
	use super::{OperationMatcher, Role, RoleRule, Unmatched};
	use crate::types::Capability;

	pub const ADMIN: &str = "ADMIN";
	pub const BUILDER: &str = "BUILDER";
	pub const EDITOR: &str = "EDITOR";
	pub const COMMENTER: &str = "COMMENTER";
	pub const VIEWER: &str = "VIEWER";
	pub const NO_ACCESS: &str = "NO_ACCESS";

	pub const NAMES: &[&str] = &[ADMIN, BUILDER, EDITOR, COMMENTER, VIEWER, NO_ACCESS];

	pub fn is_builtin(name: &str) -> bool {
		NAMES.contains(&name)
	}

	fn capped(name: &str, max: Capability, description: &str) -> Role {
		Role::new(name)
			.with_description(description)
			.with_rule(RoleRule::allow(OperationMatcher::Capability(max)))
			.with_unmatched(Unmatched::Deny)
	}

	pub fn roles() -> Vec<Role> {
		vec![
			capped(ADMIN, Capability::Admin, "Full control, including members and roles"),
			capped(BUILDER, Capability::Manage, "Create and change structure"),
			capped(EDITOR, Capability::Write, "Create, change and delete data"),
			capped(COMMENTER, Capability::Comment, "Read and comment"),
			capped(VIEWER, Capability::Read, "Read only"),
			Role::new(NO_ACCESS)
				.with_description("Explicitly denied")
				.with_rule(RoleRule::deny(OperationMatcher::Any))
				.with_unmatched(Unmatched::Deny),
		]
	}
}

/// Persistent storage of role definitions.
#[async_trait]
pub trait RoleStore: Send + Sync {
	async fn get_role(&self, name: &str) -> Result<Option<Role>, StoreError>;

	async fn list_roles(&self) -> Result<Vec<Role>, StoreError>;

	/// Insert or replace a role definition.
	async fn put_role(&self, role: &Role) -> Result<(), StoreError>;

	async fn delete_role(&self, name: &str) -> Result<bool, StoreError>;

	/// Like [`RoleStore::get_role`], failing with [`RoleError::UnknownRole`].
	async fn require_role(&self, name: &str) -> Result<Role, RoleError> {
		self
			.get_role(name)
			.await?
			.ok_or_else(|| RoleError::UnknownRole(name.to_string()))
	}
}

/// Role store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryRoleStore {
	roles: RwLock<HashMap<String, Role>>,
}

impl InMemoryRoleStore {
	pub fn new() -> Self {
		Self::default()
	}

	/// Creates a store seeded with [`builtin::roles`].
	pub fn with_builtin_roles() -> Self {
		let roles = builtin::roles()
			.into_iter()
			.map(|role| (role.name.clone(), role))
			.collect();
		Self {
			roles: RwLock::new(roles),
		}
	}
}

#[async_trait]
impl RoleStore for InMemoryRoleStore {
	async fn get_role(&self, name: &str) -> Result<Option<Role>, StoreError> {
		Ok(self.roles.read().await.get(name).cloned())
	}

	async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
		let mut roles: Vec<_> = self.roles.read().await.values().cloned().collect();
		roles.sort_by(|a, b| a.name.cmp(&b.name));
		Ok(roles)
	}

	async fn put_role(&self, role: &Role) -> Result<(), StoreError> {
		self
			.roles
			.write()
			.await
			.insert(role.name.clone(), role.clone());
		Ok(())
	}

	async fn delete_role(&self, name: &str) -> Result<bool, StoreError> {
		Ok(self.roles.write().await.remove(name).is_some())
	}
}
