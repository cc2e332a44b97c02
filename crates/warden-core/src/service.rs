// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The access-control service used by request handlers.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::assignment::{AssignmentStore, InMemoryAssignmentStore, RoleAssignment};
use crate::error::AuthzError;
use crate::evaluator::{CheckSession, Decision, Evaluator, Grant};
use crate::events::{AuthzEvent, EventBus};
use crate::operation::{OperationRegistry, OperationType};
use crate::role::{builtin, InMemoryRoleStore, Role, RoleError, RoleStore};
use crate::scope::{HasScope, ScopeError, ScopeHierarchy};
use crate::types::{Actor, Capability, OperationId, ScopeRef, ScopeType, SubjectRef};

/// Entry point tying the hierarchy, registry, stores and event bus together.
///
/// Role assignment, role deletion and scope removal run one at a time, so an
/// assignment never refers to a deleted role or a removed scope.
#[derive(Clone)]
pub struct AccessControl {
	registry: Arc<OperationRegistry>,
	roles: Arc<dyn RoleStore>,
	assignments: Arc<dyn AssignmentStore>,
	evaluator: Evaluator,
	events: EventBus,
	mutations: Arc<Mutex<()>>,
}

impl AccessControl {
	pub fn new(
		registry: Arc<OperationRegistry>,
		roles: Arc<dyn RoleStore>,
		assignments: Arc<dyn AssignmentStore>,
		events: EventBus,
	) -> Self {
		let evaluator = Evaluator::new(registry.clone(), roles.clone(), assignments.clone());
		Self {
			registry,
			roles,
			assignments,
			evaluator,
			events,
			mutations: Arc::new(Mutex::new(())),
		}
	}

	/// In-memory service with the default scope types, the default operation
	/// catalog (not yet frozen) and the built-in roles.
	pub fn in_memory() -> Result<Self, AuthzError> {
		let registry = OperationRegistry::new(Arc::new(ScopeHierarchy::with_default_types()));
		registry.register_defaults()?;
		Ok(Self::new(
			Arc::new(registry),
			Arc::new(InMemoryRoleStore::with_builtin_roles()),
			Arc::new(InMemoryAssignmentStore::new()),
			EventBus::default(),
		))
	}

	pub fn hierarchy(&self) -> &Arc<ScopeHierarchy> {
		self.registry.hierarchy()
	}

	pub fn registry(&self) -> &Arc<OperationRegistry> {
		&self.registry
	}

	pub fn evaluator(&self) -> &Evaluator {
		&self.evaluator
	}

	pub fn events(&self) -> &EventBus {
		&self.events
	}

	// =========================================================================
	// Startup
	// =========================================================================

	pub fn register_operation(
		&self,
		id: impl Into<OperationId>,
		scope_type: impl Into<ScopeType>,
		capability: Capability,
	) -> Result<Arc<OperationType>, AuthzError> {
		Ok(self.registry.register(id, scope_type, capability)?)
	}

	/// Seal the operation registry once every feature has registered.
	pub fn freeze(&self) {
		self.registry.freeze();
	}

	// =========================================================================
	// Scopes
	// =========================================================================

	pub fn insert_scope(&self, scope: ScopeRef, parent: Option<ScopeRef>) -> Result<(), AuthzError> {
		Ok(self.hierarchy().insert(scope, parent)?)
	}

	pub fn insert_entity<E: HasScope + ?Sized>(&self, entity: &E) -> Result<ScopeRef, AuthzError> {
		Ok(self.hierarchy().insert_entity(entity)?)
	}

	/// Remove a scope with its descendants and every assignment bound to them.
	///
	/// Assignments are purged before the scopes leave the hierarchy. If the
	/// store fails, the subtree stays in place and the call can be retried.
	#[tracing::instrument(skip(self), fields(scope = %scope))]
	pub async fn remove_scope(&self, scope: &ScopeRef) -> Result<Vec<ScopeRef>, AuthzError> {
		let _guard = self.mutations.lock().await;
		let subtree = self.hierarchy().subtree(scope)?;

		let mut revoked = 0;
		for scope_ref in &subtree {
			revoked += self.assignments.revoke_scope(scope_ref).await?.len();
		}

		let removed = self.hierarchy().remove(scope)?;

		tracing::info!(
			removed = removed.len(),
			revoked_assignments = revoked,
			"scope removed"
		);
		self.events.publish(AuthzEvent::ScopeRemoved {
			scope: scope.clone(),
			removed: removed.clone(),
			revoked_assignments: revoked,
		});
		Ok(removed)
	}

	// =========================================================================
	// Checks
	// =========================================================================

	pub async fn can_perform(
		&self,
		actor: &Actor,
		operation_id: &str,
		target: &ScopeRef,
	) -> Result<Decision, AuthzError> {
		self.evaluator.can_perform(actor, operation_id, target).await
	}

	pub async fn check(
		&self,
		actor: &Actor,
		operation_id: &str,
		target: &ScopeRef,
	) -> Result<Grant, AuthzError> {
		self.evaluator.check(actor, operation_id, target).await
	}

	pub fn session(&self, actor: &Actor) -> CheckSession<'_> {
		self.evaluator.session(actor)
	}

	pub async fn permitted_operations(
		&self,
		actor: &Actor,
		target: &ScopeRef,
	) -> Result<Vec<OperationId>, AuthzError> {
		self.evaluator.permitted_operations(actor, target).await
	}

	// =========================================================================
	// Assignments
	// =========================================================================

	/// Give `subject` the role at `scope`, replacing any role it held there.
	#[tracing::instrument(skip(self), fields(subject = %subject, role = %role, scope = %scope))]
	pub async fn assign_role(
		&self,
		subject: SubjectRef,
		role: &str,
		scope: &ScopeRef,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<RoleAssignment, AuthzError> {
		let _guard = self.mutations.lock().await;
		self.roles.require_role(role).await?;
		if !self.hierarchy().contains(scope) {
			return Err(ScopeError::NotFound(scope.clone()).into());
		}

		let change = self
			.assignments
			.assign(subject, role, scope, expires_at)
			.await?;
		let previous_role = change.previous.map(|previous| previous.role);

		tracing::info!(previous_role = ?previous_role, "role assigned");
		self.events.publish(AuthzEvent::RoleAssigned {
			assignment: change.current.clone(),
			previous_role,
		});
		Ok(change.current)
	}

	/// Remove the role `subject` holds at `scope`. Revoking nothing is a no-op.
	#[tracing::instrument(skip(self), fields(subject = %subject, scope = %scope))]
	pub async fn revoke_role(
		&self,
		subject: &SubjectRef,
		scope: &ScopeRef,
	) -> Result<Option<RoleAssignment>, AuthzError> {
		let removed = self.assignments.revoke(subject, scope).await?;
		if let Some(assignment) = &removed {
			tracing::info!(role = %assignment.role, "role revoked");
			self.events.publish(AuthzEvent::RoleRevoked {
				assignment: assignment.clone(),
			});
		}
		Ok(removed)
	}

	pub async fn assignments_at(&self, scope: &ScopeRef) -> Result<Vec<RoleAssignment>, AuthzError> {
		Ok(self.assignments.list_for_scope(scope).await?)
	}

	pub async fn assignments_of(
		&self,
		subject: &SubjectRef,
	) -> Result<Vec<RoleAssignment>, AuthzError> {
		Ok(self.assignments.list_for_subject(subject).await?)
	}

	// =========================================================================
	// Roles
	// =========================================================================

	pub async fn get_role(&self, name: &str) -> Result<Role, AuthzError> {
		Ok(self.roles.require_role(name).await?)
	}

	pub async fn list_roles(&self) -> Result<Vec<Role>, AuthzError> {
		Ok(self.roles.list_roles().await?)
	}

	/// Ids of the registered operations a role allows.
	pub async fn role_grants(&self, name: &str) -> Result<BTreeSet<OperationId>, AuthzError> {
		Ok(self.get_role(name).await?.operations_granted(&self.registry))
	}

	/// Create or replace a custom role.
	#[tracing::instrument(skip(self, role), fields(role = %role.name))]
	pub async fn put_role(&self, role: &Role) -> Result<(), AuthzError> {
		if role.is_builtin() {
			return Err(RoleError::ReadOnlyRole(role.name.clone()).into());
		}
		role.validate()?;
		self.roles.put_role(role).await?;
		tracing::info!(rules = role.rules.len(), "role saved");
		Ok(())
	}

	/// Delete a custom role that no assignment refers to.
	#[tracing::instrument(skip(self))]
	pub async fn delete_role(&self, name: &str) -> Result<(), AuthzError> {
		if builtin::is_builtin(name) {
			return Err(RoleError::ReadOnlyRole(name.to_string()).into());
		}
		let _guard = self.mutations.lock().await;
		let assignments = self.assignments.count_for_role(name).await?;
		if assignments > 0 {
			return Err(RoleError::InUse {
				role: name.to_string(),
				assignments,
			}
			.into());
		}
		if !self.roles.delete_role(name).await? {
			return Err(RoleError::UnknownRole(name.to_string()).into());
		}
		tracing::info!("role deleted");
		Ok(())
	}

	/// Write the built-in role definitions to the role store.
	pub async fn install_builtin_roles(&self) -> Result<usize, AuthzError> {
		let roles = builtin::roles();
		for role in &roles {
			self.roles.put_role(role).await?;
		}
		tracing::debug!(roles = roles.len(), "built-in roles installed");
		Ok(roles.len())
	}
}
