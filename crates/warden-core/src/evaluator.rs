// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Permission evaluation.
//!
//! A check walks the target's scope chain from the target up to its root.
//! At each level the actor's own assignment decides first; when it has no
//! opinion, the actor's team assignments at that level decide (any team
//! allowing wins over teams denying). The first level that decides ends the
//! walk. When no level decides the check is denied.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::assignment::{AssignmentStore, RoleAssignment};
use crate::error::AuthzError;
use crate::operation::{OperationRegistry, OperationType};
use crate::role::{Effect, Role, RoleStore};
use crate::scope::ScopeHierarchy;
use crate::types::{Actor, OperationId, ScopeRef, SubjectRef};

/// The assignment that allowed a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
	pub operation: OperationId,
	pub target: ScopeRef,
	/// Scope the deciding assignment is bound to.
	pub scope: ScopeRef,
	pub role: String,
	/// The actor's user or one of the actor's teams.
	pub subject: SubjectRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenyCause {
	DeniedByRole { scope: ScopeRef, role: String },
	NoApplicableAssignment,
}

/// Why a check was denied. Only describes the evaluating actor's assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DenyReason {
	pub operation: OperationId,
	pub target: ScopeRef,
	pub cause: DenyCause,
}

impl fmt::Display for DenyReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match &self.cause {
			DenyCause::DeniedByRole { scope, role } => write!(
				f,
				"'{}' on '{}' denied by role '{}' at '{}'",
				self.operation, self.target, role, scope
			),
			DenyCause::NoApplicableAssignment => write!(
				f,
				"'{}' on '{}' denied: no applicable role assignment",
				self.operation, self.target
			),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
	Allow(Grant),
	Deny(DenyReason),
}

impl Decision {
	pub fn is_allowed(&self) -> bool {
		matches!(self, Decision::Allow(_))
	}

	pub fn grant(&self) -> Option<&Grant> {
		match self {
			Decision::Allow(grant) => Some(grant),
			Decision::Deny(_) => None,
		}
	}

	pub fn deny_reason(&self) -> Option<&DenyReason> {
		match self {
			Decision::Allow(_) => None,
			Decision::Deny(reason) => Some(reason),
		}
	}

	/// Convert a deny into [`AuthzError::PermissionDenied`].
	pub fn into_result(self) -> Result<Grant, AuthzError> {
		match self {
			Decision::Allow(grant) => Ok(grant),
			Decision::Deny(reason) => Err(AuthzError::PermissionDenied(Box::new(reason))),
		}
	}
}

/// A verdict at one scope level, attributed to the subject whose role made it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct LevelVerdict<'a> {
	pub effect: Effect,
	pub subject: SubjectRef,
	pub role: &'a str,
}

/// Decide one scope level from the actor's assignments at that level.
pub(crate) fn decide_level<'a>(
	operation: &OperationType,
	hierarchy: &ScopeHierarchy,
	level: impl IntoIterator<Item = (SubjectRef, &'a Role)>,
) -> Option<LevelVerdict<'a>> {
	let mut team_allow = None;
	let mut team_deny = None;

	for (subject, role) in level {
		let Some(effect) = role.decide(operation, hierarchy) else {
			continue;
		};
		let verdict = LevelVerdict {
			effect,
			subject,
			role: role.name.as_str(),
		};
		if subject.is_user() {
			return Some(verdict);
		}
		match effect {
			Effect::Allow => {
				team_allow.get_or_insert(verdict);
			}
			Effect::Deny => {
				team_deny.get_or_insert(verdict);
			}
		}
	}

	team_allow.or(team_deny)
}

/// Evaluates checks against a registry and the role and assignment stores.
///
/// Cheap to clone. Evaluation only reads shared state.
#[derive(Clone)]
pub struct Evaluator {
	registry: Arc<OperationRegistry>,
	roles: Arc<dyn RoleStore>,
	assignments: Arc<dyn AssignmentStore>,
}

impl Evaluator {
	pub fn new(
		registry: Arc<OperationRegistry>,
		roles: Arc<dyn RoleStore>,
		assignments: Arc<dyn AssignmentStore>,
	) -> Self {
		Self {
			registry,
			roles,
			assignments,
		}
	}

	pub fn registry(&self) -> &Arc<OperationRegistry> {
		&self.registry
	}

	/// Start a per-request session that caches chains, assignments and roles.
	pub fn session(&self, actor: &Actor) -> CheckSession<'_> {
		self.session_at(actor, Utc::now())
	}

	/// Like [`Evaluator::session`], evaluating expiry at `now`.
	pub fn session_at(&self, actor: &Actor, now: DateTime<Utc>) -> CheckSession<'_> {
		CheckSession {
			evaluator: self,
			actor: actor.clone(),
			now,
			chains: HashMap::new(),
			levels: HashMap::new(),
			roles: HashMap::new(),
		}
	}

	/// Decide whether `actor` may perform `operation_id` on `target`.
	#[tracing::instrument(
		skip_all,
		fields(user = %actor.user, operation = %operation_id, scope = %target)
	)]
	pub async fn can_perform(
		&self,
		actor: &Actor,
		operation_id: &str,
		target: &ScopeRef,
	) -> Result<Decision, AuthzError> {
		self.session(actor).can_perform(operation_id, target).await
	}

	pub async fn can_perform_at(
		&self,
		actor: &Actor,
		operation_id: &str,
		target: &ScopeRef,
		now: DateTime<Utc>,
	) -> Result<Decision, AuthzError> {
		self
			.session_at(actor, now)
			.can_perform(operation_id, target)
			.await
	}

	/// Like [`Evaluator::can_perform`], turning a deny into an error.
	pub async fn check(
		&self,
		actor: &Actor,
		operation_id: &str,
		target: &ScopeRef,
	) -> Result<Grant, AuthzError> {
		self.session(actor).check(operation_id, target).await
	}

	/// Every registered operation evaluable at `target` that `actor` may perform.
	pub async fn permitted_operations(
		&self,
		actor: &Actor,
		target: &ScopeRef,
	) -> Result<Vec<OperationId>, AuthzError> {
		self.session(actor).permitted_operations(target).await
	}
}

/// Per-request evaluation state for one actor.
///
/// Each scope level is fetched from the assignment store at most once per
/// session, so listing checks over many rows of one table cost one fetch per
/// distinct ancestor. Sessions must not outlive the request: role and
/// assignment changes made after a level was cached are not observed.
pub struct CheckSession<'a> {
	evaluator: &'a Evaluator,
	actor: Actor,
	now: DateTime<Utc>,
	chains: HashMap<ScopeRef, Arc<[ScopeRef]>>,
	levels: HashMap<ScopeRef, Arc<[RoleAssignment]>>,
	roles: HashMap<String, Arc<Role>>,
}

impl<'a> CheckSession<'a> {
	pub fn actor(&self) -> &Actor {
		&self.actor
	}

	pub async fn can_perform(
		&mut self,
		operation_id: &str,
		target: &ScopeRef,
	) -> Result<Decision, AuthzError> {
		let operation = self.evaluator.registry.lookup(operation_id)?;
		self.evaluate(&operation, target).await
	}

	pub async fn check(
		&mut self,
		operation_id: &str,
		target: &ScopeRef,
	) -> Result<Grant, AuthzError> {
		let decision = self.can_perform(operation_id, target).await?;
		if let Decision::Deny(reason) = &decision {
			tracing::warn!(user = %self.actor.user, %reason, "permission denied");
		}
		decision.into_result()
	}

	/// The subset of `targets` on which the operation is allowed, in input order.
	pub async fn filter_permitted(
		&mut self,
		operation_id: &str,
		targets: &[ScopeRef],
	) -> Result<Vec<ScopeRef>, AuthzError> {
		let operation = self.evaluator.registry.lookup(operation_id)?;
		let mut permitted = Vec::new();
		for target in targets {
			if self.evaluate(&operation, target).await?.is_allowed() {
				permitted.push(target.clone());
			}
		}
		Ok(permitted)
	}

	pub async fn permitted_operations(
		&mut self,
		target: &ScopeRef,
	) -> Result<Vec<OperationId>, AuthzError> {
		let operations = self
			.evaluator
			.registry
			.operations_for_scope(target.scope_type.as_str());
		let mut permitted = Vec::new();
		for operation in operations {
			if self.evaluate(&operation, target).await?.is_allowed() {
				permitted.push(operation.id.clone());
			}
		}
		Ok(permitted)
	}

	async fn evaluate(
		&mut self,
		operation: &OperationType,
		target: &ScopeRef,
	) -> Result<Decision, AuthzError> {
		let evaluator = self.evaluator;
		let hierarchy = evaluator.registry.hierarchy();

		let chain = self.chain(hierarchy, target)?;
		if !hierarchy.is_descendant_type(target.scope_type.as_str(), operation.scope_type.as_str())
		{
			return Err(AuthzError::ScopeMismatch {
				operation: operation.id.clone(),
				expected: operation.scope_type.clone(),
				target: target.clone(),
			});
		}
		self.prefetch(&chain).await?;

		for scope in chain.iter() {
			let level = self.levels.get(scope).cloned().unwrap_or_else(|| Arc::from([]));
			let mut held = Vec::with_capacity(level.len());
			for assignment in level.iter() {
				held.push((assignment.subject, self.role(&assignment.role).await?));
			}

			let verdict = decide_level(
				operation,
				hierarchy,
				held.iter().map(|(subject, role)| (*subject, role.as_ref())),
			);
			let Some(verdict) = verdict else {
				continue;
			};

			tracing::debug!(
				user = %self.actor.user,
				operation = %operation.id,
				target_scope = %target,
				scope = %scope,
				role = verdict.role,
				subject = %verdict.subject,
				effect = ?verdict.effect,
				"check decided"
			);
			return Ok(match verdict.effect {
				Effect::Allow => Decision::Allow(Grant {
					operation: operation.id.clone(),
					target: target.clone(),
					scope: scope.clone(),
					role: verdict.role.to_string(),
					subject: verdict.subject,
				}),
				Effect::Deny => Decision::Deny(DenyReason {
					operation: operation.id.clone(),
					target: target.clone(),
					cause: DenyCause::DeniedByRole {
						scope: scope.clone(),
						role: verdict.role.to_string(),
					},
				}),
			});
		}

		tracing::debug!(
			user = %self.actor.user,
			operation = %operation.id,
			target_scope = %target,
			"no applicable assignment"
		);
		Ok(Decision::Deny(DenyReason {
			operation: operation.id.clone(),
			target: target.clone(),
			cause: DenyCause::NoApplicableAssignment,
		}))
	}

	fn chain(
		&mut self,
		hierarchy: &ScopeHierarchy,
		target: &ScopeRef,
	) -> Result<Arc<[ScopeRef]>, AuthzError> {
		if let Some(chain) = self.chains.get(target) {
			return Ok(chain.clone());
		}
		let chain: Arc<[ScopeRef]> = Arc::from(hierarchy.chain(target)?);
		self.chains.insert(target.clone(), chain.clone());
		Ok(chain)
	}

	/// Fetch the levels of `chain` not yet cached, in one store call.
	async fn prefetch(&mut self, chain: &[ScopeRef]) -> Result<(), AuthzError> {
		let missing: Vec<ScopeRef> = chain
			.iter()
			.filter(|scope| !self.levels.contains_key(*scope))
			.cloned()
			.collect();
		if missing.is_empty() {
			return Ok(());
		}

		let fetched = self
			.evaluator
			.assignments
			.assignments_for(&self.actor, &missing, self.now)
			.await?;

		let mut grouped: HashMap<ScopeRef, Vec<RoleAssignment>> = HashMap::new();
		for assignment in fetched {
			grouped
				.entry(assignment.scope.clone())
				.or_default()
				.push(assignment);
		}
		for scope in missing {
			let level = grouped.remove(&scope).unwrap_or_default();
			self.levels.insert(scope, Arc::from(level));
		}
		Ok(())
	}

	async fn role(&mut self, name: &str) -> Result<Arc<Role>, AuthzError> {
		if let Some(role) = self.roles.get(name) {
			return Ok(role.clone());
		}
		let role = Arc::new(self.evaluator.roles.require_role(name).await?);
		self.roles.insert(name.to_string(), role.clone());
		Ok(role)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::role::{builtin, OperationMatcher, RoleRule, Unmatched};
	use crate::scope::ScopeError;
	use crate::testing::*;
	use crate::types::{Capability, TeamId, UserId};
	use chrono::Duration;

	fn alice() -> Actor {
		Actor::new(UserId::new(1))
	}

	fn alice_subject() -> SubjectRef {
		SubjectRef::user(UserId::new(1))
	}

	fn bob_subject() -> SubjectRef {
		SubjectRef::user(UserId::new(2))
	}

	fn team(id: i64) -> SubjectRef {
		SubjectRef::team(TeamId::new(id))
	}

	async fn allowed(fixture: &Fixture, actor: &Actor, op: &str, target: &ScopeRef) -> bool {
		fixture
			.evaluator()
			.can_perform(actor, op, target)
			.await
			.unwrap()
			.is_allowed()
	}

	mod fail_closed {
		use super::*;

		#[tokio::test]
		async fn no_assignment_denies() {
			let fixture = Fixture::new();
			let decision = fixture
				.evaluator()
				.can_perform(&alice(), "database.table.read", &table())
				.await
				.unwrap();
			assert_eq!(
				decision.deny_reason().unwrap().cause,
				DenyCause::NoApplicableAssignment
			);
		}

		#[tokio::test]
		async fn other_subjects_do_not_leak() {
			let fixture = Fixture::new();
			fixture.assign(bob_subject(), builtin::ADMIN, &workspace()).await;
			assert!(!allowed(&fixture, &alice(), "database.table.read", &table()).await);
			assert!(allowed(&fixture, &Actor::new(UserId::new(2)), "database.table.read", &table()).await);
		}

		#[tokio::test]
		async fn unrelated_assignment_at_same_scope_keeps_allow() {
			let fixture = Fixture::new();
			fixture.assign(alice_subject(), builtin::EDITOR, &table()).await;
			assert!(allowed(&fixture, &alice(), "database.table.update", &table()).await);

			fixture.assign(bob_subject(), builtin::NO_ACCESS, &table()).await;
			assert!(allowed(&fixture, &alice(), "database.table.update", &table()).await);
			assert!(!allowed(&fixture, &Actor::new(UserId::new(2)), "database.table.read", &table()).await);
		}

		#[tokio::test]
		async fn other_workspace_grants_nothing() {
			let fixture = Fixture::new();
			fixture.assign(alice_subject(), builtin::ADMIN, &other_workspace()).await;
			assert!(!allowed(&fixture, &alice(), "workspace.read", &workspace()).await);
		}

		#[tokio::test]
		async fn inherit_only_roles_deny_when_nothing_decides() {
			let fixture = Fixture::new();
			fixture
				.roles
				.put_role(&Role::new("READER").with_rule(RoleRule::allow(
					OperationMatcher::Capability(Capability::Read),
				)))
				.await
				.unwrap();
			fixture.assign(alice_subject(), "READER", &workspace()).await;
			assert!(allowed(&fixture, &alice(), "database.table.read", &table()).await);
			assert!(!allowed(&fixture, &alice(), "database.table.update", &table()).await);
		}
	}

	mod inheritance {
		use super::*;

		#[tokio::test]
		async fn viewer_at_workspace_reads_tables() {
			let fixture = Fixture::new();
			fixture.assign(alice_subject(), builtin::VIEWER, &workspace()).await;

			let decision = fixture
				.evaluator()
				.can_perform(&alice(), "database.table.read", &table())
				.await
				.unwrap();
			let grant = decision.grant().unwrap();
			assert_eq!(grant.scope, workspace());
			assert_eq!(grant.role, builtin::VIEWER);

			assert!(!allowed(&fixture, &alice(), "database.table.update", &table()).await);
		}

		#[tokio::test]
		async fn closer_deny_overrides_ancestor_allow() {
			let fixture = Fixture::new();
			fixture.assign(alice_subject(), builtin::ADMIN, &workspace()).await;
			fixture.assign(alice_subject(), builtin::NO_ACCESS, &table()).await;

			let decision = fixture
				.evaluator()
				.can_perform(&alice(), "database.table.read", &table())
				.await
				.unwrap();
			assert_eq!(
				decision.deny_reason().unwrap().cause,
				DenyCause::DeniedByRole {
					scope: table(),
					role: builtin::NO_ACCESS.to_string(),
				}
			);
			assert!(allowed(&fixture, &alice(), "database.table.read", &sibling_table()).await);
			assert!(!allowed(&fixture, &alice(), "database.table.row.read", &row()).await);
		}

		#[tokio::test]
		async fn closer_builtin_can_lower_privilege() {
			let fixture = Fixture::new();
			fixture.assign(alice_subject(), builtin::EDITOR, &workspace()).await;
			fixture.assign(alice_subject(), builtin::VIEWER, &table()).await;
			assert!(!allowed(&fixture, &alice(), "database.table.create_row", &table()).await);
			assert!(allowed(&fixture, &alice(), "database.table.create_row", &sibling_table()).await);
		}

		#[tokio::test]
		async fn inherit_role_defers_to_ancestor() {
			let fixture = Fixture::new();
			fixture
				.roles
				.put_role(
					&Role::new("NO_DELETE").with_rule(RoleRule::deny(OperationMatcher::Exact(
						OperationId::from("database.table.delete"),
					))),
				)
				.await
				.unwrap();
			fixture.assign(alice_subject(), builtin::BUILDER, &workspace()).await;
			fixture.assign(alice_subject(), "NO_DELETE", &table()).await;

			assert!(!allowed(&fixture, &alice(), "database.table.delete", &table()).await);
			assert!(allowed(&fixture, &alice(), "database.table.update", &table()).await);
		}
	}

	mod teams {
		use super::*;

		#[tokio::test]
		async fn team_assignment_applies_to_members() {
			let fixture = Fixture::new();
			fixture.assign(team(7), builtin::EDITOR, &database()).await;

			let member = alice().with_team(TeamId::new(7));
			assert!(allowed(&fixture, &member, "database.table.create_row", &table()).await);
			assert!(!allowed(&fixture, &alice(), "database.table.create_row", &table()).await);
		}

		#[tokio::test]
		async fn user_assignment_beats_team_at_same_level() {
			let fixture = Fixture::new();
			fixture.assign(team(7), builtin::ADMIN, &table()).await;
			fixture.assign(alice_subject(), builtin::VIEWER, &table()).await;

			let member = alice().with_team(TeamId::new(7));
			assert!(allowed(&fixture, &member, "database.table.read", &table()).await);
			assert!(!allowed(&fixture, &member, "database.table.update", &table()).await);
		}

		#[tokio::test]
		async fn any_allowing_team_wins_over_denying_team() {
			let fixture = Fixture::new();
			fixture.assign(team(7), builtin::NO_ACCESS, &table()).await;
			fixture.assign(team(8), builtin::VIEWER, &table()).await;

			let member = alice().with_teams([TeamId::new(7), TeamId::new(8)]);
			let decision = fixture
				.evaluator()
				.can_perform(&member, "database.table.read", &table())
				.await
				.unwrap();
			assert_eq!(decision.grant().unwrap().subject, team(8));
		}

		#[tokio::test]
		async fn team_at_closer_level_beats_user_at_ancestor() {
			let fixture = Fixture::new();
			fixture.assign(alice_subject(), builtin::ADMIN, &workspace()).await;
			fixture.assign(team(7), builtin::VIEWER, &table()).await;

			let member = alice().with_team(TeamId::new(7));
			assert!(!allowed(&fixture, &member, "database.table.update", &table()).await);
		}
	}

	mod expiry {
		use super::*;

		#[tokio::test]
		async fn expired_assignments_are_ignored() {
			let fixture = Fixture::new();
			let now = Utc::now();
			fixture
				.assignments
				.assign(alice_subject(), builtin::ADMIN, &workspace(), Some(now + Duration::hours(1)))
				.await
				.unwrap();

			let evaluator = fixture.evaluator();
			let before = evaluator
				.can_perform_at(&alice(), "workspace.read", &workspace(), now)
				.await
				.unwrap();
			let after = evaluator
				.can_perform_at(&alice(), "workspace.read", &workspace(), now + Duration::hours(2))
				.await
				.unwrap();
			assert!(before.is_allowed());
			assert!(!after.is_allowed());
		}
	}

	mod errors {
		use super::*;

		#[tokio::test]
		async fn unknown_operation_is_an_error() {
			let fixture = Fixture::new();
			let err = fixture
				.evaluator()
				.can_perform(&alice(), "database.table.teleport", &table())
				.await
				.unwrap_err();
			assert!(err.is_configuration_error());
		}

		#[tokio::test]
		async fn unknown_target_is_not_found() {
			let fixture = Fixture::new();
			let err = fixture
				.evaluator()
				.can_perform(&alice(), "database.table.read", &ScopeRef::new("database_table", 99))
				.await
				.unwrap_err();
			assert!(matches!(err, AuthzError::Scope(ScopeError::NotFound(_))));
		}

		#[tokio::test]
		async fn operation_on_ancestor_scope_is_a_mismatch() {
			let fixture = Fixture::new();
			let err = fixture
				.evaluator()
				.can_perform(&alice(), "database.table.row.update", &table())
				.await
				.unwrap_err();
			assert!(matches!(err, AuthzError::ScopeMismatch { .. }));
		}

		#[tokio::test]
		async fn dangling_role_is_an_error() {
			let fixture = Fixture::new();
			fixture.assign(alice_subject(), "GONE", &workspace()).await;
			let err = fixture
				.evaluator()
				.can_perform(&alice(), "workspace.read", &workspace())
				.await
				.unwrap_err();
			assert!(err.is_configuration_error());
		}

		#[tokio::test]
		async fn check_turns_deny_into_error() {
			let fixture = Fixture::new();
			let err = fixture
				.evaluator()
				.check(&alice(), "workspace.read", &workspace())
				.await
				.unwrap_err();
			assert!(err.is_denied());
			assert!(err.to_string().contains("no applicable role assignment"));
		}
	}

	mod sessions {
		use super::*;

		#[tokio::test]
		async fn filter_permitted_keeps_allowed_targets() {
			let fixture = Fixture::new();
			fixture.assign(alice_subject(), builtin::VIEWER, &workspace()).await;
			fixture.assign(alice_subject(), builtin::NO_ACCESS, &sibling_table()).await;

			let evaluator = fixture.evaluator();
			let mut session = evaluator.session(&alice());
			let permitted = session
				.filter_permitted("database.table.read", &[table(), sibling_table()])
				.await
				.unwrap();
			assert_eq!(permitted, vec![table()]);
		}

		#[tokio::test]
		async fn session_caches_levels() {
			let fixture = Fixture::new();
			fixture.assign(alice_subject(), builtin::VIEWER, &workspace()).await;

			let evaluator = fixture.evaluator();
			let mut session = evaluator.session(&alice());
			assert!(session.can_perform("database.table.read", &table()).await.unwrap().is_allowed());

			fixture
				.assignments
				.revoke(&alice_subject(), &workspace())
				.await
				.unwrap();
			assert!(session.can_perform("database.table.read", &table()).await.unwrap().is_allowed());
			assert!(!allowed(&fixture, &alice(), "database.table.read", &table()).await);
		}

		#[tokio::test]
		async fn permitted_operations_lists_evaluable_grants() {
			let fixture = Fixture::new();
			fixture.assign(alice_subject(), builtin::COMMENTER, &workspace()).await;

			let permitted = fixture
				.evaluator()
				.permitted_operations(&alice(), &row())
				.await
				.unwrap();
			assert!(permitted.contains(&OperationId::from("database.table.row.create_comment")));
			assert!(permitted.contains(&OperationId::from("workspace.read")));
			assert!(!permitted.contains(&OperationId::from("database.table.row.update")));
			assert!(!permitted.contains(&OperationId::from("builder.page.read")));
		}
	}

	mod properties {
		use super::*;
		use proptest::prelude::*;

		fn builtin_role(index: usize) -> Role {
			builtin::roles().swap_remove(index % builtin::NAMES.len())
		}

		fn custom_role(deny_first: bool, unmatched_deny: bool) -> Role {
			let allow = RoleRule::allow(OperationMatcher::Any);
			let deny = RoleRule::deny(OperationMatcher::Prefix("database.".to_string()));
			let rules = if deny_first { vec![deny, allow] } else { vec![allow, deny] };
			let mut role = Role::new("CUSTOM").with_unmatched(if unmatched_deny {
				Unmatched::Deny
			} else {
				Unmatched::Inherit
			});
			role.rules = rules;
			role
		}

		#[test]
		fn empty_level_never_decides() {
			let registry = Fixture::new().registry;
			for operation in registry.all() {
				let level = Vec::<(SubjectRef, &Role)>::new();
				assert!(decide_level(&operation, registry.hierarchy(), level).is_none());
			}
		}

		proptest! {
			#[test]
			fn user_verdict_beats_any_team_verdicts(
				user_role in 0usize..6,
				team_roles in prop::collection::vec(0usize..6, 0..5),
				op_index in 0usize..39,
			) {
				let registry = Fixture::new().registry;
				let all = registry.all();
				let operation = all[op_index % all.len()].clone();
				let user = builtin_role(user_role);
				let teams: Vec<Role> = team_roles.iter().map(|i| builtin_role(*i)).collect();

				let mut level: Vec<(SubjectRef, &Role)> = teams
					.iter()
					.enumerate()
					.map(|(i, role)| (SubjectRef::team(TeamId::new(i as i64)), role))
					.collect();
				level.push((SubjectRef::user(UserId::new(1)), &user));

				let verdict = decide_level(&operation, registry.hierarchy(), level).unwrap();
				prop_assert!(verdict.subject.is_user());
				prop_assert_eq!(Some(verdict.effect), user.decide(&operation, registry.hierarchy()));
			}

			#[test]
			fn teams_allow_when_any_team_allows(
				team_roles in prop::collection::vec(0usize..6, 1..6),
				op_index in 0usize..39,
			) {
				let registry = Fixture::new().registry;
				let all = registry.all();
				let operation = all[op_index % all.len()].clone();
				let teams: Vec<Role> = team_roles.iter().map(|i| builtin_role(*i)).collect();
				let level = teams
					.iter()
					.enumerate()
					.map(|(i, role)| (SubjectRef::team(TeamId::new(i as i64)), role));

				let any_allows = teams
					.iter()
					.any(|r| r.decide(&operation, registry.hierarchy()) == Some(Effect::Allow));
				let verdict = decide_level(&operation, registry.hierarchy(), level).unwrap();
				prop_assert_eq!(verdict.effect == Effect::Allow, any_allows);
			}

			#[test]
			fn actor_without_assignments_is_always_denied(
				op_index in 0usize..64,
				target_index in 0usize..6,
				teams in prop::collection::vec(1i64..50, 0..4),
				others in prop::collection::vec((1000i64..1010, 0usize..6, 0usize..6), 0..8),
			) {
				let runtime = tokio::runtime::Builder::new_current_thread()
					.enable_all()
					.build()
					.unwrap();
				runtime.block_on(async {
					let fixture = Fixture::new();
					let scopes = [
						workspace(),
						database(),
						table(),
						sibling_table(),
						row(),
						other_workspace(),
					];
					for (subject, role, scope) in &others {
						fixture
							.assign(
								SubjectRef::user(UserId::new(*subject)),
								builtin::NAMES[*role % builtin::NAMES.len()],
								&scopes[*scope],
							)
							.await;
					}

					let all = fixture.registry.all();
					let operation = &all[op_index % all.len()];
					let target = &scopes[target_index];
					let actor = alice().with_teams(teams.iter().map(|id| TeamId::new(*id)));
					let evaluable = fixture.registry.hierarchy().is_descendant_type(
						target.scope_type.as_str(),
						operation.scope_type.as_str(),
					);

					match fixture
						.evaluator()
						.can_perform(&actor, operation.id.as_str(), target)
						.await
					{
						Ok(decision) => {
							assert!(evaluable);
							assert_eq!(
								decision.deny_reason().map(|reason| &reason.cause),
								Some(&DenyCause::NoApplicableAssignment)
							);
						}
						Err(err) => {
							assert!(!evaluable);
							assert!(matches!(err, AuthzError::ScopeMismatch { .. }));
						}
					}
				});
			}

			#[test]
			fn custom_rule_order_decides(deny_first in any::<bool>(), unmatched_deny in any::<bool>()) {
				let registry = Fixture::new().registry;
				let role = custom_role(deny_first, unmatched_deny);
				let operation = registry.lookup("database.table.read").unwrap();
				let verdict = decide_level(
					&operation,
					registry.hierarchy(),
					[(SubjectRef::user(UserId::new(1)), &role)],
				)
				.unwrap();
				let expected = if deny_first { Effect::Deny } else { Effect::Allow };
				prop_assert_eq!(verdict.effect, expected);
			}
		}
	}
}
