// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Role assignments.
//!
//! An assignment binds one subject (a user or a team) to one role at one
//! scope instance. There is at most one assignment per (subject, scope);
//! assigning again replaces the role and expiry but keeps the assignment id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::types::{Actor, AssignmentId, ScopeRef, SubjectRef};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAssignment {
	pub id: AssignmentId,
	pub subject: SubjectRef,
	pub role: String,
	pub scope: ScopeRef,
	pub expires_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
}

impl RoleAssignment {
	pub fn new(subject: SubjectRef, role: impl Into<String>, scope: ScopeRef) -> Self {
		Self {
			id: AssignmentId::generate(),
			subject,
			role: role.into(),
			scope,
			expires_at: None,
			created_at: Utc::now(),
		}
	}

	/// Builder: set an expiry.
	pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
		self.expires_at = Some(expires_at);
		self
	}

	/// An assignment stops applying at its expiry instant.
	pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
		self.expires_at.map_or(true, |expires_at| expires_at > now)
	}
}

/// Result of an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentChange {
	pub current: RoleAssignment,
	pub previous: Option<RoleAssignment>,
}

impl AssignmentChange {
	pub fn is_replacement(&self) -> bool {
		self.previous.is_some()
	}
}

/// Storage for role assignments.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
	/// Insert or replace the assignment of `subject` at `scope`.
	async fn assign(
		&self,
		subject: SubjectRef,
		role: &str,
		scope: &ScopeRef,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<AssignmentChange, StoreError>;

	/// Remove the assignment of `subject` at `scope`, if any.
	async fn revoke(
		&self,
		subject: &SubjectRef,
		scope: &ScopeRef,
	) -> Result<Option<RoleAssignment>, StoreError>;

	/// Remove every assignment bound to `scope`.
	async fn revoke_scope(&self, scope: &ScopeRef) -> Result<Vec<RoleAssignment>, StoreError>;

	/// Active assignments applying to `actor` at the scopes of `chain`.
	///
	/// Results follow the order of `chain`. Within one scope the user's own
	/// assignment comes first, then team assignments ordered by team id.
	async fn assignments_for(
		&self,
		actor: &Actor,
		chain: &[ScopeRef],
		now: DateTime<Utc>,
	) -> Result<Vec<RoleAssignment>, StoreError>;

	/// Every assignment at `scope`, including expired ones.
	async fn list_for_scope(&self, scope: &ScopeRef) -> Result<Vec<RoleAssignment>, StoreError>;

	/// Every assignment held by `subject`, including expired ones.
	async fn list_for_subject(
		&self,
		subject: &SubjectRef,
	) -> Result<Vec<RoleAssignment>, StoreError>;

	/// Number of assignments referring to `role`.
	async fn count_for_role(&self, role: &str) -> Result<u64, StoreError>;
}

/// Assignment store kept in process memory.
///
/// All mutations take the single write lock, so an upsert is atomic with
/// respect to concurrent assigns of the same (subject, scope).
#[derive(Debug, Default)]
pub struct InMemoryAssignmentStore {
	by_scope: RwLock<HashMap<ScopeRef, BTreeMap<SubjectRef, RoleAssignment>>>,
}

impl InMemoryAssignmentStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl AssignmentStore for InMemoryAssignmentStore {
	async fn assign(
		&self,
		subject: SubjectRef,
		role: &str,
		scope: &ScopeRef,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<AssignmentChange, StoreError> {
		let mut by_scope = self.by_scope.write().await;
		let at_scope = by_scope.entry(scope.clone()).or_default();

		let previous = at_scope.get(&subject).cloned();
		let current = match &previous {
			Some(existing) => RoleAssignment {
				role: role.to_string(),
				expires_at,
				..existing.clone()
			},
			None => RoleAssignment {
				expires_at,
				..RoleAssignment::new(subject, role, scope.clone())
			},
		};
		at_scope.insert(subject, current.clone());

		Ok(AssignmentChange { current, previous })
	}

	async fn revoke(
		&self,
		subject: &SubjectRef,
		scope: &ScopeRef,
	) -> Result<Option<RoleAssignment>, StoreError> {
		let mut by_scope = self.by_scope.write().await;
		let Some(at_scope) = by_scope.get_mut(scope) else {
			return Ok(None);
		};
		let removed = at_scope.remove(subject);
		if at_scope.is_empty() {
			by_scope.remove(scope);
		}
		Ok(removed)
	}

	async fn revoke_scope(&self, scope: &ScopeRef) -> Result<Vec<RoleAssignment>, StoreError> {
		let removed = self.by_scope.write().await.remove(scope);
		Ok(removed.map(|m| m.into_values().collect()).unwrap_or_default())
	}

	async fn assignments_for(
		&self,
		actor: &Actor,
		chain: &[ScopeRef],
		now: DateTime<Utc>,
	) -> Result<Vec<RoleAssignment>, StoreError> {
		let by_scope = self.by_scope.read().await;
		let found = chain
			.iter()
			.filter_map(|scope| by_scope.get(scope))
			.flat_map(|at_scope| at_scope.values())
			.filter(|a| actor.is_represented_by(&a.subject) && a.is_active_at(now))
			.cloned()
			.collect();
		Ok(found)
	}

	async fn list_for_scope(&self, scope: &ScopeRef) -> Result<Vec<RoleAssignment>, StoreError> {
		let by_scope = self.by_scope.read().await;
		Ok(by_scope
			.get(scope)
			.map(|m| m.values().cloned().collect())
			.unwrap_or_default())
	}

	async fn list_for_subject(
		&self,
		subject: &SubjectRef,
	) -> Result<Vec<RoleAssignment>, StoreError> {
		let by_scope = self.by_scope.read().await;
		let mut found: Vec<_> = by_scope
			.values()
			.filter_map(|at_scope| at_scope.get(subject))
			.cloned()
			.collect();
		found.sort_by(|a, b| a.scope.cmp(&b.scope));
		Ok(found)
	}

	async fn count_for_role(&self, role: &str) -> Result<u64, StoreError> {
		let by_scope = self.by_scope.read().await;
		let count = by_scope
			.values()
			.flat_map(|at_scope| at_scope.values())
			.filter(|a| a.role == role)
			.count();
		Ok(count as u64)
	}
}
