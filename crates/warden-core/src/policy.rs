// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Declarative policy files.
//!
//! A policy TOML file declares extra scope types, operations, custom roles,
//! scope instances and role assignments, applied in that order:
//!
//! ```toml
//! [[scope_types]]
//! name = "dashboard"
//! parent = "application"
//!
//! [[operations]]
//! id = "dashboard.read"
//! scope_type = "dashboard"
//! capability = "read"
//!
//! [[roles]]
//! name = "TABLE_EDITOR"
//! rules = [{ effect = "allow", match = { scope = "database_table" } }]
//!
//! [[scopes]]
//! scope = "workspace:1"
//!
//! [[assignments]]
//! subject = "user:1"
//! role = "VIEWER"
//! scope = "workspace:1"
//! expires_at = "2027-01-01T00:00:00Z"
//! ```

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::AuthzError;
use crate::role::Role;
use crate::service::AccessControl;
use crate::types::{Capability, ScopeRef, SubjectRef};

#[derive(Debug, Error)]
pub enum PolicyError {
	#[error("failed to read policy file {path}: {source}")]
	Read {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to parse policy: {0}")]
	Parse(#[from] toml::de::Error),

	#[error("invalid expiry '{value}' for {subject} at {scope}: {source}")]
	InvalidExpiry {
		value: String,
		subject: SubjectRef,
		scope: ScopeRef,
		#[source]
		source: chrono::ParseError,
	},

	#[error(transparent)]
	Authz(#[from] AuthzError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopeTypeEntry {
	pub name: String,
	pub parent: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OperationEntry {
	pub id: String,
	pub scope_type: String,
	pub capability: Capability,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopeEntry {
	pub scope: ScopeRef,
	pub parent: Option<ScopeRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssignmentEntry {
	pub subject: SubjectRef,
	pub role: String,
	pub scope: ScopeRef,
	/// RFC 3339 timestamp.
	pub expires_at: Option<String>,
}

impl AssignmentEntry {
	fn expiry(&self) -> Result<Option<DateTime<Utc>>, PolicyError> {
		self
			.expires_at
			.as_deref()
			.map(|value| {
				DateTime::parse_from_rfc3339(value)
					.map(|parsed| parsed.with_timezone(&Utc))
					.map_err(|source| PolicyError::InvalidExpiry {
						value: value.to_string(),
						subject: self.subject,
						scope: self.scope.clone(),
						source,
					})
			})
			.transpose()
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Policy {
	#[serde(default)]
	pub scope_types: Vec<ScopeTypeEntry>,
	#[serde(default)]
	pub operations: Vec<OperationEntry>,
	#[serde(default)]
	pub roles: Vec<Role>,
	#[serde(default)]
	pub scopes: Vec<ScopeEntry>,
	#[serde(default)]
	pub assignments: Vec<AssignmentEntry>,
}

/// Counts of the entries a policy applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicySummary {
	pub scope_types: usize,
	pub operations: usize,
	pub roles: usize,
	pub scopes: usize,
	pub assignments: usize,
}

impl Policy {
	pub fn from_toml_str(content: &str) -> Result<Self, PolicyError> {
		Ok(toml::from_str(content)?)
	}

	pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
			path: path.to_path_buf(),
			source,
		})?;
		Self::from_toml_str(&content)
	}

	/// Apply the policy. Operations must be applied before the registry is
	/// frozen; re-applying the same policy is idempotent.
	#[tracing::instrument(skip_all)]
	pub async fn apply(&self, access: &AccessControl) -> Result<PolicySummary, PolicyError> {
		let hierarchy = access.hierarchy();

		for entry in &self.scope_types {
			hierarchy
				.register_scope_type(entry.name.as_str(), entry.parent.as_deref())
				.map_err(AuthzError::from)?;
		}
		for entry in &self.operations {
			access.register_operation(entry.id.as_str(), entry.scope_type.as_str(), entry.capability)?;
		}
		for role in &self.roles {
			access.put_role(role).await?;
		}
		for entry in &self.scopes {
			access.insert_scope(entry.scope.clone(), entry.parent.clone())?;
		}
		for entry in &self.assignments {
			let expires_at = entry.expiry()?;
			access
				.assign_role(entry.subject, &entry.role, &entry.scope, expires_at)
				.await?;
		}

		let summary = PolicySummary {
			scope_types: self.scope_types.len(),
			operations: self.operations.len(),
			roles: self.roles.len(),
			scopes: self.scopes.len(),
			assignments: self.assignments.len(),
		};
		tracing::info!(?summary, "policy applied");
		Ok(summary)
	}
}
