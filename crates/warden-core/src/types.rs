// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core type definitions for access-control evaluation.
//!
//! - **Entity ids**: [`UserId`] and [`TeamId`] wrap the integer primary keys of
//!   the platform's users and teams; [`AssignmentId`] is a generated UUID
//! - **Names**: [`ScopeType`] and [`OperationId`] are string identifiers that
//!   cannot be mixed up with each other
//! - **References**: [`ScopeRef`] (`database_table:12`) and [`SubjectRef`]
//!   (`user:3`, `team:7`) serialize as compact strings
//! - **Capabilities**: the ordered [`Capability`] ladder an operation requires
//! - **Actors**: [`Actor`] is a user plus the teams the user belongs to

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Entity ids
// =============================================================================

macro_rules! define_entity_id {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(
			Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
		)]
		#[serde(transparent)]
		pub struct $name(i64);

		impl $name {
			/// Create an id from its database primary key.
			pub fn new(id: i64) -> Self {
				Self(id)
			}

			/// Get the inner primary key.
			pub fn get(self) -> i64 {
				self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl From<i64> for $name {
			fn from(id: i64) -> Self {
				Self(id)
			}
		}

		impl From<$name> for i64 {
			fn from(id: $name) -> Self {
				id.0
			}
		}
	};
}

define_entity_id!(UserId, "Primary key of a platform user.");
define_entity_id!(TeamId, "Primary key of a team within a workspace.");

/// Unique identifier for a role assignment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssignmentId(Uuid);

impl AssignmentId {
	/// Create an id from a UUID.
	pub fn new(id: Uuid) -> Self {
		Self(id)
	}

	/// Generate a new random id.
	pub fn generate() -> Self {
		Self(Uuid::new_v4())
	}

	/// Get the inner UUID value.
	pub fn into_inner(self) -> Uuid {
		self.0
	}
}

impl fmt::Display for AssignmentId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

// =============================================================================
// Names
// =============================================================================

macro_rules! define_name_type {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(String);

		impl $name {
			pub fn new(name: impl Into<String>) -> Self {
				Self(name.into())
			}

			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl From<&str> for $name {
			fn from(name: &str) -> Self {
				Self(name.to_string())
			}
		}

		impl From<String> for $name {
			fn from(name: String) -> Self {
				Self(name)
			}
		}

		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}

		impl PartialEq<str> for $name {
			fn eq(&self, other: &str) -> bool {
				self.0 == other
			}
		}

		impl PartialEq<&str> for $name {
			fn eq(&self, other: &&str) -> bool {
				self.0 == *other
			}
		}
	};
}

define_name_type!(
	ScopeType,
	"Name of a kind of scope, e.g. `workspace` or `database_table`."
);
define_name_type!(
	OperationId,
	"Dotted operation identifier, e.g. `database.table.read`."
);

/// Returns true if `name` is a valid scope type name (`[a-z][a-z0-9_]*`).
pub fn is_valid_scope_type_name(name: &str) -> bool {
	let mut chars = name.chars();
	matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
		&& chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Returns true if `id` is a valid operation id: dot-separated segments that
/// are each valid scope type names.
pub fn is_valid_operation_id(id: &str) -> bool {
	!id.is_empty() && id.split('.').all(is_valid_scope_type_name)
}

// =============================================================================
// Parse errors
// =============================================================================

/// Errors produced when parsing compact string references.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseRefError {
	#[error("expected '<kind>:<id>', got '{0}'")]
	MissingSeparator(String),

	#[error("invalid numeric id in '{0}'")]
	InvalidId(String),

	#[error("unknown subject kind '{0}'")]
	UnknownSubjectKind(String),

	#[error("invalid scope type name '{0}'")]
	InvalidScopeType(String),

	#[error("unknown capability '{0}'")]
	UnknownCapability(String),
}

fn split_ref(s: &str) -> Result<(&str, i64), ParseRefError> {
	let (kind, id) = s
		.rsplit_once(':')
		.ok_or_else(|| ParseRefError::MissingSeparator(s.to_string()))?;
	let id = id
		.trim()
		.parse::<i64>()
		.map_err(|_| ParseRefError::InvalidId(s.to_string()))?;
	Ok((kind.trim(), id))
}

// =============================================================================
// Scope references
// =============================================================================

/// A concrete scope instance: its type plus the owning entity's primary key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScopeRef {
	pub scope_type: ScopeType,
	pub id: i64,
}

impl ScopeRef {
	pub fn new(scope_type: impl Into<ScopeType>, id: i64) -> Self {
		Self {
			scope_type: scope_type.into(),
			id,
		}
	}
}

impl fmt::Display for ScopeRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.scope_type, self.id)
	}
}

impl FromStr for ScopeRef {
	type Err = ParseRefError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (kind, id) = split_ref(s)?;
		if !is_valid_scope_type_name(kind) {
			return Err(ParseRefError::InvalidScopeType(kind.to_string()));
		}
		Ok(Self::new(kind, id))
	}
}

impl TryFrom<String> for ScopeRef {
	type Error = ParseRefError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<ScopeRef> for String {
	fn from(scope: ScopeRef) -> Self {
		scope.to_string()
	}
}

// =============================================================================
// Subjects
// =============================================================================

/// The kind of principal a role can be assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
	User,
	Team,
}

impl fmt::Display for SubjectKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			SubjectKind::User => write!(f, "user"),
			SubjectKind::Team => write!(f, "team"),
		}
	}
}

impl FromStr for SubjectKind {
	type Err = ParseRefError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"user" => Ok(SubjectKind::User),
			"team" => Ok(SubjectKind::Team),
			other => Err(ParseRefError::UnknownSubjectKind(other.to_string())),
		}
	}
}

/// A principal that can hold role assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectRef {
	pub kind: SubjectKind,
	pub id: i64,
}

impl SubjectRef {
	pub fn user(id: UserId) -> Self {
		Self {
			kind: SubjectKind::User,
			id: id.get(),
		}
	}

	pub fn team(id: TeamId) -> Self {
		Self {
			kind: SubjectKind::Team,
			id: id.get(),
		}
	}

	pub fn is_user(&self) -> bool {
		self.kind == SubjectKind::User
	}
}

impl fmt::Display for SubjectRef {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.kind, self.id)
	}
}

impl FromStr for SubjectRef {
	type Err = ParseRefError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let (kind, id) = split_ref(s)?;
		Ok(Self {
			kind: kind.parse()?,
			id,
		})
	}
}

impl TryFrom<String> for SubjectRef {
	type Error = ParseRefError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<SubjectRef> for String {
	fn from(subject: SubjectRef) -> Self {
		subject.to_string()
	}
}

/// The user on whose behalf a check runs, together with their team memberships.
///
/// Team assignments only apply to an actor that lists the team; membership is
/// resolved by the caller before evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
	pub user: UserId,
	pub teams: Vec<TeamId>,
}

impl Actor {
	/// Creates an actor with no team memberships.
	pub fn new(user: UserId) -> Self {
		Self {
			user,
			teams: Vec::new(),
		}
	}

	/// Builder: add a team membership.
	pub fn with_team(mut self, team: TeamId) -> Self {
		if !self.teams.contains(&team) {
			self.teams.push(team);
		}
		self
	}

	/// Builder: add several team memberships.
	pub fn with_teams(self, teams: impl IntoIterator<Item = TeamId>) -> Self {
		teams.into_iter().fold(self, Actor::with_team)
	}

	pub fn user_subject(&self) -> SubjectRef {
		SubjectRef::user(self.user)
	}

	/// All subjects whose assignments apply to this actor, user first.
	pub fn subjects(&self) -> Vec<SubjectRef> {
		std::iter::once(self.user_subject())
			.chain(self.teams.iter().copied().map(SubjectRef::team))
			.collect()
	}

	/// Returns true if assignments held by `subject` apply to this actor.
	pub fn is_represented_by(&self, subject: &SubjectRef) -> bool {
		match subject.kind {
			SubjectKind::User => subject.id == self.user.get(),
			SubjectKind::Team => self.teams.iter().any(|t| t.get() == subject.id),
		}
	}
}

// =============================================================================
// Capabilities
// =============================================================================

/// The level of access an operation requires.
///
/// Ordered from least to most privileged, mirroring the built-in role ladder
/// (viewer, commenter, editor, builder, admin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
	/// Read data and structure.
	Read,
	/// Leave comments without changing data.
	Comment,
	/// Create, change and delete data.
	Write,
	/// Change structure: tables, fields, views, pages.
	Manage,
	/// Administer members, roles and the workspace itself.
	Admin,
}

impl Capability {
	/// Returns all capabilities, least privileged first.
	pub fn all() -> &'static [Capability] {
		&[
			Capability::Read,
			Capability::Comment,
			Capability::Write,
			Capability::Manage,
			Capability::Admin,
		]
	}
}

impl fmt::Display for Capability {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Capability::Read => write!(f, "read"),
			Capability::Comment => write!(f, "comment"),
			Capability::Write => write!(f, "write"),
			Capability::Manage => write!(f, "manage"),
			Capability::Admin => write!(f, "admin"),
		}
	}
}

impl FromStr for Capability {
	type Err = ParseRefError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Capability::all()
			.iter()
			.copied()
			.find(|c| c.to_string() == s)
			.ok_or_else(|| ParseRefError::UnknownCapability(s.to_string()))
	}
}
