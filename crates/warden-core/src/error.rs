// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

use crate::evaluator::DenyReason;
use crate::operation::RegistryError;
use crate::role::RoleError;
use crate::scope::ScopeError;
use crate::types::{OperationId, ScopeRef, ScopeType};

/// Failure reported by a role or assignment storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("storage backend error: {0}")]
	Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

	#[error("corrupt stored record: {0}")]
	Corrupt(String),
}

impl StoreError {
	pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
		StoreError::Backend(Box::new(err))
	}
}

/// Errors surfaced by the access-control service.
///
/// A denied check is a [`crate::Decision`], not an error. The one exception is
/// [`AuthzError::PermissionDenied`], produced only by the `check` helpers.
#[derive(Debug, Error)]
pub enum AuthzError {
	#[error(transparent)]
	Registry(#[from] RegistryError),

	#[error(transparent)]
	Scope(#[from] ScopeError),

	#[error("operation '{operation}' applies to '{expected}' scopes, not to '{target}'")]
	ScopeMismatch {
		operation: OperationId,
		expected: ScopeType,
		target: ScopeRef,
	},

	#[error(transparent)]
	Role(#[from] RoleError),

	#[error(transparent)]
	Store(#[from] StoreError),

	#[error("{0}")]
	PermissionDenied(Box<DenyReason>),
}

impl AuthzError {
	/// Errors caused by wiring mistakes rather than by the request.
	pub fn is_configuration_error(&self) -> bool {
		match self {
			AuthzError::Registry(_) | AuthzError::ScopeMismatch { .. } => true,
			AuthzError::Scope(err) => !matches!(
				err,
				ScopeError::NotFound(_) | ScopeError::AlreadyExists(_)
			),
			AuthzError::Role(err) => matches!(
				err,
				RoleError::UnknownRole(_) | RoleError::InvalidDefinition(_)
			),
			AuthzError::Store(StoreError::Corrupt(_)) => true,
			_ => false,
		}
	}

	pub fn is_not_found(&self) -> bool {
		matches!(self, AuthzError::Scope(ScopeError::NotFound(_)))
	}

	pub fn is_denied(&self) -> bool {
		matches!(self, AuthzError::PermissionDenied(_))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::evaluator::DenyCause;

	#[test]
	fn classifies_errors() {
		let unknown_op = AuthzError::from(RegistryError::UnknownOperation(OperationId::from(
			"database.table.fly",
		)));
		assert!(unknown_op.is_configuration_error());
		assert!(!unknown_op.is_not_found());

		let missing = AuthzError::from(ScopeError::NotFound(ScopeRef::new("database_table", 9)));
		assert!(missing.is_not_found());
		assert!(!missing.is_configuration_error());

		let cycle = AuthzError::from(ScopeError::CycleDetected(ScopeRef::new("workspace", 1)));
		assert!(cycle.is_configuration_error());

		let denied = AuthzError::PermissionDenied(Box::new(DenyReason {
			operation: OperationId::from("database.table.read"),
			target: ScopeRef::new("database_table", 1),
			cause: DenyCause::NoApplicableAssignment,
		}));
		assert!(denied.is_denied());
		assert!(!denied.is_configuration_error());
	}

	#[test]
	fn backend_errors_keep_their_source() {
		let err = StoreError::backend(std::io::Error::other("disk full"));
		assert!(std::error::Error::source(&err).is_some());
		assert!(err.to_string().contains("disk full"));
	}
}
