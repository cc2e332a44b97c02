// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Mapping of access-control errors to stable API error codes.
//!
//! Handlers convert an [`AuthzError`] with [`ApiError::from`] and respond with
//! `(error.status, Json(error))`.

use http::StatusCode;
use serde::Serialize;

use crate::error::AuthzError;
use crate::operation::RegistryError;
use crate::role::RoleError;
use crate::scope::ScopeError;

/// A stable error code, its HTTP status and a default message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode {
	pub code: &'static str,
	pub status: StatusCode,
	pub message: &'static str,
}

macro_rules! error_code {
	($name:ident, $status:ident, $message:expr) => {
		pub const $name: ErrorCode = ErrorCode {
			code: stringify!($name),
			status: StatusCode::$status,
			message: $message,
		};
	};
}

error_code!(
	ERROR_PERMISSION_DENIED,
	UNAUTHORIZED,
	"You don't have the required permission to execute this operation."
);
error_code!(
	ERROR_SCOPE_NOT_FOUND,
	NOT_FOUND,
	"The requested object does not exist."
);
error_code!(
	ERROR_SCOPE_ALREADY_EXISTS,
	CONFLICT,
	"The object already exists under a different parent."
);
error_code!(
	ERROR_INVALID_SCOPE,
	BAD_REQUEST,
	"The object does not fit the scope hierarchy."
);
error_code!(
	ERROR_UNKNOWN_OPERATION,
	INTERNAL_SERVER_ERROR,
	"The operation is not registered."
);
error_code!(
	ERROR_SCOPE_MISMATCH,
	INTERNAL_SERVER_ERROR,
	"The operation cannot be checked against this object."
);
error_code!(
	ERROR_OPERATION_REGISTRY,
	INTERNAL_SERVER_ERROR,
	"The operation catalog rejected the registration."
);
error_code!(
	ERROR_ROLE_DOES_NOT_EXIST,
	NOT_FOUND,
	"The requested role does not exist."
);
error_code!(
	ERROR_ROLE_READ_ONLY,
	BAD_REQUEST,
	"Built-in roles cannot be changed."
);
error_code!(
	ERROR_ROLE_IN_USE,
	CONFLICT,
	"The role is still assigned and cannot be deleted."
);
error_code!(
	ERROR_INVALID_ROLE,
	BAD_REQUEST,
	"The role definition is invalid."
);
error_code!(
	ERROR_STORAGE_UNAVAILABLE,
	SERVICE_UNAVAILABLE,
	"The permission store is unavailable."
);

/// Classify an error.
pub fn error_code(err: &AuthzError) -> ErrorCode {
	match err {
		AuthzError::PermissionDenied(_) => ERROR_PERMISSION_DENIED,
		AuthzError::ScopeMismatch { .. } => ERROR_SCOPE_MISMATCH,
		AuthzError::Registry(RegistryError::UnknownOperation(_)) => ERROR_UNKNOWN_OPERATION,
		AuthzError::Registry(_) => ERROR_OPERATION_REGISTRY,
		AuthzError::Scope(ScopeError::NotFound(_)) => ERROR_SCOPE_NOT_FOUND,
		AuthzError::Scope(ScopeError::AlreadyExists(_)) => ERROR_SCOPE_ALREADY_EXISTS,
		AuthzError::Scope(_) => ERROR_INVALID_SCOPE,
		AuthzError::Role(RoleError::UnknownRole(_)) => ERROR_ROLE_DOES_NOT_EXIST,
		AuthzError::Role(RoleError::ReadOnlyRole(_)) => ERROR_ROLE_READ_ONLY,
		AuthzError::Role(RoleError::InUse { .. }) => ERROR_ROLE_IN_USE,
		AuthzError::Role(RoleError::InvalidName(_) | RoleError::InvalidDefinition(_)) => {
			ERROR_INVALID_ROLE
		}
		AuthzError::Role(RoleError::Store(_)) | AuthzError::Store(_) => ERROR_STORAGE_UNAVAILABLE,
	}
}

/// JSON error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiError {
	pub error: &'static str,
	pub detail: String,
	#[serde(skip)]
	pub status: StatusCode,
}

impl From<&AuthzError> for ApiError {
	fn from(err: &AuthzError) -> Self {
		let code = error_code(err);
		let detail = if code.status.is_server_error() {
			code.message.to_string()
		} else {
			err.to_string()
		};
		if code.status.is_server_error() {
			tracing::error!(error = %err, code = code.code, "access control failure");
		}
		Self {
			error: code.code,
			detail,
			status: code.status,
		}
	}
}

impl From<AuthzError> for ApiError {
	fn from(err: AuthzError) -> Self {
		ApiError::from(&err)
	}
}
