// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use warden_core::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Migration {version} failed: {source}")]
	Migration {
		version: i64,
		#[source]
		source: sqlx::Error,
	},

	#[error("Internal: {0}")]
	Internal(String),

	#[error("Corrupt row: {0}")]
	Corrupt(String),

	#[error("Serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<DbError> for StoreError {
	fn from(err: DbError) -> Self {
		match err {
			DbError::Corrupt(message) => StoreError::Corrupt(message),
			DbError::Serialization(e) => StoreError::Corrupt(e.to_string()),
			other => StoreError::backend(other),
		}
	}
}
