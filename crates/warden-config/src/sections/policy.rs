// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Policy bootstrap configuration.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyConfig {
	/// Policy TOML applied at startup, if any.
	pub path: Option<PathBuf>,
	/// Install the built-in roles (ADMIN, BUILDER, ...) into the role store.
	pub builtin_roles: bool,
	/// Register the default scope types and operation catalog.
	pub builtin_operations: bool,
}

impl Default for PolicyConfig {
	fn default() -> Self {
		Self {
			path: None,
			builtin_roles: true,
			builtin_operations: true,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfigLayer {
	#[serde(default)]
	pub path: Option<PathBuf>,
	#[serde(default)]
	pub builtin_roles: Option<bool>,
	#[serde(default)]
	pub builtin_operations: Option<bool>,
}

impl PolicyConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.path.is_some() {
			self.path = other.path;
		}
		if other.builtin_roles.is_some() {
			self.builtin_roles = other.builtin_roles;
		}
		if other.builtin_operations.is_some() {
			self.builtin_operations = other.builtin_operations;
		}
	}

	pub fn finalize(self) -> PolicyConfig {
		PolicyConfig {
			path: self.path,
			builtin_roles: self.builtin_roles.unwrap_or(true),
			builtin_operations: self.builtin_operations.unwrap_or(true),
		}
	}
}
