// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Role and assignment store settings.

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:./warden.db";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// SQLite store settings (runtime, fully resolved).
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
	pub url: String,
	pub max_connections: u32,
}

impl Default for DatabaseConfig {
	fn default() -> Self {
		Self {
			url: DEFAULT_DATABASE_URL.to_string(),
			max_connections: DEFAULT_MAX_CONNECTIONS,
		}
	}
}

impl DatabaseConfig {
	/// Only SQLite URLs are accepted; the pool needs at least one connection.
	pub fn validate(&self) -> Result<(), ConfigError> {
		let url = self.url.trim();
		let Some(target) = url.strip_prefix("sqlite:") else {
			return Err(ConfigError::Validation(format!(
				"database.url (WARDEN_DATABASE_URL) must be a sqlite: URL, got '{url}'"
			)));
		};
		if target.trim_start_matches('/').is_empty() {
			return Err(ConfigError::Validation(
				"database.url (WARDEN_DATABASE_URL) names no database file".to_string(),
			));
		}

		if self.max_connections == 0 {
			return Err(ConfigError::Validation(
				"database.max_connections (WARDEN_DATABASE_MAX_CONNECTIONS) must be at least 1"
					.to_string(),
			));
		}

		Ok(())
	}
}

/// Store settings layer (partial, for merging).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfigLayer {
	#[serde(default)]
	pub url: Option<String>,
	#[serde(default)]
	pub max_connections: Option<u32>,
}

impl DatabaseConfigLayer {
	pub fn merge(&mut self, other: DatabaseConfigLayer) {
		if other.url.is_some() {
			self.url = other.url;
		}
		if other.max_connections.is_some() {
			self.max_connections = other.max_connections;
		}
	}

	pub fn finalize(self) -> DatabaseConfig {
		DatabaseConfig {
			url: self.url.unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
			max_connections: self.max_connections.unwrap_or(DEFAULT_MAX_CONNECTIONS),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(url: &str) -> DatabaseConfig {
		DatabaseConfig {
			url: url.to_string(),
			..DatabaseConfig::default()
		}
	}

	#[test]
	fn defaults_point_at_a_local_file() {
		let config = DatabaseConfigLayer::default().finalize();
		assert_eq!(config.url, "sqlite:./warden.db");
		assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn later_layer_overrides_pool_size_only() {
		let mut layer = DatabaseConfigLayer {
			url: Some("sqlite:/var/lib/warden/authz.db".to_string()),
			max_connections: None,
		};
		layer.merge(DatabaseConfigLayer {
			url: None,
			max_connections: Some(1),
		});
		let config = layer.finalize();
		assert_eq!(config.url, "sqlite:/var/lib/warden/authz.db");
		assert_eq!(config.max_connections, 1);
	}

	#[test]
	fn accepts_files_and_memory() {
		assert!(config("sqlite:/var/lib/warden/authz.db").validate().is_ok());
		assert!(config("sqlite://warden.db").validate().is_ok());
		assert!(config("sqlite::memory:").validate().is_ok());
	}

	#[test]
	fn rejects_other_schemes_and_empty_targets() {
		assert!(config("postgres://localhost/warden").validate().is_err());
		assert!(config("./warden.db").validate().is_err());
		assert!(config("sqlite:").validate().is_err());
		assert!(config("sqlite://").validate().is_err());
	}

	#[test]
	fn zero_connections_is_rejected() {
		let config = DatabaseConfig {
			max_connections: 0,
			..DatabaseConfig::default()
		};
		assert!(config.validate().unwrap_err().to_string().contains("max_connections"));
	}
}
