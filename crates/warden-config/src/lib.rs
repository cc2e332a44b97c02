// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for Warden.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`WARDEN_*`)
//!
//! # Usage
//!
//! ```ignore
//! use warden_config::load_config;
//!
//! let config = load_config()?;
//! println!("authorization data lives in {}", config.database.url);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::WardenConfigLayer;
pub use sections::*;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use tracing::{debug, info};

/// Fully resolved configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WardenConfig {
	pub database: DatabaseConfig,
	pub logging: LoggingConfig,
	pub events: EventsConfig,
	pub policy: PolicyConfig,
}

impl WardenConfig {
	/// Report the resolved settings. Call once a subscriber is installed.
	pub fn log_summary(&self) {
		info!(
			database = %self.database.url,
			max_connections = self.database.max_connections,
			log_level = %self.logging.level,
			log_json = self.logging.json,
			event_capacity = self.events.capacity,
			policy = ?self.policy.path,
			builtin_roles = self.policy.builtin_roles,
			builtin_operations = self.policy.builtin_operations,
			"Warden configuration loaded"
		);
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`WARDEN_*`)
/// 2. Config file (`/etc/warden/warden.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<WardenConfig, ConfigError> {
	load_config_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration from environment only (for testing or simple deployments).
pub fn load_config_from_env() -> Result<WardenConfig, ConfigError> {
	let mut merged = WardenConfigLayer::default();
	merged.merge(EnvSource.load()?);
	finalize(merged)
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<std::path::PathBuf>,
) -> Result<WardenConfig, ConfigError> {
	load_config_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Merge the given sources in precedence order and resolve the result.
pub fn load_config_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<WardenConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = WardenConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
fn finalize(layer: WardenConfigLayer) -> Result<WardenConfig, ConfigError> {
	let config = WardenConfig {
		database: layer.database.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
		events: layer.events.unwrap_or_default().finalize(),
		policy: layer.policy.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;
	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &WardenConfig) -> Result<(), ConfigError> {
	config.database.validate()?;

	if config.events.capacity == 0 {
		return Err(ConfigError::Validation(
			"events.capacity (WARDEN_EVENTS_CAPACITY) must be at least 1".to_string(),
		));
	}

	if config.logging.level.trim().is_empty() {
		return Err(ConfigError::Validation(
			"logging.level (WARDEN_LOG_LEVEL) must not be empty".to_string(),
		));
	}

	if !config.policy.builtin_operations && config.policy.path.is_none() {
		return Err(ConfigError::Validation(
			"policy.builtin_operations is disabled but no policy.path is set, \
			 so no operations would be registered"
				.to_string(),
		));
	}

	Ok(())
}
