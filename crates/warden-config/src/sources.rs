// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: built-in defaults, TOML files and environment variables.

use std::path::PathBuf;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::WardenConfigLayer;
use crate::sections::{
	DatabaseConfigLayer, EventsConfigLayer, LoggingConfigLayer, PolicyConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<WardenConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<WardenConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(WardenConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file contributes nothing.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/warden/warden.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<WardenConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(WardenConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: WardenConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: WARDEN_<SECTION>_<FIELD>
///
/// | Variable | Field |
/// |----------|-------|
/// | `WARDEN_DATABASE_URL` | `database.url` |
/// | `WARDEN_DATABASE_MAX_CONNECTIONS` | `database.max_connections` |
/// | `WARDEN_LOG_LEVEL` | `logging.level` |
/// | `WARDEN_LOG_JSON` | `logging.json` |
/// | `WARDEN_EVENTS_CAPACITY` | `events.capacity` |
/// | `WARDEN_POLICY_PATH` | `policy.path` |
/// | `WARDEN_POLICY_BUILTIN_ROLES` | `policy.builtin_roles` |
/// | `WARDEN_POLICY_BUILTIN_OPERATIONS` | `policy.builtin_operations` |
pub struct EnvSource;

impl EnvSource {
	/// Build a layer from an arbitrary variable lookup instead of the process
	/// environment.
	pub fn load_from(
		lookup: impl Fn(&str) -> Option<String>,
	) -> Result<WardenConfigLayer, ConfigError> {
		let env = Env { lookup };
		Ok(WardenConfigLayer {
			database: Some(DatabaseConfigLayer {
				url: env.var("WARDEN_DATABASE_URL"),
				max_connections: env.number("WARDEN_DATABASE_MAX_CONNECTIONS")?,
			}),
			logging: Some(LoggingConfigLayer {
				level: env.var("WARDEN_LOG_LEVEL"),
				json: env.bool("WARDEN_LOG_JSON")?,
			}),
			events: Some(EventsConfigLayer {
				capacity: env.number("WARDEN_EVENTS_CAPACITY")?,
			}),
			policy: Some(PolicyConfigLayer {
				path: env.var("WARDEN_POLICY_PATH").map(PathBuf::from),
				builtin_roles: env.bool("WARDEN_POLICY_BUILTIN_ROLES")?,
				builtin_operations: env.bool("WARDEN_POLICY_BUILTIN_OPERATIONS")?,
			}),
		})
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<WardenConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Self::load_from(|name| std::env::var(name).ok())
	}
}

struct Env<F> {
	lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
	fn var(&self, name: &str) -> Option<String> {
		(self.lookup)(name).filter(|s| !s.is_empty())
	}

	fn bool(&self, name: &str) -> Result<Option<bool>, ConfigError> {
		match self.var(name) {
			Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => Ok(Some(true)),
			Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => Ok(Some(false)),
			Some(v) => Err(ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid boolean value '{v}'"),
			}),
			None => Ok(None),
		}
	}

	fn number<T: std::str::FromStr>(&self, name: &str) -> Result<Option<T>, ConfigError> {
		match self.var(name) {
			Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
				key: name.to_string(),
				message: format!("invalid unsigned integer value '{v}'"),
			}),
			None => Ok(None),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let vars: HashMap<String, String> = vars
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		move |name| vars.get(name).cloned()
	}

	mod env {
		use super::*;

		#[test]
		fn reads_every_section() {
			let layer = EnvSource::load_from(lookup(&[
				("WARDEN_DATABASE_URL", "sqlite::memory:"),
				("WARDEN_DATABASE_MAX_CONNECTIONS", "2"),
				("WARDEN_LOG_LEVEL", "debug"),
				("WARDEN_LOG_JSON", "1"),
				("WARDEN_EVENTS_CAPACITY", "32"),
				("WARDEN_POLICY_PATH", "/srv/policy.toml"),
				("WARDEN_POLICY_BUILTIN_ROLES", "false"),
			]))
			.unwrap();

			let database = layer.database.unwrap();
			assert_eq!(database.url.as_deref(), Some("sqlite::memory:"));
			assert_eq!(database.max_connections, Some(2));
			let logging = layer.logging.unwrap();
			assert_eq!(logging.level.as_deref(), Some("debug"));
			assert_eq!(logging.json, Some(true));
			assert_eq!(layer.events.unwrap().capacity, Some(32));
			let policy = layer.policy.unwrap();
			assert_eq!(policy.path, Some(PathBuf::from("/srv/policy.toml")));
			assert_eq!(policy.builtin_roles, Some(false));
			assert_eq!(policy.builtin_operations, None);
		}

		#[test]
		fn empty_values_count_as_unset() {
			let layer = EnvSource::load_from(lookup(&[("WARDEN_LOG_LEVEL", "")])).unwrap();
			assert!(layer.logging.unwrap().level.is_none());
		}

		#[test]
		fn malformed_capacity_is_rejected() {
			let err = EnvSource::load_from(lookup(&[("WARDEN_EVENTS_CAPACITY", "lots")]))
				.unwrap_err();
			assert!(matches!(
				err,
				ConfigError::InvalidValue { ref key, .. } if key == "WARDEN_EVENTS_CAPACITY"
			));
		}

		#[test]
		fn malformed_boolean_is_rejected() {
			let err =
				EnvSource::load_from(lookup(&[("WARDEN_LOG_JSON", "yes please")])).unwrap_err();
			assert!(err.to_string().contains("WARDEN_LOG_JSON"));
		}
	}

	mod toml_file {
		use super::*;
		use std::io::Write;

		#[test]
		fn missing_file_is_skipped() {
			let dir = tempfile::tempdir().unwrap();
			let layer = TomlSource::new(dir.path().join("absent.toml")).load().unwrap();
			assert!(layer.database.is_none());
		}

		#[test]
		fn parses_sections() {
			let mut file = tempfile::NamedTempFile::new().unwrap();
			writeln!(
				file,
				r#"
[database]
url = "sqlite:/tmp/warden.db"

[policy]
path = "policy.toml"
builtin_operations = false
"#
			)
			.unwrap();

			let layer = TomlSource::new(file.path()).load().unwrap();
			assert_eq!(
				layer.database.unwrap().url.as_deref(),
				Some("sqlite:/tmp/warden.db")
			);
			assert_eq!(layer.policy.unwrap().builtin_operations, Some(false));
		}

		#[test]
		fn parse_errors_name_the_file() {
			let mut file = tempfile::NamedTempFile::new().unwrap();
			writeln!(file, "[database\nurl = ").unwrap();

			let err = TomlSource::new(file.path()).load().unwrap_err();
			assert!(matches!(err, ConfigError::TomlParse { ref path, .. } if path == file.path()));
		}
	}

	#[test]
	fn precedence_orders_environment_last() {
		let mut sources: Vec<Box<dyn ConfigSource>> = vec![
			Box::new(EnvSource),
			Box::new(DefaultsSource),
			Box::new(TomlSource::system()),
		];
		sources.sort_by_key(|s| s.precedence());
		let names: Vec<_> = sources.iter().map(|s| s.name()).collect();
		assert_eq!(names, vec!["defaults", "toml-config", "environment"]);
	}
}
