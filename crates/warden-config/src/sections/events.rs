// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Event bus configuration.

use serde::Deserialize;

/// Matches the broadcast capacity the core crate uses when none is configured.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct EventsConfig {
	/// Events buffered per subscriber before slow receivers start lagging.
	pub capacity: usize,
}

impl Default for EventsConfig {
	fn default() -> Self {
		Self {
			capacity: DEFAULT_EVENT_CAPACITY,
		}
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventsConfigLayer {
	#[serde(default)]
	pub capacity: Option<usize>,
}

impl EventsConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.capacity.is_some() {
			self.capacity = other.capacity;
		}
	}

	pub fn finalize(self) -> EventsConfig {
		EventsConfig {
			capacity: self.capacity.unwrap_or(DEFAULT_EVENT_CAPACITY),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_capacity() {
		assert_eq!(EventsConfigLayer::default().finalize().capacity, 1024);
	}

	#[test]
	fn merge_overwrites_capacity() {
		let mut base = EventsConfigLayer {
			capacity: Some(8),
		};
		base.merge(EventsConfigLayer {
			capacity: Some(64),
		});
		assert_eq!(base.finalize().capacity, 64);
	}
}
