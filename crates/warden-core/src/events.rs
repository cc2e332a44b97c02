// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Domain events published on role and scope changes.
//!
//! Subscribers such as audit logging or permission-cache invalidation call
//! [`EventBus::subscribe`]. Publishing never blocks; a subscriber that falls
//! more than the channel capacity behind observes `RecvError::Lagged`.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::assignment::RoleAssignment;
use crate::types::ScopeRef;

/// Default broadcast channel capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthzEvent {
	RoleAssigned {
		assignment: RoleAssignment,
		/// Role replaced by this assignment, if the subject already held one.
		previous_role: Option<String>,
	},
	RoleRevoked {
		assignment: RoleAssignment,
	},
	ScopeRemoved {
		scope: ScopeRef,
		/// The scope and all of its descendants.
		removed: Vec<ScopeRef>,
		revoked_assignments: usize,
	},
}

impl AuthzEvent {
	pub fn name(&self) -> &'static str {
		match self {
			AuthzEvent::RoleAssigned { .. } => "role_assigned",
			AuthzEvent::RoleRevoked { .. } => "role_revoked",
			AuthzEvent::ScopeRemoved { .. } => "scope_removed",
		}
	}
}

#[derive(Debug, Clone)]
pub struct EventBus {
	sender: broadcast::Sender<AuthzEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity.max(1));
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<AuthzEvent> {
		self.sender.subscribe()
	}

	/// Publish an event, returning how many subscribers received it.
	pub fn publish(&self, event: AuthzEvent) -> usize {
		let name = event.name();
		match self.sender.send(event) {
			Ok(receivers) => {
				tracing::trace!(event = name, receivers, "event published");
				receivers
			}
			Err(_) => 0,
		}
	}

	pub fn receiver_count(&self) -> usize {
		self.sender.receiver_count()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(DEFAULT_EVENT_CAPACITY)
	}
}
