// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Scope-aware role-based access control for Warden.
//!
//! Every guarded action names an operation (`database.table.read`) and a target
//! scope instance (`database_table:12`). The evaluator walks the target's
//! ancestor chain, looks at the roles the actor and the actor's teams hold on
//! each level, and returns a [`Decision`]. Anything not explicitly allowed is
//! denied.
//!
//! # Architecture
//!
//! - `scope` - scope types and the tree of scope instances
//! - `operation` - the catalog of guarded operations
//! - `role` - role definitions, built-in roles and the role store
//! - `assignment` - (subject, role, scope) bindings and the assignment store
//! - `evaluator` - permission checks and per-request sessions
//! - `service` - the [`AccessControl`] facade used by handlers
//! - `events` - broadcast of role and scope changes
//! - `policy` - declarative policy files
//! - `api_error` - stable API error codes
//!
//! # Example
//!
//! ```ignore
//! use warden_core::{AccessControl, Actor, ScopeRef, UserId, SubjectRef, builtin};
//!
//! let access = AccessControl::in_memory()?;
//! access.freeze();
//! access.insert_scope(ScopeRef::new("workspace", 1), None)?;
//! access
//!     .assign_role(SubjectRef::user(UserId::new(7)), builtin::VIEWER, &ScopeRef::new("workspace", 1), None)
//!     .await?;
//!
//! let decision = access
//!     .can_perform(&Actor::new(UserId::new(7)), "workspace.read", &ScopeRef::new("workspace", 1))
//!     .await?;
//! assert!(decision.is_allowed());
//! ```

pub mod api_error;
pub mod assignment;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod operation;
pub mod policy;
pub mod role;
pub mod scope;
pub mod service;
pub mod types;

#[cfg(test)]
mod testing;

pub use api_error::{error_code, ApiError, ErrorCode};
pub use assignment::{AssignmentChange, AssignmentStore, InMemoryAssignmentStore, RoleAssignment};
pub use error::{AuthzError, StoreError};
pub use evaluator::{CheckSession, Decision, DenyCause, DenyReason, Evaluator, Grant};
pub use events::{AuthzEvent, EventBus, DEFAULT_EVENT_CAPACITY};
pub use operation::{OperationRegistry, OperationType, RegistryError, DEFAULT_OPERATIONS};
pub use policy::{Policy, PolicyError, PolicySummary};
pub use role::{
	builtin, Effect, InMemoryRoleStore, OperationMatcher, Role, RoleError, RoleRule, RoleStore,
	Unmatched,
};
pub use scope::{HasScope, ScopeError, ScopeHierarchy, DEFAULT_SCOPE_TYPES};
pub use service::AccessControl;
pub use types::{
	Actor, AssignmentId, Capability, OperationId, ParseRefError, ScopeRef, ScopeType, SubjectKind,
	SubjectRef, TeamId, UserId,
};
