// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite persistence for Warden.
//!
//! - `pool` - pool creation and schema migrations
//! - `role` - [`RoleRepository`], a [`warden_core::RoleStore`]
//! - `assignment` - [`AssignmentRepository`], a [`warden_core::AssignmentStore`]

pub mod assignment;
pub mod error;
pub mod pool;
pub mod role;
pub mod testing;

pub use assignment::AssignmentRepository;
pub use error::{DbError, Result};
pub use pool::{create_pool, run_migrations};
pub use role::RoleRepository;
