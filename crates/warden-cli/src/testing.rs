// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::io::Write;

use warden_config::WardenConfig;
use warden_core::AccessControl;

pub(crate) const POLICY: &str = r#"
[[scopes]]
scope = "workspace:1"

[[scopes]]
scope = "application:2"
parent = "workspace:1"

[[scopes]]
scope = "database_table:10"
parent = "application:2"

[[roles]]
name = "TABLE_READER"
rules = [{ effect = "allow", match = { exact = "database.table.read" } }]

[[assignments]]
subject = "user:7"
role = "VIEWER"
scope = "workspace:1"
"#;

pub(crate) fn policy_file() -> tempfile::NamedTempFile {
	let mut file = tempfile::NamedTempFile::new().unwrap();
	write!(file, "{POLICY}").unwrap();
	file
}

/// Service on a fresh in-memory database with [`POLICY`] applied. The policy
/// file is returned so it outlives the service.
pub(crate) async fn service() -> (AccessControl, tempfile::NamedTempFile) {
	let policy = policy_file();
	let mut config = WardenConfig::default();
	config.policy.path = Some(policy.path().to_path_buf());

	let pool = warden_db::testing::create_memory_pool().await.unwrap();
	let access = crate::bootstrap::build(pool, &config).await.unwrap();
	(access, policy)
}
