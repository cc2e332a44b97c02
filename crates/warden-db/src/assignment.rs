// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Role assignment repository.
//!
//! `UNIQUE(subject_type, subject_id, scope_type, scope_instance_id)` keeps one
//! assignment per subject and scope; [`AssignmentRepository::upsert_assignment`]
//! relies on it through `ON CONFLICT DO UPDATE`. Timestamps are stored as
//! fixed-width RFC 3339 strings so that expiry comparisons can run in SQL.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{
	sqlite::{Sqlite, SqlitePool, SqliteRow},
	QueryBuilder, Row,
};
use std::collections::HashMap;
use uuid::Uuid;
use warden_core::{
	Actor, AssignmentChange, AssignmentId, AssignmentStore, RoleAssignment, ScopeRef, ScopeType,
	StoreError, SubjectKind, SubjectRef,
};

use crate::error::DbError;

fn timestamp(at: DateTime<Utc>) -> String {
	at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, DbError> {
	DateTime::parse_from_rfc3339(value)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Corrupt(format!("Invalid {column} '{value}': {e}")))
}

/// SQLite-backed [`AssignmentStore`].
#[derive(Clone)]
pub struct AssignmentRepository {
	pool: SqlitePool,
}

impl AssignmentRepository {
	/// Create a new repository with the given pool.
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Insert or replace the assignment of `subject` at `scope`, keeping the
	/// id and creation time of an existing row.
	///
	/// The transaction starts with `BEGIN IMMEDIATE` so the write lock is held
	/// before the previous row is read. Concurrent writers queue on the busy
	/// timeout instead of failing with a stale snapshot.
	#[tracing::instrument(skip(self), fields(subject = %subject, scope = %scope, role = %role))]
	pub async fn upsert_assignment(
		&self,
		subject: SubjectRef,
		role: &str,
		scope: &ScopeRef,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<AssignmentChange, DbError> {
		let mut tx = self.pool.begin_with("BEGIN IMMEDIATE").await?;

		let previous = fetch_assignment(&mut *tx, &subject, scope).await?;

		sqlx::query(
			r#"
			INSERT INTO role_assignments
				(id, subject_type, subject_id, role_name, scope_type, scope_instance_id, expires_at, created_at)
			VALUES (?, ?, ?, ?, ?, ?, ?, ?)
			ON CONFLICT(subject_type, subject_id, scope_type, scope_instance_id) DO UPDATE SET
				role_name = excluded.role_name,
				expires_at = excluded.expires_at
			"#,
		)
		.bind(AssignmentId::generate().to_string())
		.bind(subject.kind.to_string())
		.bind(subject.id)
		.bind(role)
		.bind(scope.scope_type.as_str())
		.bind(scope.id)
		.bind(expires_at.map(timestamp))
		.bind(timestamp(Utc::now()))
		.execute(&mut *tx)
		.await?;

		let current = fetch_assignment(&mut *tx, &subject, scope)
			.await?
			.ok_or_else(|| DbError::Internal("Upserted assignment not found".to_string()))?;

		tx.commit().await?;

		tracing::debug!(replaced = previous.is_some(), "assignment stored");
		Ok(AssignmentChange { current, previous })
	}

	#[tracing::instrument(skip(self), fields(subject = %subject, scope = %scope))]
	pub async fn delete_assignment(
		&self,
		subject: &SubjectRef,
		scope: &ScopeRef,
	) -> Result<Option<RoleAssignment>, DbError> {
		let row = sqlx::query(
			r#"
			DELETE FROM role_assignments
			WHERE subject_type = ? AND subject_id = ? AND scope_type = ? AND scope_instance_id = ?
			RETURNING id, subject_type, subject_id, role_name, scope_type, scope_instance_id,
				expires_at, created_at
			"#,
		)
		.bind(subject.kind.to_string())
		.bind(subject.id)
		.bind(scope.scope_type.as_str())
		.bind(scope.id)
		.fetch_optional(&self.pool)
		.await?;

		row.map(|r| row_to_assignment(&r)).transpose()
	}

	#[tracing::instrument(skip(self), fields(scope = %scope))]
	pub async fn delete_scope_assignments(
		&self,
		scope: &ScopeRef,
	) -> Result<Vec<RoleAssignment>, DbError> {
		let rows = sqlx::query(
			r#"
			DELETE FROM role_assignments
			WHERE scope_type = ? AND scope_instance_id = ?
			RETURNING id, subject_type, subject_id, role_name, scope_type, scope_instance_id,
				expires_at, created_at
			"#,
		)
		.bind(scope.scope_type.as_str())
		.bind(scope.id)
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(row_to_assignment).collect()
	}

	/// Active assignments of the actor's user and teams at the scopes of `chain`,
	/// ordered by chain position, then user before teams, then team id.
	#[tracing::instrument(skip(self, chain), fields(user = %actor.user, levels = chain.len()))]
	pub async fn find_active(
		&self,
		actor: &Actor,
		chain: &[ScopeRef],
		now: DateTime<Utc>,
	) -> Result<Vec<RoleAssignment>, DbError> {
		if chain.is_empty() {
			return Ok(Vec::new());
		}

		let mut query = QueryBuilder::<Sqlite>::new(
			r#"
			SELECT id, subject_type, subject_id, role_name, scope_type, scope_instance_id,
				expires_at, created_at
			FROM role_assignments
			WHERE (expires_at IS NULL OR expires_at > "#,
		);
		query.push_bind(timestamp(now));

		query.push(") AND (");
		let mut scopes = query.separated(" OR ");
		for scope in chain {
			scopes.push("(scope_type = ");
			scopes.push_bind_unseparated(scope.scope_type.to_string());
			scopes.push_unseparated(" AND scope_instance_id = ");
			scopes.push_bind_unseparated(scope.id);
			scopes.push_unseparated(")");
		}

		query.push(") AND (");
		let mut subjects = query.separated(" OR ");
		for subject in actor.subjects() {
			subjects.push("(subject_type = ");
			subjects.push_bind_unseparated(subject.kind.to_string());
			subjects.push_unseparated(" AND subject_id = ");
			subjects.push_bind_unseparated(subject.id);
			subjects.push_unseparated(")");
		}
		query.push(")");

		let rows = query.build().fetch_all(&self.pool).await?;
		let mut found = rows
			.iter()
			.map(row_to_assignment)
			.collect::<Result<Vec<_>, _>>()?;

		let position: HashMap<&ScopeRef, usize> =
			chain.iter().enumerate().map(|(i, s)| (s, i)).collect();
		found.sort_by_key(|a| (position.get(&a.scope).copied().unwrap_or(usize::MAX), a.subject));
		Ok(found)
	}

	#[tracing::instrument(skip(self), fields(scope = %scope))]
	pub async fn list_by_scope(&self, scope: &ScopeRef) -> Result<Vec<RoleAssignment>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT id, subject_type, subject_id, role_name, scope_type, scope_instance_id,
				expires_at, created_at
			FROM role_assignments
			WHERE scope_type = ? AND scope_instance_id = ?
			ORDER BY CASE subject_type WHEN 'user' THEN 0 ELSE 1 END, subject_id
			"#,
		)
		.bind(scope.scope_type.as_str())
		.bind(scope.id)
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(row_to_assignment).collect()
	}

	#[tracing::instrument(skip(self), fields(subject = %subject))]
	pub async fn list_by_subject(
		&self,
		subject: &SubjectRef,
	) -> Result<Vec<RoleAssignment>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT id, subject_type, subject_id, role_name, scope_type, scope_instance_id,
				expires_at, created_at
			FROM role_assignments
			WHERE subject_type = ? AND subject_id = ?
			ORDER BY scope_type, scope_instance_id
			"#,
		)
		.bind(subject.kind.to_string())
		.bind(subject.id)
		.fetch_all(&self.pool)
		.await?;

		rows.iter().map(row_to_assignment).collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn count_by_role(&self, role: &str) -> Result<u64, DbError> {
		let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM role_assignments WHERE role_name = ?")
			.bind(role)
			.fetch_one(&self.pool)
			.await?;

		Ok(count.max(0) as u64)
	}
}

async fn fetch_assignment<'e, E>(
	executor: E,
	subject: &SubjectRef,
	scope: &ScopeRef,
) -> Result<Option<RoleAssignment>, DbError>
where
	E: sqlx::Executor<'e, Database = Sqlite>,
{
	let row = sqlx::query(
		r#"
		SELECT id, subject_type, subject_id, role_name, scope_type, scope_instance_id,
			expires_at, created_at
		FROM role_assignments
		WHERE subject_type = ? AND subject_id = ? AND scope_type = ? AND scope_instance_id = ?
		"#,
	)
	.bind(subject.kind.to_string())
	.bind(subject.id)
	.bind(scope.scope_type.as_str())
	.bind(scope.id)
	.fetch_optional(executor)
	.await?;

	row.map(|r| row_to_assignment(&r)).transpose()
}

fn row_to_assignment(row: &SqliteRow) -> Result<RoleAssignment, DbError> {
	let id_str: String = row.get("id");
	let subject_type: String = row.get("subject_type");
	let scope_type: String = row.get("scope_type");
	let expires_at: Option<String> = row.get("expires_at");
	let created_at: String = row.get("created_at");

	let id = Uuid::parse_str(&id_str)
		.map_err(|e| DbError::Corrupt(format!("Invalid assignment ID '{id_str}': {e}")))?;
	let kind: SubjectKind = subject_type
		.parse()
		.map_err(|e| DbError::Corrupt(format!("Invalid subject type: {e}")))?;

	Ok(RoleAssignment {
		id: AssignmentId::new(id),
		subject: SubjectRef {
			kind,
			id: row.get("subject_id"),
		},
		role: row.get("role_name"),
		scope: ScopeRef::new(ScopeType::new(scope_type), row.get("scope_instance_id")),
		expires_at: expires_at
			.map(|value| parse_timestamp("expires_at", &value))
			.transpose()?,
		created_at: parse_timestamp("created_at", &created_at)?,
	})
}

#[async_trait]
impl AssignmentStore for AssignmentRepository {
	async fn assign(
		&self,
		subject: SubjectRef,
		role: &str,
		scope: &ScopeRef,
		expires_at: Option<DateTime<Utc>>,
	) -> Result<AssignmentChange, StoreError> {
		Ok(self.upsert_assignment(subject, role, scope, expires_at).await?)
	}

	async fn revoke(
		&self,
		subject: &SubjectRef,
		scope: &ScopeRef,
	) -> Result<Option<RoleAssignment>, StoreError> {
		Ok(self.delete_assignment(subject, scope).await?)
	}

	async fn revoke_scope(&self, scope: &ScopeRef) -> Result<Vec<RoleAssignment>, StoreError> {
		Ok(self.delete_scope_assignments(scope).await?)
	}

	async fn assignments_for(
		&self,
		actor: &Actor,
		chain: &[ScopeRef],
		now: DateTime<Utc>,
	) -> Result<Vec<RoleAssignment>, StoreError> {
		Ok(self.find_active(actor, chain, now).await?)
	}

	async fn list_for_scope(&self, scope: &ScopeRef) -> Result<Vec<RoleAssignment>, StoreError> {
		Ok(self.list_by_scope(scope).await?)
	}

	async fn list_for_subject(
		&self,
		subject: &SubjectRef,
	) -> Result<Vec<RoleAssignment>, StoreError> {
		Ok(self.list_by_subject(subject).await?)
	}

	async fn count_for_role(&self, role: &str) -> Result<u64, StoreError> {
		Ok(self.count_by_role(role).await?)
	}
}
