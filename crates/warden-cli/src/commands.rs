// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Subcommand definitions and their implementations.

use std::collections::BTreeSet;
use std::io::Write;

use chrono::{DateTime, Utc};
use clap::{ArgGroup, Args, Subcommand};
use serde::Serialize;
use warden_core::{
	AccessControl, Actor, Decision, OperationId, RoleAssignment, ScopeRef, SubjectRef, TeamId,
	Unmatched, UserId,
};

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Evaluate a single permission check
	Check(CheckArgs),
	/// List the operations an actor may perform on a scope
	Permissions(PermissionsArgs),
	/// List roles and the operations each one grants
	Roles,
	/// Give a user or team a role at a scope, replacing any role held there
	Assign(AssignArgs),
	/// Remove the role a user or team holds at a scope
	Revoke(RevokeArgs),
	/// List role assignments at a scope or held by a subject
	Assignments(AssignmentsArgs),
	/// Show version and build information
	Version,
}

#[derive(Args, Debug)]
pub struct ActorArgs {
	/// User id the check runs for
	#[arg(long)]
	pub user: i64,

	/// Team the user belongs to (repeatable)
	#[arg(long = "team", value_name = "TEAM")]
	pub teams: Vec<i64>,
}

impl ActorArgs {
	fn actor(&self) -> Actor {
		Actor::new(UserId::new(self.user)).with_teams(self.teams.iter().copied().map(TeamId::new))
	}
}

#[derive(Args, Debug)]
pub struct CheckArgs {
	#[command(flatten)]
	pub actor: ActorArgs,

	/// Operation id, e.g. `database.table.read`
	#[arg(long)]
	pub operation: String,

	/// Target scope as `type:id`, e.g. `database_table:12`
	#[arg(long)]
	pub scope: ScopeRef,

	/// Evaluate as of this RFC 3339 time instead of now
	#[arg(long)]
	pub at: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
pub struct PermissionsArgs {
	#[command(flatten)]
	pub actor: ActorArgs,

	/// Target scope as `type:id`
	#[arg(long)]
	pub scope: ScopeRef,
}

#[derive(Args, Debug)]
pub struct AssignArgs {
	/// Subject as `user:<id>` or `team:<id>`
	#[arg(long)]
	pub subject: SubjectRef,

	#[arg(long)]
	pub role: String,

	/// Scope as `type:id`
	#[arg(long)]
	pub scope: ScopeRef,

	/// RFC 3339 time after which the assignment no longer applies
	#[arg(long)]
	pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
pub struct RevokeArgs {
	/// Subject as `user:<id>` or `team:<id>`
	#[arg(long)]
	pub subject: SubjectRef,

	/// Scope as `type:id`
	#[arg(long)]
	pub scope: ScopeRef,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("filter").required(true).args(["scope", "subject"])))]
pub struct AssignmentsArgs {
	/// Assignments bound directly to this scope
	#[arg(long)]
	pub scope: Option<ScopeRef>,

	/// Assignments held by this subject
	#[arg(long)]
	pub subject: Option<SubjectRef>,
}

/// How a command finished, mapped to the process exit code by `main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	Success,
	/// A `check` evaluated to deny.
	Denied,
}

#[derive(Debug, Serialize)]
struct RoleListing {
	name: String,
	description: Option<String>,
	builtin: bool,
	unmatched: Unmatched,
	grants: BTreeSet<OperationId>,
}

/// Run a command against `access`, writing results to `out`.
pub async fn run(
	access: &AccessControl,
	command: Command,
	json: bool,
	out: &mut dyn Write,
) -> anyhow::Result<Outcome> {
	match command {
		Command::Check(args) => check(access, args, json, out).await,
		Command::Permissions(args) => permissions(access, args, json, out).await,
		Command::Roles => roles(access, json, out).await,
		Command::Assign(args) => assign(access, args, json, out).await,
		Command::Revoke(args) => revoke(access, args, json, out).await,
		Command::Assignments(args) => assignments(access, args, json, out).await,
		Command::Version => {
			writeln!(out, "{}", crate::version::format_version_info())?;
			Ok(Outcome::Success)
		}
	}
}

async fn check(
	access: &AccessControl,
	args: CheckArgs,
	json: bool,
	out: &mut dyn Write,
) -> anyhow::Result<Outcome> {
	let actor = args.actor.actor();
	let now = args.at.unwrap_or_else(Utc::now);
	let decision = access
		.evaluator()
		.can_perform_at(&actor, &args.operation, &args.scope, now)
		.await?;

	if json {
		writeln!(out, "{}", serde_json::to_string_pretty(&decision)?)?;
	} else {
		match &decision {
			Decision::Allow(grant) => writeln!(
				out,
				"allow: '{}' on '{}' via role '{}' held by {} at '{}'",
				grant.operation, grant.target, grant.role, grant.subject, grant.scope
			)?,
			Decision::Deny(reason) => writeln!(out, "deny: {reason}")?,
		}
	}

	Ok(if decision.is_allowed() {
		Outcome::Success
	} else {
		Outcome::Denied
	})
}

async fn permissions(
	access: &AccessControl,
	args: PermissionsArgs,
	json: bool,
	out: &mut dyn Write,
) -> anyhow::Result<Outcome> {
	let operations = access
		.permitted_operations(&args.actor.actor(), &args.scope)
		.await?;

	if json {
		writeln!(out, "{}", serde_json::to_string_pretty(&operations)?)?;
	} else {
		for operation in &operations {
			writeln!(out, "{operation}")?;
		}
	}
	Ok(Outcome::Success)
}

async fn roles(access: &AccessControl, json: bool, out: &mut dyn Write) -> anyhow::Result<Outcome> {
	let listings: Vec<RoleListing> = access
		.list_roles()
		.await?
		.into_iter()
		.map(|role| RoleListing {
			grants: role.operations_granted(access.registry()),
			builtin: role.is_builtin(),
			name: role.name,
			description: role.description,
			unmatched: role.unmatched,
		})
		.collect();

	if json {
		writeln!(out, "{}", serde_json::to_string_pretty(&listings)?)?;
		return Ok(Outcome::Success);
	}

	for listing in &listings {
		let kind = if listing.builtin { "built-in" } else { "custom" };
		writeln!(
			out,
			"{} ({kind}, unmatched: {}, {} operations)",
			listing.name,
			listing.unmatched,
			listing.grants.len()
		)?;
		if let Some(description) = &listing.description {
			writeln!(out, "  {description}")?;
		}
		for operation in &listing.grants {
			writeln!(out, "    {operation}")?;
		}
	}
	Ok(Outcome::Success)
}

async fn assign(
	access: &AccessControl,
	args: AssignArgs,
	json: bool,
	out: &mut dyn Write,
) -> anyhow::Result<Outcome> {
	let assignment = access
		.assign_role(args.subject, &args.role, &args.scope, args.expires_at)
		.await?;

	if json {
		writeln!(out, "{}", serde_json::to_string_pretty(&assignment)?)?;
	} else {
		writeln!(
			out,
			"assigned '{}' to {} at '{}'",
			assignment.role, assignment.subject, assignment.scope
		)?;
	}
	Ok(Outcome::Success)
}

async fn revoke(
	access: &AccessControl,
	args: RevokeArgs,
	json: bool,
	out: &mut dyn Write,
) -> anyhow::Result<Outcome> {
	let removed = access.revoke_role(&args.subject, &args.scope).await?;

	if json {
		writeln!(out, "{}", serde_json::to_string_pretty(&removed)?)?;
		return Ok(Outcome::Success);
	}

	match removed {
		Some(assignment) => writeln!(
			out,
			"revoked '{}' from {} at '{}'",
			assignment.role, assignment.subject, assignment.scope
		)?,
		None => writeln!(out, "{} holds no role at '{}'", args.subject, args.scope)?,
	}
	Ok(Outcome::Success)
}

async fn assignments(
	access: &AccessControl,
	args: AssignmentsArgs,
	json: bool,
	out: &mut dyn Write,
) -> anyhow::Result<Outcome> {
	let listed = match (&args.scope, &args.subject) {
		(Some(scope), _) => access.assignments_at(scope).await?,
		(None, Some(subject)) => access.assignments_of(subject).await?,
		(None, None) => anyhow::bail!("either --scope or --subject is required"),
	};

	if json {
		writeln!(out, "{}", serde_json::to_string_pretty(&listed)?)?;
	} else {
		for assignment in &listed {
			writeln!(out, "{}", format_assignment(assignment))?;
		}
	}
	Ok(Outcome::Success)
}

fn format_assignment(assignment: &RoleAssignment) -> String {
	match assignment.expires_at {
		Some(expires_at) => format!(
			"{}\t{}\t{}\texpires {}",
			assignment.subject,
			assignment.role,
			assignment.scope,
			expires_at.to_rfc3339()
		),
		None => format!(
			"{}\t{}\t{}",
			assignment.subject, assignment.role, assignment.scope
		),
	}
}
