// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `warden` - inspect and manage scope-aware role assignments.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use warden_config::{LoggingConfig, WardenConfig};

mod bootstrap;
mod commands;
#[cfg(test)]
mod testing;
mod version;

use commands::{Command, Outcome};

/// Warden - scope-aware role-based access control.
#[derive(Parser, Debug)]
#[command(name = "warden", about = "Scope-aware role-based access control", version)]
struct Args {
	/// Config file (defaults to /etc/warden/warden.toml)
	#[arg(long, global = true, env = "WARDEN_CONFIG")]
	config: Option<PathBuf>,

	/// Print results as JSON
	#[arg(long, global = true)]
	json: bool,

	#[command(subcommand)]
	command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
	let args = Args::parse();

	if let Command::Version = args.command {
		println!("{}", version::format_version_info());
		return Ok(ExitCode::SUCCESS);
	}

	let config = load_config(args.config.as_ref())?;
	init_tracing(&config.logging);
	config.log_summary();

	let access = bootstrap::open(&config).await?;
	let mut stdout = std::io::stdout().lock();
	let outcome = commands::run(&access, args.command, args.json, &mut stdout).await?;

	Ok(match outcome {
		Outcome::Success => ExitCode::SUCCESS,
		Outcome::Denied => ExitCode::from(2),
	})
}

fn load_config(path: Option<&PathBuf>) -> Result<WardenConfig, warden_config::ConfigError> {
	match path {
		Some(path) => warden_config::load_config_with_file(path),
		None => warden_config::load_config(),
	}
}

/// `RUST_LOG` wins over the configured level. Logs go to stderr so command
/// output on stdout stays parseable.
fn init_tracing(logging: &LoggingConfig) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| logging.level.clone().into());

	let registry = tracing_subscriber::registry().with(filter);
	if logging.json {
		registry
			.with(
				tracing_subscriber::fmt::layer()
					.json()
					.with_writer(std::io::stderr),
			)
			.init();
	} else {
		registry
			.with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
			.init();
	}
}
