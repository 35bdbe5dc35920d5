// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Remedy binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use remedy_server::{app, telemetry, version};

/// Remedy - turns production errors into sandboxed fix attempts.
#[derive(Parser, Debug)]
#[command(name = "remedy", about = "Autonomous error remediation pipeline", version)]
struct Args {
	/// Config file (defaults to /etc/remedy/remedy.toml)
	#[arg(long, env = "REMEDY_CONFIG")]
	config: Option<PathBuf>,

	/// Enrich the next queued message and print it without acknowledging it
	#[arg(long, conflicts_with = "clear_queue")]
	test_sentry_message: bool,

	/// Acknowledge and discard every queued message
	#[arg(long)]
	clear_queue: bool,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Show version and build information
	Version,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config = remedy_config::load_config(args.config)?;
	telemetry::init_tracing(&config.logging);

	if args.clear_queue {
		let drained = app::clear_queue(&config).await?;
		println!("drained {drained} message(s)");
		return Ok(());
	}

	if args.test_sentry_message {
		match app::preview(&config).await? {
			Some(preview) => print!("{}", preview.render()?),
			None => println!("queue is empty"),
		}
		return Ok(());
	}

	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		worker = config.worker.enabled,
		"starting remedy"
	);
	app::serve(config).await?;
	Ok(())
}
