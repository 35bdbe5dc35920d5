// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Startup and process-level failures. All of them are fatal.
#[derive(Debug, Error)]
pub enum ServerError {
	#[error("configuration error: {0}")]
	Config(#[from] remedy_config::ConfigError),

	#[error("queue error: {0}")]
	Queue(#[from] remedy_queue::QueueError),

	#[error("policy error: {0}")]
	Policy(#[from] remedy_policy::PolicyError),

	#[error("enrichment error: {0}")]
	Enrich(#[from] remedy_enrich::EnrichError),

	#[error("kubernetes error: {0}")]
	K8s(#[from] remedy_sandbox::K8sError),

	#[error("sandbox error: {0}")]
	Sandbox(#[from] remedy_sandbox::SandboxError),

	#[error("worker error: {0}")]
	Worker(#[from] remedy_worker::WorkerError),

	#[error("io error: {0}")]
	Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
