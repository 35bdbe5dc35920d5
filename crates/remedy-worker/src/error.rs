// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use remedy_queue::MessageId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
	#[error("queue error: {0}")]
	Queue(#[from] remedy_queue::QueueError),

	#[error("enrichment error: {0}")]
	Enrich(#[from] remedy_enrich::EnrichError),

	#[error("sandbox error: {0}")]
	Sandbox(#[from] remedy_sandbox::SandboxError),

	#[error(transparent)]
	Core(#[from] remedy_core::CoreError),

	#[error("message {0} is not a valid error report")]
	Poison(MessageId),

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WorkerError>;
