// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types shared across the pipeline.

use thiserror::Error;

use crate::job::JobState;

#[derive(Debug, Error)]
pub enum CoreError {
	#[error("invalid job transition: {from} -> {to}")]
	InvalidTransition { from: JobState, to: JobState },

	#[error("error report is missing an event id")]
	MissingEventId,

	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
