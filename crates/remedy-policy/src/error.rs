// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
	#[error("invalid ignore pattern '{pattern}': {source}")]
	InvalidPattern {
		pattern: String,
		#[source]
		source: regex::Error,
	},

	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, PolicyError>;
