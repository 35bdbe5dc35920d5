// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

use crate::retry::RetryableError;

#[derive(Debug, Error)]
pub enum EnrichError {
	#[error("cannot enrich report {event_id}: {reason}")]
	Unenrichable {
		event_id: String,
		reason: &'static str,
	},

	#[error("http error: {0}")]
	Http(String),

	#[error("request timed out")]
	Timeout,

	#[error("issue tracker returned {status}: {body}")]
	Status { status: u16, body: String },

	#[error("invalid response: {0}")]
	InvalidResponse(String),

	#[error("issue id {0:?} is not numeric")]
	InvalidIssueId(String),
}

impl From<reqwest::Error> for EnrichError {
	fn from(e: reqwest::Error) -> Self {
		if e.is_timeout() {
			EnrichError::Timeout
		} else if e.is_decode() {
			EnrichError::InvalidResponse(e.to_string())
		} else {
			EnrichError::Http(e.to_string())
		}
	}
}

impl RetryableError for EnrichError {
	fn is_retryable(&self) -> bool {
		match self {
			EnrichError::Http(_) | EnrichError::Timeout => true,
			EnrichError::Status { status, .. } => *status == 408 || *status == 429 || *status >= 500,
			EnrichError::Unenrichable { .. }
			| EnrichError::InvalidResponse(_)
			| EnrichError::InvalidIssueId(_) => false,
		}
	}
}

pub type Result<T> = std::result::Result<T, EnrichError>;
