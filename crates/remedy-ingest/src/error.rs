// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
	#[error("missing webhook signature")]
	MissingSignature,

	#[error("invalid webhook signature")]
	InvalidSignature,

	#[error("webhook secret not configured")]
	SecretNotConfigured,

	#[error("invalid webhook payload: {0}")]
	InvalidPayload(String),

	#[error("queue error: {0}")]
	Queue(#[from] remedy_queue::QueueError),

	#[error("policy error: {0}")]
	Policy(#[from] remedy_policy::PolicyError),
}

impl IngestError {
	/// Authenticity failures map to 401; everything else is unexpected.
	pub fn is_unauthorized(&self) -> bool {
		matches!(
			self,
			IngestError::MissingSignature
				| IngestError::InvalidSignature
				| IngestError::SecretNotConfigured
		)
	}
}

impl From<serde_json::Error> for IngestError {
	fn from(e: serde_json::Error) -> Self {
		IngestError::InvalidPayload(e.to_string())
	}
}

pub type Result<T> = std::result::Result<T, IngestError>;
