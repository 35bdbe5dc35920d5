// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

#[derive(Error, Debug)]
pub enum K8sError {
	#[error("K8s API error: {message}")]
	ApiError { message: String },

	#[error("Pod not found: {name}")]
	PodNotFound { name: String },

	#[error("Namespace not found: {name}")]
	NamespaceNotFound { name: String },
}

impl From<kube::Error> for K8sError {
	fn from(err: kube::Error) -> Self {
		K8sError::ApiError {
			message: err.to_string(),
		}
	}
}

#[derive(Error, Debug)]
pub enum SandboxError {
	#[error("kubernetes error: {0}")]
	K8s(#[from] K8sError),

	#[error("failed to serialize error context: {0}")]
	Context(#[from] remedy_core::CoreError),

	#[error("sandbox pod {pod} failed to start: {reason}")]
	StartFailed { pod: String, reason: String },

	#[error("sandbox pod {pod} disappeared before finishing")]
	Vanished { pod: String },

	#[error("sandbox for job {job_id} is already running")]
	AlreadyRunning { job_id: String },
}
