// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sandboxed execution of remediation attempts.
//!
//! Each attempt runs in its own short-lived pod built from a fixed agent
//! image. The error context and credentials reach the agent through
//! environment variables only. Live pods are tracked in a registry so the
//! worker can gate on capacity and tear everything down on shutdown.

mod client;
mod error;
mod kube_client;
mod pod;
mod runner;
pub mod testing;

pub use client::K8sClient;
pub use error::{K8sError, SandboxError};
pub use kube_client::KubeClient;
pub use pod::{
	build_pod_spec, sanitize_label_value, AgentCredentials, CONTAINER_NAME, ENV_BASE_BRANCH,
	ENV_ERROR_CONTEXT, ENV_GITHUB_REPOSITORY, ENV_GITHUB_TOKEN, ENV_JOB_ID, ENV_LLM_API_KEY,
	JOB_ID_LABEL, MANAGED_LABEL,
};
pub use runner::{SandboxHandle, SandboxOutcome, SandboxRunner};
