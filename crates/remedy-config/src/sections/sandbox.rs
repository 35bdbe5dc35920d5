// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sandbox pod configuration.

use serde::{Deserialize, Serialize};

/// Sandbox configuration layer (for merging).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxConfigLayer {
	#[serde(default)]
	pub namespace: Option<String>,
	#[serde(default)]
	pub image: Option<String>,
	#[serde(default)]
	pub job_timeout_secs: Option<u64>,
	#[serde(default)]
	pub stop_grace_secs: Option<u32>,
	#[serde(default)]
	pub memory_limit: Option<String>,
	#[serde(default)]
	pub cpu_limit: Option<String>,
	#[serde(default)]
	pub image_pull_secrets: Option<Vec<String>>,
	#[serde(default)]
	pub service_account: Option<String>,
}

impl SandboxConfigLayer {
	pub fn merge(&mut self, other: SandboxConfigLayer) {
		if other.namespace.is_some() {
			self.namespace = other.namespace;
		}
		if other.image.is_some() {
			self.image = other.image;
		}
		if other.job_timeout_secs.is_some() {
			self.job_timeout_secs = other.job_timeout_secs;
		}
		if other.stop_grace_secs.is_some() {
			self.stop_grace_secs = other.stop_grace_secs;
		}
		if other.memory_limit.is_some() {
			self.memory_limit = other.memory_limit;
		}
		if other.cpu_limit.is_some() {
			self.cpu_limit = other.cpu_limit;
		}
		if other.image_pull_secrets.is_some() {
			self.image_pull_secrets = other.image_pull_secrets;
		}
		if other.service_account.is_some() {
			self.service_account = other.service_account;
		}
	}

	pub fn finalize(self) -> SandboxConfig {
		SandboxConfig {
			namespace: self
				.namespace
				.unwrap_or_else(|| "remedy-sandboxes".to_string()),
			image: self
				.image
				.unwrap_or_else(|| "ghcr.io/ghuntley/remedy-agent:latest".to_string()),
			job_timeout_secs: self.job_timeout_secs.unwrap_or(600),
			stop_grace_secs: self.stop_grace_secs.unwrap_or(30),
			memory_limit: self.memory_limit.unwrap_or_else(|| "4Gi".to_string()),
			cpu_limit: self.cpu_limit,
			image_pull_secrets: self.image_pull_secrets.unwrap_or_default(),
			service_account: self.service_account,
		}
	}
}

/// Sandbox configuration (runtime, resolved).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SandboxConfig {
	pub namespace: String,
	/// Pre-built agent image every sandbox runs.
	pub image: String,
	pub job_timeout_secs: u64,
	pub stop_grace_secs: u32,
	pub memory_limit: String,
	pub cpu_limit: Option<String>,
	pub image_pull_secrets: Vec<String>,
	pub service_account: Option<String>,
}

impl Default for SandboxConfig {
	fn default() -> Self {
		SandboxConfigLayer::default().finalize()
	}
}
