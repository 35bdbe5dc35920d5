// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerConfigLayer {
	#[serde(default)]
	pub enabled: Option<bool>,
	#[serde(default)]
	pub max_concurrent_jobs: Option<usize>,
	#[serde(default)]
	pub poll_interval_secs: Option<u64>,
	#[serde(default)]
	pub shutdown_timeout_secs: Option<u64>,
	#[serde(default)]
	pub log_tail_lines: Option<usize>,
}

impl WorkerConfigLayer {
	pub fn merge(&mut self, other: WorkerConfigLayer) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.max_concurrent_jobs.is_some() {
			self.max_concurrent_jobs = other.max_concurrent_jobs;
		}
		if other.poll_interval_secs.is_some() {
			self.poll_interval_secs = other.poll_interval_secs;
		}
		if other.shutdown_timeout_secs.is_some() {
			self.shutdown_timeout_secs = other.shutdown_timeout_secs;
		}
		if other.log_tail_lines.is_some() {
			self.log_tail_lines = other.log_tail_lines;
		}
	}

	pub fn finalize(self) -> WorkerConfig {
		WorkerConfig {
			enabled: self.enabled.unwrap_or(true),
			max_concurrent_jobs: self.max_concurrent_jobs.unwrap_or(2),
			poll_interval_secs: self.poll_interval_secs.unwrap_or(5),
			shutdown_timeout_secs: self.shutdown_timeout_secs.unwrap_or(30),
			log_tail_lines: self.log_tail_lines.unwrap_or(40),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerConfig {
	/// Run the queue consumer alongside the webhook server.
	pub enabled: bool,
	pub max_concurrent_jobs: usize,
	pub poll_interval_secs: u64,
	/// Upper bound on waiting for in-flight jobs after `stop_all`.
	pub shutdown_timeout_secs: u64,
	pub log_tail_lines: usize,
}

impl Default for WorkerConfig {
	fn default() -> Self {
		WorkerConfigLayer::default().finalize()
	}
}
