// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable queue configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfigLayer {
	/// Queue endpoint, e.g. `sqlite:/var/lib/remedy/queue.db`.
	#[serde(default)]
	pub url: Option<String>,
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub wait_time_secs: Option<u64>,
	#[serde(default)]
	pub visibility_timeout_secs: Option<u64>,
	#[serde(default)]
	pub max_receive_count: Option<u32>,
}

impl QueueConfigLayer {
	pub fn merge(&mut self, other: QueueConfigLayer) {
		if other.url.is_some() {
			self.url = other.url;
		}
		if other.name.is_some() {
			self.name = other.name;
		}
		if other.wait_time_secs.is_some() {
			self.wait_time_secs = other.wait_time_secs;
		}
		if other.visibility_timeout_secs.is_some() {
			self.visibility_timeout_secs = other.visibility_timeout_secs;
		}
		if other.max_receive_count.is_some() {
			self.max_receive_count = other.max_receive_count;
		}
	}

	pub fn finalize(self) -> QueueConfig {
		QueueConfig {
			url: self.url,
			name: self.name.unwrap_or_else(|| "error-fix".to_string()),
			wait_time_secs: self.wait_time_secs.unwrap_or(20),
			visibility_timeout_secs: self.visibility_timeout_secs.unwrap_or(900),
			max_receive_count: self.max_receive_count.unwrap_or(5),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
	pub url: Option<String>,
	pub name: String,
	/// Long poll duration for a single receive.
	pub wait_time_secs: u64,
	/// Must exceed the sandbox timeout plus its stop grace period.
	pub visibility_timeout_secs: u64,
	/// Receives after which a message is dead-lettered.
	pub max_receive_count: u32,
}

impl Default for QueueConfig {
	fn default() -> Self {
		QueueConfigLayer::default().finalize()
	}
}
