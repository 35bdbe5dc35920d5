// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Remediation eligibility policy.

use serde::{Deserialize, Serialize};

const DEFAULT_IGNORED_ERROR_TYPES: &[&str] = &["URIError", "ChunkLoadError", "AbortError"];

// Browser noise that is not actionable from source.
const DEFAULT_IGNORED_MESSAGE_PATTERNS: &[&str] = &[
	"ResizeObserver loop",
	"Failed to fetch",
	"Load failed",
	"NetworkError when attempting to fetch resource",
];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyConfigLayer {
	#[serde(default)]
	pub enabled: Option<bool>,
	#[serde(default)]
	pub allowed_environments: Option<Vec<String>>,
	#[serde(default)]
	pub ignored_error_types: Option<Vec<String>>,
	#[serde(default)]
	pub ignored_message_patterns: Option<Vec<String>>,
	#[serde(default)]
	pub min_occurrences: Option<u32>,
	#[serde(default)]
	pub max_fixes_per_hour: Option<u32>,
}

impl PolicyConfigLayer {
	pub fn merge(&mut self, other: PolicyConfigLayer) {
		if other.enabled.is_some() {
			self.enabled = other.enabled;
		}
		if other.allowed_environments.is_some() {
			self.allowed_environments = other.allowed_environments;
		}
		if other.ignored_error_types.is_some() {
			self.ignored_error_types = other.ignored_error_types;
		}
		if other.ignored_message_patterns.is_some() {
			self.ignored_message_patterns = other.ignored_message_patterns;
		}
		if other.min_occurrences.is_some() {
			self.min_occurrences = other.min_occurrences;
		}
		if other.max_fixes_per_hour.is_some() {
			self.max_fixes_per_hour = other.max_fixes_per_hour;
		}
	}

	pub fn finalize(self) -> PolicyConfig {
		let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
		PolicyConfig {
			enabled: self.enabled.unwrap_or(true),
			allowed_environments: self
				.allowed_environments
				.unwrap_or_else(|| vec!["production".to_string()]),
			ignored_error_types: self
				.ignored_error_types
				.unwrap_or_else(|| owned(DEFAULT_IGNORED_ERROR_TYPES)),
			ignored_message_patterns: self
				.ignored_message_patterns
				.unwrap_or_else(|| owned(DEFAULT_IGNORED_MESSAGE_PATTERNS)),
			min_occurrences: self.min_occurrences.unwrap_or(1),
			max_fixes_per_hour: self.max_fixes_per_hour.unwrap_or(10),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
	pub enabled: bool,
	pub allowed_environments: Vec<String>,
	pub ignored_error_types: Vec<String>,
	/// Case-insensitive regular expressions matched against the message.
	pub ignored_message_patterns: Vec<String>,
	pub min_occurrences: u32,
	pub max_fixes_per_hour: u32,
}

impl Default for PolicyConfig {
	fn default() -> Self {
		PolicyConfigLayer::default().finalize()
	}
}
