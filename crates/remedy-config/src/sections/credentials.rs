// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! External service endpoints and their credentials.
//!
//! Credentials are never read from the TOML file. They come from the
//! environment (or `*_FILE` mounts) and are attached during finalization.

use serde::{Deserialize, Serialize};

use crate::secret::SecretString;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentryConfigLayer {
	#[serde(default)]
	pub base_url: Option<String>,
	#[serde(default)]
	pub timeout_secs: Option<u64>,
	#[serde(default)]
	pub max_retries: Option<u32>,
}

impl SentryConfigLayer {
	pub fn merge(&mut self, other: SentryConfigLayer) {
		if other.base_url.is_some() {
			self.base_url = other.base_url;
		}
		if other.timeout_secs.is_some() {
			self.timeout_secs = other.timeout_secs;
		}
		if other.max_retries.is_some() {
			self.max_retries = other.max_retries;
		}
	}

	pub fn finalize(self, auth_token: Option<SecretString>) -> SentryConfig {
		SentryConfig {
			base_url: self
				.base_url
				.unwrap_or_else(|| "https://sentry.io".to_string())
				.trim_end_matches('/')
				.to_string(),
			timeout_secs: self.timeout_secs.unwrap_or(30),
			max_retries: self.max_retries.unwrap_or(3),
			auth_token,
		}
	}
}

/// Issue tracker API used for enrichment.
#[derive(Debug, Clone)]
pub struct SentryConfig {
	pub base_url: String,
	pub timeout_secs: u64,
	pub max_retries: u32,
	pub auth_token: Option<SecretString>,
}

impl Default for SentryConfig {
	fn default() -> Self {
		SentryConfigLayer::default().finalize(None)
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHubConfigLayer {
	/// `owner/name` of the repository fixes are proposed against.
	#[serde(default)]
	pub repository: Option<String>,
	#[serde(default)]
	pub base_branch: Option<String>,
}

impl GitHubConfigLayer {
	pub fn merge(&mut self, other: GitHubConfigLayer) {
		if other.repository.is_some() {
			self.repository = other.repository;
		}
		if other.base_branch.is_some() {
			self.base_branch = other.base_branch;
		}
	}

	pub fn finalize(self, token: Option<SecretString>) -> GitHubConfig {
		GitHubConfig {
			repository: self.repository,
			base_branch: self.base_branch.unwrap_or_else(|| "main".to_string()),
			token,
		}
	}
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
	pub repository: Option<String>,
	pub base_branch: String,
	pub token: Option<SecretString>,
}

impl Default for GitHubConfig {
	fn default() -> Self {
		GitHubConfigLayer::default().finalize(None)
	}
}

/// Language model credentials passed through to the sandbox agent.
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
	pub api_key: Option<SecretString>,
}
