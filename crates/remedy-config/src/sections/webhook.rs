// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Inbound webhook configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::secret::SecretString;

pub const DEFAULT_SIGNATURE_HEADER: &str = "sentry-hook-signature";

/// Environment this deployment runs in.
///
/// Signature verification fails closed in production and fails open (with a
/// warning) everywhere else when no webhook secret is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
	#[default]
	Development,
	Staging,
	Production,
}

impl AppEnvironment {
	pub fn is_production(self) -> bool {
		self == AppEnvironment::Production
	}
}

impl FromStr for AppEnvironment {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"development" | "dev" | "local" => Ok(AppEnvironment::Development),
			"staging" | "stage" => Ok(AppEnvironment::Staging),
			"production" | "prod" => Ok(AppEnvironment::Production),
			other => Err(ConfigError::InvalidValue {
				key: "webhook.environment".to_string(),
				message: format!("unknown environment '{other}'"),
			}),
		}
	}
}

impl fmt::Display for AppEnvironment {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			AppEnvironment::Development => "development",
			AppEnvironment::Staging => "staging",
			AppEnvironment::Production => "production",
		};
		f.write_str(s)
	}
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebhookConfigLayer {
	#[serde(default)]
	pub environment: Option<AppEnvironment>,
	#[serde(default)]
	pub signature_header: Option<String>,
}

impl WebhookConfigLayer {
	pub fn merge(&mut self, other: WebhookConfigLayer) {
		if other.environment.is_some() {
			self.environment = other.environment;
		}
		if other.signature_header.is_some() {
			self.signature_header = other.signature_header;
		}
	}

	pub fn finalize(self, secret: Option<SecretString>) -> WebhookConfig {
		WebhookConfig {
			environment: self.environment.unwrap_or_default(),
			signature_header: self
				.signature_header
				.unwrap_or_else(|| DEFAULT_SIGNATURE_HEADER.to_string()),
			secret,
		}
	}
}

#[derive(Debug, Clone)]
pub struct WebhookConfig {
	pub environment: AppEnvironment,
	pub signature_header: String,
	pub secret: Option<SecretString>,
}

impl Default for WebhookConfig {
	fn default() -> Self {
		WebhookConfigLayer::default().finalize(None)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_environment_parsing() {
		assert_eq!(
			"PROD".parse::<AppEnvironment>().unwrap(),
			AppEnvironment::Production
		);
		assert_eq!(
			"staging".parse::<AppEnvironment>().unwrap(),
			AppEnvironment::Staging
		);
		assert!("qa".parse::<AppEnvironment>().is_err());
	}

	#[test]
	fn test_defaults() {
		let config = WebhookConfig::default();
		assert_eq!(config.environment, AppEnvironment::Development);
		assert_eq!(config.signature_header, "sentry-hook-signature");
		assert!(config.secret.is_none());
	}
}
