// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration for the Remedy pipeline.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Redacted [`Secret`] values loaded with `VAR` / `VAR_FILE` support
//! - Startup validation, including the credentials the worker cannot run without
//!
//! # Usage
//!
//! ```ignore
//! use remedy_config::load_config;
//!
//! let config = load_config(None)?;
//! println!("listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod secret;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::RemedyConfigLayer;
pub use secret::{load_secret_env, Secret, SecretEnvError, SecretString};
pub use sections::*;
pub use sources::{
	ConfigSource, DefaultsSource, EnvSource, Precedence, Secrets, TomlSource, ENV_GITHUB_TOKEN,
	ENV_LLM_API_KEY, ENV_SENTRY_AUTH_TOKEN, ENV_WEBHOOK_SECRET,
};

use std::path::PathBuf;

use regex::RegexBuilder;
use tracing::{debug, info, warn};

/// Fully resolved configuration.
#[derive(Debug, Clone, Default)]
pub struct RemedyConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub webhook: WebhookConfig,
	pub policy: PolicyConfig,
	pub queue: QueueConfig,
	pub worker: WorkerConfig,
	pub sandbox: SandboxConfig,
	pub sentry: SentryConfig,
	pub github: GitHubConfig,
	pub llm: LlmConfig,
	pub logging: LoggingConfig,
}

/// Everything a worker needs before it may start polling.
#[derive(Debug, Clone)]
pub struct WorkerCredentials {
	pub queue_url: String,
	pub github_token: SecretString,
	pub llm_api_key: SecretString,
	pub repository: String,
	pub base_branch: String,
}

impl RemedyConfig {
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}

	pub fn require_queue_url(&self) -> Result<&str, ConfigError> {
		self
			.queue
			.url
			.as_deref()
			.ok_or_else(|| ConfigError::Missing("REMEDY_QUEUE_URL".to_string()))
	}

	/// Checks the credentials the worker cannot run without.
	///
	/// Every missing value is reported at once so an operator can fix the
	/// deployment in one pass.
	pub fn require_worker_credentials(&self) -> Result<WorkerCredentials, ConfigError> {
		let mut missing = Vec::new();
		if self.queue.url.is_none() {
			missing.push("REMEDY_QUEUE_URL");
		}
		if self.github.token.is_none() {
			missing.push(ENV_GITHUB_TOKEN);
		}
		if self.llm.api_key.is_none() {
			missing.push(ENV_LLM_API_KEY);
		}
		if self.github.repository.is_none() {
			missing.push("REMEDY_GITHUB_REPOSITORY");
		}

		match (
			&self.queue.url,
			&self.github.token,
			&self.llm.api_key,
			&self.github.repository,
		) {
			(Some(queue_url), Some(github_token), Some(llm_api_key), Some(repository)) => {
				Ok(WorkerCredentials {
					queue_url: queue_url.clone(),
					github_token: github_token.clone(),
					llm_api_key: llm_api_key.clone(),
					repository: repository.clone(),
					base_branch: self.github.base_branch.clone(),
				})
			}
			_ => Err(ConfigError::Missing(missing.join(", "))),
		}
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`REMEDY_*`)
/// 2. Config file (`config_path`, or `/etc/remedy/remedy.toml`)
/// 3. Built-in defaults
pub fn load_config(config_path: Option<PathBuf>) -> Result<RemedyConfig, ConfigError> {
	let toml = match config_path {
		Some(path) => TomlSource::new(path),
		None => TomlSource::system(),
	};
	let mut sources: Vec<Box<dyn ConfigSource>> =
		vec![Box::new(EnvSource), Box::new(toml), Box::new(DefaultsSource)];

	sources.sort_by_key(|s| s.precedence());

	let mut merged = RemedyConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged, Secrets::from_env()?)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: RemedyConfigLayer, secrets: Secrets) -> Result<RemedyConfig, ConfigError> {
	let config = RemedyConfig {
		http: layer.http.unwrap_or_default().finalize(),
		database: layer.database.unwrap_or_default().finalize(),
		webhook: layer
			.webhook
			.unwrap_or_default()
			.finalize(secrets.webhook_secret),
		policy: layer.policy.unwrap_or_default().finalize(),
		queue: layer.queue.unwrap_or_default().finalize(),
		worker: layer.worker.unwrap_or_default().finalize(),
		sandbox: layer.sandbox.unwrap_or_default().finalize(),
		sentry: layer
			.sentry
			.unwrap_or_default()
			.finalize(secrets.sentry_auth_token),
		github: layer
			.github
			.unwrap_or_default()
			.finalize(secrets.github_token),
		llm: LlmConfig {
			api_key: secrets.llm_api_key,
		},
		logging: layer.logging.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		addr = %config.socket_addr(),
		environment = %config.webhook.environment,
		pipeline_enabled = config.policy.enabled,
		allowed_environments = ?config.policy.allowed_environments,
		queue_configured = config.queue.url.is_some(),
		max_concurrent_jobs = config.worker.max_concurrent_jobs,
		sandbox_image = %config.sandbox.image,
		job_timeout_secs = config.sandbox.job_timeout_secs,
		sentry_token_configured = config.sentry.auth_token.is_some(),
		"Configuration loaded"
	);

	Ok(config)
}

fn validate_config(config: &RemedyConfig) -> Result<(), ConfigError> {
	if config.worker.max_concurrent_jobs == 0 {
		return Err(ConfigError::Validation(
			"worker.max_concurrent_jobs must be at least 1".to_string(),
		));
	}

	let sandbox_budget = config.sandbox.job_timeout_secs + u64::from(config.sandbox.stop_grace_secs);
	if config.queue.visibility_timeout_secs <= sandbox_budget {
		return Err(ConfigError::Validation(format!(
			"queue.visibility_timeout_secs ({}) must exceed sandbox.job_timeout_secs + sandbox.stop_grace_secs ({sandbox_budget})",
			config.queue.visibility_timeout_secs
		)));
	}

	for pattern in &config.policy.ignored_message_patterns {
		RegexBuilder::new(pattern)
			.case_insensitive(true)
			.build()
			.map_err(|e| ConfigError::InvalidValue {
				key: "policy.ignored_message_patterns".to_string(),
				message: format!("'{pattern}': {e}"),
			})?;
	}

	if config.webhook.environment.is_production() && config.webhook.secret.is_none() {
		warn!(
			"{ENV_WEBHOOK_SECRET} is not set; webhook requests will be rejected in production"
		);
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn full_secrets() -> Secrets {
		Secrets {
			webhook_secret: Some("whsec".into()),
			sentry_auth_token: Some("sntrys".into()),
			github_token: Some("ghp".into()),
			llm_api_key: Some("sk-ant".into()),
		}
	}

	#[test]
	fn test_defaults_are_valid() {
		let config = finalize(RemedyConfigLayer::default(), Secrets::default()).unwrap();
		assert_eq!(config.queue.visibility_timeout_secs, 900);
		assert_eq!(config.sandbox.job_timeout_secs, 600);
		assert_eq!(config.queue.wait_time_secs, 20);
		assert_eq!(config.socket_addr(), "0.0.0.0:8080");
	}

	#[test]
	fn test_visibility_must_exceed_sandbox_budget() {
		let layer = RemedyConfigLayer {
			queue: Some(QueueConfigLayer {
				visibility_timeout_secs: Some(630),
				..Default::default()
			}),
			..Default::default()
		};
		let err = finalize(layer, Secrets::default()).unwrap_err();
		assert!(matches!(err, ConfigError::Validation(_)));
	}

	#[test]
	fn test_zero_concurrency_is_rejected() {
		let layer = RemedyConfigLayer {
			worker: Some(WorkerConfigLayer {
				max_concurrent_jobs: Some(0),
				..Default::default()
			}),
			..Default::default()
		};
		assert!(finalize(layer, Secrets::default()).is_err());
	}

	#[test]
	fn test_invalid_ignore_pattern_is_rejected() {
		let layer = RemedyConfigLayer {
			policy: Some(PolicyConfigLayer {
				ignored_message_patterns: Some(vec!["(unclosed".to_string()]),
				..Default::default()
			}),
			..Default::default()
		};
		let err = finalize(layer, Secrets::default()).unwrap_err();
		assert!(matches!(err, ConfigError::InvalidValue { .. }));
	}

	#[test]
	fn test_worker_credentials_report_everything_missing() {
		let config = finalize(RemedyConfigLayer::default(), Secrets::default()).unwrap();
		let err = config.require_worker_credentials().unwrap_err();
		let message = err.to_string();
		assert!(message.contains("REMEDY_QUEUE_URL"));
		assert!(message.contains(ENV_GITHUB_TOKEN));
		assert!(message.contains(ENV_LLM_API_KEY));
		assert!(message.contains("REMEDY_GITHUB_REPOSITORY"));
	}

	#[test]
	fn test_worker_credentials_present() {
		let layer = RemedyConfigLayer {
			queue: Some(QueueConfigLayer {
				url: Some("sqlite::memory:".to_string()),
				..Default::default()
			}),
			github: Some(GitHubConfigLayer {
				repository: Some("acme/web".to_string()),
				base_branch: Some("develop".to_string()),
			}),
			..Default::default()
		};
		let config = finalize(layer, full_secrets()).unwrap();
		let creds = config.require_worker_credentials().unwrap();
		assert_eq!(creds.queue_url, "sqlite::memory:");
		assert_eq!(creds.repository, "acme/web");
		assert_eq!(creds.base_branch, "develop");
		assert_eq!(creds.llm_api_key.expose(), "sk-ant");
	}

	#[test]
	fn test_secrets_do_not_leak_through_debug() {
		let config = finalize(RemedyConfigLayer::default(), full_secrets()).unwrap();
		let debug = format!("{config:?}");
		assert!(!debug.contains("ghp"));
		assert!(!debug.contains("sk-ant"));
		assert!(debug.contains("[REDACTED]"));
	}
}
