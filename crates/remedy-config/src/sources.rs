// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::RemedyConfigLayer;
use crate::secret::{load_secret_env, SecretString};
use crate::sections::{
	split_list, AppEnvironment, DatabaseConfigLayer, GitHubConfigLayer, HttpConfigLayer, LogFormat,
	LoggingConfigLayer, PolicyConfigLayer, QueueConfigLayer, SandboxConfigLayer, SentryConfigLayer,
	WebhookConfigLayer, WorkerConfigLayer,
};

pub const ENV_WEBHOOK_SECRET: &str = "REMEDY_WEBHOOK_SECRET";
pub const ENV_SENTRY_AUTH_TOKEN: &str = "REMEDY_SENTRY_AUTH_TOKEN";
pub const ENV_GITHUB_TOKEN: &str = "REMEDY_GITHUB_TOKEN";
pub const ENV_LLM_API_KEY: &str = "REMEDY_ANTHROPIC_API_KEY";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<RemedyConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<RemedyConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(RemedyConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file is not an error.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/remedy/remedy.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<RemedyConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(RemedyConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: RemedyConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: REMEDY_<SECTION>_<FIELD>. List values are comma separated.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<RemedyConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(RemedyConfigLayer {
			http: Some(HttpConfigLayer {
				host: env_var("REMEDY_HOST"),
				port: env_parse("REMEDY_PORT")?,
			}),
			database: Some(DatabaseConfigLayer {
				url: env_var("REMEDY_DATABASE_URL"),
			}),
			webhook: Some(WebhookConfigLayer {
				environment: env_parse::<AppEnvironment>("REMEDY_ENV")?,
				signature_header: env_var("REMEDY_WEBHOOK_SIGNATURE_HEADER"),
			}),
			policy: Some(PolicyConfigLayer {
				enabled: env_bool("REMEDY_POLICY_ENABLED"),
				allowed_environments: env_list("REMEDY_POLICY_ALLOWED_ENVIRONMENTS"),
				ignored_error_types: env_list("REMEDY_POLICY_IGNORED_ERROR_TYPES"),
				ignored_message_patterns: env_list("REMEDY_POLICY_IGNORED_MESSAGE_PATTERNS"),
				min_occurrences: env_parse("REMEDY_POLICY_MIN_OCCURRENCES")?,
				max_fixes_per_hour: env_parse("REMEDY_POLICY_MAX_FIXES_PER_HOUR")?,
			}),
			queue: Some(QueueConfigLayer {
				url: env_var("REMEDY_QUEUE_URL"),
				name: env_var("REMEDY_QUEUE_NAME"),
				wait_time_secs: env_parse("REMEDY_QUEUE_WAIT_TIME_SECS")?,
				visibility_timeout_secs: env_parse("REMEDY_QUEUE_VISIBILITY_TIMEOUT_SECS")?,
				max_receive_count: env_parse("REMEDY_QUEUE_MAX_RECEIVE_COUNT")?,
			}),
			worker: Some(WorkerConfigLayer {
				enabled: env_bool("REMEDY_WORKER_ENABLED"),
				max_concurrent_jobs: env_parse("REMEDY_WORKER_MAX_CONCURRENT_JOBS")?,
				poll_interval_secs: env_parse("REMEDY_WORKER_POLL_INTERVAL_SECS")?,
				shutdown_timeout_secs: env_parse("REMEDY_WORKER_SHUTDOWN_TIMEOUT_SECS")?,
				log_tail_lines: env_parse("REMEDY_WORKER_LOG_TAIL_LINES")?,
			}),
			sandbox: Some(SandboxConfigLayer {
				namespace: env_var("REMEDY_SANDBOX_NAMESPACE"),
				image: env_var("REMEDY_SANDBOX_IMAGE"),
				job_timeout_secs: env_parse("REMEDY_SANDBOX_JOB_TIMEOUT_SECS")?,
				stop_grace_secs: env_parse("REMEDY_SANDBOX_STOP_GRACE_SECS")?,
				memory_limit: env_var("REMEDY_SANDBOX_MEMORY_LIMIT"),
				cpu_limit: env_var("REMEDY_SANDBOX_CPU_LIMIT"),
				image_pull_secrets: env_list("REMEDY_SANDBOX_IMAGE_PULL_SECRETS"),
				service_account: env_var("REMEDY_SANDBOX_SERVICE_ACCOUNT"),
			}),
			sentry: Some(SentryConfigLayer {
				base_url: env_var("REMEDY_SENTRY_BASE_URL"),
				timeout_secs: env_parse("REMEDY_SENTRY_TIMEOUT_SECS")?,
				max_retries: env_parse("REMEDY_SENTRY_MAX_RETRIES")?,
			}),
			github: Some(GitHubConfigLayer {
				repository: env_var("REMEDY_GITHUB_REPOSITORY"),
				base_branch: env_var("REMEDY_GITHUB_BASE_BRANCH"),
			}),
			logging: Some(LoggingConfigLayer {
				level: env_var("REMEDY_LOG_LEVEL"),
				format: env_parse::<LogFormat>("REMEDY_LOG_FORMAT")?,
			}),
		})
	}
}

/// Credentials loaded with `VAR` / `VAR_FILE` support.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
	pub webhook_secret: Option<SecretString>,
	pub sentry_auth_token: Option<SecretString>,
	pub github_token: Option<SecretString>,
	pub llm_api_key: Option<SecretString>,
}

impl Secrets {
	pub fn from_env() -> Result<Self, ConfigError> {
		Ok(Self {
			webhook_secret: load_secret_env(ENV_WEBHOOK_SECRET)?,
			sentry_auth_token: load_secret_env(ENV_SENTRY_AUTH_TOKEN)?,
			github_token: load_secret_env(ENV_GITHUB_TOKEN)?,
			llm_api_key: load_secret_env(ENV_LLM_API_KEY)?,
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_list(name: &str) -> Option<Vec<String>> {
	env_var(name).map(|v| split_list(&v))
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid value '{v}'"),
		}),
		None => Ok(None),
	}
}
