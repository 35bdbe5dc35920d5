// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections.

mod credentials;
mod database;
mod http;
mod logging;
mod policy;
mod queue;
mod sandbox;
mod webhook;
mod worker;

pub use credentials::{
	GitHubConfig, GitHubConfigLayer, LlmConfig, SentryConfig, SentryConfigLayer,
};
pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use http::{HttpConfig, HttpConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use policy::{PolicyConfig, PolicyConfigLayer};
pub use queue::{QueueConfig, QueueConfigLayer};
pub use sandbox::{SandboxConfig, SandboxConfigLayer};
pub use webhook::{AppEnvironment, WebhookConfig, WebhookConfigLayer};
pub use worker::{WorkerConfig, WorkerConfigLayer};

/// Splits a comma separated list, dropping blank entries.
pub(crate) fn split_list(value: &str) -> Vec<String> {
	value
		.split(',')
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.map(str::to_string)
		.collect()
}
