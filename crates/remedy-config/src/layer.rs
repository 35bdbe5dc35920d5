// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Deserialize, Serialize};

use crate::sections::{
	DatabaseConfigLayer, GitHubConfigLayer, HttpConfigLayer, LoggingConfigLayer, PolicyConfigLayer,
	QueueConfigLayer, SandboxConfigLayer, SentryConfigLayer, WebhookConfigLayer, WorkerConfigLayer,
};

/// One source's view of the configuration, every section optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemedyConfigLayer {
	#[serde(default)]
	pub http: Option<HttpConfigLayer>,
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub webhook: Option<WebhookConfigLayer>,
	#[serde(default)]
	pub policy: Option<PolicyConfigLayer>,
	#[serde(default)]
	pub queue: Option<QueueConfigLayer>,
	#[serde(default)]
	pub worker: Option<WorkerConfigLayer>,
	#[serde(default)]
	pub sandbox: Option<SandboxConfigLayer>,
	#[serde(default)]
	pub sentry: Option<SentryConfigLayer>,
	#[serde(default)]
	pub github: Option<GitHubConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
}

macro_rules! merge_section {
	($self:ident, $other:ident, $field:ident) => {
		if let Some(overlay) = $other.$field {
			$self.$field.get_or_insert_with(Default::default).merge(overlay);
		}
	};
}

impl RemedyConfigLayer {
	pub fn merge(&mut self, other: RemedyConfigLayer) {
		merge_section!(self, other, http);
		merge_section!(self, other, database);
		merge_section!(self, other, webhook);
		merge_section!(self, other, policy);
		merge_section!(self, other, queue);
		merge_section!(self, other, worker);
		merge_section!(self, other, sandbox);
		merge_section!(self, other, sentry);
		merge_section!(self, other, github);
		merge_section!(self, other, logging);
	}
}
