// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Pod specification for a remediation attempt.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
	Capabilities, Container, EnvVar, LocalObjectReference, Pod, PodSpec, ResourceRequirements,
	SecurityContext,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use remedy_config::{SandboxConfig, SecretString, WorkerCredentials};
use remedy_core::{EnrichedErrorContext, JobId};

use crate::error::SandboxError;

pub const MANAGED_LABEL: &str = "remedy.dev/managed";
pub const JOB_ID_LABEL: &str = "remedy.dev/job-id";
const EVENT_ID_LABEL: &str = "remedy.dev/event-id";
const ERROR_TYPE_LABEL: &str = "remedy.dev/error-type";
const ENVIRONMENT_LABEL: &str = "remedy.dev/environment";
const ISSUE_URL_ANNOTATION: &str = "remedy.dev/issue-url";
const SOURCE_FILE_ANNOTATION: &str = "remedy.dev/source-file";
pub const CONTAINER_NAME: &str = "agent";
const MAX_LABEL_LENGTH: usize = 63;
const AGENT_UID: i64 = 1000;

pub const ENV_ERROR_CONTEXT: &str = "REMEDY_ERROR_CONTEXT";
pub const ENV_LLM_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_GITHUB_REPOSITORY: &str = "GITHUB_REPOSITORY";
pub const ENV_BASE_BRANCH: &str = "BASE_BRANCH";
pub const ENV_JOB_ID: &str = "REMEDY_JOB_ID";

/// Credentials handed to the agent inside the pod.
#[derive(Debug, Clone)]
pub struct AgentCredentials {
	pub llm_api_key: SecretString,
	pub github_token: SecretString,
	pub repository: String,
	pub base_branch: String,
}

impl From<&WorkerCredentials> for AgentCredentials {
	fn from(creds: &WorkerCredentials) -> Self {
		Self {
			llm_api_key: creds.llm_api_key.clone(),
			github_token: creds.github_token.clone(),
			repository: creds.repository.clone(),
			base_branch: creds.base_branch.clone(),
		}
	}
}

/// Makes `value` usable as a Kubernetes label value: at most 63 characters
/// of `[A-Za-z0-9_.-]`, starting and ending alphanumeric.
pub fn sanitize_label_value(value: &str) -> String {
	let mapped: String = value
		.chars()
		.map(|c| match c {
			'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
			_ => '_',
		})
		.collect();

	let edge = |c: char| !c.is_ascii_alphanumeric();
	let mut out = mapped.trim_matches(edge).to_string();
	if out.len() > MAX_LABEL_LENGTH {
		out.truncate(MAX_LABEL_LENGTH);
		out = out.trim_end_matches(edge).to_string();
	}
	out
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
	EnvVar {
		name: name.to_string(),
		value: Some(value.into()),
		value_from: None,
	}
}

/// Builds the pod for one attempt.
///
/// The context travels as JSON in [`ENV_ERROR_CONTEXT`]. Nothing is passed
/// as a command-line argument.
pub fn build_pod_spec(
	job_id: &JobId,
	context: &EnrichedErrorContext,
	config: &SandboxConfig,
	credentials: &AgentCredentials,
) -> Result<Pod, SandboxError> {
	let report = &context.report;

	let mut labels = BTreeMap::new();
	labels.insert(MANAGED_LABEL.to_string(), "true".to_string());
	labels.insert(JOB_ID_LABEL.to_string(), sanitize_label_value(job_id.as_str()));
	labels.insert(EVENT_ID_LABEL.to_string(), sanitize_label_value(&report.event_id));
	labels.insert(ERROR_TYPE_LABEL.to_string(), sanitize_label_value(&report.error_type));
	labels.insert(
		ENVIRONMENT_LABEL.to_string(),
		sanitize_label_value(&report.environment),
	);

	let mut annotations = BTreeMap::new();
	if let Some(url) = &report.issue_url {
		annotations.insert(ISSUE_URL_ANNOTATION.to_string(), url.clone());
	}
	if let Some(file) = &report.file_name {
		let location = match report.line_number {
			Some(line) => format!("{file}:{line}"),
			None => file.clone(),
		};
		annotations.insert(SOURCE_FILE_ANNOTATION.to_string(), location);
	}

	let env_vars = vec![
		env(ENV_ERROR_CONTEXT, context.to_json()?),
		env(ENV_LLM_API_KEY, credentials.llm_api_key.expose().as_str()),
		env(ENV_GITHUB_TOKEN, credentials.github_token.expose().as_str()),
		env(ENV_GITHUB_REPOSITORY, credentials.repository.as_str()),
		env(ENV_BASE_BRANCH, credentials.base_branch.as_str()),
		env(ENV_JOB_ID, job_id.as_str()),
	];

	let mut limits = BTreeMap::new();
	limits.insert("memory".to_string(), Quantity(config.memory_limit.clone()));
	if let Some(cpu) = &config.cpu_limit {
		limits.insert("cpu".to_string(), Quantity(cpu.clone()));
	}

	let security_context = SecurityContext {
		run_as_non_root: Some(true),
		run_as_user: Some(AGENT_UID),
		run_as_group: Some(AGENT_UID),
		allow_privilege_escalation: Some(false),
		privileged: Some(false),
		capabilities: Some(Capabilities {
			drop: Some(vec!["ALL".to_string()]),
			add: None,
		}),
		..Default::default()
	};

	let container = Container {
		name: CONTAINER_NAME.to_string(),
		image: Some(config.image.clone()),
		env: Some(env_vars),
		resources: Some(ResourceRequirements {
			limits: Some(limits),
			requests: None,
			claims: None,
		}),
		security_context: Some(security_context),
		..Default::default()
	};

	let image_pull_secrets = (!config.image_pull_secrets.is_empty()).then(|| {
		config
			.image_pull_secrets
			.iter()
			.map(|name| LocalObjectReference { name: name.clone() })
			.collect()
	});

	let deadline = config
		.job_timeout_secs
		.saturating_add(u64::from(config.stop_grace_secs));

	Ok(Pod {
		metadata: ObjectMeta {
			name: Some(job_id.as_k8s_name()),
			namespace: Some(config.namespace.clone()),
			labels: Some(labels),
			annotations: (!annotations.is_empty()).then_some(annotations),
			..Default::default()
		},
		spec: Some(PodSpec {
			containers: vec![container],
			restart_policy: Some("Never".to_string()),
			image_pull_secrets,
			service_account_name: config.service_account.clone(),
			automount_service_account_token: Some(config.service_account.is_some()),
			active_deadline_seconds: Some(i64::try_from(deadline).unwrap_or(i64::MAX)),
			..Default::default()
		}),
		status: None,
	})
}

#[cfg(test)]
pub(crate) mod fixtures {
	use super::*;
	use chrono::{TimeZone, Utc};
	use remedy_core::ErrorReport;

	pub fn context() -> EnrichedErrorContext {
		EnrichedErrorContext::fallback(ErrorReport {
			event_id: "a1b2c3d4e5f60718293a4b5c6d7e8f90".to_string(),
			issue_id: Some("4711".to_string()),
			error_type: "TypeError".to_string(),
			error_message: "Cannot read properties of undefined (reading 'title')".to_string(),
			stack_trace: vec![],
			file_name: Some("src/components/Reader.tsx".to_string()),
			line_number: Some(42),
			col_number: None,
			function_name: Some("Reader".to_string()),
			culprit: None,
			environment: "production".to_string(),
			timestamp: Utc.timestamp_millis_opt(1_740_830_400_000).unwrap(),
			project_name: "web".to_string(),
			issue_url: Some("https://sentry.io/organizations/acme/issues/4711/".to_string()),
			tags: Default::default(),
			breadcrumbs: vec![],
			request: None,
		})
	}

	pub fn credentials() -> AgentCredentials {
		AgentCredentials {
			llm_api_key: "sk-ant-test".into(),
			github_token: "ghp_test".into(),
			repository: "acme/web".to_string(),
			base_branch: "main".to_string(),
		}
	}

	pub fn job_id() -> JobId {
		JobId::for_dispatch(
			"a1b2c3d4e5f60718293a4b5c6d7e8f90",
			Utc.timestamp_millis_opt(1_740_830_401_000).unwrap(),
			1,
		)
	}
}

#[cfg(test)]
mod tests {
	use super::fixtures::{context, credentials, job_id};
	use super::*;

	fn env_value<'a>(pod: &'a Pod, name: &str) -> Option<&'a str> {
		pod.spec.as_ref()?.containers[0]
			.env
			.as_ref()?
			.iter()
			.find(|e| e.name == name)?
			.value
			.as_deref()
	}

	#[test]
	fn pod_runs_fixed_image_without_restarts() {
		let config = SandboxConfig::default();
		let pod = build_pod_spec(&job_id(), &context(), &config, &credentials()).unwrap();

		assert_eq!(pod.metadata.name, Some(job_id().as_k8s_name()));
		assert_eq!(pod.metadata.namespace.as_deref(), Some("remedy-sandboxes"));

		let spec = pod.spec.as_ref().unwrap();
		assert_eq!(spec.restart_policy.as_deref(), Some("Never"));
		assert_eq!(spec.active_deadline_seconds, Some(630));
		assert_eq!(spec.containers.len(), 1);

		let container = &spec.containers[0];
		assert_eq!(container.image.as_deref(), Some(config.image.as_str()));
		assert!(container.command.is_none());
		assert!(container.args.is_none());
	}

	#[test]
	fn pod_is_locked_down() {
		let pod = build_pod_spec(&job_id(), &context(), &SandboxConfig::default(), &credentials())
			.unwrap();
		let container = &pod.spec.as_ref().unwrap().containers[0];

		let security = container.security_context.as_ref().unwrap();
		assert_eq!(security.run_as_non_root, Some(true));
		assert_eq!(security.run_as_user, Some(1000));
		assert_eq!(security.allow_privilege_escalation, Some(false));
		assert_eq!(
			security.capabilities.as_ref().unwrap().drop,
			Some(vec!["ALL".to_string()])
		);

		let limits = container
			.resources
			.as_ref()
			.unwrap()
			.limits
			.as_ref()
			.unwrap();
		assert_eq!(limits.get("memory"), Some(&Quantity("4Gi".to_string())));
		assert!(!limits.contains_key("cpu"));
		assert_eq!(
			pod.spec.as_ref().unwrap().automount_service_account_token,
			Some(false)
		);
	}

	#[test]
	fn context_round_trips_through_env() {
		let ctx = context();
		let pod = build_pod_spec(&job_id(), &ctx, &SandboxConfig::default(), &credentials()).unwrap();

		let json = env_value(&pod, ENV_ERROR_CONTEXT).unwrap();
		assert_eq!(EnrichedErrorContext::from_json(json).unwrap(), ctx);

		assert_eq!(env_value(&pod, ENV_LLM_API_KEY), Some("sk-ant-test"));
		assert_eq!(env_value(&pod, ENV_GITHUB_TOKEN), Some("ghp_test"));
		assert_eq!(env_value(&pod, ENV_GITHUB_REPOSITORY), Some("acme/web"));
		assert_eq!(env_value(&pod, ENV_BASE_BRANCH), Some("main"));
		assert_eq!(env_value(&pod, ENV_JOB_ID), Some(job_id().as_str()));
	}

	#[test]
	fn labels_and_annotations_describe_the_job() {
		let pod = build_pod_spec(&job_id(), &context(), &SandboxConfig::default(), &credentials())
			.unwrap();
		let labels = pod.metadata.labels.as_ref().unwrap();
		assert_eq!(labels[MANAGED_LABEL], "true");
		assert_eq!(labels[JOB_ID_LABEL], job_id().as_str());
		assert_eq!(labels[ERROR_TYPE_LABEL], "TypeError");

		let annotations = pod.metadata.annotations.as_ref().unwrap();
		assert_eq!(annotations[SOURCE_FILE_ANNOTATION], "src/components/Reader.tsx:42");
	}

	#[test]
	fn optional_limits_and_pull_secrets() {
		let config = SandboxConfig {
			cpu_limit: Some("2".to_string()),
			image_pull_secrets: vec!["ghcr".to_string()],
			service_account: Some("remedy-agent".to_string()),
			..Default::default()
		};
		let pod = build_pod_spec(&job_id(), &context(), &config, &credentials()).unwrap();
		let spec = pod.spec.as_ref().unwrap();
		assert_eq!(
			spec.image_pull_secrets.as_ref().unwrap()[0].name,
			"ghcr".to_string()
		);
		assert_eq!(spec.service_account_name.as_deref(), Some("remedy-agent"));
		let limits = spec.containers[0].resources.as_ref().unwrap().limits.as_ref().unwrap();
		assert_eq!(limits.get("cpu"), Some(&Quantity("2".to_string())));
	}

	#[test]
	fn sanitize_label_value_cases() {
		assert_eq!(sanitize_label_value("TypeError"), "TypeError");
		assert_eq!(sanitize_label_value("a/b:c"), "a_b_c");
		assert_eq!(sanitize_label_value("--x--"), "x");
		assert_eq!(sanitize_label_value(""), "");
		let long = "a".repeat(62) + "-bbbb";
		let out = sanitize_label_value(&long);
		assert_eq!(out.len(), 62);
		assert!(out.ends_with('a'));
	}
}
