// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use remedy_config::SandboxConfig;
use remedy_core::{EnrichedErrorContext, JobId};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::client::K8sClient;
use crate::error::{K8sError, SandboxError};
use crate::pod::{build_pod_spec, AgentCredentials, CONTAINER_NAME};

const POLL_INTERVAL_MS: u64 = 500;

/// A live sandbox tracked in the registry.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxHandle {
	pub job_id: JobId,
	pub pod_name: String,
	pub namespace: String,
	pub started_at: DateTime<Utc>,
}

/// Result of one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxOutcome {
	/// `None` when the agent never reported an exit status.
	pub exit_code: Option<i32>,
	pub logs: String,
	pub success: bool,
	pub timed_out: bool,
}

type Registry = Arc<Mutex<HashMap<JobId, SandboxHandle>>>;

fn lock(registry: &Registry) -> MutexGuard<'_, HashMap<JobId, SandboxHandle>> {
	registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// Removes a registry entry when dropped, so cancelled and panicking attempts
/// are released too.
struct RegistryGuard {
	registry: Registry,
	job_id: JobId,
}

impl Drop for RegistryGuard {
	fn drop(&mut self) {
		lock(&self.registry).remove(&self.job_id);
	}
}

enum PodExit {
	Finished(Option<i32>),
	Failed(String),
}

#[derive(Clone)]
pub struct SandboxRunner {
	client: Arc<dyn K8sClient>,
	config: SandboxConfig,
	credentials: AgentCredentials,
	registry: Registry,
	job_timeout: Duration,
	poll_interval: Duration,
}

impl SandboxRunner {
	pub fn new(
		client: Arc<dyn K8sClient>,
		config: SandboxConfig,
		credentials: AgentCredentials,
	) -> Self {
		let job_timeout = Duration::from_secs(config.job_timeout_secs);
		Self {
			client,
			config,
			credentials,
			registry: Arc::new(Mutex::new(HashMap::new())),
			job_timeout,
			poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
		}
	}

	pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
		self.job_timeout = timeout;
		self
	}

	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;
		self
	}

	pub fn namespace(&self) -> &str {
		&self.config.namespace
	}

	/// Fails fast when the sandbox namespace does not exist.
	pub async fn validate_namespace(&self) -> Result<(), SandboxError> {
		self.client.get_namespace(&self.config.namespace).await?;
		info!(namespace = %self.config.namespace, "validated sandbox namespace");
		Ok(())
	}

	pub fn active_count(&self) -> usize {
		lock(&self.registry).len()
	}

	pub fn active(&self) -> Vec<SandboxHandle> {
		lock(&self.registry).values().cloned().collect()
	}

	/// Runs one attempt to completion or timeout.
	///
	/// Only infrastructure failures are errors. A non-zero exit or a timeout
	/// is reported through the outcome.
	#[instrument(skip(self, job_id, context), fields(job_id = %job_id, event_id = %context.event_id()))]
	pub async fn run(
		&self,
		job_id: &JobId,
		context: &EnrichedErrorContext,
	) -> Result<SandboxOutcome, SandboxError> {
		let pod = build_pod_spec(job_id, context, &self.config, &self.credentials)?;
		let pod_name = job_id.as_k8s_name();
		let namespace = self.config.namespace.clone();

		match lock(&self.registry).entry(job_id.clone()) {
			Entry::Occupied(_) => {
				return Err(SandboxError::AlreadyRunning {
					job_id: job_id.to_string(),
				});
			}
			Entry::Vacant(slot) => {
				slot.insert(SandboxHandle {
					job_id: job_id.clone(),
					pod_name: pod_name.clone(),
					namespace: namespace.clone(),
					started_at: Utc::now(),
				});
			}
		}
		let _guard = RegistryGuard {
			registry: Arc::clone(&self.registry),
			job_id: job_id.clone(),
		};

		info!(pod_name = %pod_name, image = %self.config.image, "launching sandbox pod");
		self.client.create_pod(&namespace, pod).await?;

		match tokio::time::timeout(self.job_timeout, self.wait_for_exit(&pod_name)).await {
			Ok(Ok(PodExit::Finished(exit_code))) => {
				let logs = self.collect_logs(&pod_name).await;
				self.remove_pod(&pod_name, 0).await;
				let success = exit_code == Some(0);
				info!(pod_name = %pod_name, exit_code = ?exit_code, success, "sandbox finished");
				Ok(SandboxOutcome {
					exit_code,
					logs,
					success,
					timed_out: false,
				})
			}
			Ok(Ok(PodExit::Failed(reason))) => {
				let logs = self.collect_logs(&pod_name).await;
				self.remove_pod(&pod_name, 0).await;
				warn!(pod_name = %pod_name, reason = %reason, "sandbox pod failed without an exit status");
				Ok(SandboxOutcome {
					exit_code: None,
					logs,
					success: false,
					timed_out: false,
				})
			}
			Ok(Err(e)) => {
				self.remove_pod(&pod_name, 0).await;
				Err(e)
			}
			Err(_) => {
				warn!(
					pod_name = %pod_name,
					timeout_secs = self.job_timeout.as_secs(),
					"sandbox timed out, stopping pod"
				);
				let logs = self.collect_logs(&pod_name).await;
				self.remove_pod(&pod_name, self.config.stop_grace_secs).await;
				Ok(SandboxOutcome {
					exit_code: None,
					logs,
					success: false,
					timed_out: true,
				})
			}
		}
	}

	async fn wait_for_exit(&self, pod_name: &str) -> Result<PodExit, SandboxError> {
		loop {
			let pod = match self.client.get_pod(pod_name, &self.config.namespace).await {
				Ok(pod) => pod,
				Err(K8sError::PodNotFound { .. }) => {
					return Err(SandboxError::Vanished {
						pod: pod_name.to_string(),
					})
				}
				Err(e) => return Err(e.into()),
			};

			let phase = pod
				.status
				.as_ref()
				.and_then(|s| s.phase.as_deref())
				.unwrap_or("Unknown");

			match phase {
				"Succeeded" => return Ok(PodExit::Finished(exit_code(&pod).or(Some(0)))),
				"Failed" => {
					return Ok(match exit_code(&pod) {
						Some(code) => PodExit::Finished(Some(code)),
						None => PodExit::Failed(
							pod
								.status
								.as_ref()
								.and_then(|s| s.reason.clone().or_else(|| s.message.clone()))
								.unwrap_or_else(|| "unknown failure".to_string()),
						),
					})
				}
				_ => {
					if let Some(reason) = start_failure(&pod) {
						return Err(SandboxError::StartFailed {
							pod: pod_name.to_string(),
							reason,
						});
					}
					debug!(pod_name, phase, "waiting for sandbox");
					tokio::time::sleep(self.poll_interval).await;
				}
			}
		}
	}

	async fn collect_logs(&self, pod_name: &str) -> String {
		match self
			.client
			.read_logs(pod_name, &self.config.namespace, CONTAINER_NAME)
			.await
		{
			Ok(logs) => logs,
			Err(e) => {
				warn!(pod_name, error = %e, "failed to collect sandbox logs");
				String::new()
			}
		}
	}

	async fn remove_pod(&self, pod_name: &str, grace_secs: u32) {
		match self
			.client
			.delete_pod(pod_name, &self.config.namespace, grace_secs)
			.await
		{
			Ok(()) | Err(K8sError::PodNotFound { .. }) => {}
			Err(e) => warn!(pod_name, error = %e, "failed to delete sandbox pod"),
		}
	}

	/// Force-deletes every registered pod. Returns how many were targeted.
	pub async fn stop_all(&self) -> usize {
		let handles = self.active();
		for handle in &handles {
			info!(job_id = %handle.job_id, pod_name = %handle.pod_name, "force-stopping sandbox");
			match self
				.client
				.delete_pod(&handle.pod_name, &handle.namespace, 0)
				.await
			{
				Ok(()) | Err(K8sError::PodNotFound { .. }) => {}
				Err(e) => warn!(pod_name = %handle.pod_name, error = %e, "failed to stop sandbox"),
			}
		}
		handles.len()
	}
}

fn exit_code(pod: &Pod) -> Option<i32> {
	pod
		.status
		.as_ref()?
		.container_statuses
		.as_ref()?
		.iter()
		.find(|s| s.name == CONTAINER_NAME)?
		.state
		.as_ref()?
		.terminated
		.as_ref()
		.map(|t| t.exit_code)
}

/// Waiting reasons that will never resolve on their own.
fn start_failure(pod: &Pod) -> Option<String> {
	const FATAL: [&str; 4] = [
		"ErrImagePull",
		"ImagePullBackOff",
		"InvalidImageName",
		"CreateContainerConfigError",
	];
	pod
		.status
		.as_ref()?
		.container_statuses
		.as_ref()?
		.iter()
		.filter_map(|s| s.state.as_ref()?.waiting.as_ref()?.reason.clone())
		.find(|reason| FATAL.contains(&reason.as_str()))
}
