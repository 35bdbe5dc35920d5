// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory [`K8sClient`] for tests.
//!
//! Created pods report `Running` for a configurable number of polls and then
//! terminate with a scripted exit code, or never terminate at all.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
	ContainerState, ContainerStateTerminated, ContainerStatus, Namespace, Pod, PodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::client::K8sClient;
use crate::error::K8sError;
use crate::pod::CONTAINER_NAME;

/// How a fake pod ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeExit {
	Code(i32),
	/// Keeps running until deleted.
	Hang,
}

struct FakePod {
	pod: Pod,
	exit: FakeExit,
	polls_left: u32,
}

struct FakeState {
	pods: HashMap<String, FakePod>,
	script: VecDeque<FakeExit>,
	default_exit: FakeExit,
	polls_before_exit: u32,
	logs: String,
	fail_create: bool,
	created: Vec<Pod>,
	deleted: Vec<(String, u32)>,
	peak_live: usize,
}

pub struct FakeK8sClient {
	state: Mutex<FakeState>,
}

impl Default for FakeK8sClient {
	fn default() -> Self {
		Self::new()
	}
}

impl FakeK8sClient {
	/// Pods exit 0 after one poll.
	pub fn new() -> Self {
		Self {
			state: Mutex::new(FakeState {
				pods: HashMap::new(),
				script: VecDeque::new(),
				default_exit: FakeExit::Code(0),
				polls_before_exit: 1,
				logs: String::new(),
				fail_create: false,
				created: Vec::new(),
				deleted: Vec::new(),
				peak_live: 0,
			}),
		}
	}

	fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}

	pub fn with_exit(self, exit: FakeExit) -> Self {
		self.state().default_exit = exit;
		self
	}

	/// Exits for successive pods. Falls back to the default once drained.
	pub fn with_script(self, exits: impl IntoIterator<Item = FakeExit>) -> Self {
		self.state().script.extend(exits);
		self
	}

	pub fn with_polls_before_exit(self, polls: u32) -> Self {
		self.state().polls_before_exit = polls;
		self
	}

	pub fn with_logs(self, logs: impl Into<String>) -> Self {
		self.state().logs = logs.into();
		self
	}

	pub fn failing_create(self) -> Self {
		self.state().fail_create = true;
		self
	}

	pub fn created_pods(&self) -> Vec<Pod> {
		self.state().created.clone()
	}

	/// `(pod name, grace period)` for every delete call.
	pub fn deletions(&self) -> Vec<(String, u32)> {
		self.state().deleted.clone()
	}

	pub fn live_pods(&self) -> usize {
		self.state().pods.len()
	}

	/// Highest number of pods alive at the same time.
	pub fn peak_live(&self) -> usize {
		self.state().peak_live
	}
}

fn terminated(pod: &mut Pod, code: i32) {
	let phase = if code == 0 { "Succeeded" } else { "Failed" };
	pod.status = Some(PodStatus {
		phase: Some(phase.to_string()),
		container_statuses: Some(vec![ContainerStatus {
			name: CONTAINER_NAME.to_string(),
			state: Some(ContainerState {
				terminated: Some(ContainerStateTerminated {
					exit_code: code,
					..Default::default()
				}),
				..Default::default()
			}),
			..Default::default()
		}]),
		..Default::default()
	});
}

fn running(pod: &mut Pod) {
	pod.status = Some(PodStatus {
		phase: Some("Running".to_string()),
		..Default::default()
	});
}

#[async_trait]
impl K8sClient for FakeK8sClient {
	async fn create_pod(&self, _namespace: &str, pod: Pod) -> Result<Pod, K8sError> {
		let mut state = self.state();
		if state.fail_create {
			return Err(K8sError::ApiError {
				message: "admission webhook denied the request".to_string(),
			});
		}
		let name = pod.metadata.name.clone().unwrap_or_default();
		if state.pods.contains_key(&name) {
			return Err(K8sError::ApiError {
				message: format!("pods \"{name}\" already exists"),
			});
		}
		let exit = state.script.pop_front().unwrap_or(state.default_exit);
		let polls_left = state.polls_before_exit;

		let mut stored = pod.clone();
		stored.status = Some(PodStatus {
			phase: Some("Pending".to_string()),
			..Default::default()
		});
		state.created.push(pod);
		state.pods.insert(
			name,
			FakePod {
				pod: stored.clone(),
				exit,
				polls_left,
			},
		);
		state.peak_live = state.peak_live.max(state.pods.len());
		Ok(stored)
	}

	async fn get_pod(&self, name: &str, _namespace: &str) -> Result<Pod, K8sError> {
		let mut state = self.state();
		let fake = state
			.pods
			.get_mut(name)
			.ok_or_else(|| K8sError::PodNotFound { name: name.into() })?;

		if fake.polls_left > 0 {
			fake.polls_left -= 1;
			running(&mut fake.pod);
		} else {
			match fake.exit {
				FakeExit::Code(code) => terminated(&mut fake.pod, code),
				FakeExit::Hang => running(&mut fake.pod),
			}
		}
		Ok(fake.pod.clone())
	}

	async fn delete_pod(
		&self,
		name: &str,
		_namespace: &str,
		grace_period_seconds: u32,
	) -> Result<(), K8sError> {
		let mut state = self.state();
		state.deleted.push((name.to_string(), grace_period_seconds));
		match state.pods.remove(name) {
			Some(_) => Ok(()),
			None => Err(K8sError::PodNotFound { name: name.into() }),
		}
	}

	async fn read_logs(
		&self,
		name: &str,
		_namespace: &str,
		_container: &str,
	) -> Result<String, K8sError> {
		let state = self.state();
		if !state.pods.contains_key(name) {
			return Err(K8sError::PodNotFound { name: name.into() });
		}
		Ok(state.logs.clone())
	}

	async fn get_namespace(&self, name: &str) -> Result<Namespace, K8sError> {
		Ok(Namespace {
			metadata: ObjectMeta {
				name: Some(name.to_string()),
				..Default::default()
			},
			..Default::default()
		})
	}
}
