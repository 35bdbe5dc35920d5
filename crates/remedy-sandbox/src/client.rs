// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod};

use crate::error::K8sError;

/// The pod operations the sandbox runner depends on.
#[async_trait]
pub trait K8sClient: Send + Sync {
	async fn create_pod(&self, namespace: &str, pod: Pod) -> Result<Pod, K8sError>;

	async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, K8sError>;

	/// Deletes a pod, giving its containers `grace_period_seconds` to exit.
	async fn delete_pod(
		&self,
		name: &str,
		namespace: &str,
		grace_period_seconds: u32,
	) -> Result<(), K8sError>;

	/// Combined stdout/stderr of a container.
	async fn read_logs(&self, name: &str, namespace: &str, container: &str)
		-> Result<String, K8sError>;

	async fn get_namespace(&self, name: &str) -> Result<Namespace, K8sError>;
}
