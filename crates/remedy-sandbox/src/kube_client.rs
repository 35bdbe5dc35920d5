// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Pod};
use kube::api::{Api, DeleteParams, LogParams, PostParams};
use kube::Client;
use tracing::debug;

use crate::client::K8sClient;
use crate::error::K8sError;

/// K8s client backed by the cluster API.
pub struct KubeClient {
	client: Client,
}

impl KubeClient {
	/// Discovers cluster configuration from the in-cluster service account,
	/// `KUBECONFIG` or `~/.kube/config`, in that order.
	pub async fn new() -> Result<Self, K8sError> {
		let client = Client::try_default().await?;
		debug!("K8s client initialized");
		Ok(Self { client })
	}

	fn pods(&self, namespace: &str) -> Api<Pod> {
		Api::namespaced(self.client.clone(), namespace)
	}
}

fn not_found_or(err: kube::Error, name: &str) -> K8sError {
	match err {
		kube::Error::Api(ref resp) if resp.code == 404 => K8sError::PodNotFound { name: name.into() },
		e => e.into(),
	}
}

#[async_trait]
impl K8sClient for KubeClient {
	async fn create_pod(&self, namespace: &str, pod: Pod) -> Result<Pod, K8sError> {
		Ok(self.pods(namespace).create(&PostParams::default(), &pod).await?)
	}

	async fn get_pod(&self, name: &str, namespace: &str) -> Result<Pod, K8sError> {
		self
			.pods(namespace)
			.get(name)
			.await
			.map_err(|e| not_found_or(e, name))
	}

	async fn delete_pod(
		&self,
		name: &str,
		namespace: &str,
		grace_period_seconds: u32,
	) -> Result<(), K8sError> {
		let params = DeleteParams {
			grace_period_seconds: Some(grace_period_seconds),
			..Default::default()
		};
		self
			.pods(namespace)
			.delete(name, &params)
			.await
			.map(|_| ())
			.map_err(|e| not_found_or(e, name))
	}

	async fn read_logs(
		&self,
		name: &str,
		namespace: &str,
		container: &str,
	) -> Result<String, K8sError> {
		let params = LogParams {
			container: Some(container.to_string()),
			..Default::default()
		};
		self
			.pods(namespace)
			.logs(name, &params)
			.await
			.map_err(|e| not_found_or(e, name))
	}

	async fn get_namespace(&self, name: &str) -> Result<Namespace, K8sError> {
		let namespaces: Api<Namespace> = Api::all(self.client.clone());
		match namespaces.get(name).await {
			Ok(ns) => Ok(ns),
			Err(kube::Error::Api(err)) if err.code == 404 => {
				Err(K8sError::NamespaceNotFound { name: name.into() })
			}
			Err(e) => Err(e.into()),
		}
	}
}
