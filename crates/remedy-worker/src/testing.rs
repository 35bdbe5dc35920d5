// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;
use std::time::Duration;

use remedy_config::{SandboxConfig, SentryConfig, WorkerConfig};
use remedy_core::ErrorReport;
use remedy_enrich::{ContextEnricher, SentryEnricher};
use remedy_queue::{MessageQueue, QueueOptions, SqliteQueue};
use remedy_sandbox::testing::FakeK8sClient;
use remedy_sandbox::{AgentCredentials, SandboxRunner};
use sqlx::sqlite::SqlitePoolOptions;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{Orchestrator, WorkerStats};

const WAIT_LIMIT: Duration = Duration::from_secs(5);
const TICK: Duration = Duration::from_millis(5);

/// In-memory queue, fake cluster and an orchestrator wired to both.
pub(crate) struct Harness {
	pub queue: Arc<SqliteQueue>,
	pub k8s: Arc<FakeK8sClient>,
	pub orchestrator: Orchestrator,
	max_concurrent: usize,
}

impl Harness {
	pub async fn new(k8s: FakeK8sClient, max_concurrent: usize) -> Self {
		Self::with_visibility(k8s, max_concurrent, Duration::from_secs(60)).await
	}

	/// Like `new`, with unacknowledged messages reappearing after `visibility`.
	pub async fn with_visibility(
		k8s: FakeK8sClient,
		max_concurrent: usize,
		visibility: Duration,
	) -> Self {
		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.connect("sqlite::memory:")
			.await
			.unwrap();
		let queue = SqliteQueue::new(
			pool,
			QueueOptions {
				name: "error-fix".to_string(),
				wait_time: Duration::ZERO,
				visibility_timeout: visibility,
				max_receive_count: 5,
			},
		);
		queue.ensure_schema().await.unwrap();
		let queue = Arc::new(queue);
		let k8s = Arc::new(k8s);
		let orchestrator = build(&queue, &k8s, max_concurrent, None);
		Self {
			queue,
			k8s,
			orchestrator,
			max_concurrent,
		}
	}

	pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
		self.orchestrator = build(&self.queue, &self.k8s, self.max_concurrent, Some(timeout));
		self
	}

	/// Sentry enricher without credentials: located reports fall back,
	/// unlocated ones fail.
	pub fn enricher() -> Arc<dyn ContextEnricher> {
		Arc::new(SentryEnricher::new(&SentryConfig::default()).unwrap())
	}

	pub async fn publish(&self, event_id: &str, located: bool) {
		let file = if located {
			r#""fileName": "src/app.ts", "lineNumber": 12,"#
		} else {
			""
		};
		let report = ErrorReport::from_json(&format!(
			r#"{{
				"eventId": "{event_id}",
				"issueId": "4711",
				"errorType": "TypeError",
				"errorMessage": "x is undefined",
				{file}
				"environment": "production",
				"timestamp": "2025-03-01T12:00:00Z"
			}}"#
		))
		.unwrap();
		self.queue.publish(&report).await.unwrap();
	}

	pub async fn wait_for(&self, done: impl Fn() -> bool) {
		tokio::time::timeout(WAIT_LIMIT, async {
			while !done() {
				tokio::time::sleep(TICK).await;
			}
		})
		.await
		.expect("condition not reached in time");
	}

	/// Runs the orchestrator until `done` holds, then shuts it down.
	pub async fn run_until(&self, done: impl Fn(&WorkerStats) -> bool) -> WorkerStats {
		let token = CancellationToken::new();
		let orchestrator = self.orchestrator.clone();
		let handle = tokio::spawn({
			let token = token.clone();
			async move { orchestrator.run(token).await }
		});
		self.wait_for(|| done(&self.orchestrator.stats())).await;
		token.cancel();
		tokio::time::timeout(WAIT_LIMIT, handle)
			.await
			.expect("worker did not stop in time")
			.unwrap()
	}
}

fn build(
	queue: &Arc<SqliteQueue>,
	k8s: &Arc<FakeK8sClient>,
	max_concurrent: usize,
	job_timeout: Option<Duration>,
) -> Orchestrator {
	let credentials = AgentCredentials {
		llm_api_key: "sk-ant-test".into(),
		github_token: "ghp_test".into(),
		repository: "acme/web".to_string(),
		base_branch: "main".to_string(),
	};
	let mut runner = SandboxRunner::new(k8s.clone(), SandboxConfig::default(), credentials)
		.with_poll_interval(TICK);
	if let Some(timeout) = job_timeout {
		runner = runner.with_job_timeout(timeout);
	}
	let config = WorkerConfig {
		max_concurrent_jobs: max_concurrent,
		..WorkerConfig::default()
	};
	Orchestrator::new(queue.clone(), Harness::enricher(), runner, &config)
		.with_poll_interval(TICK)
		.with_shutdown_timeout(Duration::from_secs(2))
}
