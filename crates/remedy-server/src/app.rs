// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Process wiring for the serve, drain and dry-run modes.

use std::sync::Arc;
use std::time::Duration;

use remedy_config::RemedyConfig;
use remedy_enrich::SentryEnricher;
use remedy_ingest::Ingestor;
use remedy_policy::{Filter, SqliteThrottle};
use remedy_queue::{create_pool, MessageQueue, QueueOptions, SqliteQueue};
use remedy_sandbox::{AgentCredentials, KubeClient, SandboxRunner};
use remedy_worker::{DryRun, Orchestrator};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::routes::{create_router, AppState};

/// Wait used by the one-shot modes so an empty queue is noticed quickly.
const ONE_SHOT_WAIT: Duration = Duration::from_secs(1);

pub async fn open_queue(config: &RemedyConfig) -> Result<SqliteQueue> {
	let url = config.require_queue_url()?;
	let queue = SqliteQueue::connect(url, QueueOptions::from(&config.queue)).await?;
	info!(queue = %config.queue.name, "queue ready");
	Ok(queue)
}

pub async fn build_ingestor(
	config: &RemedyConfig,
	queue: Arc<dyn MessageQueue>,
) -> Result<Ingestor> {
	let filter = Filter::new(config.policy.clone())?;
	let pool = create_pool(&config.database.url).await?;
	let throttle = SqliteThrottle::new(pool, &config.policy);
	throttle.ensure_schema().await?;

	if config.webhook.secret.is_none() {
		warn!(
			environment = %config.webhook.environment,
			"webhook secret not configured"
		);
	}

	Ok(Ingestor::new(
		config.webhook.clone(),
		filter,
		Arc::new(throttle),
		queue,
	))
}

/// Fails when worker credentials are missing or the sandbox namespace does
/// not exist.
pub async fn build_orchestrator(
	config: &RemedyConfig,
	queue: Arc<dyn MessageQueue>,
) -> Result<Orchestrator> {
	let credentials = config.require_worker_credentials()?;
	let k8s = KubeClient::new().await?;
	let runner = SandboxRunner::new(
		Arc::new(k8s),
		config.sandbox.clone(),
		AgentCredentials::from(&credentials),
	);
	runner.validate_namespace().await?;

	let enricher = SentryEnricher::new(&config.sentry)?;
	if !enricher.has_credentials() {
		warn!("no Sentry auth token, reports will not be enriched");
	}

	Ok(Orchestrator::new(
		queue,
		Arc::new(enricher),
		runner,
		&config.worker,
	))
}

/// Runs the webhook server and, when enabled, the worker until a shutdown
/// signal arrives.
pub async fn serve(config: RemedyConfig) -> Result<()> {
	let queue: Arc<dyn MessageQueue> = Arc::new(open_queue(&config).await?);
	let ingestor = build_ingestor(&config, Arc::clone(&queue)).await?;
	let shutdown = CancellationToken::new();

	let (worker_state, worker) = if config.worker.enabled {
		let orchestrator = build_orchestrator(&config, Arc::clone(&queue)).await?;
		let states = orchestrator.subscribe();
		let token = shutdown.clone();
		let handle = tokio::spawn(async move { orchestrator.run(token).await });
		(Some(states), Some(handle))
	} else {
		info!("worker disabled, serving webhooks only");
		(None, None)
	};

	let app = create_router(AppState {
		ingestor: Arc::new(ingestor),
		worker: worker_state,
	});

	let addr = config.socket_addr();
	let listener = tokio::net::TcpListener::bind(&addr).await?;
	info!(addr = %addr, "listening");

	tokio::spawn({
		let token = shutdown.clone();
		async move {
			shutdown_signal().await;
			info!("received shutdown signal");
			token.cancel();
		}
	});

	let token = shutdown.clone();
	axum::serve(listener, app)
		.with_graceful_shutdown(async move { token.cancelled().await })
		.await?;

	if let Some(handle) = worker {
		match handle.await {
			Ok(stats) => info!(?stats, "worker finished"),
			Err(e) => error!(error = %e, "worker task failed"),
		}
	}

	info!("shutdown complete");
	Ok(())
}

/// Acknowledges every queued message without running anything.
pub async fn clear_queue(config: &RemedyConfig) -> Result<usize> {
	let queue = open_queue(config).await?.with_wait_time(ONE_SHOT_WAIT);
	Ok(remedy_worker::drain(&queue).await?)
}

/// Enriches the next queued message and leaves it on the queue.
pub async fn preview(config: &RemedyConfig) -> Result<Option<DryRun>> {
	let queue = open_queue(config).await?.with_wait_time(ONE_SHOT_WAIT);
	let enricher = SentryEnricher::new(&config.sentry)?;
	Ok(remedy_worker::dry_run(&queue, &enricher).await?)
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			error!(error = %e, "failed to listen for ctrl-c");
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut signal) => {
				signal.recv().await;
			}
			Err(e) => {
				error!(error = %e, "failed to listen for SIGTERM");
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {}
		_ = terminate => {}
	}
}
