// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Queue consumer that turns reports into sandboxed remediation attempts.
//!
//! At most `max_concurrent_jobs` attempts are in flight. A message is only
//! acknowledged when its attempt succeeds or its body is unparseable; every
//! other outcome leaves it to reappear after the visibility timeout.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use remedy_config::WorkerConfig;
use remedy_core::{ErrorReport, Job, JobState};
use remedy_enrich::ContextEnricher;
use remedy_queue::{MessageQueue, QueueMessage};
use remedy_sandbox::SandboxRunner;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::log_tail::tail;

const BASE_RECEIVE_BACKOFF_SECS: u64 = 1;
const MAX_RECEIVE_BACKOFF_SECS: u64 = 60;
const RECEIVE_BACKOFF_FACTOR: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
	Idle,
	Polling,
	Dispatching,
	ShuttingDown,
	Stopped,
}

impl fmt::Display for WorkerState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			WorkerState::Idle => "idle",
			WorkerState::Polling => "polling",
			WorkerState::Dispatching => "dispatching",
			WorkerState::ShuttingDown => "shutting_down",
			WorkerState::Stopped => "stopped",
		};
		f.write_str(s)
	}
}

/// Counters over the lifetime of one [`Orchestrator::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
	pub dispatched: u64,
	pub succeeded: u64,
	pub failed: u64,
	pub timed_out: u64,
	pub abandoned: u64,
	/// Unparseable messages acknowledged and dropped.
	pub poison: u64,
}

impl WorkerStats {
	/// Attempts that reached a terminal state.
	pub fn completed(&self) -> u64 {
		self.succeeded + self.failed + self.timed_out + self.abandoned
	}

	fn record(&mut self, result: Result<JobState, JoinError>) {
		match result {
			Ok(JobState::Succeeded) => self.succeeded += 1,
			Ok(JobState::TimedOut) => self.timed_out += 1,
			Ok(JobState::Abandoned) => self.abandoned += 1,
			Ok(_) => self.failed += 1,
			Err(e) if e.is_cancelled() => {}
			Err(e) => {
				error!(error = %e, "remediation task panicked");
				self.failed += 1;
			}
		}
	}
}

#[derive(Clone)]
pub struct Orchestrator {
	queue: Arc<dyn MessageQueue>,
	enricher: Arc<dyn ContextEnricher>,
	runner: SandboxRunner,
	max_concurrent: usize,
	poll_interval: Duration,
	shutdown_timeout: Duration,
	log_tail_lines: usize,
	state: Arc<watch::Sender<WorkerState>>,
	stats: Arc<Mutex<WorkerStats>>,
	/// Distinguishes attempts dispatched for the same event in the same millisecond.
	sequence: Arc<AtomicU64>,
}

impl Orchestrator {
	pub fn new(
		queue: Arc<dyn MessageQueue>,
		enricher: Arc<dyn ContextEnricher>,
		runner: SandboxRunner,
		config: &WorkerConfig,
	) -> Self {
		let (state, _) = watch::channel(WorkerState::Idle);
		Self {
			queue,
			enricher,
			runner,
			max_concurrent: config.max_concurrent_jobs.max(1),
			poll_interval: Duration::from_secs(config.poll_interval_secs),
			shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
			log_tail_lines: config.log_tail_lines,
			state: Arc::new(state),
			stats: Arc::new(Mutex::new(WorkerStats::default())),
			sequence: Arc::new(AtomicU64::new(0)),
		}
	}

	pub fn with_poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;
		self
	}

	pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
		self.shutdown_timeout = timeout;
		self
	}

	pub fn state(&self) -> WorkerState {
		*self.state.borrow()
	}

	pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
		self.state.subscribe()
	}

	pub fn stats(&self) -> WorkerStats {
		*self.lock_stats()
	}

	pub fn runner(&self) -> &SandboxRunner {
		&self.runner
	}

	fn lock_stats(&self) -> MutexGuard<'_, WorkerStats> {
		self.stats.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn set_state(&self, state: WorkerState) {
		let previous = self.state.send_replace(state);
		if previous != state {
			debug!(from = %previous, to = %state, "worker state changed");
		}
	}

	fn reap(&self, result: Result<JobState, JoinError>) {
		self.lock_stats().record(result);
	}

	/// Polls until `shutdown` is cancelled, then stops every sandbox and waits
	/// up to the shutdown timeout for in-flight attempts.
	pub async fn run(&self, shutdown: CancellationToken) -> WorkerStats {
		let mut tasks: JoinSet<JobState> = JoinSet::new();
		let mut receive_failures: u32 = 0;

		info!(
			max_concurrent = self.max_concurrent,
			poll_interval_ms = self.poll_interval.as_millis() as u64,
			"worker started"
		);

		loop {
			if shutdown.is_cancelled() {
				break;
			}

			while let Some(result) = tasks.try_join_next() {
				self.reap(result);
			}

			if tasks.len().max(self.runner.active_count()) >= self.max_concurrent {
				self.set_state(WorkerState::Idle);
				tokio::select! {
					_ = shutdown.cancelled() => break,
					Some(result) = tasks.join_next() => self.reap(result),
					_ = tokio::time::sleep(self.poll_interval) => {}
				}
				continue;
			}

			self.set_state(WorkerState::Polling);
			let received = tokio::select! {
				_ = shutdown.cancelled() => break,
				received = self.queue.receive() => received,
			};

			match received {
				Ok(Some(message)) => {
					receive_failures = 0;
					self.set_state(WorkerState::Dispatching);
					self.dispatch(message, &mut tasks, &shutdown).await;
				}
				Ok(None) => {
					receive_failures = 0;
					self.set_state(WorkerState::Idle);
					tokio::select! {
						_ = shutdown.cancelled() => break,
						_ = tokio::time::sleep(self.poll_interval) => {}
					}
				}
				Err(e) => {
					receive_failures += 1;
					let delay = receive_backoff(receive_failures);
					error!(
						error = %e,
						failures = receive_failures,
						retry_in_secs = delay.as_secs(),
						"failed to receive from queue"
					);
					tokio::select! {
						_ = shutdown.cancelled() => break,
						_ = tokio::time::sleep(delay) => {}
					}
				}
			}
		}

		self.shut_down(tasks).await;
		let stats = self.stats();
		info!(?stats, "worker stopped");
		stats
	}

	async fn dispatch(
		&self,
		message: QueueMessage,
		tasks: &mut JoinSet<JobState>,
		shutdown: &CancellationToken,
	) {
		let Some(report) = self.queue.parse(&message) else {
			self.lock_stats().poison += 1;
			if let Err(e) = self.queue.ack(&message).await {
				error!(message_id = %message.id, error = %e, "failed to acknowledge poison message");
			}
			return;
		};

		self.lock_stats().dispatched += 1;
		info!(
			message_id = %message.id,
			event_id = %report.event_id,
			receive_count = message.receive_count,
			in_flight = tasks.len() + 1,
			"dispatching remediation"
		);

		let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
		let this = self.clone();
		let shutdown = shutdown.clone();
		tasks.spawn(async move { this.execute(message, report, sequence, shutdown).await });
	}

	#[instrument(skip_all, fields(message_id = %message.id, event_id = %report.event_id))]
	async fn execute(
		&self,
		message: QueueMessage,
		report: ErrorReport,
		sequence: u64,
		shutdown: CancellationToken,
	) -> JobState {
		let mut job = Job::new(report, Utc::now(), sequence);
		advance(&mut job, JobState::Enriching);

		let context = match self.enricher.enrich(&job.report).await {
			Ok(context) => context,
			Err(e) => {
				warn!(job_id = %job.id, error = %e, "enrichment failed, leaving message for redelivery");
				advance(&mut job, JobState::Abandoned);
				return job.state;
			}
		};

		if shutdown.is_cancelled() {
			info!(job_id = %job.id, "shutdown requested before sandbox launch");
			advance(&mut job, JobState::Abandoned);
			return job.state;
		}

		if let Err(e) = job.start(context.clone()) {
			error!(job_id = %job.id, error = %e, "could not start job");
			return job.state;
		}

		match self.runner.run(&job.id, &context).await {
			Ok(outcome) if outcome.success => {
				advance(&mut job, JobState::Succeeded);
				match self.queue.ack(&message).await {
					Ok(()) => info!(job_id = %job.id, "remediation succeeded, message acknowledged"),
					Err(e) => error!(job_id = %job.id, error = %e, "remediation succeeded but acknowledgement failed"),
				}
			}
			Ok(outcome) => {
				let next = if outcome.timed_out {
					JobState::TimedOut
				} else {
					JobState::Failed
				};
				advance(&mut job, next);
				warn!(
					job_id = %job.id,
					state = %job.state,
					exit_code = ?outcome.exit_code,
					log_tail = %tail(&outcome.logs, self.log_tail_lines),
					"remediation did not succeed, message left for redelivery"
				);
			}
			Err(e) => {
				advance(&mut job, JobState::Failed);
				error!(job_id = %job.id, error = %e, "sandbox failed, message left for redelivery");
			}
		}

		job.state
	}

	async fn shut_down(&self, mut tasks: JoinSet<JobState>) {
		self.set_state(WorkerState::ShuttingDown);
		let stopped = self.runner.stop_all().await;
		info!(in_flight = tasks.len(), stopped, "worker shutting down");

		let drained = tokio::time::timeout(self.shutdown_timeout, async {
			while let Some(result) = tasks.join_next().await {
				self.reap(result);
			}
		})
		.await;

		if drained.is_err() {
			let late = self.runner.stop_all().await;
			warn!(
				remaining = tasks.len(),
				stopped = late,
				timeout_secs = self.shutdown_timeout.as_secs(),
				"in-flight attempts did not finish in time, aborting"
			);
			tasks.abort_all();
			while let Some(result) = tasks.join_next().await {
				self.reap(result);
			}
		}

		self.set_state(WorkerState::Stopped);
	}
}

fn advance(job: &mut Job, next: JobState) {
	if let Err(e) = job.transition(next) {
		error!(job_id = %job.id, error = %e, "rejected job state change");
	}
}

/// Delay after `failures` consecutive receive errors.
pub(crate) fn receive_backoff(failures: u32) -> Duration {
	let delay =
		BASE_RECEIVE_BACKOFF_SECS as f64 * RECEIVE_BACKOFF_FACTOR.powi(failures as i32 - 1);
	Duration::from_secs((delay as u64).min(MAX_RECEIVE_BACKOFF_SECS))
}
