// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Remediation jobs and their lifecycle.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::context::EnrichedErrorContext;
use crate::error::{CoreError, Result};
use crate::report::ErrorReport;

const K8S_NAME_PREFIX: &str = "remedy-";
const MAX_K8S_NAME_LENGTH: usize = 63;

/// Identifier of one remediation attempt.
///
/// Built from the event id, the dispatch time in milliseconds and a
/// per-process dispatch sequence. The sequence keeps two deliveries of the
/// same event dispatched within one millisecond apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
	pub fn for_dispatch(event_id: &str, dispatched_at: DateTime<Utc>, sequence: u64) -> Self {
		Self(format!(
			"{event_id}-{}-{sequence}",
			dispatched_at.timestamp_millis()
		))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Returns a DNS-1123 compatible pod name for this job.
	///
	/// When the id is too long the leading characters are dropped, keeping
	/// the dispatch timestamp and sequence suffix intact.
	pub fn as_k8s_name(&self) -> String {
		let sanitized: String = self
			.0
			.chars()
			.map(|c| {
				if c.is_ascii_alphanumeric() {
					c.to_ascii_lowercase()
				} else {
					'-'
				}
			})
			.collect();

		let budget = MAX_K8S_NAME_LENGTH - K8S_NAME_PREFIX.len();
		let tail = if sanitized.len() > budget {
			&sanitized[sanitized.len() - budget..]
		} else {
			sanitized.as_str()
		};

		format!(
			"{K8S_NAME_PREFIX}{}",
			tail.trim_matches('-')
		)
	}
}

impl fmt::Display for JobId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
	Queued,
	Enriching,
	Running,
	Succeeded,
	Failed,
	TimedOut,
	/// Enrichment failed; the message is left for redelivery.
	Abandoned,
}

impl JobState {
	pub fn is_terminal(self) -> bool {
		matches!(
			self,
			JobState::Succeeded | JobState::Failed | JobState::TimedOut | JobState::Abandoned
		)
	}

	fn can_transition_to(self, next: JobState) -> bool {
		matches!(
			(self, next),
			(JobState::Queued, JobState::Enriching)
				| (JobState::Enriching, JobState::Running)
				| (JobState::Enriching, JobState::Abandoned)
				| (JobState::Running, JobState::Succeeded)
				| (JobState::Running, JobState::Failed)
				| (JobState::Running, JobState::TimedOut)
		)
	}
}

impl fmt::Display for JobState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			JobState::Queued => "queued",
			JobState::Enriching => "enriching",
			JobState::Running => "running",
			JobState::Succeeded => "succeeded",
			JobState::Failed => "failed",
			JobState::TimedOut => "timed_out",
			JobState::Abandoned => "abandoned",
		};
		f.write_str(s)
	}
}

/// One remediation attempt for a dequeued report.
#[derive(Debug, Clone)]
pub struct Job {
	pub id: JobId,
	pub report: ErrorReport,
	pub context: Option<EnrichedErrorContext>,
	pub state: JobState,
	pub dispatched_at: DateTime<Utc>,
}

impl Job {
	pub fn new(report: ErrorReport, dispatched_at: DateTime<Utc>, sequence: u64) -> Self {
		Self {
			id: JobId::for_dispatch(&report.event_id, dispatched_at, sequence),
			report,
			context: None,
			state: JobState::Queued,
			dispatched_at,
		}
	}

	pub fn transition(&mut self, next: JobState) -> Result<()> {
		if !self.state.can_transition_to(next) {
			return Err(CoreError::InvalidTransition {
				from: self.state,
				to: next,
			});
		}
		self.state = next;
		Ok(())
	}

	/// Attaches the enriched context and moves the job to `Running`.
	pub fn start(&mut self, context: EnrichedErrorContext) -> Result<()> {
		self.transition(JobState::Running)?;
		self.context = Some(context);
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::report::fixtures::report;
	use chrono::TimeZone;

	#[test]
	fn job_id_combines_event_dispatch_time_and_sequence() {
		let at = Utc.timestamp_millis_opt(1_740_830_400_123).unwrap();
		let id = JobId::for_dispatch("abc123", at, 7);
		assert_eq!(id.as_str(), "abc123-1740830400123-7");
	}

	#[test]
	fn redispatch_yields_distinct_ids() {
		let a = JobId::for_dispatch("abc", Utc.timestamp_millis_opt(1_000).unwrap(), 0);
		let b = JobId::for_dispatch("abc", Utc.timestamp_millis_opt(1_001).unwrap(), 0);
		assert_ne!(a, b);
	}

	#[test]
	fn same_event_in_the_same_millisecond_gets_distinct_pods() {
		let at = Utc.timestamp_millis_opt(1_740_830_400_123).unwrap();
		let event = "f".repeat(32);
		let a = JobId::for_dispatch(&event, at, 1);
		let b = JobId::for_dispatch(&event, at, 2);
		assert_ne!(a, b);
		assert_ne!(a.as_k8s_name(), b.as_k8s_name());
	}

	#[test]
	fn k8s_name_is_valid_and_keeps_dispatch_suffix() {
		let long_event = "E".repeat(80);
		let id = JobId::for_dispatch(
			&long_event,
			Utc.timestamp_millis_opt(1_740_830_400_123).unwrap(),
			42,
		);
		let name = id.as_k8s_name();
		assert!(name.len() <= MAX_K8S_NAME_LENGTH);
		assert!(name.starts_with("remedy-"));
		assert!(name.ends_with("1740830400123-42"));
		assert!(name
			.chars()
			.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
	}

	#[test]
	fn k8s_name_replaces_invalid_characters() {
		let id = JobId("Ev_1.x-5".to_string());
		assert_eq!(id.as_k8s_name(), "remedy-ev-1-x-5");
	}

	#[test]
	fn job_follows_happy_path() {
		let mut job = Job::new(report(), Utc::now(), 0);
		assert_eq!(job.state, JobState::Queued);
		job.transition(JobState::Enriching).unwrap();
		job.start(crate::EnrichedErrorContext::fallback(job.report.clone())).unwrap();
		assert!(job.context.is_some());
		job.transition(JobState::TimedOut).unwrap();
		assert!(job.state.is_terminal());
	}

	#[test]
	fn job_rejects_skipping_enrichment() {
		let mut job = Job::new(report(), Utc::now(), 0);
		let err = job.transition(JobState::Running).unwrap_err();
		assert!(matches!(err, CoreError::InvalidTransition { .. }));
		assert_eq!(job.state, JobState::Queued);
	}

	#[test]
	fn terminal_states_do_not_transition() {
		let mut job = Job::new(report(), Utc::now(), 0);
		job.transition(JobState::Enriching).unwrap();
		job.transition(JobState::Abandoned).unwrap();
		assert!(job.transition(JobState::Running).is_err());
	}
}
