// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persistent sliding-window throttle.
//!
//! Every report that passes the [`Filter`](crate::Filter) is recorded as an
//! occurrence of its fingerprint. A report is admitted once its fingerprint
//! has been seen `min_occurrences` times within the window, provided fewer
//! than `max_fixes_per_hour` reports were admitted in the past hour. Counts
//! live in SQLite so they survive restarts.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use remedy_config::PolicyConfig;
use remedy_core::ErrorReport;
use sqlx::SqlitePool;
use tracing::{debug, instrument};

use crate::error::Result;
use crate::filter::{Decision, RejectReason};

const DEFAULT_WINDOW_SECS: i64 = 3600;

/// Groups reports that describe the same underlying problem.
///
/// The issue id is preferred since the tracker already groups events. Without
/// one, type and location stand in.
pub fn fingerprint(report: &ErrorReport) -> String {
	match report.issue_id.as_deref().filter(|id| !id.is_empty()) {
		Some(issue_id) => format!("issue:{issue_id}"),
		None => format!(
			"loc:{}|{}|{}",
			report.error_type,
			report.file_name.as_deref().unwrap_or_default(),
			report.line_number.map(|l| l.to_string()).unwrap_or_default()
		),
	}
}

#[async_trait]
pub trait Throttle: Send + Sync {
	/// Records an occurrence and decides whether a fix may be attempted.
	/// An accepted decision also consumes one slot of the hourly budget.
	async fn admit(&self, report: &ErrorReport, now: DateTime<Utc>) -> Result<Decision>;

	/// Gives back the hourly slot consumed by an accepted `admit` call made
	/// at `admitted_at`. Used when the admitted report never reached the queue.
	async fn release(&self, report: &ErrorReport, admitted_at: DateTime<Utc>) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteThrottle {
	pool: SqlitePool,
	min_occurrences: u32,
	max_fixes_per_hour: u32,
	window: Duration,
}

impl SqliteThrottle {
	pub fn new(pool: SqlitePool, policy: &PolicyConfig) -> Self {
		Self {
			pool,
			min_occurrences: policy.min_occurrences,
			max_fixes_per_hour: policy.max_fixes_per_hour,
			window: Duration::seconds(DEFAULT_WINDOW_SECS),
		}
	}

	pub fn with_window(mut self, window: Duration) -> Self {
		self.window = window;
		self
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		sqlx::query(
			r#"
			CREATE TABLE IF NOT EXISTS throttle_occurrences (
				fingerprint TEXT NOT NULL,
				seen_at INTEGER NOT NULL
			)
			"#,
		)
		.execute(&self.pool)
		.await?;
		sqlx::query(
			r#"
			CREATE INDEX IF NOT EXISTS idx_throttle_occurrences_fp
			ON throttle_occurrences (fingerprint, seen_at)
			"#,
		)
		.execute(&self.pool)
		.await?;
		sqlx::query(
			r#"
			CREATE TABLE IF NOT EXISTS throttle_fixes (
				fingerprint TEXT NOT NULL,
				admitted_at INTEGER NOT NULL
			)
			"#,
		)
		.execute(&self.pool)
		.await?;
		Ok(())
	}
}

#[async_trait]
impl Throttle for SqliteThrottle {
	#[instrument(skip(self, report), fields(event_id = %report.event_id))]
	async fn admit(&self, report: &ErrorReport, now: DateTime<Utc>) -> Result<Decision> {
		let fp = fingerprint(report);
		let now_ms = now.timestamp_millis();
		let window_start = (now - self.window).timestamp_millis();
		let hour_start = (now - Duration::hours(1)).timestamp_millis();

		let mut tx = self.pool.begin().await?;

		sqlx::query("DELETE FROM throttle_occurrences WHERE seen_at < ?")
			.bind(window_start)
			.execute(&mut *tx)
			.await?;
		sqlx::query("DELETE FROM throttle_fixes WHERE admitted_at < ?")
			.bind(window_start.min(hour_start))
			.execute(&mut *tx)
			.await?;

		sqlx::query("INSERT INTO throttle_occurrences (fingerprint, seen_at) VALUES (?, ?)")
			.bind(&fp)
			.bind(now_ms)
			.execute(&mut *tx)
			.await?;

		let seen: i64 = sqlx::query_scalar(
			"SELECT COUNT(*) FROM throttle_occurrences WHERE fingerprint = ? AND seen_at >= ?",
		)
		.bind(&fp)
		.bind(window_start)
		.fetch_one(&mut *tx)
		.await?;

		let seen = u32::try_from(seen).unwrap_or(u32::MAX);
		if seen < self.min_occurrences {
			tx.commit().await?;
			debug!(fingerprint = %fp, seen, required = self.min_occurrences, "below occurrence threshold");
			return Ok(Decision::Reject(RejectReason::BelowMinOccurrences {
				seen,
				required: self.min_occurrences,
			}));
		}

		let fixes: i64 =
			sqlx::query_scalar("SELECT COUNT(*) FROM throttle_fixes WHERE admitted_at >= ?")
				.bind(hour_start)
				.fetch_one(&mut *tx)
				.await?;

		let fixes = u32::try_from(fixes).unwrap_or(u32::MAX);
		if fixes >= self.max_fixes_per_hour {
			tx.commit().await?;
			debug!(fingerprint = %fp, fixes, limit = self.max_fixes_per_hour, "hourly fix budget exhausted");
			return Ok(Decision::Reject(RejectReason::RateLimited {
				fixes,
				limit: self.max_fixes_per_hour,
			}));
		}

		sqlx::query("INSERT INTO throttle_fixes (fingerprint, admitted_at) VALUES (?, ?)")
			.bind(&fp)
			.bind(now_ms)
			.execute(&mut *tx)
			.await?;

		tx.commit().await?;
		Ok(Decision::Accept)
	}

	#[instrument(skip(self, report), fields(event_id = %report.event_id))]
	async fn release(&self, report: &ErrorReport, admitted_at: DateTime<Utc>) -> Result<()> {
		let fp = fingerprint(report);
		let released = sqlx::query(
			r#"
			DELETE FROM throttle_fixes WHERE rowid = (
				SELECT rowid FROM throttle_fixes
				WHERE fingerprint = ? AND admitted_at = ?
				LIMIT 1
			)
			"#,
		)
		.bind(&fp)
		.bind(admitted_at.timestamp_millis())
		.execute(&self.pool)
		.await?
		.rows_affected();
		debug!(fingerprint = %fp, released, "released hourly fix slot");
		Ok(())
	}
}
