// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite-backed queue.
//!
//! Each row carries a `visible_at` timestamp. Receiving a message bumps its
//! receive count, stamps a fresh receipt handle and pushes `visible_at` out
//! by the visibility timeout in one statement, so two consumers can never
//! hold the same delivery.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use remedy_config::QueueConfig;
use sqlx::SqlitePool;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::pool::create_pool;
use crate::queue::{MessageId, MessageQueue, QueueDepth, QueueMessage};

const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct QueueOptions {
	pub name: String,
	pub wait_time: Duration,
	pub visibility_timeout: Duration,
	pub max_receive_count: u32,
}

impl From<&QueueConfig> for QueueOptions {
	fn from(config: &QueueConfig) -> Self {
		Self {
			name: config.name.clone(),
			wait_time: Duration::from_secs(config.wait_time_secs),
			visibility_timeout: Duration::from_secs(config.visibility_timeout_secs),
			max_receive_count: config.max_receive_count,
		}
	}
}

#[derive(Clone)]
pub struct SqliteQueue {
	pool: SqlitePool,
	options: QueueOptions,
}

impl SqliteQueue {
	pub fn new(pool: SqlitePool, options: QueueOptions) -> Self {
		Self { pool, options }
	}

	/// Opens the queue database at `url` and creates the schema if needed.
	pub async fn connect(url: &str, options: QueueOptions) -> Result<Self> {
		let pool = create_pool(url).await?;
		let queue = Self::new(pool, options);
		queue.ensure_schema().await?;
		Ok(queue)
	}

	/// Returns a handle on the same queue with a different long-poll wait.
	pub fn with_wait_time(&self, wait_time: Duration) -> Self {
		let mut queue = self.clone();
		queue.options.wait_time = wait_time;
		queue
	}

	pub async fn ensure_schema(&self) -> Result<()> {
		sqlx::query(
			r#"
			CREATE TABLE IF NOT EXISTS queue_messages (
				id TEXT PRIMARY KEY,
				queue TEXT NOT NULL,
				body TEXT NOT NULL,
				attributes TEXT NOT NULL,
				receive_count INTEGER NOT NULL DEFAULT 0,
				visible_at INTEGER NOT NULL,
				receipt_handle TEXT,
				dead_lettered INTEGER NOT NULL DEFAULT 0,
				created_at INTEGER NOT NULL
			)
			"#,
		)
		.execute(&self.pool)
		.await?;
		sqlx::query(
			r#"
			CREATE INDEX IF NOT EXISTS idx_queue_messages_visible
			ON queue_messages (queue, dead_lettered, visible_at)
			"#,
		)
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	/// Moves messages that exhausted their receives and lapsed again to the
	/// dead-letter state.
	async fn dead_letter_exhausted(&self, now_ms: i64) -> Result<u64> {
		let result = sqlx::query(
			r#"
			UPDATE queue_messages
			SET dead_lettered = 1, receipt_handle = NULL
			WHERE queue = ? AND dead_lettered = 0 AND visible_at <= ? AND receive_count >= ?
			"#,
		)
		.bind(&self.options.name)
		.bind(now_ms)
		.bind(i64::from(self.options.max_receive_count))
		.execute(&self.pool)
		.await?;

		let moved = result.rows_affected();
		if moved > 0 {
			warn!(queue = %self.options.name, count = moved, "dead-lettered messages after max receives");
		}
		Ok(moved)
	}

	async fn try_receive(&self) -> Result<Option<QueueMessage>> {
		let now_ms = Utc::now().timestamp_millis();
		self.dead_letter_exhausted(now_ms).await?;

		let visibility_ms = i64::try_from(self.options.visibility_timeout.as_millis()).unwrap_or(i64::MAX);
		let receipt_handle = Uuid::new_v4().to_string();

		let row = sqlx::query_as::<_, (String, String, String, i64)>(
			r#"
			UPDATE queue_messages
			SET receive_count = receive_count + 1,
				visible_at = ?,
				receipt_handle = ?
			WHERE id = (
				SELECT id FROM queue_messages
				WHERE queue = ? AND dead_lettered = 0 AND visible_at <= ?
				ORDER BY created_at, rowid
				LIMIT 1
			)
			RETURNING id, body, attributes, receive_count
			"#,
		)
		.bind(now_ms.saturating_add(visibility_ms))
		.bind(&receipt_handle)
		.bind(&self.options.name)
		.bind(now_ms)
		.fetch_optional(&self.pool)
		.await?;

		let Some((id, body, attributes, receive_count)) = row else {
			return Ok(None);
		};

		let attributes: BTreeMap<String, String> = serde_json::from_str(&attributes)?;
		Ok(Some(QueueMessage {
			id: MessageId(id),
			receipt_handle,
			body,
			attributes,
			receive_count: u32::try_from(receive_count).unwrap_or(u32::MAX),
		}))
	}
}

#[async_trait]
impl MessageQueue for SqliteQueue {
	#[instrument(skip(self, body, attributes), fields(queue = %self.options.name))]
	async fn send(&self, body: &str, attributes: &BTreeMap<String, String>) -> Result<MessageId> {
		let id = Uuid::new_v4().to_string();
		let now_ms = Utc::now().timestamp_millis();
		let attributes = serde_json::to_string(attributes)?;

		sqlx::query(
			r#"
			INSERT INTO queue_messages (id, queue, body, attributes, visible_at, created_at)
			VALUES (?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(&id)
		.bind(&self.options.name)
		.bind(body)
		.bind(attributes)
		.bind(now_ms)
		.bind(now_ms)
		.execute(&self.pool)
		.await?;

		debug!(message_id = %id, "message enqueued");
		Ok(MessageId(id))
	}

	async fn receive(&self) -> Result<Option<QueueMessage>> {
		let deadline = tokio::time::Instant::now() + self.options.wait_time;
		loop {
			if let Some(message) = self.try_receive().await? {
				debug!(
					message_id = %message.id,
					receive_count = message.receive_count,
					"message received"
				);
				return Ok(Some(message));
			}

			let now = tokio::time::Instant::now();
			if now >= deadline {
				return Ok(None);
			}
			tokio::time::sleep(RECEIVE_POLL_INTERVAL.min(deadline - now)).await;
		}
	}

	#[instrument(skip(self, message), fields(message_id = %message.id))]
	async fn ack(&self, message: &QueueMessage) -> Result<()> {
		let result = sqlx::query("DELETE FROM queue_messages WHERE id = ? AND receipt_handle = ?")
			.bind(&message.id.0)
			.bind(&message.receipt_handle)
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			warn!("ack for message that no longer exists or was redelivered since");
		} else {
			debug!("message acknowledged");
		}
		Ok(())
	}

	async fn depth(&self) -> Result<QueueDepth> {
		let now_ms = Utc::now().timestamp_millis();
		let (visible, in_flight, dead_lettered) = sqlx::query_as::<_, (i64, i64, i64)>(
			r#"
			SELECT
				COALESCE(SUM(CASE WHEN dead_lettered = 0 AND visible_at <= ? THEN 1 ELSE 0 END), 0),
				COALESCE(SUM(CASE WHEN dead_lettered = 0 AND visible_at > ? THEN 1 ELSE 0 END), 0),
				COALESCE(SUM(CASE WHEN dead_lettered = 1 THEN 1 ELSE 0 END), 0)
			FROM queue_messages
			WHERE queue = ?
			"#,
		)
		.bind(now_ms)
		.bind(now_ms)
		.bind(&self.options.name)
		.fetch_one(&self.pool)
		.await?;

		Ok(QueueDepth {
			visible: visible.max(0) as u64,
			in_flight: in_flight.max(0) as u64,
			dead_lettered: dead_lettered.max(0) as u64,
		})
	}
}
