// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use remedy_core::ErrorReport;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

pub const ATTR_JOB_TYPE: &str = "JobType";
pub const ATTR_ENVIRONMENT: &str = "Environment";
pub const ATTR_ERROR_TYPE: &str = "ErrorType";
pub const JOB_TYPE_ERROR_FIX: &str = "error-fix";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// A message handed to a consumer.
#[derive(Debug, Clone)]
pub struct QueueMessage {
	pub id: MessageId,
	/// Opaque handle for this particular delivery.
	pub receipt_handle: String,
	pub body: String,
	pub attributes: BTreeMap<String, String>,
	/// How many times the queue has delivered this message, this delivery
	/// included.
	pub receive_count: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueDepth {
	pub visible: u64,
	pub in_flight: u64,
	pub dead_lettered: u64,
}

/// Routing attributes published alongside every report.
pub fn routing_attributes(report: &ErrorReport) -> BTreeMap<String, String> {
	BTreeMap::from([
		(ATTR_JOB_TYPE.to_string(), JOB_TYPE_ERROR_FIX.to_string()),
		(ATTR_ENVIRONMENT.to_string(), report.environment.clone()),
		(ATTR_ERROR_TYPE.to_string(), report.error_type.clone()),
	])
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
	async fn send(&self, body: &str, attributes: &BTreeMap<String, String>) -> Result<MessageId>;

	/// Long-polls for at most one message, hiding it for the visibility
	/// timeout. Returns `None` when nothing arrived within the wait time.
	async fn receive(&self) -> Result<Option<QueueMessage>>;

	/// Permanently deletes the message. Only the most recent delivery's
	/// receipt handle is honoured; a stale one leaves the message in place.
	async fn ack(&self, message: &QueueMessage) -> Result<()>;

	async fn depth(&self) -> Result<QueueDepth>;

	/// Publishes a report with its routing attributes.
	async fn publish(&self, report: &ErrorReport) -> Result<MessageId> {
		let body = report.to_json()?;
		self.send(&body, &routing_attributes(report)).await
	}

	/// Decodes the message body. `None` means the message is poison and
	/// should be acknowledged and dropped.
	fn parse(&self, message: &QueueMessage) -> Option<ErrorReport> {
		match ErrorReport::from_json(&message.body) {
			Ok(report) => Some(report),
			Err(e) => {
				warn!(message_id = %message.id, error = %e, "discarding unparseable message body");
				None
			}
		}
	}
}
