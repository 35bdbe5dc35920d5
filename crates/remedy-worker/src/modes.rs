// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! One-shot operator modes that never launch a sandbox.

use remedy_core::{EnrichedErrorContext, ErrorReport};
use remedy_enrich::ContextEnricher;
use remedy_queue::{MessageId, MessageQueue};
use tracing::{debug, info};

use crate::error::{Result, WorkerError};

/// Receives and acknowledges every available message.
///
/// Stops at the first empty receive, so the queue's wait time bounds how long
/// an already-empty queue takes to drain.
pub async fn drain(queue: &dyn MessageQueue) -> Result<usize> {
	let mut drained = 0;
	while let Some(message) = queue.receive().await? {
		queue.ack(&message).await?;
		debug!(message_id = %message.id, "drained message");
		drained += 1;
	}
	info!(drained, "queue drained");
	Ok(drained)
}

/// A report before and after enrichment.
#[derive(Debug, Clone)]
pub struct DryRun {
	pub message_id: MessageId,
	pub before: ErrorReport,
	pub after: EnrichedErrorContext,
}

impl DryRun {
	pub fn render(&self) -> Result<String> {
		Ok(format!(
			"message {}\n--- received ---\n{}\n--- enriched ---\n{}\n",
			self.message_id,
			serde_json::to_string_pretty(&self.before)?,
			serde_json::to_string_pretty(&self.after)?,
		))
	}
}

/// Enriches the next message without acknowledging it. The message reappears
/// once its visibility timeout lapses.
pub async fn dry_run(
	queue: &dyn MessageQueue,
	enricher: &dyn ContextEnricher,
) -> Result<Option<DryRun>> {
	let Some(message) = queue.receive().await? else {
		info!("queue is empty, nothing to preview");
		return Ok(None);
	};
	let before = queue
		.parse(&message)
		.ok_or_else(|| WorkerError::Poison(message.id.clone()))?;
	let after = enricher.enrich(&before).await?;

	info!(
		message_id = %message.id,
		enriched = after.enriched,
		"dry run complete, message left on the queue"
	);
	Ok(Some(DryRun {
		message_id: message.id,
		before,
		after,
	}))
}
