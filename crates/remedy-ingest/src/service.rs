// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use chrono::Utc;
use remedy_config::{PolicyConfig, WebhookConfig};
use remedy_policy::{Decision, Filter, RejectReason, Throttle};
use remedy_queue::MessageQueue;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::payload::parse_webhook;
use crate::signature::verify_request;

/// Header naming the webhook resource (`event_alert`, `error`, `issue`).
pub const RESOURCE_HEADER: &str = "sentry-hook-resource";

const SKIP_NO_LOCATION: &str = "insufficient location information";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IngestOutcome {
	Queued {
		#[serde(rename = "messageId")]
		message_id: String,
	},
	Filtered {
		reason: String,
		#[serde(skip)]
		rejection: RejectReason,
	},
	Skipped {
		reason: String,
	},
	Ignored {
		action: String,
	},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineHealth {
	pub status: &'static str,
	pub pipeline_enabled: bool,
	pub environments: Vec<String>,
}

/// Webhook entry point: authenticates, normalizes, filters and enqueues.
pub struct Ingestor {
	webhook: WebhookConfig,
	filter: Filter,
	throttle: Arc<dyn Throttle>,
	queue: Arc<dyn MessageQueue>,
}

impl Ingestor {
	pub fn new(
		webhook: WebhookConfig,
		filter: Filter,
		throttle: Arc<dyn Throttle>,
		queue: Arc<dyn MessageQueue>,
	) -> Self {
		Self {
			webhook,
			filter,
			throttle,
			queue,
		}
	}

	pub fn signature_header(&self) -> &str {
		&self.webhook.signature_header
	}

	pub fn policy(&self) -> &PolicyConfig {
		self.filter.config()
	}

	pub fn health(&self) -> PipelineHealth {
		let policy = self.policy();
		PipelineHealth {
			status: "ok",
			pipeline_enabled: policy.enabled,
			environments: policy.allowed_environments.clone(),
		}
	}

	/// Handles one delivery. The signature is checked against the raw bytes
	/// before the body is parsed.
	#[instrument(skip(self, signature, body), fields(resource = resource.unwrap_or("unknown")))]
	pub async fn handle(
		&self,
		signature: Option<&str>,
		resource: Option<&str>,
		body: &[u8],
	) -> Result<IngestOutcome> {
		verify_request(&self.webhook, body, signature)?;

		let webhook = parse_webhook(body)?;
		if !webhook.is_actionable() {
			debug!(action = %webhook.action, "ignoring webhook action");
			return Ok(IngestOutcome::Ignored {
				action: webhook.action,
			});
		}

		let Some(report) = webhook.report.filter(|r| r.is_deliverable()) else {
			info!("skipping webhook without a usable location or issue id");
			return Ok(IngestOutcome::Skipped {
				reason: SKIP_NO_LOCATION.to_string(),
			});
		};

		let admitted_at = Utc::now();
		let decision = match self.filter.evaluate(&report) {
			Decision::Accept => self.throttle.admit(&report, admitted_at).await?,
			rejected => rejected,
		};
		if let Decision::Reject(rejection) = decision {
			info!(
				event_id = %report.event_id,
				error_type = %report.error_type,
				reason = %rejection,
				"error report filtered"
			);
			return Ok(IngestOutcome::Filtered {
				reason: rejection.to_string(),
				rejection,
			});
		}

		let message_id = match self.queue.publish(&report).await {
			Ok(id) => id,
			Err(e) => {
				if let Err(release) = self.throttle.release(&report, admitted_at).await {
					warn!(event_id = %report.event_id, error = %release, "failed to release fix slot");
				}
				return Err(e.into());
			}
		};
		info!(
			event_id = %report.event_id,
			message_id = %message_id,
			error_type = %report.error_type,
			file = report.file_name.as_deref().unwrap_or_default(),
			"error report queued"
		);
		Ok(IngestOutcome::Queued {
			message_id: message_id.0,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::IngestError;
	use crate::signature::compute_signature;
	use remedy_config::AppEnvironment;
	use remedy_policy::SqliteThrottle;
	use remedy_queue::{QueueOptions, SqliteQueue, ATTR_JOB_TYPE};
	use serde_json::{json, Value};
	use sqlx::sqlite::SqlitePoolOptions;
	use std::time::Duration;

	const SECRET: &str = "whsec_test";

	struct Harness {
		ingestor: Ingestor,
		queue: Arc<SqliteQueue>,
	}

	async fn harness(policy: PolicyConfig) -> Harness {
		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.connect("sqlite::memory:")
			.await
			.unwrap();

		let queue = SqliteQueue::new(
			pool.clone(),
			QueueOptions {
				name: "error-fix".to_string(),
				wait_time: Duration::ZERO,
				visibility_timeout: Duration::from_secs(900),
				max_receive_count: 5,
			},
		);
		queue.ensure_schema().await.unwrap();
		let queue = Arc::new(queue);

		let throttle = SqliteThrottle::new(pool, &policy);
		throttle.ensure_schema().await.unwrap();

		let webhook = WebhookConfig {
			environment: AppEnvironment::Production,
			signature_header: "sentry-hook-signature".to_string(),
			secret: Some(SECRET.into()),
		};

		Harness {
			ingestor: Ingestor::new(
				webhook,
				Filter::new(policy).unwrap(),
				Arc::new(throttle),
				queue.clone(),
			),
			queue,
		}
	}

	fn event(error_type: &str, message: &str, environment: &str) -> Value {
		json!({
			"action": "triggered",
			"data": {"event": {
				"event_id": "0f1e2d3c4b5a69788796a5b4c3d2e1f0",
				"issue_id": "4711",
				"environment": environment,
				"project_slug": "web",
				"exception": {"values": [{
					"type": error_type,
					"value": message,
					"stacktrace": {"frames": [
						{"filename": "src/components/Reader.tsx", "lineno": 42, "in_app": true}
					]}
				}]}
			}}
		})
	}

	async fn deliver(h: &Harness, payload: &Value) -> Result<IngestOutcome> {
		let body = serde_json::to_vec(payload).unwrap();
		let sig = compute_signature(SECRET.as_bytes(), &body).unwrap();
		h.ingestor.handle(Some(&sig), Some("event_alert"), &body).await
	}

	#[tokio::test]
	async fn production_type_error_is_queued() {
		let h = harness(PolicyConfig::default()).await;
		let outcome = deliver(&h, &event("TypeError", "x is undefined", "production"))
			.await
			.unwrap();
		assert!(matches!(outcome, IngestOutcome::Queued { .. }));

		let message = h.queue.receive().await.unwrap().unwrap();
		assert_eq!(message.attributes[ATTR_JOB_TYPE], "error-fix");
		let report = h.queue.parse(&message).unwrap();
		assert_eq!(report.file_name.as_deref(), Some("src/components/Reader.tsx"));
		assert_eq!(report.line_number, Some(42));
	}

	#[tokio::test]
	async fn ignored_message_pattern_is_filtered() {
		let h = harness(PolicyConfig::default()).await;
		let outcome = deliver(
			&h,
			&event("Error", "ResizeObserver loop limit exceeded", "production"),
		)
		.await
		.unwrap();
		assert!(matches!(
			outcome,
			IngestOutcome::Filtered {
				rejection: RejectReason::IgnoredMessage { .. },
				..
			}
		));
		assert_eq!(h.queue.depth().await.unwrap().visible, 0);
	}

	#[tokio::test]
	async fn staging_is_filtered_by_default() {
		let h = harness(PolicyConfig::default()).await;
		let outcome = deliver(&h, &event("TypeError", "boom", "staging"))
			.await
			.unwrap();
		assert!(matches!(outcome, IngestOutcome::Filtered { .. }));
	}

	#[tokio::test]
	async fn hourly_budget_filters_excess_reports() {
		let h = harness(PolicyConfig {
			max_fixes_per_hour: 1,
			..Default::default()
		})
		.await;
		let first = deliver(&h, &event("TypeError", "boom", "production"))
			.await
			.unwrap();
		assert!(matches!(first, IngestOutcome::Queued { .. }));
		let second = deliver(&h, &event("TypeError", "boom", "production"))
			.await
			.unwrap();
		assert!(matches!(
			second,
			IngestOutcome::Filtered {
				rejection: RejectReason::RateLimited { .. },
				..
			}
		));
	}

	#[tokio::test]
	async fn uri_error_is_filtered_and_not_queued() {
		let h = harness(PolicyConfig::default()).await;
		let outcome = deliver(&h, &event("URIError", "URI malformed", "production"))
			.await
			.unwrap();
		assert!(matches!(
			outcome,
			IngestOutcome::Filtered {
				rejection: RejectReason::IgnoredErrorType { .. },
				..
			}
		));
		assert_eq!(
			serde_json::to_value(&outcome).unwrap()["status"],
			json!("filtered")
		);
		assert_eq!(h.queue.depth().await.unwrap(), Default::default());
	}

	#[tokio::test]
	async fn failed_publish_gives_back_the_fix_slot() {
		let pool = SqlitePoolOptions::new()
			.max_connections(1)
			.connect("sqlite::memory:")
			.await
			.unwrap();
		let policy = PolicyConfig {
			max_fixes_per_hour: 1,
			..Default::default()
		};
		let throttle = SqliteThrottle::new(pool.clone(), &policy);
		throttle.ensure_schema().await.unwrap();
		// Schema is created only after the first delivery, so that publish fails.
		let queue = Arc::new(SqliteQueue::new(
			pool,
			QueueOptions {
				name: "error-fix".to_string(),
				wait_time: Duration::ZERO,
				visibility_timeout: Duration::from_secs(900),
				max_receive_count: 5,
			},
		));
		let h = Harness {
			ingestor: Ingestor::new(
				WebhookConfig {
					environment: AppEnvironment::Production,
					signature_header: "sentry-hook-signature".to_string(),
					secret: Some(SECRET.into()),
				},
				Filter::new(policy).unwrap(),
				Arc::new(throttle),
				queue.clone(),
			),
			queue,
		};

		let err = deliver(&h, &event("TypeError", "boom", "production"))
			.await
			.unwrap_err();
		assert!(matches!(err, IngestError::Queue(_)));

		h.queue.ensure_schema().await.unwrap();
		let outcome = deliver(&h, &event("TypeError", "boom", "production"))
			.await
			.unwrap();
		assert!(matches!(outcome, IngestOutcome::Queued { .. }));
	}

	#[tokio::test]
	async fn invalid_signature_leaves_queue_untouched() {
		let h = harness(PolicyConfig::default()).await;
		let body = serde_json::to_vec(&event("TypeError", "boom", "production")).unwrap();
		let err = h
			.ingestor
			.handle(Some("deadbeef"), None, &body)
			.await
			.unwrap_err();
		assert!(matches!(err, IngestError::InvalidSignature));
		assert!(err.is_unauthorized());
		assert_eq!(h.queue.depth().await.unwrap(), Default::default());
	}

	#[tokio::test]
	async fn missing_location_and_issue_is_skipped() {
		let h = harness(PolicyConfig::default()).await;
		let payload = json!({
			"action": "created",
			"data": {"event": {
				"event_id": "abc",
				"environment": "production",
				"exception": {"values": [{"type": "TypeError", "value": "boom"}]}
			}}
		});
		let outcome = deliver(&h, &payload).await.unwrap();
		assert_eq!(
			outcome,
			IngestOutcome::Skipped {
				reason: SKIP_NO_LOCATION.to_string()
			}
		);
		assert_eq!(h.queue.depth().await.unwrap().visible, 0);
	}

	#[tokio::test]
	async fn non_created_actions_are_ignored() {
		let h = harness(PolicyConfig::default()).await;
		let mut payload = event("TypeError", "boom", "production");
		payload["action"] = json!("resolved");
		let outcome = deliver(&h, &payload).await.unwrap();
		assert_eq!(
			outcome,
			IngestOutcome::Ignored {
				action: "resolved".to_string()
			}
		);
	}

	#[tokio::test]
	async fn signed_garbage_is_an_invalid_payload() {
		let h = harness(PolicyConfig::default()).await;
		let body = b"{not json";
		let sig = compute_signature(SECRET.as_bytes(), body).unwrap();
		let err = h.ingestor.handle(Some(&sig), None, body).await.unwrap_err();
		assert!(matches!(err, IngestError::InvalidPayload(_)));
		assert!(!err.is_unauthorized());
	}

	#[tokio::test]
	async fn health_reflects_policy() {
		let h = harness(PolicyConfig::default()).await;
		let health = h.ingestor.health();
		assert_eq!(
			serde_json::to_value(&health).unwrap(),
			json!({"status": "ok", "pipelineEnabled": true, "environments": ["production"]})
		);
	}

	#[test]
	fn outcome_serializes_with_status_tag() {
		let outcome = IngestOutcome::Queued {
			message_id: "m-1".to_string(),
		};
		assert_eq!(
			serde_json::to_value(&outcome).unwrap(),
			json!({"status": "queued", "messageId": "m-1"})
		);
		let filtered = IngestOutcome::Filtered {
			reason: "pipeline disabled".to_string(),
			rejection: RejectReason::Disabled,
		};
		assert_eq!(
			serde_json::to_value(&filtered).unwrap(),
			json!({"status": "filtered", "reason": "pipeline disabled"})
		);
	}
}
