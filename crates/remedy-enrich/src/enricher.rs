// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use remedy_config::SentryConfig;
use remedy_core::{most_relevant_frame, EnrichedErrorContext, ErrorReport};
use tracing::{info, instrument, warn};

use crate::client::SentryClient;
use crate::error::{EnrichError, Result};
use crate::event::LatestEvent;

/// Only the most recent breadcrumbs are kept.
pub const MAX_BREADCRUMBS: usize = 10;

#[async_trait]
pub trait ContextEnricher: Send + Sync {
	/// Builds the context a remediation attempt works from.
	///
	/// Errors only when the report has no file location to fall back on.
	async fn enrich(&self, report: &ErrorReport) -> Result<EnrichedErrorContext>;
}

pub struct SentryEnricher {
	client: Option<SentryClient>,
}

impl SentryEnricher {
	/// Without an auth token every report gets a fallback context.
	pub fn new(config: &SentryConfig) -> Result<Self> {
		let client = match &config.auth_token {
			Some(token) => Some(SentryClient::new(config, token.clone())?),
			None => None,
		};
		Ok(Self { client })
	}

	pub fn with_client(client: SentryClient) -> Self {
		Self {
			client: Some(client),
		}
	}

	pub fn has_credentials(&self) -> bool {
		self.client.is_some()
	}
}

fn unenrichable(report: &ErrorReport, reason: &'static str) -> EnrichError {
	EnrichError::Unenrichable {
		event_id: report.event_id.clone(),
		reason,
	}
}

#[async_trait]
impl ContextEnricher for SentryEnricher {
	#[instrument(skip(self, report), fields(event_id = %report.event_id))]
	async fn enrich(&self, report: &ErrorReport) -> Result<EnrichedErrorContext> {
		let has_location = report.has_location();

		let Some(client) = &self.client else {
			if !has_location {
				return Err(unenrichable(report, "no issue tracker credentials and no file location"));
			}
			return Ok(EnrichedErrorContext::fallback(report.clone()));
		};

		let Some(issue_id) = report.issue_id.as_deref().filter(|id| !id.is_empty()) else {
			if !has_location {
				return Err(unenrichable(report, "no issue id and no file location"));
			}
			return Ok(EnrichedErrorContext::fallback(report.clone()));
		};

		match client.latest_event(issue_id).await {
			Ok(event) => {
				let context = merge(report, event);
				info!(
					frames = context.report.stack_trace.len(),
					breadcrumbs = context.report.breadcrumbs.len(),
					chain = context.exception_chain.len(),
					"error context enriched"
				);
				Ok(context)
			}
			Err(e) if has_location => {
				warn!(issue_id, error = %e, "enrichment failed, using report as-is");
				Ok(EnrichedErrorContext::fallback(report.clone()))
			}
			Err(e) => Err(e),
		}
	}
}

/// Overlays event detail on the report. Anything the event lacks keeps the
/// report's value.
fn merge(report: &ErrorReport, event: LatestEvent) -> EnrichedErrorContext {
	let mut merged = report.clone();

	if let Some(primary) = event.primary_exception() {
		if let Some(error_type) = primary.error_type.as_ref().filter(|t| !t.is_empty()) {
			merged.error_type = error_type.clone();
		}
		if let Some(value) = primary.value.as_ref().filter(|v| !v.is_empty()) {
			merged.error_message = value.clone();
		}
	}

	if !event.frames.is_empty() {
		if let Some(frame) = most_relevant_frame(&event.frames).filter(|f| f.location().is_some()) {
			merged.apply_frame(frame);
		}
		merged.stack_trace = event.frames;
	}

	if !event.breadcrumbs.is_empty() {
		let mut crumbs = event.breadcrumbs;
		let skip = crumbs.len().saturating_sub(MAX_BREADCRUMBS);
		crumbs.drain(..skip);
		merged.breadcrumbs = crumbs;
	}

	if event.request.is_some() {
		merged.request = event.request;
	}
	if event.culprit.is_some() {
		merged.culprit = event.culprit;
	}
	merged.tags.extend(event.tags);

	EnrichedErrorContext {
		report: merged,
		exception_chain: event.exceptions,
		enriched: true,
	}
}
