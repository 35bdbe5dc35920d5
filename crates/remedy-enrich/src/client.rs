// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::time::Duration;

use remedy_config::{SecretString, SentryConfig};
use reqwest::Client;
use tracing::{debug, instrument};

use crate::error::{EnrichError, Result};
use crate::event::LatestEvent;
use crate::retry::{retry, RetryConfig};

const MAX_ERROR_BODY: usize = 512;

/// Minimal client for the Sentry issues API.
#[derive(Clone)]
pub struct SentryClient {
	http: Client,
	base_url: String,
	token: SecretString,
	retry: RetryConfig,
}

impl SentryClient {
	pub fn new(config: &SentryConfig, token: SecretString) -> Result<Self> {
		let http = Client::builder()
			.user_agent(concat!("remedy/", env!("CARGO_PKG_VERSION")))
			.timeout(Duration::from_secs(config.timeout_secs))
			.build()
			.map_err(|e| EnrichError::Http(e.to_string()))?;

		Ok(Self {
			http,
			base_url: config.base_url.trim_end_matches('/').to_string(),
			token,
			retry: RetryConfig::with_max_retries(config.max_retries),
		})
	}

	pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
		self.retry = retry;
		self
	}

	pub fn latest_event_url(&self, issue_id: &str) -> String {
		format!("{}/api/0/issues/{issue_id}/events/latest/", self.base_url)
	}

	/// Fetches the most recent event recorded for an issue. Ids that are not
	/// purely numeric are rejected before any request is made.
	#[instrument(skip(self))]
	pub async fn latest_event(&self, issue_id: &str) -> Result<LatestEvent> {
		if !is_valid_issue_id(issue_id) {
			return Err(EnrichError::InvalidIssueId(issue_id.to_string()));
		}
		let url = self.latest_event_url(issue_id);

		let body = retry(&self.retry, || async {
			let response = self
				.http
				.get(&url)
				.bearer_auth(self.token.expose())
				.send()
				.await?;

			let status = response.status();
			let text = response.text().await?;
			if !status.is_success() {
				let mut body = text;
				body.truncate(floor_char_boundary(&body, MAX_ERROR_BODY));
				return Err(EnrichError::Status {
					status: status.as_u16(),
					body,
				});
			}
			Ok::<_, EnrichError>(text)
		})
		.await?;

		debug!(bytes = body.len(), "fetched latest event");
		LatestEvent::from_json(&body).map_err(|e| EnrichError::InvalidResponse(e.to_string()))
	}
}

fn is_valid_issue_id(issue_id: &str) -> bool {
	!issue_id.is_empty() && issue_id.bytes().all(|b| b.is_ascii_digit())
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
	if s.len() <= max {
		return s.len();
	}
	(0..=max).rev().find(|i| s.is_char_boundary(*i)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config(base_url: &str) -> SentryConfig {
		SentryConfig {
			base_url: base_url.to_string(),
			timeout_secs: 5,
			max_retries: 2,
			auth_token: None,
		}
	}

	#[test]
	fn builds_latest_event_url() {
		let client = SentryClient::new(&config("https://sentry.example.com/"), "t".into()).unwrap();
		assert_eq!(
			client.latest_event_url("4711"),
			"https://sentry.example.com/api/0/issues/4711/events/latest/"
		);
	}

	#[test]
	fn only_numeric_issue_ids_are_accepted() {
		assert!(is_valid_issue_id("4711"));
		for id in ["", "../admin", "4711/../../projects", "47 11", "4711?x=1", "٤٧"] {
			assert!(!is_valid_issue_id(id), "{id:?} should be rejected");
		}
	}

	#[tokio::test]
	async fn non_numeric_issue_id_is_rejected_without_a_request() {
		let client = SentryClient::new(&config("http://127.0.0.1:9"), "t".into()).unwrap();
		let err = client.latest_event("../admin").await.unwrap_err();
		assert!(matches!(err, EnrichError::InvalidIssueId(ref id) if id == "../admin"));
	}

	#[test]
	fn error_bodies_are_truncated_on_char_boundaries() {
		let s = "aé";
		assert_eq!(floor_char_boundary(s, 2), 1);
		assert_eq!(floor_char_boundary(s, 10), 3);
	}
}
