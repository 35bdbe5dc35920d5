// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Exponential backoff with jitter for issue tracker calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryConfig {
	/// Total attempts, the first one included.
	pub max_attempts: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
	pub backoff_factor: f64,
	pub jitter: bool,
}

impl Default for RetryConfig {
	fn default() -> Self {
		Self {
			max_attempts: 4,
			base_delay: Duration::from_millis(250),
			max_delay: Duration::from_secs(8),
			backoff_factor: 2.0,
			jitter: true,
		}
	}
}

impl RetryConfig {
	/// `max_retries` counts retries after the first attempt.
	pub fn with_max_retries(max_retries: u32) -> Self {
		Self {
			max_attempts: max_retries.saturating_add(1),
			..Self::default()
		}
	}

	/// Delay before retry number `retry` (zero based).
	pub fn delay_for(&self, retry: u32) -> Duration {
		let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
		let raw = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
		let capped = raw.min(self.max_delay.as_secs_f64());
		let scaled = if self.jitter {
			capped * (0.5 + fastrand::f64())
		} else {
			capped
		};
		Duration::from_secs_f64(scaled)
	}
}

pub trait RetryableError {
	fn is_retryable(&self) -> bool;
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent.
pub async fn retry<F, Fut, T, E>(config: &RetryConfig, mut op: F) -> Result<T, E>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T, E>>,
	E: RetryableError + std::fmt::Display,
{
	let mut attempt = 0u32;
	loop {
		attempt += 1;
		let err = match op().await {
			Ok(value) => return Ok(value),
			Err(err) => err,
		};

		if !err.is_retryable() || attempt >= config.max_attempts {
			return Err(err);
		}

		let delay = config.delay_for(attempt - 1);
		warn!(
			error = %err,
			attempt,
			max_attempts = config.max_attempts,
			delay_ms = delay.as_millis() as u64,
			"issue tracker call failed, retrying"
		);
		tokio::time::sleep(delay).await;
	}
}
