// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Stateless eligibility checks.

use std::fmt;

use regex::{Regex, RegexBuilder};
use remedy_config::PolicyConfig;
use remedy_core::ErrorReport;
use serde::Serialize;

use crate::error::{PolicyError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
	Disabled,
	EnvironmentNotAllowed { environment: String },
	IgnoredErrorType { error_type: String },
	IgnoredMessage { pattern: String },
	BelowMinOccurrences { seen: u32, required: u32 },
	RateLimited { fixes: u32, limit: u32 },
}

impl fmt::Display for RejectReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			RejectReason::Disabled => write!(f, "pipeline disabled"),
			RejectReason::EnvironmentNotAllowed { environment } => {
				write!(f, "environment '{environment}' not allowed")
			}
			RejectReason::IgnoredErrorType { error_type } => {
				write!(f, "error type '{error_type}' is ignored")
			}
			RejectReason::IgnoredMessage { pattern } => {
				write!(f, "message matches ignore pattern '{pattern}'")
			}
			RejectReason::BelowMinOccurrences { seen, required } => {
				write!(f, "seen {seen} of {required} required occurrences")
			}
			RejectReason::RateLimited { fixes, limit } => {
				write!(f, "rate limited: {fixes} fixes in the last hour (limit {limit})")
			}
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
	Accept,
	Reject(RejectReason),
}

impl Decision {
	pub fn is_accept(&self) -> bool {
		matches!(self, Decision::Accept)
	}
}

/// Compiled policy. Patterns are compiled once at construction.
#[derive(Debug, Clone)]
pub struct Filter {
	config: PolicyConfig,
	patterns: Vec<(String, Regex)>,
}

impl Filter {
	pub fn new(config: PolicyConfig) -> Result<Self> {
		let patterns = config
			.ignored_message_patterns
			.iter()
			.map(|pattern| {
				RegexBuilder::new(pattern)
					.case_insensitive(true)
					.build()
					.map(|re| (pattern.clone(), re))
					.map_err(|source| PolicyError::InvalidPattern {
						pattern: pattern.clone(),
						source,
					})
			})
			.collect::<Result<Vec<_>>>()?;

		Ok(Self { config, patterns })
	}

	pub fn config(&self) -> &PolicyConfig {
		&self.config
	}

	pub fn evaluate(&self, report: &ErrorReport) -> Decision {
		if !self.config.enabled {
			return Decision::Reject(RejectReason::Disabled);
		}

		if !self
			.config
			.allowed_environments
			.iter()
			.any(|env| env.eq_ignore_ascii_case(&report.environment))
		{
			return Decision::Reject(RejectReason::EnvironmentNotAllowed {
				environment: report.environment.clone(),
			});
		}

		if self
			.config
			.ignored_error_types
			.iter()
			.any(|t| t == &report.error_type)
		{
			return Decision::Reject(RejectReason::IgnoredErrorType {
				error_type: report.error_type.clone(),
			});
		}

		if let Some((pattern, _)) = self
			.patterns
			.iter()
			.find(|(_, re)| re.is_match(&report.error_message))
		{
			return Decision::Reject(RejectReason::IgnoredMessage {
				pattern: pattern.clone(),
			});
		}

		Decision::Accept
	}
}

/// One-shot evaluation against a policy.
pub fn evaluate(report: &ErrorReport, config: &PolicyConfig) -> Result<Decision> {
	Ok(Filter::new(config.clone())?.evaluate(report))
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use proptest::prelude::*;

	fn report(environment: &str, error_type: &str, message: &str) -> ErrorReport {
		ErrorReport {
			event_id: "evt".to_string(),
			issue_id: Some("1".to_string()),
			error_type: error_type.to_string(),
			error_message: message.to_string(),
			stack_trace: vec![],
			file_name: Some("src/app.ts".to_string()),
			line_number: Some(1),
			col_number: None,
			function_name: None,
			culprit: None,
			environment: environment.to_string(),
			timestamp: Utc::now(),
			project_name: "web".to_string(),
			issue_url: None,
			tags: Default::default(),
			breadcrumbs: vec![],
			request: None,
		}
	}

	#[test]
	fn accepts_production_type_error() {
		let filter = Filter::new(PolicyConfig::default()).unwrap();
		assert_eq!(
			filter.evaluate(&report("production", "TypeError", "x is undefined")),
			Decision::Accept
		);
	}

	#[test]
	fn rejects_when_disabled() {
		let config = PolicyConfig {
			enabled: false,
			..Default::default()
		};
		let decision = evaluate(&report("production", "TypeError", "boom"), &config).unwrap();
		assert_eq!(decision, Decision::Reject(RejectReason::Disabled));
	}

	#[test]
	fn rejects_default_ignored_type() {
		let filter = Filter::new(PolicyConfig::default()).unwrap();
		assert_eq!(
			filter.evaluate(&report("production", "URIError", "URI malformed")),
			Decision::Reject(RejectReason::IgnoredErrorType {
				error_type: "URIError".to_string()
			})
		);
	}

	#[test]
	fn ignore_patterns_are_case_insensitive() {
		let filter = Filter::new(PolicyConfig::default()).unwrap();
		let decision = filter.evaluate(&report("production", "TypeError", "FAILED TO FETCH"));
		assert!(matches!(
			decision,
			Decision::Reject(RejectReason::IgnoredMessage { .. })
		));
	}

	#[test]
	fn environment_check_runs_before_type_check() {
		let filter = Filter::new(PolicyConfig::default()).unwrap();
		assert_eq!(
			filter.evaluate(&report("staging", "URIError", "x")),
			Decision::Reject(RejectReason::EnvironmentNotAllowed {
				environment: "staging".to_string()
			})
		);
	}

	#[test]
	fn invalid_pattern_fails_construction() {
		let config = PolicyConfig {
			ignored_message_patterns: vec!["[".to_string()],
			..Default::default()
		};
		assert!(matches!(
			Filter::new(config),
			Err(PolicyError::InvalidPattern { .. })
		));
	}

	#[test]
	fn reject_reasons_render_for_operators() {
		let reason = RejectReason::EnvironmentNotAllowed {
			environment: "dev".to_string(),
		};
		assert_eq!(reason.to_string(), "environment 'dev' not allowed");
	}

	proptest! {
		#[test]
		fn disallowed_environments_are_always_rejected(env in "[a-z]{1,12}") {
			prop_assume!(env != "production");
			let filter = Filter::new(PolicyConfig::default()).unwrap();
			let decision = filter.evaluate(&report(&env, "TypeError", "boom"));
			let is_env_reject = matches!(
				decision,
				Decision::Reject(RejectReason::EnvironmentNotAllowed { .. })
			);
			prop_assert!(is_env_reject);
		}
	}
}
