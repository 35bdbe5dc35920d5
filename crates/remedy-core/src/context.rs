// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Enriched error context handed to the sandbox.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::report::ErrorReport;

/// One exception in a chained error (`cause`, `__cause__`, etc).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExceptionLink {
	#[serde(rename = "type")]
	pub error_type: Option<String>,
	pub value: Option<String>,
	pub module: Option<String>,
}

/// An [`ErrorReport`] extended with detail fetched from the issue tracker.
///
/// The report fields are flattened so the serialized form is a superset of
/// the queue message body. `enriched` is false when the context is a bare
/// fallback built from the report alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedErrorContext {
	#[serde(flatten)]
	pub report: ErrorReport,
	#[serde(default)]
	pub exception_chain: Vec<ExceptionLink>,
	#[serde(default)]
	pub enriched: bool,
}

impl EnrichedErrorContext {
	/// Wraps a report without consulting the issue tracker.
	pub fn fallback(report: ErrorReport) -> Self {
		Self {
			report,
			exception_chain: Vec::new(),
			enriched: false,
		}
	}

	pub fn event_id(&self) -> &str {
		&self.report.event_id
	}

	pub fn to_json(&self) -> Result<String> {
		Ok(serde_json::to_string(self)?)
	}

	pub fn from_json(body: &str) -> Result<Self> {
		Ok(serde_json::from_str(body)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::report::fixtures::report;

	#[test]
	fn fallback_keeps_report_unchanged() {
		let report = report();
		let context = EnrichedErrorContext::fallback(report.clone());
		assert_eq!(context.report, report);
		assert!(!context.enriched);
		assert!(context.exception_chain.is_empty());
	}

	#[test]
	fn serialized_context_is_a_superset_of_the_report() {
		let context = EnrichedErrorContext::fallback(report());
		let json: serde_json::Value = serde_json::from_str(&context.to_json().unwrap()).unwrap();
		assert_eq!(json["eventId"], "a1b2c3d4e5f60718293a4b5c6d7e8f90");
		assert_eq!(json["fileName"], "src/components/Reader.tsx");
		assert_eq!(json["enriched"], false);

		let report = ErrorReport::from_json(&context.to_json().unwrap()).unwrap();
		assert_eq!(report, context.report);
	}

	#[test]
	fn context_round_trips_every_field() {
		let context = EnrichedErrorContext {
			report: report(),
			exception_chain: vec![
				ExceptionLink {
					error_type: Some("TypeError".to_string()),
					value: Some("outer".to_string()),
					module: Some("reader".to_string()),
				},
				ExceptionLink {
					error_type: Some("FetchError".to_string()),
					value: Some("inner".to_string()),
					module: None,
				},
			],
			enriched: true,
		};
		let decoded = EnrichedErrorContext::from_json(&context.to_json().unwrap()).unwrap();
		assert_eq!(decoded, context);
	}
}
