// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The normalized error report carried on the queue.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A single stack frame as seen by the remediation agent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StackFrame {
	/// Relative filename
	pub filename: Option<String>,
	pub abs_path: Option<String>,
	pub line_no: Option<u32>,
	pub col_no: Option<u32>,
	pub function: Option<String>,
	pub module: Option<String>,

	/// Source line the frame points at, when the tracker captured it
	pub context_line: Option<String>,
	pub pre_context: Vec<String>,
	pub post_context: Vec<String>,

	/// Application code vs dependency/runtime code
	pub in_app: bool,
}

impl StackFrame {
	/// Filename used to locate the source, preferring the relative name.
	pub fn location(&self) -> Option<&str> {
		self
			.filename
			.as_deref()
			.or(self.abs_path.as_deref())
			.filter(|f| !f.is_empty())
	}
}

/// Selects the frame a fix should target.
///
/// Scans from the innermost frame (the end of the list) for the first frame
/// flagged in-app. When no frame is in-app the last frame is used.
pub fn most_relevant_frame(frames: &[StackFrame]) -> Option<&StackFrame> {
	frames
		.iter()
		.rev()
		.find(|f| f.in_app)
		.or_else(|| frames.last())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Breadcrumb {
	pub timestamp: Option<String>,
	#[serde(rename = "type")]
	pub kind: Option<String>,
	pub category: Option<String>,
	pub level: Option<String>,
	pub message: Option<String>,
	pub data: Option<serde_json::Value>,
}

/// HTTP request metadata attached to the event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestInfo {
	pub url: Option<String>,
	pub method: Option<String>,
	pub query_string: Option<String>,
	pub headers: BTreeMap<String, String>,
	pub data: Option<serde_json::Value>,
}

impl RequestInfo {
	pub fn is_empty(&self) -> bool {
		self.url.is_none()
			&& self.method.is_none()
			&& self.query_string.is_none()
			&& self.headers.is_empty()
			&& self.data.is_none()
	}
}

/// Normalized, minimal description of one reported exception.
///
/// This is the queue message body. It is never mutated after it has been
/// published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
	pub event_id: String,
	#[serde(default)]
	pub issue_id: Option<String>,
	pub error_type: String,
	pub error_message: String,
	#[serde(default)]
	pub stack_trace: Vec<StackFrame>,
	#[serde(default)]
	pub file_name: Option<String>,
	#[serde(default)]
	pub line_number: Option<u32>,
	#[serde(default)]
	pub col_number: Option<u32>,
	#[serde(default)]
	pub function_name: Option<String>,
	#[serde(default)]
	pub culprit: Option<String>,
	pub environment: String,
	pub timestamp: DateTime<Utc>,
	#[serde(default)]
	pub project_name: String,
	#[serde(default)]
	pub issue_url: Option<String>,
	#[serde(default)]
	pub tags: BTreeMap<String, String>,
	#[serde(default)]
	pub breadcrumbs: Vec<Breadcrumb>,
	#[serde(default)]
	pub request: Option<RequestInfo>,
}

impl ErrorReport {
	/// True when the report names a source file a fix can target.
	pub fn has_location(&self) -> bool {
		self.file_name.as_deref().is_some_and(|f| !f.trim().is_empty())
	}

	pub fn has_issue_id(&self) -> bool {
		self.issue_id.as_deref().is_some_and(|id| !id.is_empty())
	}

	/// A report is deliverable when it can be acted on by the worker: it has
	/// an event id and either a file location or an issue id to enrich from.
	pub fn is_deliverable(&self) -> bool {
		!self.event_id.is_empty() && (self.has_location() || self.has_issue_id())
	}

	/// Copies file/line/column/function from the given frame.
	pub fn apply_frame(&mut self, frame: &StackFrame) {
		self.file_name = frame.location().map(str::to_string);
		self.line_number = frame.line_no;
		self.col_number = frame.col_no;
		self.function_name = frame.function.clone();
	}

	pub fn to_json(&self) -> Result<String> {
		if self.event_id.is_empty() {
			return Err(CoreError::MissingEventId);
		}
		Ok(serde_json::to_string(self)?)
	}

	pub fn from_json(body: &str) -> Result<Self> {
		let report: Self = serde_json::from_str(body)?;
		if report.event_id.is_empty() {
			return Err(CoreError::MissingEventId);
		}
		Ok(report)
	}
}


#[cfg(test)]
mod tests {
	use super::fixtures::*;
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn most_relevant_frame_prefers_last_in_app() {
		let frames = vec![
			frame("a.js", 1, true),
			frame("b.js", 2, true),
			frame("vendor.js", 3, false),
		];
		assert_eq!(
			most_relevant_frame(&frames).and_then(|f| f.filename.as_deref()),
			Some("b.js")
		);
	}

	#[test]
	fn most_relevant_frame_falls_back_to_last_frame() {
		let frames = vec![frame("x.js", 1, false), frame("y.js", 2, false)];
		assert_eq!(
			most_relevant_frame(&frames).and_then(|f| f.filename.as_deref()),
			Some("y.js")
		);
	}

	#[test]
	fn most_relevant_frame_of_empty_is_none() {
		assert!(most_relevant_frame(&[]).is_none());
	}

	#[test]
	fn frame_location_falls_back_to_abs_path() {
		let frame = StackFrame {
			abs_path: Some("/app/src/main.ts".to_string()),
			..Default::default()
		};
		assert_eq!(frame.location(), Some("/app/src/main.ts"));
	}

	#[test]
	fn fixture_report_targets_in_app_frame() {
		let report = report();
		assert_eq!(report.file_name.as_deref(), Some("src/components/Reader.tsx"));
		assert_eq!(report.line_number, Some(42));
		assert!(report.has_location());
		assert!(report.is_deliverable());
	}

	#[test]
	fn report_without_location_or_issue_is_undeliverable() {
		let mut report = report();
		report.file_name = None;
		report.issue_id = None;
		assert!(!report.is_deliverable());

		report.issue_id = Some("1".to_string());
		assert!(report.is_deliverable());
	}

	#[test]
	fn blank_file_name_is_not_a_location() {
		let mut report = report();
		report.file_name = Some("  ".to_string());
		assert!(!report.has_location());
	}

	#[test]
	fn json_uses_camel_case_field_names() {
		let json: serde_json::Value = serde_json::from_str(&report().to_json().unwrap()).unwrap();
		for key in [
			"eventId",
			"issueId",
			"errorType",
			"errorMessage",
			"stackTrace",
			"fileName",
			"lineNumber",
			"colNumber",
			"functionName",
			"culprit",
			"environment",
			"timestamp",
			"projectName",
			"issueUrl",
			"tags",
			"breadcrumbs",
			"request",
		] {
			assert!(json.get(key).is_some(), "missing {key}");
		}
		assert_eq!(json["stackTrace"][1]["inApp"], true);
	}

	#[test]
	fn from_json_rejects_empty_event_id() {
		let mut report = report();
		report.event_id.clear();
		let body = serde_json::to_string(&report).unwrap();
		assert!(matches!(
			ErrorReport::from_json(&body),
			Err(CoreError::MissingEventId)
		));
	}

	#[test]
	fn from_json_accepts_minimal_body() {
		let body = r#"{
			"eventId": "e1",
			"errorType": "Error",
			"errorMessage": "boom",
			"environment": "production",
			"timestamp": "2025-03-01T12:00:00Z",
			"fileName": "src/app.ts"
		}"#;
		let report = ErrorReport::from_json(body).unwrap();
		assert!(report.stack_trace.is_empty());
		assert!(report.has_location());
	}

	proptest! {
		#[test]
		fn most_relevant_frame_is_in_app_when_any_is(flags in proptest::collection::vec(any::<bool>(), 1..20)) {
			let frames: Vec<StackFrame> = flags
				.iter()
				.enumerate()
				.map(|(i, in_app)| frame(&format!("f{i}.js"), i as u32, *in_app))
				.collect();
			let chosen = most_relevant_frame(&frames).unwrap();
			match flags.iter().rposition(|b| *b) {
				Some(idx) => prop_assert_eq!(chosen, &frames[idx]),
				None => prop_assert_eq!(chosen, frames.last().unwrap()),
			}
		}
	}
}
