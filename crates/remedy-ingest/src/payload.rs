// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Sentry webhook payload normalization.
//!
//! The record describing the error sits at a different path depending on
//! how the webhook was delivered:
//! - `data.event` for alert rule actions (`event_alert` resource)
//! - `data.error` for the `error` resource
//! - `data.issue` for the `issue` resource, which carries no frames

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use remedy_core::{most_relevant_frame, Breadcrumb, ErrorReport, RequestInfo, StackFrame};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{IngestError, Result};

const DEFAULT_ERROR_TYPE: &str = "Error";
const UNKNOWN_ENVIRONMENT: &str = "unknown";

/// Frame as Sentry serializes it in webhook bodies.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawFrame {
	filename: Option<String>,
	abs_path: Option<String>,
	lineno: Option<u32>,
	colno: Option<u32>,
	function: Option<String>,
	module: Option<String>,
	context_line: Option<String>,
	pre_context: Option<Vec<String>>,
	post_context: Option<Vec<String>>,
	in_app: Option<bool>,
}

impl From<RawFrame> for StackFrame {
	fn from(raw: RawFrame) -> Self {
		StackFrame {
			filename: raw.filename,
			abs_path: raw.abs_path,
			line_no: raw.lineno,
			col_no: raw.colno,
			function: raw.function,
			module: raw.module,
			context_line: raw.context_line,
			pre_context: raw.pre_context.unwrap_or_default(),
			post_context: raw.post_context.unwrap_or_default(),
			in_app: raw.in_app.unwrap_or(false),
		}
	}
}

#[derive(Debug, Deserialize)]
struct Envelope {
	#[serde(default)]
	action: String,
	#[serde(default)]
	data: Value,
}

/// A parsed webhook delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct SentryWebhook {
	pub action: String,
	/// `None` when the payload carries no event/error/issue record.
	pub report: Option<ErrorReport>,
}

impl SentryWebhook {
	/// Only new events are worth a remediation attempt.
	pub fn is_actionable(&self) -> bool {
		matches!(self.action.as_str(), "created" | "triggered")
	}
}

/// Parses a verified webhook body.
pub fn parse_webhook(body: &[u8]) -> Result<SentryWebhook> {
	let envelope: Envelope = serde_json::from_slice(body)?;
	if !envelope.data.is_object() && !envelope.data.is_null() {
		return Err(IngestError::InvalidPayload(
			"`data` must be an object".to_string(),
		));
	}

	let report = if let Some(event) = envelope.data.get("event").filter(|v| v.is_object()) {
		Some(report_from_event(event))
	} else if let Some(error) = envelope.data.get("error").filter(|v| v.is_object()) {
		Some(report_from_event(error))
	} else {
		envelope
			.data
			.get("issue")
			.filter(|v| v.is_object())
			.map(report_from_issue)
	};

	Ok(SentryWebhook {
		action: envelope.action,
		report,
	})
}

fn report_from_event(event: &Value) -> ErrorReport {
	let exception = event
		.pointer("/exception/values")
		.and_then(Value::as_array)
		.and_then(|values| values.first());

	let frames_value = exception
		.and_then(|e| e.pointer("/stacktrace/frames"))
		.or_else(|| event.pointer("/stacktrace/frames"));
	let frames = parse_frames(frames_value);

	let metadata = event.get("metadata");
	let title = str_at(event, "title");

	let error_type = exception
		.and_then(|e| str_at(e, "type"))
		.or_else(|| metadata.and_then(|m| str_at(m, "type")))
		.or_else(|| title.as_deref().and_then(type_from_title))
		.unwrap_or_else(|| DEFAULT_ERROR_TYPE.to_string());

	let error_message = exception
		.and_then(|e| str_at(e, "value"))
		.or_else(|| metadata.and_then(|m| str_at(m, "value")))
		.or_else(|| title.clone())
		.or_else(|| str_at(event, "message"))
		.unwrap_or_default();

	let tags = parse_tags(event.get("tags"));
	let environment = str_at(event, "environment")
		.or_else(|| tags.get("environment").cloned())
		.unwrap_or_else(|| UNKNOWN_ENVIRONMENT.to_string());

	let event_id = str_at(event, "event_id")
		.or_else(|| str_at(event, "id"))
		.unwrap_or_else(generated_event_id);

	let issue_id = str_at(event, "issue_id")
		.or_else(|| str_at(event, "groupID"))
		.or_else(|| str_at(event, "group_id"));

	let mut report = ErrorReport {
		event_id,
		issue_id,
		error_type,
		error_message,
		stack_trace: Vec::new(),
		file_name: None,
		line_number: None,
		col_number: None,
		function_name: None,
		culprit: str_at(event, "culprit"),
		environment,
		timestamp: timestamp_at(event, &["datetime", "timestamp"]).unwrap_or_else(Utc::now),
		project_name: project_name(event),
		issue_url: str_at(event, "issue_url")
			.or_else(|| str_at(event, "web_url"))
			.or_else(|| str_at(event, "url")),
		tags,
		breadcrumbs: parse_breadcrumbs(event.pointer("/breadcrumbs/values")),
		request: parse_request(event.get("request")),
	};

	if let Some(frame) = most_relevant_frame(&frames) {
		report.apply_frame(frame);
	}
	if !report.has_location() {
		// Position and function of a frame without a file do not describe
		// the metadata file.
		report.file_name = metadata.and_then(|m| str_at(m, "filename"));
		report.line_number = None;
		report.col_number = None;
		report.function_name = metadata.and_then(|m| str_at(m, "function"));
	}
	report.stack_trace = frames;
	report
}

fn report_from_issue(issue: &Value) -> ErrorReport {
	let metadata = issue.get("metadata");
	let title = str_at(issue, "title");

	let error_type = metadata
		.and_then(|m| str_at(m, "type"))
		.or_else(|| title.as_deref().and_then(type_from_title))
		.unwrap_or_else(|| DEFAULT_ERROR_TYPE.to_string());
	let error_message = metadata
		.and_then(|m| str_at(m, "value"))
		.or(title)
		.unwrap_or_default();

	let tags = parse_tags(issue.get("tags"));
	let environment = str_at(issue, "environment")
		.or_else(|| tags.get("environment").cloned())
		.unwrap_or_else(|| UNKNOWN_ENVIRONMENT.to_string());

	ErrorReport {
		event_id: generated_event_id(),
		issue_id: str_at(issue, "id"),
		error_type,
		error_message,
		stack_trace: Vec::new(),
		file_name: metadata.and_then(|m| str_at(m, "filename")),
		line_number: None,
		col_number: None,
		function_name: metadata.and_then(|m| str_at(m, "function")),
		culprit: str_at(issue, "culprit"),
		environment,
		timestamp: timestamp_at(issue, &["lastSeen", "firstSeen"]).unwrap_or_else(Utc::now),
		project_name: project_name(issue),
		issue_url: str_at(issue, "web_url").or_else(|| str_at(issue, "permalink")),
		tags,
		breadcrumbs: Vec::new(),
		request: None,
	}
}

fn generated_event_id() -> String {
	Uuid::new_v4().simple().to_string()
}

/// Reads a string or number field as a string, ignoring empty strings.
fn str_at(value: &Value, key: &str) -> Option<String> {
	match value.get(key)? {
		Value::String(s) if !s.is_empty() => Some(s.clone()),
		Value::Number(n) => Some(n.to_string()),
		_ => None,
	}
}

/// `"TypeError: x is undefined"` -> `"TypeError"`.
fn type_from_title(title: &str) -> Option<String> {
	let (head, _) = title.split_once(':')?;
	let head = head.trim();
	(!head.is_empty() && !head.contains(' ')).then(|| head.to_string())
}

fn project_name(value: &Value) -> String {
	match value.get("project") {
		Some(Value::Object(project)) => project
			.get("slug")
			.or_else(|| project.get("name"))
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string(),
		Some(Value::String(slug)) => slug.clone(),
		_ => str_at(value, "project_slug").unwrap_or_default(),
	}
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
	match value {
		Value::String(s) => DateTime::parse_from_rfc3339(s)
			.map(|t| t.with_timezone(&Utc))
			.ok(),
		Value::Number(n) => {
			let secs = n.as_f64()?;
			Utc.timestamp_millis_opt((secs * 1000.0) as i64).single()
		}
		_ => None,
	}
}

fn timestamp_at(value: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
	keys
		.iter()
		.find_map(|key| value.get(*key).and_then(parse_timestamp))
}

fn parse_frames(value: Option<&Value>) -> Vec<StackFrame> {
	value
		.and_then(Value::as_array)
		.map(|frames| {
			frames
				.iter()
				.filter_map(|f| serde_json::from_value::<RawFrame>(f.clone()).ok())
				.map(StackFrame::from)
				.collect()
		})
		.unwrap_or_default()
}

/// Tags arrive as `[[key, value]]`, `[{key, value}]` or a plain object.
fn parse_tags(value: Option<&Value>) -> BTreeMap<String, String> {
	let mut tags = BTreeMap::new();
	match value {
		Some(Value::Array(items)) => {
			for item in items {
				let pair = match item {
					Value::Array(kv) if kv.len() == 2 => {
						kv[0].as_str().zip(kv[1].as_str())
					}
					Value::Object(obj) => obj
						.get("key")
						.and_then(Value::as_str)
						.zip(obj.get("value").and_then(Value::as_str)),
					_ => None,
				};
				if let Some((k, v)) = pair {
					tags.insert(k.to_string(), v.to_string());
				}
			}
		}
		Some(Value::Object(obj)) => {
			for (k, v) in obj {
				if let Some(v) = v.as_str() {
					tags.insert(k.clone(), v.to_string());
				}
			}
		}
		_ => {}
	}
	tags
}

pub(crate) fn parse_breadcrumbs(value: Option<&Value>) -> Vec<Breadcrumb> {
	let Some(items) = value.and_then(Value::as_array) else {
		return Vec::new();
	};
	items
		.iter()
		.filter(|item| item.is_object())
		.map(|item| Breadcrumb {
			timestamp: item.get("timestamp").and_then(|t| match t {
				Value::String(s) => Some(s.clone()),
				Value::Number(_) => parse_timestamp(t).map(|dt| dt.to_rfc3339()),
				_ => None,
			}),
			kind: str_at(item, "type"),
			category: str_at(item, "category"),
			level: str_at(item, "level"),
			message: str_at(item, "message"),
			data: item.get("data").filter(|d| !d.is_null()).cloned(),
		})
		.collect()
}

pub(crate) fn parse_request(value: Option<&Value>) -> Option<RequestInfo> {
	let value = value.filter(|v| v.is_object())?;

	let query_string = match value.get("query_string").or_else(|| value.get("query")) {
		Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
		Some(Value::Array(pairs)) if !pairs.is_empty() => Some(
			pairs
				.iter()
				.filter_map(|p| p.as_array())
				.filter_map(|kv| Some(format!("{}={}", kv.first()?.as_str()?, kv.get(1)?.as_str()?)))
				.collect::<Vec<_>>()
				.join("&"),
		),
		_ => None,
	};

	let request = RequestInfo {
		url: str_at(value, "url"),
		method: str_at(value, "method"),
		query_string,
		headers: parse_tags(value.get("headers")),
		data: value.get("data").filter(|d| !d.is_null()).cloned(),
	};
	(!request.is_empty()).then_some(request)
}
