// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The issue tracker's "latest event" document.
//!
//! Detail is spread over typed `entries` (`exception`, `breadcrumbs`,
//! `request`). Frames use camelCase keys and carry source context as
//! `[line_no, text]` pairs.

use std::collections::BTreeMap;

use remedy_core::{Breadcrumb, ExceptionLink, RequestInfo, StackFrame};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiFrame {
	filename: Option<String>,
	abs_path: Option<String>,
	line_no: Option<u32>,
	col_no: Option<u32>,
	function: Option<String>,
	module: Option<String>,
	in_app: Option<bool>,
	context: Option<Vec<(u32, Option<String>)>>,
}

impl From<ApiFrame> for StackFrame {
	fn from(api: ApiFrame) -> Self {
		let mut frame = StackFrame {
			filename: api.filename,
			abs_path: api.abs_path,
			line_no: api.line_no,
			col_no: api.col_no,
			function: api.function,
			module: api.module,
			in_app: api.in_app.unwrap_or(false),
			..Default::default()
		};

		if let Some(line_no) = api.line_no {
			for (n, text) in api.context.unwrap_or_default() {
				let text = text.unwrap_or_default();
				if n < line_no {
					frame.pre_context.push(text);
				} else if n == line_no {
					frame.context_line = Some(text);
				} else {
					frame.post_context.push(text);
				}
			}
		}
		frame
	}
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiStacktrace {
	frames: Vec<ApiFrame>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ApiException {
	#[serde(rename = "type")]
	error_type: Option<String>,
	value: Option<String>,
	module: Option<String>,
	stacktrace: Option<ApiStacktrace>,
}

#[derive(Debug, Deserialize)]
struct ApiEntry {
	#[serde(rename = "type")]
	kind: String,
	#[serde(default)]
	data: Value,
}

#[derive(Debug, Deserialize)]
struct ApiTag {
	key: String,
	#[serde(default)]
	value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ApiEvent {
	#[serde(rename = "eventID")]
	event_id: Option<String>,
	culprit: Option<String>,
	entries: Vec<ApiEntry>,
	tags: Vec<ApiTag>,
}

/// Parsed detail of an issue's most recent event.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestEvent {
	pub event_id: Option<String>,
	pub culprit: Option<String>,
	/// Exception chain in the order reported; the first entry is primary.
	pub exceptions: Vec<ExceptionLink>,
	/// Frames of the primary exception.
	pub frames: Vec<StackFrame>,
	pub breadcrumbs: Vec<Breadcrumb>,
	pub request: Option<RequestInfo>,
	pub tags: BTreeMap<String, String>,
}

impl LatestEvent {
	pub fn from_json(body: &str) -> serde_json::Result<Self> {
		let api: ApiEvent = serde_json::from_str(body)?;
		let mut event = LatestEvent {
			event_id: api.event_id,
			culprit: api.culprit.filter(|c| !c.is_empty()),
			tags: api
				.tags
				.into_iter()
				.filter_map(|t| Some((t.key, t.value?)))
				.collect(),
			..Default::default()
		};

		for entry in api.entries {
			match entry.kind.as_str() {
				"exception" => event.apply_exceptions(entry.data),
				"breadcrumbs" => event.breadcrumbs = breadcrumbs(&entry.data),
				"request" => event.request = request(&entry.data),
				_ => {}
			}
		}
		Ok(event)
	}

	pub fn primary_exception(&self) -> Option<&ExceptionLink> {
		self.exceptions.first()
	}

	fn apply_exceptions(&mut self, data: Value) {
		let values: Vec<ApiException> = data
			.get("values")
			.cloned()
			.and_then(|v| serde_json::from_value(v).ok())
			.unwrap_or_default();

		for (index, exception) in values.into_iter().enumerate() {
			if index == 0 {
				self.frames = exception
					.stacktrace
					.map(|s| s.frames.into_iter().map(StackFrame::from).collect())
					.unwrap_or_default();
			}
			self.exceptions.push(ExceptionLink {
				error_type: exception.error_type,
				value: exception.value,
				module: exception.module,
			});
		}
	}
}

fn breadcrumbs(data: &Value) -> Vec<Breadcrumb> {
	data
		.get("values")
		.cloned()
		.and_then(|v| serde_json::from_value(v).ok())
		.unwrap_or_default()
}

fn pairs(value: Option<&Value>) -> Vec<(String, String)> {
	let Some(Value::Array(items)) = value else {
		return Vec::new();
	};
	items
		.iter()
		.filter_map(|item| {
			let kv = item.as_array()?;
			Some((
				kv.first()?.as_str()?.to_string(),
				kv.get(1)?.as_str()?.to_string(),
			))
		})
		.collect()
}

fn request(data: &Value) -> Option<RequestInfo> {
	if !data.is_object() {
		return None;
	}
	let text = |key: &str| {
		data
			.get(key)
			.and_then(Value::as_str)
			.filter(|s| !s.is_empty())
			.map(str::to_string)
	};

	let query_string = match data.get("query") {
		Some(Value::String(q)) if !q.is_empty() => Some(q.clone()),
		other => {
			let query = pairs(other);
			(!query.is_empty()).then(|| {
				query
					.iter()
					.map(|(k, v)| format!("{k}={v}"))
					.collect::<Vec<_>>()
					.join("&")
			})
		}
	};

	let info = RequestInfo {
		url: text("url"),
		method: text("method"),
		query_string,
		headers: pairs(data.get("headers")).into_iter().collect(),
		data: data.get("data").filter(|d| !d.is_null()).cloned(),
	};
	(!info.is_empty()).then_some(info)
}

#[cfg(test)]
pub(crate) mod fixtures {
	use serde_json::{json, Value};

	pub fn latest_event() -> Value {
		let crumbs: Vec<Value> = (0..12)
			.map(|i| json!({"timestamp": format!("2025-03-01T11:59:{i:02}Z"), "category": "ui.click", "message": format!("click {i}")}))
			.collect();
		json!({
			"id": "9f2c1e0a5b7d4c3e8f1a2b3c4d5e6f70",
			"eventID": "9f2c1e0a5b7d4c3e8f1a2b3c4d5e6f70",
			"groupID": "4711",
			"culprit": "Reader.render",
			"tags": [{"key": "browser", "value": "Chrome 120"}, {"key": "release", "value": "web@1.4.0"}],
			"entries": [
				{"type": "exception", "data": {"values": [
					{
						"type": "TypeError",
						"value": "Cannot read properties of undefined (reading 'title')",
						"module": null,
						"stacktrace": {"frames": [
							{"filename": "node_modules/react-dom/index.js", "lineNo": 10, "inApp": false, "context": []},
							{
								"filename": "src/components/Reader.tsx",
								"absPath": "webpack:///src/components/Reader.tsx",
								"lineNo": 44,
								"colNo": 12,
								"function": "Reader",
								"inApp": true,
								"context": [[43, "  const book = props.book;"], [44, "  return book.title;"], [45, "}"]]
							}
						]}
					},
					{"type": "FetchError", "value": "upstream 500"}
				]}},
				{"type": "breadcrumbs", "data": {"values": crumbs}},
				{"type": "request", "data": {
					"url": "https://app.example.com/books/12",
					"method": "GET",
					"query": [["tab", "notes"]],
					"headers": [["Accept", "text/html"]]
				}}
			]
		})
	}
}
