// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP surface: the Sentry webhook and a health endpoint.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use remedy_ingest::{Ingestor, PipelineHealth, RESOURCE_HEADER};
use remedy_worker::WorkerState;
use serde::Serialize;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

#[derive(Clone)]
pub struct AppState {
	pub ingestor: Arc<Ingestor>,
	/// Present when the worker runs in this process.
	pub worker: Option<watch::Receiver<WorkerState>>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
	pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
	#[serde(flatten)]
	pub pipeline: PipelineHealth,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub worker: Option<WorkerState>,
}

pub fn create_router(state: AppState) -> Router {
	Router::new()
		.route("/webhook", post(webhook))
		.route("/health", get(health))
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers.get(name).and_then(|v| v.to_str().ok())
}

async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
	let signature = header(&headers, state.ingestor.signature_header());
	let resource = header(&headers, RESOURCE_HEADER);

	match state.ingestor.handle(signature, resource, &body).await {
		Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
		Err(e) if e.is_unauthorized() => {
			warn!(error = %e, "rejected unauthenticated webhook");
			(
				StatusCode::UNAUTHORIZED,
				Json(ErrorResponse {
					error: e.to_string(),
				}),
			)
				.into_response()
		}
		Err(e) => {
			error!(error = %e, "failed to process webhook");
			(
				StatusCode::INTERNAL_SERVER_ERROR,
				Json(ErrorResponse {
					error: e.to_string(),
				}),
			)
				.into_response()
		}
	}
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
	Json(HealthResponse {
		pipeline: state.ingestor.health(),
		worker: state.worker.as_ref().map(|rx| *rx.borrow()),
	})
}
