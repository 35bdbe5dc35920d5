// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Inbound Sentry webhooks.
//!
//! Requests are authenticated against the raw body before anything is
//! parsed. Accepted payloads are normalized into an
//! [`ErrorReport`](remedy_core::ErrorReport), run through the policy and
//! published to the queue.

pub mod error;
pub mod payload;
pub mod service;
pub mod signature;

pub use error::{IngestError, Result};
pub use payload::{parse_webhook, SentryWebhook};
pub use service::{IngestOutcome, Ingestor, PipelineHealth, RESOURCE_HEADER};
pub use signature::{compute_signature, verify_request, verify_signature};
