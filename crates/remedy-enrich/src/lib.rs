// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Expands a queued [`ErrorReport`](remedy_core::ErrorReport) into the full
//! context a remediation agent works from.
//!
//! The issue tracker is consulted for the latest event of the report's issue.
//! Enrichment is best effort: whenever the report already names a source
//! location, any failure degrades to a fallback context built from the report
//! alone.

pub mod client;
pub mod enricher;
pub mod error;
pub mod event;
pub mod retry;

pub use client::SentryClient;
pub use enricher::{ContextEnricher, SentryEnricher, MAX_BREADCRUMBS};
pub use error::{EnrichError, Result};
pub use event::LatestEvent;
pub use retry::{retry, RetryConfig, RetryableError};
