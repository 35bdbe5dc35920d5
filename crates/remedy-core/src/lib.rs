// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for the Remedy error remediation pipeline.
//!
//! Remedy turns production exceptions reported by Sentry into sandboxed
//! remediation attempts. This crate holds the types shared by every stage:
//! - [`ErrorReport`]: the normalized report that travels through the queue
//! - [`EnrichedErrorContext`]: the report expanded with issue tracker detail
//! - [`Job`]: one remediation attempt and its lifecycle state

pub mod context;
pub mod error;
pub mod job;
pub mod report;

pub use context::{EnrichedErrorContext, ExceptionLink};
pub use error::{CoreError, Result};
pub use job::{Job, JobId, JobState};
pub use report::{most_relevant_frame, Breadcrumb, ErrorReport, RequestInfo, StackFrame};
