// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Remediation worker: consumes queued error reports, enriches them and runs
//! each one in its own sandbox.

pub mod error;
pub mod log_tail;
pub mod modes;
pub mod orchestrator;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Result, WorkerError};
pub use log_tail::{tail, MAX_TAIL_BYTES};
pub use modes::{drain, dry_run, DryRun};
pub use orchestrator::{Orchestrator, WorkerState, WorkerStats};
