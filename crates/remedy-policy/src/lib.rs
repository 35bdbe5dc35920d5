// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Decides whether a reported error is eligible for remediation.
//!
//! Two stages run in order:
//! - [`Filter`]: a pure predicate over the report and the policy
//! - [`Throttle`]: persistent sliding-window counters enforcing
//!   `min_occurrences` and `max_fixes_per_hour` across restarts

pub mod error;
pub mod filter;
pub mod throttle;

pub use error::{PolicyError, Result};
pub use filter::{evaluate, Decision, Filter, RejectReason};
pub use throttle::{fingerprint, SqliteThrottle, Throttle};
