// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Remedy process: the Sentry webhook endpoint and the remediation worker.

pub mod app;
pub mod error;
pub mod routes;
pub mod telemetry;
pub mod version;

pub use error::{Result, ServerError};
pub use routes::{create_router, AppState};
