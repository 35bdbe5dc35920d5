// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable, at-least-once message queue for error reports.
//!
//! A received message stays invisible to other consumers for the visibility
//! timeout. If it is not acknowledged within that window it becomes visible
//! again. Messages received `max_receive_count` times are dead-lettered
//! instead of being redelivered.

pub mod error;
pub mod pool;
pub mod queue;
pub mod sqlite;

pub use error::{QueueError, Result};
pub use pool::create_pool;
pub use queue::{
	routing_attributes, MessageId, MessageQueue, QueueDepth, QueueMessage, ATTR_ENVIRONMENT,
	ATTR_ERROR_TYPE, ATTR_JOB_TYPE, JOB_TYPE_ERROR_FIX,
};
pub use sqlite::{QueueOptions, SqliteQueue};
