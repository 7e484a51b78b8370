// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Rate limiting seam.
//!
//! The lifecycle flows consume from a limiter before touching storage or
//! sending email. The bucket implementation (and its cache) lives outside
//! this workspace; flows only see the decision.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Outcome of a limiter consumption attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
	/// Whether the request may proceed.
	pub allowed: bool,
	/// When the bucket refills, for a Retry-After surface. `None` when
	/// allowed.
	pub reset: Option<DateTime<Utc>>,
}

impl RateLimitDecision {
	/// A decision that always allows.
	pub fn allow() -> Self {
		Self {
			allowed: true,
			reset: None,
		}
	}

	/// A denial with a refill time.
	pub fn deny_until(reset: DateTime<Utc>) -> Self {
		Self {
			allowed: false,
			reset: Some(reset),
		}
	}
}

/// Token-bucket consumption.
#[async_trait]
pub trait RateLimiter: Send + Sync {
	/// Consume `cost` tokens from the bucket for `key`.
	async fn consume(&self, key: &str, cost: u32) -> RateLimitDecision;
}
