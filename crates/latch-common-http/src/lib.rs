// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared HTTP client construction for Latch.
//!
//! All outbound HTTP in the workspace (OAuth providers, CAPTCHA verification)
//! goes through clients built here so that every request carries the same
//! User-Agent and the construction knobs live in one place.

use reqwest::{Client, ClientBuilder};
use std::time::Duration;

/// Default timeout applied to outbound provider calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Returns the standard Latch User-Agent string.
///
/// Format: `latch/{version}`
pub fn user_agent() -> String {
	format!("latch/{}", env!("CARGO_PKG_VERSION"))
}

/// Creates a new HTTP client builder with the standard User-Agent.
///
/// Use this when you need to customize the client further.
///
/// # Example
/// ```ignore
/// let client = latch_common_http::builder()
///     .timeout(Duration::from_secs(5))
///     .build()?;
/// ```
pub fn builder() -> ClientBuilder {
	Client::builder()
		.user_agent(user_agent())
		.timeout(DEFAULT_TIMEOUT)
}

/// Creates a new HTTP client with the standard User-Agent and timeout.
///
/// # Panics
///
/// Panics if the client cannot be built (should never happen in practice).
pub fn new_client() -> Client {
	builder().build().expect("failed to build HTTP client")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn user_agent_has_correct_format() {
		let ua = user_agent();
		assert!(ua.starts_with("latch/"));
		let parts: Vec<&str> = ua.split('/').collect();
		assert_eq!(parts.len(), 2);
		assert!(!parts[1].is_empty());
	}

	#[test]
	fn builder_produces_client() {
		assert!(builder().build().is_ok());
	}
}
