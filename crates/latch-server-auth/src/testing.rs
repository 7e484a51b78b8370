// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Collaborator test doubles.
//!
//! Not `#[cfg(test)]`: the OAuth crate's tests drive the same flows and use
//! these fakes too.

use async_trait::async_trait;
use std::sync::Mutex;

use latch_auth_core::VerificationCode;

use crate::captcha::{CaptchaError, CaptchaGateway};
use crate::email::{EmailError, EmailGateway, EmailTemplate};
use crate::rate_limit::{RateLimitDecision, RateLimiter};

/// An email captured by [`RecordingEmailGateway`].
#[derive(Debug, Clone)]
pub struct SentEmail {
	pub to: String,
	pub template: EmailTemplate,
}

impl SentEmail {
	/// The verification code carried by the template.
	pub fn code(&self) -> &VerificationCode {
		match &self.template {
			EmailTemplate::SignupVerification { code }
			| EmailTemplate::PasswordReset { code }
			| EmailTemplate::EmailChange { code }
			| EmailTemplate::AccountLink { code } => code,
		}
	}
}

/// Email gateway that records instead of sending.
#[derive(Debug, Default)]
pub struct RecordingEmailGateway {
	sent: Mutex<Vec<SentEmail>>,
}

impl RecordingEmailGateway {
	pub fn new() -> Self {
		Self::default()
	}

	/// Every email sent so far.
	pub fn sent(&self) -> Vec<SentEmail> {
		self.sent.lock().unwrap().clone()
	}

	/// The most recent email, if any.
	pub fn last(&self) -> Option<SentEmail> {
		self.sent.lock().unwrap().last().cloned()
	}
}

#[async_trait]
impl EmailGateway for RecordingEmailGateway {
	async fn send(&self, to: &str, template: &EmailTemplate) -> Result<(), EmailError> {
		self.sent.lock().unwrap().push(SentEmail {
			to: to.to_string(),
			template: template.clone(),
		});
		Ok(())
	}
}

/// CAPTCHA gateway with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticCaptchaGateway {
	result: bool,
}

impl StaticCaptchaGateway {
	pub fn passing() -> Self {
		Self { result: true }
	}

	pub fn failing() -> Self {
		Self { result: false }
	}
}

#[async_trait]
impl CaptchaGateway for StaticCaptchaGateway {
	async fn verify(&self, _token: &str, _client_ip: &str) -> Result<bool, CaptchaError> {
		Ok(self.result)
	}
}

/// Rate limiter with a fixed answer.
#[derive(Debug, Clone, Copy)]
pub struct StaticRateLimiter {
	allowed: bool,
}

impl StaticRateLimiter {
	pub fn permissive() -> Self {
		Self { allowed: true }
	}

	pub fn exhausted() -> Self {
		Self { allowed: false }
	}
}

#[async_trait]
impl RateLimiter for StaticRateLimiter {
	async fn consume(&self, _key: &str, _cost: u32) -> RateLimitDecision {
		if self.allowed {
			RateLimitDecision::allow()
		} else {
			RateLimitDecision::deny_until(chrono::Utc::now() + chrono::Duration::seconds(60))
		}
	}
}
