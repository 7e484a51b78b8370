// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Verification email templates and the delivery gateway.
//!
//! The lifecycle use cases decide *what* to send (which template, which
//! code); delivery itself is a collaborator behind [`EmailGateway`]. The
//! templates render to plain text here so every flow's wording lives in one
//! place.

use async_trait::async_trait;

use latch_auth_core::VerificationCode;

/// Errors from the email gateway.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
	/// The underlying transport failed to accept the message.
	#[error("email delivery failed: {0}")]
	Delivery(String),
}

/// The verification emails the lifecycle flows send.
#[derive(Debug, Clone)]
pub enum EmailTemplate {
	/// Signup: prove ownership of the address being registered.
	SignupVerification { code: VerificationCode },
	/// Password reset: prove ownership before the password changes.
	PasswordReset { code: VerificationCode },
	/// Email change: sent to the NEW address being claimed.
	EmailChange { code: VerificationCode },
	/// Account link: prove the local account owner is driving the link.
	AccountLink { code: VerificationCode },
}

/// Render a template to `(subject, body)`.
pub fn render_email(template: &EmailTemplate) -> (String, String) {
	match template {
		EmailTemplate::SignupVerification { code } => (
			"Verify your email address".to_string(),
			format!(
				"Welcome! Enter this code to verify your email address:\n\n\
				 {}\n\n\
				 The code expires in 30 minutes. If you did not sign up, you can ignore this email.",
				code.as_str()
			),
		),
		EmailTemplate::PasswordReset { code } => (
			"Reset your password".to_string(),
			format!(
				"Enter this code to continue resetting your password:\n\n\
				 {}\n\n\
				 The code expires in 30 minutes. If you did not request a reset, you can ignore this email.",
				code.as_str()
			),
		),
		EmailTemplate::EmailChange { code } => (
			"Confirm your new email address".to_string(),
			format!(
				"Enter this code to confirm your new email address:\n\n\
				 {}\n\n\
				 The code expires in 30 minutes. If you did not request this change, you can ignore this email.",
				code.as_str()
			),
		),
		EmailTemplate::AccountLink { code } => (
			"Confirm account linking".to_string(),
			format!(
				"Enter this code to link your external account:\n\n\
				 {}\n\n\
				 The code expires in 30 minutes. If you did not start this, you can ignore this email.",
				code.as_str()
			),
		),
	}
}

/// Outbound email delivery.
///
/// Implementations wrap an SMTP relay or a provider API; tests use the
/// recording gateway from [`crate::testing`].
#[async_trait]
pub trait EmailGateway: Send + Sync {
	async fn send(&self, to: &str, template: &EmailTemplate) -> Result<(), EmailError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn code(digits: &str) -> VerificationCode {
		digits.parse().unwrap()
	}

	#[test]
	fn every_template_embeds_its_code() {
		let templates = [
			EmailTemplate::SignupVerification { code: code("11111111") },
			EmailTemplate::PasswordReset { code: code("22222222") },
			EmailTemplate::EmailChange { code: code("33333333") },
			EmailTemplate::AccountLink { code: code("44444444") },
		];

		for template in &templates {
			let (subject, body) = render_email(template);
			assert!(!subject.is_empty());
			let expected = match template {
				EmailTemplate::SignupVerification { code } => code.as_str(),
				EmailTemplate::PasswordReset { code } => code.as_str(),
				EmailTemplate::EmailChange { code } => code.as_str(),
				EmailTemplate::AccountLink { code } => code.as_str(),
			};
			assert!(body.contains(expected));
		}
	}

	#[test]
	fn subjects_differ_per_flow() {
		let subjects: std::collections::HashSet<String> = [
			EmailTemplate::SignupVerification { code: code("11111111") },
			EmailTemplate::PasswordReset { code: code("11111111") },
			EmailTemplate::EmailChange { code: code("11111111") },
			EmailTemplate::AccountLink { code: code("11111111") },
		]
		.iter()
		.map(|t| render_email(t).0)
		.collect();
		assert_eq!(subjects.len(), 4);
	}
}
