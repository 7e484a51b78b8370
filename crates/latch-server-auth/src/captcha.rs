// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! CAPTCHA verification.
//!
//! Signup and login requests carry a CAPTCHA token minted client-side; the
//! use cases check it through [`CaptchaGateway`] before doing any work. The
//! concrete implementation talks to Cloudflare Turnstile.

use async_trait::async_trait;
use serde::Deserialize;
use std::env;

use latch_common_secret::SecretString;

const TURNSTILE_VERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

/// Errors from CAPTCHA verification.
#[derive(Debug, thiserror::Error)]
pub enum CaptchaError {
	/// The HTTP request to the verifier failed.
	#[error("captcha verification request failed: {0}")]
	HttpRequest(#[from] reqwest::Error),

	/// A required environment variable was not set.
	#[error("missing environment variable: {0}")]
	MissingEnvVar(String),
}

/// CAPTCHA token verification.
#[async_trait]
pub trait CaptchaGateway: Send + Sync {
	/// Returns `true` if the token is valid for the given client IP.
	async fn verify(&self, token: &str, client_ip: &str) -> Result<bool, CaptchaError>;
}

/// Cloudflare Turnstile verification client.
#[derive(Debug, Clone)]
pub struct TurnstileClient {
	secret: SecretString,
	http_client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct TurnstileResponse {
	success: bool,
}

impl TurnstileClient {
	/// Create a client with an explicit site secret.
	pub fn new(secret: SecretString) -> Self {
		Self {
			secret,
			http_client: latch_common_http::new_client(),
		}
	}

	/// Load the site secret from `LATCH_SERVER_TURNSTILE_SECRET`.
	pub fn from_env() -> Result<Self, CaptchaError> {
		let secret = env::var("LATCH_SERVER_TURNSTILE_SECRET")
			.map_err(|_| CaptchaError::MissingEnvVar("LATCH_SERVER_TURNSTILE_SECRET".to_string()))?;
		Ok(Self::new(SecretString::new(secret)))
	}
}

#[async_trait]
impl CaptchaGateway for TurnstileClient {
	#[tracing::instrument(name = "captcha.verify", skip_all)]
	async fn verify(&self, token: &str, client_ip: &str) -> Result<bool, CaptchaError> {
		let response = self
			.http_client
			.post(TURNSTILE_VERIFY_URL)
			.form(&[
				("secret", self.secret.expose().as_str()),
				("response", token),
				("remoteip", client_ip),
			])
			.send()
			.await?;

		let body: TurnstileResponse = response.json().await?;
		tracing::debug!(success = body.success, "captcha verified");
		Ok(body.success)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn turnstile_response_deserializes() {
		let body: TurnstileResponse = serde_json::from_str(r#"{"success": true}"#).unwrap();
		assert!(body.success);

		let body: TurnstileResponse =
			serde_json::from_str(r#"{"success": false, "error-codes": ["invalid-input-response"]}"#)
				.unwrap();
		assert!(!body.success);
	}

	#[test]
	fn client_secret_is_not_logged() {
		let client = TurnstileClient::new(SecretString::new("ts-secret-value".to_string()));
		let debug = format!("{client:?}");
		assert!(!debug.contains("ts-secret-value"));
	}

	#[test]
	fn from_env_requires_variable() {
		// The variable is absent in the test environment.
		std::env::remove_var("LATCH_SERVER_TURNSTILE_SECRET");
		assert!(matches!(
			TurnstileClient::from_env(),
			Err(CaptchaError::MissingEnvVar(_))
		));
	}
}
