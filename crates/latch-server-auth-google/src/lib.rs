// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Google OAuth 2.0 authentication for Latch.
//!
//! Implements the authorization code flow with PKCE against Google's OAuth
//! endpoints, then reads the OpenID Connect `userinfo` document for the
//! identity. The `sub` claim is the stable provider user id; `email` plus
//! `email_verified` drive Latch's account reconciliation.
//!
//! # Security Considerations
//!
//! - `client_secret` and access tokens are wrapped in [`SecretString`].
//! - `email_verified` comes from Google, and the reconciliation engine only
//!   trusts addresses Google has verified.
//! - Tracing spans skip token and code parameters.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use latch_common_secret::SecretString;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use url::Url;

const GOOGLE_AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	/// A required environment variable was not set.
	#[error("missing environment variable: {0}")]
	MissingEnvVar(String),

	/// A configuration value was empty or invalid.
	#[error("invalid configuration: {0}")]
	InvalidConfig(String),
}

/// Errors that can occur during OAuth operations.
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
	/// The HTTP request to Google failed (network error, timeout, etc.).
	#[error("HTTP request failed: {0}")]
	HttpRequest(#[from] reqwest::Error),

	/// The response from Google could not be parsed as expected.
	#[error("failed to parse response: {0}")]
	ParseError(String),

	/// Google returned an error response (invalid code, expired token, etc.).
	#[error("Google API error: {0}")]
	GoogleError(String),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Google OAuth client.
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
	/// The OAuth application client ID.
	pub client_id: String,
	/// The OAuth application client secret (wrapped to prevent logging).
	pub client_secret: SecretString,
	/// The callback URL where Google redirects after authorization.
	pub redirect_uri: String,
	/// OAuth scopes to request. Defaults are `openid`, `email`, `profile`.
	pub scopes: Vec<String>,
}

impl GoogleOAuthConfig {
	/// Load configuration from environment variables.
	///
	/// # Required Environment Variables
	///
	/// - `LATCH_SERVER_GOOGLE_CLIENT_ID`
	/// - `LATCH_SERVER_GOOGLE_CLIENT_SECRET`
	/// - `LATCH_SERVER_GOOGLE_REDIRECT_URI`
	///
	/// # Errors
	///
	/// Returns [`ConfigError::MissingEnvVar`] if any required variable is
	/// not set.
	pub fn from_env() -> Result<Self, ConfigError> {
		let client_id = env::var("LATCH_SERVER_GOOGLE_CLIENT_ID")
			.map_err(|_| ConfigError::MissingEnvVar("LATCH_SERVER_GOOGLE_CLIENT_ID".to_string()))?;

		let client_secret = env::var("LATCH_SERVER_GOOGLE_CLIENT_SECRET").map_err(|_| {
			ConfigError::MissingEnvVar("LATCH_SERVER_GOOGLE_CLIENT_SECRET".to_string())
		})?;

		let redirect_uri = env::var("LATCH_SERVER_GOOGLE_REDIRECT_URI").map_err(|_| {
			ConfigError::MissingEnvVar("LATCH_SERVER_GOOGLE_REDIRECT_URI".to_string())
		})?;

		Ok(Self {
			client_id,
			client_secret: SecretString::new(client_secret),
			redirect_uri,
			scopes: vec![
				"openid".to_string(),
				"email".to_string(),
				"profile".to_string(),
			],
		})
	}

	/// Validate that all configuration fields are non-empty.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.client_id.is_empty() {
			return Err(ConfigError::InvalidConfig(
				"client_id cannot be empty".to_string(),
			));
		}
		if self.client_secret.expose().is_empty() {
			return Err(ConfigError::InvalidConfig(
				"client_secret cannot be empty".to_string(),
			));
		}
		if self.redirect_uri.is_empty() {
			return Err(ConfigError::InvalidConfig(
				"redirect_uri cannot be empty".to_string(),
			));
		}
		Ok(())
	}

	/// Join scopes into the space-separated form Google expects.
	pub fn scopes_string(&self) -> String {
		self.scopes.join(" ")
	}
}

// =============================================================================
// PKCE
// =============================================================================

/// Derive the S256 code challenge for a PKCE verifier.
pub fn code_challenge_s256(code_verifier: &str) -> String {
	let digest = Sha256::digest(code_verifier.as_bytes());
	URL_SAFE_NO_PAD.encode(digest)
}

// =============================================================================
// Response types
// =============================================================================

/// Response from Google's token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleTokenResponse {
	/// The access token for API requests (wrapped to prevent logging).
	#[serde(deserialize_with = "deserialize_secret_string")]
	pub access_token: SecretString,
	/// The token type (always "Bearer").
	pub token_type: String,
	/// Seconds until the access token expires.
	pub expires_in: i64,
	/// Granted scopes, space-separated.
	#[serde(default)]
	pub scope: String,
}

fn deserialize_secret_string<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let s = String::deserialize(deserializer)?;
	Ok(SecretString::new(s))
}

/// The authenticated user from Google's OpenID Connect `userinfo` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleUserInfo {
	/// Google's stable subject identifier.
	pub sub: String,
	/// Email address.
	pub email: Option<String>,
	/// Whether Google has verified the email.
	#[serde(default)]
	pub email_verified: bool,
	/// Full display name, if shared.
	pub name: Option<String>,
	/// Profile picture URL, if shared.
	pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorResponse {
	error: String,
	error_description: Option<String>,
}

// =============================================================================
// Client
// =============================================================================

/// OAuth client for authenticating users via Google.
#[derive(Debug, Clone)]
pub struct GoogleOAuthClient {
	config: GoogleOAuthConfig,
	http_client: reqwest::Client,
}

impl GoogleOAuthClient {
	/// Create a new Google OAuth client with the given configuration.
	///
	/// # Panics
	///
	/// Panics if the HTTP client cannot be built (should never happen in
	/// practice).
	#[tracing::instrument(skip_all, name = "GoogleOAuthClient::new")]
	pub fn new(config: GoogleOAuthConfig) -> Self {
		Self {
			config,
			http_client: latch_common_http::new_client(),
		}
	}

	/// Generate the Google authorization URL.
	///
	/// # Arguments
	///
	/// - `state`: the signed state blob binding the callback to this
	///   request.
	/// - `code_verifier`: the PKCE verifier whose S256 challenge is
	///   embedded in the URL.
	#[tracing::instrument(skip(self, state, code_verifier), fields(client_id = %self.config.client_id))]
	pub fn authorization_url(&self, state: &str, code_verifier: &str) -> String {
		let mut url = Url::parse(GOOGLE_AUTHORIZE_URL).expect("invalid authorize URL");

		url.query_pairs_mut()
			.append_pair("client_id", &self.config.client_id)
			.append_pair("redirect_uri", &self.config.redirect_uri)
			.append_pair("response_type", "code")
			.append_pair("scope", &self.config.scopes_string())
			.append_pair("state", state)
			.append_pair("code_challenge", &code_challenge_s256(code_verifier))
			.append_pair("code_challenge_method", "S256")
			.append_pair("access_type", "online");

		url.to_string()
	}

	/// Exchange an authorization code (plus its PKCE verifier) for tokens.
	///
	/// # Errors
	///
	/// - [`OAuthError::HttpRequest`]: network error or timeout.
	/// - [`OAuthError::GoogleError`]: Google rejected the code.
	/// - [`OAuthError::ParseError`]: unexpected response format.
	#[tracing::instrument(skip_all, name = "GoogleOAuthClient::exchange_code")]
	pub async fn exchange_code(
		&self,
		code: &str,
		code_verifier: &str,
	) -> Result<GoogleTokenResponse, OAuthError> {
		tracing::debug!("exchanging authorization code for access token");

		let response = self
			.http_client
			.post(GOOGLE_TOKEN_URL)
			.form(&[
				("client_id", self.config.client_id.as_str()),
				("client_secret", self.config.client_secret.expose().as_str()),
				("grant_type", "authorization_code"),
				("code", code),
				("redirect_uri", self.config.redirect_uri.as_str()),
				("code_verifier", code_verifier),
			])
			.send()
			.await?;

		let body = response.text().await?;

		if let Ok(error_response) = serde_json::from_str::<GoogleErrorResponse>(&body) {
			if !error_response.error.is_empty() {
				let message = error_response
					.error_description
					.unwrap_or(error_response.error);
				return Err(OAuthError::GoogleError(message));
			}
		}

		serde_json::from_str(&body)
			.map_err(|e| OAuthError::ParseError(format!("failed to parse token response: {e}")))
	}

	/// Fetch the authenticated user's OpenID Connect identity.
	#[tracing::instrument(skip_all, name = "GoogleOAuthClient::get_userinfo")]
	pub async fn get_userinfo(&self, access_token: &str) -> Result<GoogleUserInfo, OAuthError> {
		tracing::debug!("fetching Google userinfo");

		let response = self
			.http_client
			.get(GOOGLE_USERINFO_URL)
			.header("Authorization", format!("Bearer {access_token}"))
			.send()
			.await?;

		if !response.status().is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(OAuthError::GoogleError(format!(
				"failed to get userinfo: {body}"
			)));
		}

		response
			.json()
			.await
			.map_err(|e| OAuthError::ParseError(format!("failed to parse userinfo response: {e}")))
	}

	/// Revoke an access token.
	///
	/// Called once the identity has been read; failures are reported so the
	/// caller can log them, but nothing downstream depends on success.
	#[tracing::instrument(skip_all, name = "GoogleOAuthClient::revoke_token")]
	pub async fn revoke_token(&self, access_token: &str) -> Result<(), OAuthError> {
		let response = self
			.http_client
			.post(GOOGLE_REVOKE_URL)
			.form(&[("token", access_token)])
			.send()
			.await?;

		if !response.status().is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(OAuthError::GoogleError(format!(
				"failed to revoke token: {body}"
			)));
		}

		Ok(())
	}
}
