// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Discord OAuth 2.0 authentication for Latch.
//!
//! Implements the authorization code flow with PKCE against Discord:
//!
//! 1. **Authorization URL**: built with a signed `state` (CSRF binding) and
//!    an S256 code challenge derived from the caller's verifier.
//! 2. **Callback**: Discord redirects back with `code` and `state`.
//! 3. **Code exchange**: the code plus the original verifier buy an access
//!    token.
//! 4. **Identity**: `/users/@me` yields the stable snowflake id, username,
//!    email, and whether Discord has verified that email.
//! 5. **Revocation**: the access token is revoked once the identity has
//!    been read; Latch keeps sessions of its own, not provider tokens.
//!
//! # Security Considerations
//!
//! - `client_secret` and access tokens are wrapped in [`SecretString`].
//! - The `state` parameter is opaque to this crate; signing and verification
//!   belong to the caller.
//! - Tracing spans skip token and code parameters.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use latch_common_secret::SecretString;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::env;
use url::Url;

const DISCORD_AUTHORIZE_URL: &str = "https://discord.com/oauth2/authorize";
const DISCORD_TOKEN_URL: &str = "https://discord.com/api/oauth2/token";
const DISCORD_REVOKE_URL: &str = "https://discord.com/api/oauth2/token/revoke";
const DISCORD_USER_API_URL: &str = "https://discord.com/api/users/@me";
const DISCORD_CDN_URL: &str = "https://cdn.discordapp.com";

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
	/// The HTTP request to Discord failed (network error, timeout, etc.).
	#[error("HTTP request failed: {0}")]
	HttpRequest(#[from] reqwest::Error),

	/// The response from Discord could not be parsed as expected.
	#[error("failed to parse response: {0}")]
	ParseError(String),

	/// Discord returned an error response (invalid code, expired token, etc.).
	#[error("Discord API error: {0}")]
	DiscordError(String),
}

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the Discord OAuth client.
#[derive(Debug, Clone)]
pub struct DiscordOAuthConfig {
	/// The OAuth application client ID.
	pub client_id: String,
	/// The OAuth application client secret (wrapped to prevent logging).
	pub client_secret: SecretString,
	/// The callback URL where Discord redirects after authorization.
	pub redirect_uri: String,
	/// OAuth scopes to request. Defaults are `identify` and `email`.
	pub scopes: Vec<String>,
}

impl DiscordOAuthConfig {
	/// Load configuration from environment variables.
	///
	/// # Required Environment Variables
	///
	/// - `LATCH_SERVER_DISCORD_CLIENT_ID`
	/// - `LATCH_SERVER_DISCORD_CLIENT_SECRET`
	/// - `LATCH_SERVER_DISCORD_REDIRECT_URI`
	///
	/// # Errors
	///
	/// Returns [`ConfigError::MissingEnvVar`] if any required variable is
	/// not set.
	pub fn from_env() -> Result<Self, ConfigError> {
		let client_id = env::var("LATCH_SERVER_DISCORD_CLIENT_ID")
			.map_err(|_| ConfigError::MissingEnvVar("LATCH_SERVER_DISCORD_CLIENT_ID".to_string()))?;

		let client_secret = env::var("LATCH_SERVER_DISCORD_CLIENT_SECRET").map_err(|_| {
			ConfigError::MissingEnvVar("LATCH_SERVER_DISCORD_CLIENT_SECRET".to_string())
		})?;

		let redirect_uri = env::var("LATCH_SERVER_DISCORD_REDIRECT_URI").map_err(|_| {
			ConfigError::MissingEnvVar("LATCH_SERVER_DISCORD_REDIRECT_URI".to_string())
		})?;

		Ok(Self {
			client_id,
			client_secret: SecretString::new(client_secret),
			redirect_uri,
			scopes: vec!["identify".to_string(), "email".to_string()],
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

	/// Join scopes into the space-separated form Discord expects.
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

/// Response from Discord's token endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordTokenResponse {
	/// The access token for API requests (wrapped to prevent logging).
	#[serde(deserialize_with = "deserialize_secret_string")]
	pub access_token: SecretString,
	/// The token type (always "Bearer").
	pub token_type: String,
	/// Granted scopes, space-separated.
	pub scope: String,
	/// Seconds until the access token expires.
	pub expires_in: i64,
}

fn deserialize_secret_string<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let s = String::deserialize(deserializer)?;
	Ok(SecretString::new(s))
}

/// The authenticated user from Discord's `/users/@me` endpoint.
///
/// `id` is the snowflake, stable across username changes — it is what Latch
/// stores as the provider user id. `email` requires the `email` scope and
/// may be absent for bot-owned tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordUser {
	/// Discord's stable snowflake id.
	pub id: String,
	/// The unique username.
	pub username: String,
	/// The display name, if set.
	pub global_name: Option<String>,
	/// Avatar hash, if set. See [`DiscordUser::avatar_url`].
	pub avatar: Option<String>,
	/// Email address (requires the `email` scope).
	pub email: Option<String>,
	/// Whether Discord has verified the email.
	#[serde(default)]
	pub verified: bool,
}

impl DiscordUser {
	/// CDN URL of the user's avatar, if they have one.
	pub fn avatar_url(&self) -> Option<String> {
		self.avatar
			.as_ref()
			.map(|hash| format!("{DISCORD_CDN_URL}/avatars/{}/{hash}.png", self.id))
	}

	/// The name to show: the global display name when set, else the
	/// username.
	pub fn display_name(&self) -> &str {
		self.global_name.as_deref().unwrap_or(&self.username)
	}
}

#[derive(Debug, Deserialize)]
struct DiscordErrorResponse {
	error: String,
	error_description: Option<String>,
}

// =============================================================================
// Client
// =============================================================================

/// OAuth client for authenticating users via Discord.
#[derive(Debug, Clone)]
pub struct DiscordOAuthClient {
	config: DiscordOAuthConfig,
	http_client: reqwest::Client,
}

impl DiscordOAuthClient {
	/// Create a new Discord OAuth client with the given configuration.
	///
	/// # Panics
	///
	/// Panics if the HTTP client cannot be built (should never happen in
	/// practice).
	#[tracing::instrument(skip_all, name = "DiscordOAuthClient::new")]
	pub fn new(config: DiscordOAuthConfig) -> Self {
		Self {
			config,
			http_client: latch_common_http::new_client(),
		}
	}

	/// Generate the Discord authorization URL.
	///
	/// # Arguments
	///
	/// - `state`: the signed state blob binding the callback to this
	///   request; verified by the caller when the callback arrives.
	/// - `code_verifier`: the PKCE verifier; its S256 challenge is embedded
	///   in the URL and the verifier itself goes to
	///   [`exchange_code`](Self::exchange_code) later.
	#[tracing::instrument(skip(self, state, code_verifier), fields(client_id = %self.config.client_id))]
	pub fn authorization_url(&self, state: &str, code_verifier: &str) -> String {
		let mut url = Url::parse(DISCORD_AUTHORIZE_URL).expect("invalid authorize URL");

		url.query_pairs_mut()
			.append_pair("client_id", &self.config.client_id)
			.append_pair("redirect_uri", &self.config.redirect_uri)
			.append_pair("response_type", "code")
			.append_pair("scope", &self.config.scopes_string())
			.append_pair("state", state)
			.append_pair("code_challenge", &code_challenge_s256(code_verifier))
			.append_pair("code_challenge_method", "S256")
			.append_pair("prompt", "consent");

		url.to_string()
	}

	/// Exchange an authorization code (plus its PKCE verifier) for tokens.
	///
	/// # Errors
	///
	/// - [`OAuthError::HttpRequest`]: network error or timeout.
	/// - [`OAuthError::DiscordError`]: Discord rejected the code.
	/// - [`OAuthError::ParseError`]: unexpected response format.
	#[tracing::instrument(skip_all, name = "DiscordOAuthClient::exchange_code")]
	pub async fn exchange_code(
		&self,
		code: &str,
		code_verifier: &str,
	) -> Result<DiscordTokenResponse, OAuthError> {
		tracing::debug!("exchanging authorization code for access token");

		let response = self
			.http_client
			.post(DISCORD_TOKEN_URL)
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

		if let Ok(error_response) = serde_json::from_str::<DiscordErrorResponse>(&body) {
			if !error_response.error.is_empty() {
				let message = error_response
					.error_description
					.unwrap_or(error_response.error);
				return Err(OAuthError::DiscordError(message));
			}
		}

		serde_json::from_str(&body)
			.map_err(|e| OAuthError::ParseError(format!("failed to parse token response: {e}")))
	}

	/// Fetch the authenticated user's identity.
	#[tracing::instrument(skip_all, name = "DiscordOAuthClient::get_user")]
	pub async fn get_user(&self, access_token: &str) -> Result<DiscordUser, OAuthError> {
		tracing::debug!("fetching Discord user identity");

		let response = self
			.http_client
			.get(DISCORD_USER_API_URL)
			.header("Authorization", format!("Bearer {access_token}"))
			.send()
			.await?;

		if !response.status().is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(OAuthError::DiscordError(format!(
				"failed to get user: {body}"
			)));
		}

		response
			.json()
			.await
			.map_err(|e| OAuthError::ParseError(format!("failed to parse user response: {e}")))
	}

	/// Revoke an access token.
	///
	/// Called once the identity has been read; failures are reported so the
	/// caller can log them, but nothing downstream depends on success.
	#[tracing::instrument(skip_all, name = "DiscordOAuthClient::revoke_token")]
	pub async fn revoke_token(&self, access_token: &str) -> Result<(), OAuthError> {
		let response = self
			.http_client
			.post(DISCORD_REVOKE_URL)
			.form(&[
				("client_id", self.config.client_id.as_str()),
				("client_secret", self.config.client_secret.expose().as_str()),
				("token", access_token),
				("token_type_hint", "access_token"),
			])
			.send()
			.await?;

		if !response.status().is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(OAuthError::DiscordError(format!(
				"failed to revoke token: {body}"
			)));
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn config() -> DiscordOAuthConfig {
		DiscordOAuthConfig {
			client_id: "1234567890".to_string(),
			client_secret: SecretString::new("discord_secret".to_string()),
			redirect_uri: "https://example.com/auth/discord/callback".to_string(),
			scopes: vec!["identify".to_string(), "email".to_string()],
		}
	}

	#[test]
	fn authorization_url_contains_required_params() {
		let client = DiscordOAuthClient::new(config());
		let url = client.authorization_url("state-123", "verifier-abc");

		assert!(url.starts_with("https://discord.com/oauth2/authorize"));
		assert!(url.contains("client_id=1234567890"));
		assert!(url.contains("response_type=code"));
		assert!(url.contains("state=state-123"));
		assert!(url.contains("scope=identify+email"));
		assert!(url.contains("code_challenge="));
		assert!(url.contains("code_challenge_method=S256"));
	}

	#[test]
	fn authorization_url_never_embeds_the_verifier() {
		let client = DiscordOAuthClient::new(config());
		let url = client.authorization_url("state", "plaintext-verifier-value");
		assert!(!url.contains("plaintext-verifier-value"));
	}

	#[test]
	fn code_challenge_matches_rfc7636_s256_vector() {
		// Appendix B of RFC 7636.
		assert_eq!(
			code_challenge_s256("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
			"E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
		);
	}

	#[test]
	fn user_deserializes_and_builds_avatar_url() {
		let json = r#"{
			"id": "80351110224678912",
			"username": "nelly",
			"global_name": "Nelly",
			"avatar": "8342729096ea3675442027381ff50dfe",
			"email": "nelly@example.com",
			"verified": true
		}"#;

		let user: DiscordUser = serde_json::from_str(json).unwrap();
		assert_eq!(user.id, "80351110224678912");
		assert_eq!(user.display_name(), "Nelly");
		assert!(user.verified);
		assert_eq!(
			user.avatar_url().unwrap(),
			"https://cdn.discordapp.com/avatars/80351110224678912/8342729096ea3675442027381ff50dfe.png"
		);
	}

	#[test]
	fn user_deserializes_with_null_fields() {
		let json = r#"{
			"id": "80351110224678912",
			"username": "nelly",
			"global_name": null,
			"avatar": null,
			"email": null
		}"#;

		let user: DiscordUser = serde_json::from_str(json).unwrap();
		assert_eq!(user.display_name(), "nelly");
		assert!(user.avatar_url().is_none());
		assert!(!user.verified);
	}

	#[test]
	fn token_response_deserializes() {
		let json = r#"{
			"access_token": "6qrZcUqja7812RVdnEKjpzOL4CvHBFG",
			"token_type": "Bearer",
			"expires_in": 604800,
			"scope": "identify email"
		}"#;

		let token: DiscordTokenResponse = serde_json::from_str(json).unwrap();
		assert_eq!(token.access_token.expose(), "6qrZcUqja7812RVdnEKjpzOL4CvHBFG");
		assert_eq!(token.token_type, "Bearer");
		assert_eq!(token.expires_in, 604800);
	}

	#[test]
	fn access_token_is_not_logged() {
		let json = r#"{
			"access_token": "super-secret-discord-token",
			"token_type": "Bearer",
			"expires_in": 604800,
			"scope": "identify"
		}"#;

		let token: DiscordTokenResponse = serde_json::from_str(json).unwrap();
		let debug = format!("{token:?}");
		assert!(!debug.contains("super-secret-discord-token"));
		assert!(debug.contains("[REDACTED]"));
	}

	#[test]
	fn config_validation_rejects_empty_fields() {
		let mut c = config();
		c.client_id = String::new();
		assert!(c.validate().is_err());

		let mut c = config();
		c.client_secret = SecretString::new(String::new());
		assert!(c.validate().is_err());

		let mut c = config();
		c.redirect_uri = String::new();
		assert!(c.validate().is_err());

		assert!(config().validate().is_ok());
	}
}
