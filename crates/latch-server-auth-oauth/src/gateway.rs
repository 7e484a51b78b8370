// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The provider gateway seam.
//!
//! The reconciliation engine speaks one trait; the Discord and Google
//! clients are adapted onto it here. Identities are normalized into
//! [`ProviderIdentity`] so the decision table never sees provider-specific
//! field names.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;

use latch_auth_core::OAuthProvider;
use latch_common_secret::SecretString;
use latch_server_auth_discord::DiscordOAuthClient;
use latch_server_auth_google::GoogleOAuthClient;

/// Errors from a provider gateway, by failed step.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
	#[error("token exchange failed: {0}")]
	Exchange(String),

	#[error("identity fetch failed: {0}")]
	Identity(String),

	#[error("token revocation failed: {0}")]
	Revoke(String),
}

/// Provider tokens held between exchange and revocation.
#[derive(Debug, Clone)]
pub struct ProviderTokens {
	pub access_token: SecretString,
}

/// A provider identity normalized for reconciliation.
#[derive(Debug, Clone)]
pub struct ProviderIdentity {
	pub provider: OAuthProvider,
	/// The stable user id at the provider (snowflake, `sub`).
	pub provider_user_id: String,
	/// The email the provider reports, if any.
	pub email: Option<String>,
	/// Whether the provider attests ownership of that email. Reconciliation
	/// only trusts verified addresses.
	pub email_verified: bool,
	/// Display name for account creation.
	pub name: String,
	/// Avatar URL for account creation.
	pub icon_url: Option<String>,
}

impl ProviderIdentity {
	/// The email address, if the provider has verified it.
	pub fn verified_email(&self) -> Option<&str> {
		if self.email_verified {
			self.email.as_deref()
		} else {
			None
		}
	}
}

/// One OAuth provider as the reconciliation engine sees it.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
	/// Which provider this gateway fronts.
	fn provider(&self) -> OAuthProvider;

	/// Build the authorization URL for a signed state and PKCE verifier.
	fn authorization_url(&self, state: &str, code_verifier: &str) -> String;

	/// Exchange the callback code (plus verifier) for tokens.
	async fn exchange_code(
		&self,
		code: &str,
		code_verifier: &str,
	) -> Result<ProviderTokens, GatewayError>;

	/// Fetch the identity behind the tokens.
	async fn get_identity(&self, tokens: &ProviderTokens) -> Result<ProviderIdentity, GatewayError>;

	/// Revoke the tokens. Best-effort: the caller logs failures and moves on.
	async fn revoke_token(&self, tokens: &ProviderTokens) -> Result<(), GatewayError>;
}

/// Generate a PKCE code verifier: 32 random bytes, base64url.
pub fn generate_code_verifier() -> String {
	let mut bytes = [0u8; 32];
	rand::rngs::OsRng.fill_bytes(&mut bytes);
	URL_SAFE_NO_PAD.encode(bytes)
}

// =============================================================================
// Discord adapter
// =============================================================================

/// [`ProviderGateway`] over the Discord client.
pub struct DiscordGateway {
	client: DiscordOAuthClient,
}

impl DiscordGateway {
	pub fn new(client: DiscordOAuthClient) -> Self {
		Self { client }
	}
}

#[async_trait]
impl ProviderGateway for DiscordGateway {
	fn provider(&self) -> OAuthProvider {
		OAuthProvider::Discord
	}

	fn authorization_url(&self, state: &str, code_verifier: &str) -> String {
		self.client.authorization_url(state, code_verifier)
	}

	async fn exchange_code(
		&self,
		code: &str,
		code_verifier: &str,
	) -> Result<ProviderTokens, GatewayError> {
		let tokens = self
			.client
			.exchange_code(code, code_verifier)
			.await
			.map_err(|e| GatewayError::Exchange(e.to_string()))?;
		Ok(ProviderTokens {
			access_token: tokens.access_token,
		})
	}

	async fn get_identity(&self, tokens: &ProviderTokens) -> Result<ProviderIdentity, GatewayError> {
		let user = self
			.client
			.get_user(tokens.access_token.expose())
			.await
			.map_err(|e| GatewayError::Identity(e.to_string()))?;
		Ok(ProviderIdentity {
			provider: OAuthProvider::Discord,
			provider_user_id: user.id.clone(),
			icon_url: user.avatar_url(),
			name: user.display_name().to_string(),
			email_verified: user.verified,
			email: user.email,
		})
	}

	async fn revoke_token(&self, tokens: &ProviderTokens) -> Result<(), GatewayError> {
		self.client
			.revoke_token(tokens.access_token.expose())
			.await
			.map_err(|e| GatewayError::Revoke(e.to_string()))
	}
}

// =============================================================================
// Google adapter
// =============================================================================

/// [`ProviderGateway`] over the Google client.
pub struct GoogleGateway {
	client: GoogleOAuthClient,
}

impl GoogleGateway {
	pub fn new(client: GoogleOAuthClient) -> Self {
		Self { client }
	}
}

#[async_trait]
impl ProviderGateway for GoogleGateway {
	fn provider(&self) -> OAuthProvider {
		OAuthProvider::Google
	}

	fn authorization_url(&self, state: &str, code_verifier: &str) -> String {
		self.client.authorization_url(state, code_verifier)
	}

	async fn exchange_code(
		&self,
		code: &str,
		code_verifier: &str,
	) -> Result<ProviderTokens, GatewayError> {
		let tokens = self
			.client
			.exchange_code(code, code_verifier)
			.await
			.map_err(|e| GatewayError::Exchange(e.to_string()))?;
		Ok(ProviderTokens {
			access_token: tokens.access_token,
		})
	}

	async fn get_identity(&self, tokens: &ProviderTokens) -> Result<ProviderIdentity, GatewayError> {
		let info = self
			.client
			.get_userinfo(tokens.access_token.expose())
			.await
			.map_err(|e| GatewayError::Identity(e.to_string()))?;
		let name = info
			.name
			.clone()
			.or_else(|| info.email.clone())
			.unwrap_or_else(|| "Google user".to_string());
		Ok(ProviderIdentity {
			provider: OAuthProvider::Google,
			provider_user_id: info.sub,
			email: info.email,
			email_verified: info.email_verified,
			name,
			icon_url: info.picture,
		})
	}

	async fn revoke_token(&self, tokens: &ProviderTokens) -> Result<(), GatewayError> {
		self.client
			.revoke_token(tokens.access_token.expose())
			.await
			.map_err(|e| GatewayError::Revoke(e.to_string()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn verifier_is_base64url_43_chars() {
		let verifier = generate_code_verifier();
		assert_eq!(verifier.len(), 43);
		assert!(verifier
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
	}

	#[test]
	fn verifiers_are_unique() {
		assert_ne!(generate_code_verifier(), generate_code_verifier());
	}

	#[test]
	fn verified_email_requires_the_flag() {
		let mut identity = ProviderIdentity {
			provider: OAuthProvider::Discord,
			provider_user_id: "1".to_string(),
			email: Some("a@x.com".to_string()),
			email_verified: false,
			name: "A".to_string(),
			icon_url: None,
		};
		assert!(identity.verified_email().is_none());

		identity.email_verified = true;
		assert_eq!(identity.verified_email(), Some("a@x.com"));

		identity.email = None;
		assert!(identity.verified_email().is_none());
	}
}
