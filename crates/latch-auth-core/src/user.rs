// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User and external-identity entities.
//!
//! [`User`] is the durable anchor every session kind references by id.
//! [`ExternalIdentity`] records a `(provider, provider_user_id)` pair linked
//! to a local user; it is what federated login resolves against.
//!
//! # PII Handling
//!
//! `email`, `name`, and `icon_url` are user-provided PII and should be
//! redacted in logs. `password_hash` is an Argon2 PHC string, never the
//! password itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{IdentityId, UserId};

// =============================================================================
// Gender
// =============================================================================

/// Self-reported gender on a user profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
	Man,
	Woman,
	Other,
}

impl fmt::Display for Gender {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Gender::Man => write!(f, "man"),
			Gender::Woman => write!(f, "woman"),
			Gender::Other => write!(f, "other"),
		}
	}
}

impl std::str::FromStr for Gender {
	type Err = ParseGenderError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"man" => Ok(Gender::Man),
			"woman" => Ok(Gender::Woman),
			"other" => Ok(Gender::Other),
			_ => Err(ParseGenderError(s.to_string())),
		}
	}
}

/// Error for unrecognized gender strings.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unrecognized gender: {0}")]
pub struct ParseGenderError(String);

// =============================================================================
// OAuthProvider
// =============================================================================

/// Supported OAuth providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthProvider {
	/// Discord OAuth.
	Discord,
	/// Google OAuth.
	Google,
}

impl fmt::Display for OAuthProvider {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OAuthProvider::Discord => write!(f, "discord"),
			OAuthProvider::Google => write!(f, "google"),
		}
	}
}

impl std::str::FromStr for OAuthProvider {
	type Err = ParseProviderError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"discord" => Ok(OAuthProvider::Discord),
			"google" => Ok(OAuthProvider::Google),
			_ => Err(ParseProviderError(s.to_string())),
		}
	}
}

/// Error for unrecognized provider strings.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unrecognized oauth provider: {0}")]
pub struct ParseProviderError(String);

// =============================================================================
// User
// =============================================================================

/// A user account.
///
/// Sessions reference users by id only; the one denormalized copy of a user
/// field that sessions carry is a target email, kept specifically to detect
/// address races at confirmation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
	/// Unique identifier for this user.
	pub id: UserId,

	/// Primary email address.
	pub email: String,

	/// Whether ownership of `email` has been proven.
	pub email_verified: bool,

	/// Display name.
	pub name: String,

	/// URL of the user's avatar image.
	pub icon_url: Option<String>,

	/// Self-reported gender; `None` until the user sets one.
	pub gender: Option<Gender>,

	/// Argon2 PHC hash of the password. `None` for accounts created through
	/// a federated provider that have not set a password.
	pub password_hash: Option<String>,

	/// When the user was created.
	pub created_at: DateTime<Utc>,

	/// When the user was last updated.
	pub updated_at: DateTime<Utc>,
}

impl User {
	/// Create a user from a confirmed signup.
	///
	/// The signup flow only reaches this point after the email challenge has
	/// been passed, so the account starts verified.
	pub fn register(
		email: impl Into<String>,
		name: impl Into<String>,
		gender: Gender,
		password_hash: String,
	) -> Self {
		let now = Utc::now();
		Self {
			id: UserId::generate(),
			email: email.into(),
			email_verified: true,
			name: name.into(),
			icon_url: None,
			gender: Some(gender),
			password_hash: Some(password_hash),
			created_at: now,
			updated_at: now,
		}
	}

	/// Create a user from a federated identity.
	///
	/// The provider attested the email, so the account starts verified. No
	/// password is set; [`has_password`](Self::has_password) is false until
	/// the user creates one.
	pub fn from_provider_identity(
		email: impl Into<String>,
		name: impl Into<String>,
		icon_url: Option<String>,
	) -> Self {
		let now = Utc::now();
		Self {
			id: UserId::generate(),
			email: email.into(),
			email_verified: true,
			name: name.into(),
			icon_url,
			gender: None,
			password_hash: None,
			created_at: now,
			updated_at: now,
		}
	}

	/// True if the account has a password credential.
	///
	/// Disconnecting an OAuth provider requires this, so an account is never
	/// left with no way to log in.
	pub fn has_password(&self) -> bool {
		self.password_hash.is_some()
	}
}

// =============================================================================
// ExternalIdentity
// =============================================================================

/// A federated identity linked to a local user.
///
/// Unique on `(provider, provider_user_id)`: one external account can be
/// linked to at most one local user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalIdentity {
	/// Unique identifier for this link.
	pub id: IdentityId,

	/// The local user this identity belongs to.
	pub user_id: UserId,

	/// The provider that owns the external account.
	pub provider: OAuthProvider,

	/// The user's id at the provider.
	pub provider_user_id: String,

	/// When the link was created.
	pub created_at: DateTime<Utc>,
}

impl ExternalIdentity {
	/// Link a provider account to a local user.
	pub fn link(user_id: UserId, provider: OAuthProvider, provider_user_id: impl Into<String>) -> Self {
		Self {
			id: IdentityId::generate(),
			user_id,
			provider,
			provider_user_id: provider_user_id.into(),
			created_at: Utc::now(),
		}
	}
}
