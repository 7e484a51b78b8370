// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Account-link challenge, confirmation, and provider disconnect.
//!
//! A callback that found a same-email local account leaves behind an
//! [`AccountLinkSession`] and hands its token to the client. Linking then
//! takes two more steps: `challenge` emails a code to the local account's
//! address, and `confirm` trades the correct code for the persisted
//! identity link plus a fresh login session. The link session is deleted
//! last, after the identity and login rows exist.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::instrument;

use latch_auth_core::{
	AccountLink, AccountLinkSession, ExternalIdentity, Login, LoginSession, OAuthProvider, UserId,
};
use latch_server_auth::{
	AuthenticatedUser, EmailError, EmailGateway, EmailTemplate, RateLimiter,
};
use latch_server_db::{DbError, IdentityRepository, UserRepository};
use latch_server_sessions::{
	validate_token, SessionRepository, SessionStoreError, ValidateError,
};

/// Errors from the account-link use cases.
#[derive(Debug, thiserror::Error)]
pub enum AccountLinkError {
	/// Malformed, unknown, or wrong-secret session token.
	#[error("invalid session token")]
	InvalidToken,

	/// The link session expired; the row has been removed.
	#[error("account link session expired")]
	Expired,

	/// Too many challenge requests for this key.
	#[error("rate limited")]
	RateLimited { reset: Option<DateTime<Utc>> },

	/// Confirmation attempted before any challenge code was emailed.
	#[error("account link not challenged")]
	NotChallenged,

	/// The supplied code does not match.
	#[error("invalid verification code")]
	InvalidCode,

	/// The linking user no longer exists.
	#[error("user not found")]
	UserNotFound,

	/// This user already has an identity for the provider.
	#[error("provider already linked")]
	ProviderAlreadyLinked,

	/// The external identity was claimed by a different user mid-flow.
	#[error("account already linked to another user")]
	AccountAlreadyLinkedToAnotherUser,

	#[error(transparent)]
	Email(#[from] EmailError),

	#[error(transparent)]
	Sessions(#[from] SessionStoreError),

	#[error(transparent)]
	Db(#[from] DbError),
}

impl From<ValidateError> for AccountLinkError {
	fn from(err: ValidateError) -> Self {
		match err {
			ValidateError::Invalid => AccountLinkError::InvalidToken,
			ValidateError::Expired => AccountLinkError::Expired,
			ValidateError::Store(e) => AccountLinkError::Sessions(e),
		}
	}
}

/// Errors from disconnecting a provider.
#[derive(Debug, thiserror::Error)]
pub enum DisconnectError {
	/// The account has no password; removing the link would lock it out.
	#[error("password not set")]
	PasswordNotSet,

	/// The account does not exist.
	#[error("user not found")]
	UserNotFound,

	/// No identity for this provider was linked.
	#[error("provider not linked")]
	NotLinked,

	#[error(transparent)]
	Db(#[from] DbError),
}

/// The account-link use cases.
pub struct AccountLinkService {
	links: Arc<dyn SessionRepository<AccountLink>>,
	logins: Arc<dyn SessionRepository<Login>>,
	users: Arc<dyn UserRepository>,
	identities: Arc<dyn IdentityRepository>,
	email: Arc<dyn EmailGateway>,
	limiter: Arc<dyn RateLimiter>,
}

impl AccountLinkService {
	pub fn new(
		links: Arc<dyn SessionRepository<AccountLink>>,
		logins: Arc<dyn SessionRepository<Login>>,
		users: Arc<dyn UserRepository>,
		identities: Arc<dyn IdentityRepository>,
		email: Arc<dyn EmailGateway>,
		limiter: Arc<dyn RateLimiter>,
	) -> Self {
		Self {
			links,
			logins,
			users,
			identities,
			email,
			limiter,
		}
	}

	/// Mint the challenge code and email it to the local account's address.
	///
	/// Re-challenging replaces the code; only the latest emailed code
	/// confirms.
	#[instrument(name = "account_link.challenge", skip_all)]
	pub async fn challenge(&self, token: &str) -> Result<AccountLinkSession, AccountLinkError> {
		let mut session = validate_token(self.links.as_ref(), token).await?;

		let decision = self
			.limiter
			.consume(&format!("account_link:{}", session.payload.user_id), 1)
			.await;
		if !decision.allowed {
			return Err(AccountLinkError::RateLimited {
				reset: decision.reset,
			});
		}

		let code = session.challenge();
		self.links.save(&session).await?;

		self.email
			.send(&session.payload.email, &EmailTemplate::AccountLink { code })
			.await?;

		Ok(session)
	}

	/// Trade the correct code for a persisted identity link and a login.
	#[instrument(name = "account_link.confirm", skip_all)]
	pub async fn confirm(&self, token: &str, code: &str) -> Result<AuthenticatedUser, AccountLinkError> {
		let session = validate_token(self.links.as_ref(), token).await?;

		let Some(expected) = &session.payload.code else {
			return Err(AccountLinkError::NotChallenged);
		};
		if !expected.matches(code) {
			return Err(AccountLinkError::InvalidCode);
		}

		let Some(user) = self.users.find_by_id(&session.payload.user_id).await? else {
			self.links.delete(&session.id).await?;
			return Err(AccountLinkError::UserNotFound);
		};

		if self
			.identities
			.find_by_user_and_provider(&user.id, session.payload.provider)
			.await?
			.is_some()
		{
			return Err(AccountLinkError::ProviderAlreadyLinked);
		}
		if let Some(existing) = self
			.identities
			.find_by_provider(session.payload.provider, &session.payload.provider_user_id)
			.await?
		{
			return Err(if existing.user_id == user.id {
				AccountLinkError::ProviderAlreadyLinked
			} else {
				AccountLinkError::AccountAlreadyLinkedToAnotherUser
			});
		}

		let link = ExternalIdentity::link(
			user.id,
			session.payload.provider,
			session.payload.provider_user_id.clone(),
		);
		match self.identities.save(&link).await {
			Ok(()) => {}
			Err(DbError::Conflict(_)) => {
				return Err(AccountLinkError::AccountAlreadyLinkedToAnotherUser)
			}
			Err(e) => return Err(e.into()),
		}

		let (login_session, secret) = LoginSession::issue_for(user.id);
		self.logins.save(&login_session).await?;
		let login_token = login_session.token(&secret);

		// Last step: the link session outlives the effects it gates.
		self.links.delete(&session.id).await?;

		tracing::info!(user_id = %user.id, provider = %session.payload.provider, "account linked");
		Ok(AuthenticatedUser {
			user,
			session: login_session,
			token: login_token,
		})
	}

	/// Remove a provider link from an account.
	///
	/// Refused while the account has no password, so the link being removed
	/// is never its only credential.
	#[instrument(name = "account_link.disconnect", skip_all, fields(user_id = %user_id, provider = %provider))]
	pub async fn disconnect(
		&self,
		user_id: &UserId,
		provider: OAuthProvider,
	) -> Result<(), DisconnectError> {
		let Some(user) = self.users.find_by_id(user_id).await? else {
			return Err(DisconnectError::UserNotFound);
		};
		if !user.has_password() {
			return Err(DisconnectError::PasswordNotSet);
		}

		let deleted = self
			.identities
			.delete_by_user_and_provider(user_id, provider)
			.await?;
		if deleted == 0 {
			return Err(DisconnectError::NotLinked);
		}

		tracing::info!(user_id = %user_id, provider = %provider, "provider disconnected");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testkit::{discord_identity, harness, FakeGateway, Harness};
	use crate::state::OAuthFlow;
	use latch_auth_core::Gender;
	use latch_server_auth::hash_password;
	use latch_server_sessions::validate_token;

	/// Drive a callback far enough to leave a link proposal behind,
	/// returning its token.
	async fn propose(h: &Harness, email: &str, provider_user_id: &str) -> String {
		let local = latch_auth_core::User::register(
			email,
			"Local",
			Gender::Other,
			hash_password("pw123456").unwrap(),
		);
		h.users.save(&local).await.unwrap();

		let gateway = FakeGateway::with_identity(discord_identity(provider_user_id, email));
		let err = h
			.callbacks
			.handle_callback(&gateway, h.params(OAuthFlow::Login, None))
			.await
			.unwrap_err();
		match err {
			crate::callback::CallbackError::AccountAssociationAvailable { token, .. } => {
				token.encode()
			}
			other => panic!("expected AccountAssociationAvailable, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn challenge_then_confirm_links_and_logs_in() {
		let h = harness().await;
		let token = propose(&h, "shared@x.com", "snowflake-1").await;

		// Challenge: code minted and emailed to the local address.
		let session = h.link_service.challenge(&token).await.unwrap();
		assert!(session.is_challenged());
		let sent = h.outbox.last().unwrap();
		assert_eq!(sent.to, "shared@x.com");
		let code = sent.code().as_str().to_string();

		// Confirm: identity persisted, login issued, session gone.
		let auth = h.link_service.confirm(&token, &code).await.unwrap();
		assert_eq!(auth.user.email, "shared@x.com");

		let identity = h
			.identities
			.find_by_provider(OAuthProvider::Discord, "snowflake-1")
			.await
			.unwrap()
			.unwrap();
		assert_eq!(identity.user_id, auth.user.id);

		let login = validate_token(h.logins.as_ref(), &auth.token.encode())
			.await
			.unwrap();
		assert_eq!(login.user_id(), auth.user.id);

		// The link session row itself is deleted.
		assert!(matches!(
			h.link_service.confirm(&token, &code).await.unwrap_err(),
			AccountLinkError::InvalidToken
		));
	}

	#[tokio::test]
	async fn confirm_before_challenge_is_refused() {
		let h = harness().await;
		let token = propose(&h, "shared@x.com", "snowflake-1").await;

		let err = h.link_service.confirm(&token, "00000000").await.unwrap_err();
		assert!(matches!(err, AccountLinkError::NotChallenged));
	}

	#[tokio::test]
	async fn wrong_code_leaves_the_session_intact() {
		let h = harness().await;
		let token = propose(&h, "shared@x.com", "snowflake-1").await;

		let session = h.link_service.challenge(&token).await.unwrap();
		let real = h.outbox.last().unwrap().code().as_str().to_string();
		let wrong = if real == "00000000" { "00000001" } else { "00000000" };

		let err = h.link_service.confirm(&token, wrong).await.unwrap_err();
		assert!(matches!(err, AccountLinkError::InvalidCode));

		// Session still there, identity not created.
		assert!(h.links.find(&session.id).await.unwrap().is_some());
		assert!(h
			.identities
			.find_by_provider(OAuthProvider::Discord, "snowflake-1")
			.await
			.unwrap()
			.is_none());

		// The right code still works afterwards.
		h.link_service.confirm(&token, &real).await.unwrap();
	}

	#[tokio::test]
	async fn rechallenge_invalidates_the_previous_code() {
		let h = harness().await;
		let token = propose(&h, "shared@x.com", "snowflake-1").await;

		h.link_service.challenge(&token).await.unwrap();
		let first = h.outbox.last().unwrap().code().as_str().to_string();
		h.link_service.challenge(&token).await.unwrap();
		let second = h.outbox.last().unwrap().code().as_str().to_string();

		if first != second {
			assert!(matches!(
				h.link_service.confirm(&token, &first).await.unwrap_err(),
				AccountLinkError::InvalidCode
			));
		}
		h.link_service.confirm(&token, &second).await.unwrap();
	}

	#[tokio::test]
	async fn identity_claimed_mid_flow_is_a_conflict() {
		let h = harness().await;
		let token = propose(&h, "shared@x.com", "snowflake-1").await;
		h.link_service.challenge(&token).await.unwrap();
		let code = h.outbox.last().unwrap().code().as_str().to_string();

		// Another account claims the identity while the code is in flight.
		let other = latch_auth_core::User::register(
			"other@x.com",
			"Other",
			Gender::Other,
			"hash".to_string(),
		);
		h.users.save(&other).await.unwrap();
		h.identities
			.save(&ExternalIdentity::link(
				other.id,
				OAuthProvider::Discord,
				"snowflake-1",
			))
			.await
			.unwrap();

		let err = h.link_service.confirm(&token, &code).await.unwrap_err();
		assert!(matches!(
			err,
			AccountLinkError::AccountAlreadyLinkedToAnotherUser
		));
	}

	#[tokio::test]
	async fn provider_already_linked_is_a_conflict() {
		let h = harness().await;
		let token = propose(&h, "shared@x.com", "snowflake-1").await;
		h.link_service.challenge(&token).await.unwrap();
		let code = h.outbox.last().unwrap().code().as_str().to_string();

		// The same user already holds a Discord identity.
		let user = h.users.find_by_email("shared@x.com").await.unwrap().unwrap();
		h.identities
			.save(&ExternalIdentity::link(
				user.id,
				OAuthProvider::Discord,
				"some-other-snowflake",
			))
			.await
			.unwrap();

		let err = h.link_service.confirm(&token, &code).await.unwrap_err();
		assert!(matches!(err, AccountLinkError::ProviderAlreadyLinked));
	}

	mod disconnect {
		use super::*;

		#[tokio::test]
		async fn requires_a_password() {
			let h = harness().await;
			let user = latch_auth_core::User::from_provider_identity("o@x.com", "O", None);
			h.users.save(&user).await.unwrap();
			h.identities
				.save(&ExternalIdentity::link(
					user.id,
					OAuthProvider::Discord,
					"snowflake-1",
				))
				.await
				.unwrap();

			let err = h
				.link_service
				.disconnect(&user.id, OAuthProvider::Discord)
				.await
				.unwrap_err();
			assert!(matches!(err, DisconnectError::PasswordNotSet));

			// The link is untouched.
			assert!(h
				.identities
				.find_by_user_and_provider(&user.id, OAuthProvider::Discord)
				.await
				.unwrap()
				.is_some());
		}

		#[tokio::test]
		async fn removes_the_link_when_a_password_exists() {
			let h = harness().await;
			let user = latch_auth_core::User::register(
				"p@x.com",
				"P",
				Gender::Other,
				hash_password("pw123456").unwrap(),
			);
			h.users.save(&user).await.unwrap();
			h.identities
				.save(&ExternalIdentity::link(
					user.id,
					OAuthProvider::Google,
					"sub-1",
				))
				.await
				.unwrap();

			h.link_service
				.disconnect(&user.id, OAuthProvider::Google)
				.await
				.unwrap();

			assert!(h
				.identities
				.find_by_user_and_provider(&user.id, OAuthProvider::Google)
				.await
				.unwrap()
				.is_none());
		}

		#[tokio::test]
		async fn unlinked_provider_is_an_error() {
			let h = harness().await;
			let user = latch_auth_core::User::register(
				"p@x.com",
				"P",
				Gender::Other,
				hash_password("pw123456").unwrap(),
			);
			h.users.save(&user).await.unwrap();

			let err = h
				.link_service
				.disconnect(&user.id, OAuthProvider::Google)
				.await
				.unwrap_err();
			assert!(matches!(err, DisconnectError::NotLinked));
		}
	}
}
