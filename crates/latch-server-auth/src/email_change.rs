// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Email change: claim a new address by proving you can read it.
//!
//! The session carries the *target* address and the code is sent there, not
//! to the current one. Confirmation is single-step — a correct code performs
//! the change and deletes the session — so unlike signup there is no
//! intermediate verified state.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::instrument;

use latch_auth_core::{
	EmailVerification, EmailVerificationSession, PasswordReset, SessionToken, User, UserId,
};
use latch_server_db::{DbError, UserRepository};
use latch_server_sessions::{
	validate_token, SessionRepository, SessionStoreError, ValidateError,
};

use crate::email::{EmailError, EmailGateway, EmailTemplate};
use crate::rate_limit::RateLimiter;

/// Errors from the email-change flow.
#[derive(Debug, thiserror::Error)]
pub enum EmailChangeError {
	/// A user already owns the target address.
	#[error("email already registered")]
	EmailAlreadyRegistered,

	/// Too many change requests for this key.
	#[error("rate limited")]
	RateLimited { reset: Option<DateTime<Utc>> },

	/// The requesting account does not exist.
	#[error("user not found")]
	UserNotFound,

	/// Malformed, unknown, or wrong-secret session token.
	#[error("invalid session token")]
	InvalidToken,

	/// The verification session expired; the row has been removed.
	#[error("email verification session expired")]
	Expired,

	/// The supplied code does not match.
	#[error("invalid verification code")]
	InvalidCode,

	#[error(transparent)]
	Email(#[from] EmailError),

	#[error(transparent)]
	Sessions(#[from] SessionStoreError),

	#[error(transparent)]
	Db(#[from] DbError),
}

impl From<ValidateError> for EmailChangeError {
	fn from(err: ValidateError) -> Self {
		match err {
			ValidateError::Invalid => EmailChangeError::InvalidToken,
			ValidateError::Expired => EmailChangeError::Expired,
			ValidateError::Store(e) => EmailChangeError::Sessions(e),
		}
	}
}

/// A pending change: the session plus the bearer token for confirmation.
#[derive(Debug)]
pub struct EmailChangeChallenge {
	pub session: EmailVerificationSession,
	pub token: SessionToken,
}

/// The email-change use cases.
pub struct EmailChangeService {
	verifications: Arc<dyn SessionRepository<EmailVerification>>,
	resets: Arc<dyn SessionRepository<PasswordReset>>,
	users: Arc<dyn UserRepository>,
	email: Arc<dyn EmailGateway>,
	limiter: Arc<dyn RateLimiter>,
}

impl EmailChangeService {
	pub fn new(
		verifications: Arc<dyn SessionRepository<EmailVerification>>,
		resets: Arc<dyn SessionRepository<PasswordReset>>,
		users: Arc<dyn UserRepository>,
		email: Arc<dyn EmailGateway>,
		limiter: Arc<dyn RateLimiter>,
	) -> Self {
		Self {
			verifications,
			resets,
			users,
			email,
			limiter,
		}
	}

	/// Start an address change for an authenticated user.
	#[instrument(name = "email_change.request", skip_all, fields(user_id = %user_id))]
	pub async fn request(
		&self,
		user_id: &UserId,
		new_email: &str,
	) -> Result<EmailChangeChallenge, EmailChangeError> {
		let decision = self
			.limiter
			.consume(&format!("email_change:{user_id}"), 1)
			.await;
		if !decision.allowed {
			return Err(EmailChangeError::RateLimited {
				reset: decision.reset,
			});
		}

		if self.users.find_by_id(user_id).await?.is_none() {
			return Err(EmailChangeError::UserNotFound);
		}
		if self.users.find_by_email(new_email).await?.is_some() {
			return Err(EmailChangeError::EmailAlreadyRegistered);
		}

		self.verifications.delete_for_owner(user_id).await?;
		let (session, secret) = EmailVerificationSession::request(*user_id, new_email);
		self.verifications.save(&session).await?;

		// The code goes to the address being claimed.
		self.email
			.send(
				new_email,
				&EmailTemplate::EmailChange {
					code: session.payload.code.clone(),
				},
			)
			.await?;

		let token = session.token(&secret);
		Ok(EmailChangeChallenge { session, token })
	}

	/// Confirm with the emailed code, switching the account to the new
	/// address.
	///
	/// The target address is re-checked for a registration race, and the
	/// user's outstanding password-reset sessions are dropped — they were
	/// minted against the old address.
	#[instrument(name = "email_change.confirm", skip_all)]
	pub async fn confirm(&self, token: &str, code: &str) -> Result<User, EmailChangeError> {
		let session = validate_token(self.verifications.as_ref(), token).await?;

		if !session.payload.code.matches(code) {
			return Err(EmailChangeError::InvalidCode);
		}

		if self
			.users
			.find_by_email(&session.payload.email)
			.await?
			.is_some()
		{
			return Err(EmailChangeError::EmailAlreadyRegistered);
		}

		let Some(mut user) = self.users.find_by_id(&session.payload.user_id).await? else {
			self.verifications.delete(&session.id).await?;
			return Err(EmailChangeError::UserNotFound);
		};

		user.email = session.payload.email.clone();
		user.email_verified = true;
		user.updated_at = Utc::now();
		match self.users.save(&user).await {
			Ok(()) => {}
			Err(DbError::Conflict(_)) => return Err(EmailChangeError::EmailAlreadyRegistered),
			Err(e) => return Err(e.into()),
		}

		self.resets.delete_for_owner(&user.id).await?;

		// Last step: the session row goes only after the change is durable.
		self.verifications.delete(&session.id).await?;

		tracing::info!(user_id = %user.id, "email change confirmed");
		Ok(user)
	}
}
