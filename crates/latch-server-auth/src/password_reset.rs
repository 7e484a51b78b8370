// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Password reset: request → verify the emailed code → set a new password.
//!
//! Reset sessions are keyed by user id (one live reset per account) and stay
//! on the short 30-minute span through both phases. Confirming rotates the
//! credential, so it also deletes every login session the user holds before
//! removing the reset session itself — the reset row always goes last.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::instrument;

use latch_auth_core::{Login, PasswordReset, PasswordResetSession, SessionToken, User};
use latch_server_db::{DbError, UserRepository};
use latch_server_sessions::{
	validate_token, SessionRepository, SessionStoreError, ValidateError,
};

use crate::email::{EmailError, EmailGateway, EmailTemplate};
use crate::password::{hash_password, PasswordError};
use crate::rate_limit::RateLimiter;

/// Errors from the password-reset flow.
#[derive(Debug, thiserror::Error)]
pub enum PasswordResetError {
	/// No account owns this email address.
	#[error("user not found")]
	UserNotFound,

	/// Too many reset requests for this key.
	#[error("rate limited")]
	RateLimited { reset: Option<DateTime<Utc>> },

	/// Malformed, unknown, or wrong-secret session token.
	#[error("invalid session token")]
	InvalidToken,

	/// The reset session expired; the row has been removed.
	#[error("password reset session expired")]
	Expired,

	/// The supplied code does not match.
	#[error("invalid verification code")]
	InvalidCode,

	/// The code was already consumed.
	#[error("email already verified")]
	AlreadyVerified,

	/// Confirmation attempted before the email challenge was passed.
	#[error("email verification required")]
	EmailVerificationRequired,

	#[error(transparent)]
	Password(#[from] PasswordError),

	#[error(transparent)]
	Email(#[from] EmailError),

	#[error(transparent)]
	Sessions(#[from] SessionStoreError),

	#[error(transparent)]
	Db(#[from] DbError),
}

impl From<ValidateError> for PasswordResetError {
	fn from(err: ValidateError) -> Self {
		match err {
			ValidateError::Invalid => PasswordResetError::InvalidToken,
			ValidateError::Expired => PasswordResetError::Expired,
			ValidateError::Store(e) => PasswordResetError::Sessions(e),
		}
	}
}

/// A pending reset: the session plus the bearer token for the next steps.
#[derive(Debug)]
pub struct PasswordResetChallenge {
	pub session: PasswordResetSession,
	pub token: SessionToken,
}

/// The password-reset use cases.
pub struct PasswordResetService {
	resets: Arc<dyn SessionRepository<PasswordReset>>,
	logins: Arc<dyn SessionRepository<Login>>,
	users: Arc<dyn UserRepository>,
	email: Arc<dyn EmailGateway>,
	limiter: Arc<dyn RateLimiter>,
}

impl PasswordResetService {
	pub fn new(
		resets: Arc<dyn SessionRepository<PasswordReset>>,
		logins: Arc<dyn SessionRepository<Login>>,
		users: Arc<dyn UserRepository>,
		email: Arc<dyn EmailGateway>,
		limiter: Arc<dyn RateLimiter>,
	) -> Self {
		Self {
			resets,
			logins,
			users,
			email,
			limiter,
		}
	}

	/// Start a reset for the account owning `email` and send the code.
	#[instrument(name = "password_reset.request", skip_all)]
	pub async fn request(&self, email: &str) -> Result<PasswordResetChallenge, PasswordResetError> {
		let decision = self
			.limiter
			.consume(&format!("password_reset:{email}"), 1)
			.await;
		if !decision.allowed {
			return Err(PasswordResetError::RateLimited {
				reset: decision.reset,
			});
		}

		let Some(user) = self.users.find_by_email(email).await? else {
			return Err(PasswordResetError::UserNotFound);
		};

		self.resets.delete_for_owner(&user.id).await?;
		let (session, secret) = PasswordResetSession::request(user.id);
		self.resets.save(&session).await?;

		self.email
			.send(
				&user.email,
				&EmailTemplate::PasswordReset {
					code: session.payload.code.clone(),
				},
			)
			.await?;

		let token = session.token(&secret);
		Ok(PasswordResetChallenge { session, token })
	}

	/// Pass the email challenge.
	#[instrument(name = "password_reset.verify_email", skip_all)]
	pub async fn verify_email(
		&self,
		token: &str,
		code: &str,
	) -> Result<PasswordResetSession, PasswordResetError> {
		let mut session = validate_token(self.resets.as_ref(), token).await?;

		if session.payload.email_verified {
			return Err(PasswordResetError::AlreadyVerified);
		}
		if !session.payload.code.matches(code) {
			return Err(PasswordResetError::InvalidCode);
		}

		session.mark_email_verified();
		self.resets.save(&session).await?;
		Ok(session)
	}

	/// Set the new password and invalidate every login session.
	///
	/// The user logs in again with the new credential; a reset does not
	/// produce a login session of its own.
	#[instrument(name = "password_reset.confirm", skip_all)]
	pub async fn confirm(&self, token: &str, new_password: &str) -> Result<User, PasswordResetError> {
		let session = validate_token(self.resets.as_ref(), token).await?;

		if !session.payload.email_verified {
			return Err(PasswordResetError::EmailVerificationRequired);
		}

		let Some(mut user) = self.users.find_by_id(&session.payload.user_id).await? else {
			// Account deleted while the reset was in flight.
			self.resets.delete(&session.id).await?;
			return Err(PasswordResetError::UserNotFound);
		};

		user.password_hash = Some(hash_password(new_password)?);
		user.updated_at = Utc::now();
		self.users.save(&user).await?;

		// Credential rotation logs out every device.
		self.logins.delete_for_owner(&user.id).await?;

		// Last step: the reset row outlives everything it gates.
		self.resets.delete(&session.id).await?;

		tracing::info!(user_id = %user.id, "password reset confirmed");
		Ok(user)
	}
}
