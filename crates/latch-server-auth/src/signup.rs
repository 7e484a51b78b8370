// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Signup: the three-step path from an email address to an account.
//!
//! ```text
//! request(email) ──> SignupSession { code, email_verified: false }   (30 min)
//!        │                              │
//!        │                       verify_email(token, code)
//!        │                              │
//!        │                              ▼
//!        │           SignupSession { email_verified: true }          (24 h)
//!        │                              │
//!        │                       confirm(token, profile)
//!        │                              │
//!        ▼                              ▼
//!   email with code         User created + LoginSession issued,
//!                                signup session deleted
//! ```
//!
//! The session row is the last thing deleted on confirmation, so a crash
//! between "user created" and "session deleted" leaves a re-confirmable
//! session rather than a half-registered user with no way forward.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::instrument;

use latch_auth_core::{
	Gender, Login, LoginSession, SessionToken, Signup, SignupSession, User,
};
use latch_server_db::{DbError, UserRepository};
use latch_server_sessions::{
	validate_token, SessionRepository, SessionStoreError, ValidateError,
};

use crate::captcha::{CaptchaError, CaptchaGateway};
use crate::email::{EmailError, EmailGateway, EmailTemplate};
use crate::login::AuthenticatedUser;
use crate::password::{hash_password, PasswordError};
use crate::rate_limit::RateLimiter;

/// Errors from the signup flow.
#[derive(Debug, thiserror::Error)]
pub enum SignupError {
	/// The CAPTCHA token did not verify.
	#[error("captcha verification failed")]
	CaptchaFailed,

	/// Too many signup requests for this key.
	#[error("rate limited")]
	RateLimited { reset: Option<DateTime<Utc>> },

	/// A user already owns this email address.
	#[error("email already registered")]
	EmailAlreadyRegistered,

	/// Malformed, unknown, or wrong-secret session token.
	#[error("invalid session token")]
	InvalidToken,

	/// The signup session expired; the row has been removed.
	#[error("signup session expired")]
	Expired,

	/// The supplied code does not match.
	#[error("invalid verification code")]
	InvalidCode,

	/// The code was already consumed; the session is in its second phase.
	#[error("email already verified")]
	AlreadyVerified,

	/// Confirmation attempted before the email challenge was passed.
	#[error("email verification required")]
	EmailVerificationRequired,

	#[error(transparent)]
	Password(#[from] PasswordError),

	#[error(transparent)]
	Captcha(#[from] CaptchaError),

	#[error(transparent)]
	Email(#[from] EmailError),

	#[error(transparent)]
	Sessions(#[from] SessionStoreError),

	#[error(transparent)]
	Db(#[from] DbError),
}

impl From<ValidateError> for SignupError {
	fn from(err: ValidateError) -> Self {
		match err {
			ValidateError::Invalid => SignupError::InvalidToken,
			ValidateError::Expired => SignupError::Expired,
			ValidateError::Store(e) => SignupError::Sessions(e),
		}
	}
}

/// Inputs to [`SignupService::request`].
#[derive(Debug, Clone)]
pub struct SignupRequest {
	pub email: String,
	pub captcha_token: String,
	pub client_ip: String,
}

/// A pending signup: the session plus the bearer token for the next steps.
#[derive(Debug)]
pub struct SignupChallenge {
	pub session: SignupSession,
	pub token: SessionToken,
}

/// Profile details supplied at confirmation.
#[derive(Debug, Clone)]
pub struct SignupProfile {
	pub name: String,
	pub password: String,
	pub gender: Gender,
}

/// The signup use cases.
pub struct SignupService {
	signups: Arc<dyn SessionRepository<Signup>>,
	logins: Arc<dyn SessionRepository<Login>>,
	users: Arc<dyn UserRepository>,
	email: Arc<dyn EmailGateway>,
	captcha: Arc<dyn CaptchaGateway>,
	limiter: Arc<dyn RateLimiter>,
}

impl SignupService {
	pub fn new(
		signups: Arc<dyn SessionRepository<Signup>>,
		logins: Arc<dyn SessionRepository<Login>>,
		users: Arc<dyn UserRepository>,
		email: Arc<dyn EmailGateway>,
		captcha: Arc<dyn CaptchaGateway>,
		limiter: Arc<dyn RateLimiter>,
	) -> Self {
		Self {
			signups,
			logins,
			users,
			email,
			captcha,
			limiter,
		}
	}

	/// Start a signup: mint a session keyed by the email and send the code.
	///
	/// Any earlier signup session for the same address is deleted first, so
	/// at most one is live per email and only the latest emailed code works.
	#[instrument(name = "signup.request", skip_all)]
	pub async fn request(&self, request: SignupRequest) -> Result<SignupChallenge, SignupError> {
		let decision = self
			.limiter
			.consume(&format!("signup:{}", request.email), 1)
			.await;
		if !decision.allowed {
			return Err(SignupError::RateLimited {
				reset: decision.reset,
			});
		}

		if !self
			.captcha
			.verify(&request.captcha_token, &request.client_ip)
			.await?
		{
			return Err(SignupError::CaptchaFailed);
		}

		if self.users.find_by_email(&request.email).await?.is_some() {
			return Err(SignupError::EmailAlreadyRegistered);
		}

		self.signups.delete_for_owner(&request.email).await?;
		let (session, secret) = SignupSession::request(request.email.clone());
		self.signups.save(&session).await?;

		self.email
			.send(
				&request.email,
				&EmailTemplate::SignupVerification {
					code: session.payload.code.clone(),
				},
			)
			.await?;

		let token = session.token(&secret);
		Ok(SignupChallenge { session, token })
	}

	/// Pass the email challenge, extending the session into its second phase.
	#[instrument(name = "signup.verify_email", skip_all)]
	pub async fn verify_email(&self, token: &str, code: &str) -> Result<SignupSession, SignupError> {
		let mut session = validate_token(self.signups.as_ref(), token).await?;

		if session.payload.email_verified {
			return Err(SignupError::AlreadyVerified);
		}
		if !session.payload.code.matches(code) {
			return Err(SignupError::InvalidCode);
		}

		session.mark_email_verified();
		self.signups.save(&session).await?;
		Ok(session)
	}

	/// Create the account and log the new user in.
	///
	/// Requires a passed email challenge. The email is re-checked against
	/// the user table because nothing prevents a racing registration between
	/// request and confirm.
	#[instrument(name = "signup.confirm", skip_all)]
	pub async fn confirm(
		&self,
		token: &str,
		profile: SignupProfile,
	) -> Result<AuthenticatedUser, SignupError> {
		let session = validate_token(self.signups.as_ref(), token).await?;

		if !session.payload.email_verified {
			return Err(SignupError::EmailVerificationRequired);
		}
		if self
			.users
			.find_by_email(&session.payload.email)
			.await?
			.is_some()
		{
			return Err(SignupError::EmailAlreadyRegistered);
		}

		let password_hash = hash_password(&profile.password)?;
		let user = User::register(
			session.payload.email.clone(),
			profile.name,
			profile.gender,
			password_hash,
		);
		match self.users.save(&user).await {
			Ok(()) => {}
			Err(DbError::Conflict(_)) => return Err(SignupError::EmailAlreadyRegistered),
			Err(e) => return Err(e.into()),
		}

		let (login_session, secret) = LoginSession::issue_for(user.id);
		self.logins.save(&login_session).await?;
		let login_token = login_session.token(&secret);

		// Last step: only a fully materialized account deletes its signup.
		self.signups.delete(&session.id).await?;

		tracing::info!(user_id = %user.id, "signup confirmed");
		Ok(AuthenticatedUser {
			user,
			session: login_session,
			token: login_token,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::{RecordingEmailGateway, StaticCaptchaGateway, StaticRateLimiter};
	use latch_server_db::testing::create_user_test_pool;
	use latch_server_db::SqliteUserRepository;
	use latch_server_sessions::{
		create_session_tables, SqliteLoginSessionRepository, SqliteSignupSessionRepository,
	};

	struct Harness {
		service: SignupService,
		signups: Arc<SqliteSignupSessionRepository>,
		users: Arc<SqliteUserRepository>,
		outbox: Arc<RecordingEmailGateway>,
	}

	async fn harness() -> Harness {
		harness_with_captcha(StaticCaptchaGateway::passing()).await
	}

	async fn harness_with_captcha(captcha: StaticCaptchaGateway) -> Harness {
		let pool = create_user_test_pool().await;
		create_session_tables(&pool).await.unwrap();

		let signups = Arc::new(SqliteSignupSessionRepository::new(pool.clone()));
		let users = Arc::new(SqliteUserRepository::new(pool.clone()));
		let outbox = Arc::new(RecordingEmailGateway::new());

		let service = SignupService::new(
			signups.clone(),
			Arc::new(SqliteLoginSessionRepository::new(pool)),
			users.clone(),
			outbox.clone(),
			Arc::new(captcha),
			Arc::new(StaticRateLimiter::permissive()),
		);

		Harness {
			service,
			signups,
			users,
			outbox,
		}
	}

	fn request(email: &str) -> SignupRequest {
		SignupRequest {
			email: email.to_string(),
			captcha_token: "captcha-tok".to_string(),
			client_ip: "203.0.113.9".to_string(),
		}
	}

	fn profile() -> SignupProfile {
		SignupProfile {
			name: "A".to_string(),
			password: "pw123456".to_string(),
			gender: Gender::Man,
		}
	}

	#[tokio::test]
	async fn full_signup_scenario() {
		let h = harness().await;

		// Request: session minted, code emailed, not yet verified.
		let challenge = h.service.request(request("a@x.com")).await.unwrap();
		assert!(!challenge.session.payload.email_verified);
		let sent = h.outbox.last().unwrap();
		assert_eq!(sent.to, "a@x.com");
		let code = sent.code().as_str().to_string();
		assert_eq!(code.len(), 8);

		// Verify: flag flips, expiry extends into the second phase.
		let token = challenge.token.encode();
		let verified = h.service.verify_email(&token, &code).await.unwrap();
		assert!(verified.payload.email_verified);
		assert!(verified.expires_at > challenge.session.expires_at);

		// Confirm: user exists, is verified, and is logged in.
		let auth = h.service.confirm(&token, profile()).await.unwrap();
		assert_eq!(auth.user.email, "a@x.com");
		assert!(auth.user.email_verified);
		assert_eq!(auth.user.gender, Some(Gender::Man));
		assert_eq!(auth.session.user_id(), auth.user.id);

		let stored = h.users.find_by_email("a@x.com").await.unwrap().unwrap();
		assert_eq!(stored.id, auth.user.id);

		// The signup session row is gone.
		assert!(h
			.signups
			.find(&challenge.session.id)
			.await
			.unwrap()
			.is_none());
	}

	#[tokio::test]
	async fn wrong_code_is_rejected_and_session_untouched() {
		let h = harness().await;
		let challenge = h.service.request(request("a@x.com")).await.unwrap();
		let token = challenge.token.encode();

		let real = h.outbox.last().unwrap().code().as_str().to_string();
		let wrong = if real == "00000000" { "00000001" } else { "00000000" };

		let err = h.service.verify_email(&token, wrong).await.unwrap_err();
		assert!(matches!(err, SignupError::InvalidCode));

		let stored = h.signups.find(&challenge.session.id).await.unwrap().unwrap();
		assert!(!stored.payload.email_verified);
	}

	#[tokio::test]
	async fn code_is_single_use() {
		let h = harness().await;
		let challenge = h.service.request(request("a@x.com")).await.unwrap();
		let token = challenge.token.encode();
		let code = h.outbox.last().unwrap().code().as_str().to_string();

		h.service.verify_email(&token, &code).await.unwrap();
		let err = h.service.verify_email(&token, &code).await.unwrap_err();
		assert!(matches!(err, SignupError::AlreadyVerified));
	}

	#[tokio::test]
	async fn confirm_requires_verified_email() {
		let h = harness().await;
		let challenge = h.service.request(request("a@x.com")).await.unwrap();

		let err = h
			.service
			.confirm(&challenge.token.encode(), profile())
			.await
			.unwrap_err();
		assert!(matches!(err, SignupError::EmailVerificationRequired));
	}

	#[tokio::test]
	async fn second_request_invalidates_first_session() {
		let h = harness().await;
		let first = h.service.request(request("a@x.com")).await.unwrap();
		let second = h.service.request(request("a@x.com")).await.unwrap();

		assert!(h.signups.find(&first.session.id).await.unwrap().is_none());
		assert!(h.signups.find(&second.session.id).await.unwrap().is_some());

		// The first token no longer validates.
		let err = h
			.service
			.verify_email(&first.token.encode(), "00000000")
			.await
			.unwrap_err();
		assert!(matches!(err, SignupError::InvalidToken));
	}

	#[tokio::test]
	async fn registered_email_is_refused_at_request() {
		let h = harness().await;
		let user = User::register("taken@x.com", "T", Gender::Other, "h".to_string());
		h.users.save(&user).await.unwrap();

		let err = h.service.request(request("taken@x.com")).await.unwrap_err();
		assert!(matches!(err, SignupError::EmailAlreadyRegistered));
	}

	#[tokio::test]
	async fn registration_race_is_caught_at_confirm() {
		let h = harness().await;
		let challenge = h.service.request(request("a@x.com")).await.unwrap();
		let token = challenge.token.encode();
		let code = h.outbox.last().unwrap().code().as_str().to_string();
		h.service.verify_email(&token, &code).await.unwrap();

		// Someone else registers the address between verify and confirm.
		let racer = User::register("a@x.com", "R", Gender::Other, "h".to_string());
		h.users.save(&racer).await.unwrap();

		let err = h.service.confirm(&token, profile()).await.unwrap_err();
		assert!(matches!(err, SignupError::EmailAlreadyRegistered));
	}

	#[tokio::test]
	async fn failed_captcha_blocks_the_flow() {
		let h = harness_with_captcha(StaticCaptchaGateway::failing()).await;
		let err = h.service.request(request("a@x.com")).await.unwrap_err();
		assert!(matches!(err, SignupError::CaptchaFailed));
		assert!(h.outbox.sent().is_empty());
	}

	#[tokio::test]
	async fn weak_password_fails_confirmation() {
		let h = harness().await;
		let challenge = h.service.request(request("a@x.com")).await.unwrap();
		let token = challenge.token.encode();
		let code = h.outbox.last().unwrap().code().as_str().to_string();
		h.service.verify_email(&token, &code).await.unwrap();

		let err = h
			.service
			.confirm(
				&token,
				SignupProfile {
					name: "A".to_string(),
					password: "short".to_string(),
					gender: Gender::Man,
				},
			)
			.await
			.unwrap_err();
		assert!(matches!(err, SignupError::Password(PasswordError::TooShort)));

		// The session survives a rejected confirmation.
		assert!(h.signups.find(&challenge.session.id).await.unwrap().is_some());
	}
}
