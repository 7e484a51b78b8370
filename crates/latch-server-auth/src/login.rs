// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Password login and login-session management.
//!
//! Login sessions are the one kind a user may hold several of (one per
//! device). They end three ways: logout deletes one, a password change
//! deletes all, and expiry sweeps the rest.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::instrument;

use latch_auth_core::{Login, LoginSession, SessionToken, User, UserId};
use latch_server_db::{DbError, UserRepository};
use latch_server_sessions::{
	validate_token, SessionRepository, SessionStoreError, ValidateError,
};

use crate::password::{verify_dummy_password, verify_password};
use crate::rate_limit::RateLimiter;

/// A user plus the freshly issued login session and its bearer token.
///
/// Returned by every flow that ends in "you are now logged in": password
/// login, signup confirmation, OAuth login, and account-link confirmation.
#[derive(Debug)]
pub struct AuthenticatedUser {
	pub user: User,
	pub session: LoginSession,
	pub token: SessionToken,
}

/// Errors from the login flow.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
	/// Unknown email or wrong password; deliberately indistinguishable.
	#[error("invalid email or password")]
	InvalidCredentials,

	/// Too many attempts for this key.
	#[error("rate limited")]
	RateLimited { reset: Option<DateTime<Utc>> },

	/// Malformed, unknown, or wrong-secret session token.
	#[error("invalid session token")]
	InvalidToken,

	/// The session expired; the row has been removed.
	#[error("session expired")]
	Expired,

	#[error(transparent)]
	Sessions(#[from] SessionStoreError),

	#[error(transparent)]
	Db(#[from] DbError),
}

impl From<ValidateError> for LoginError {
	fn from(err: ValidateError) -> Self {
		match err {
			ValidateError::Invalid => LoginError::InvalidToken,
			ValidateError::Expired => LoginError::Expired,
			ValidateError::Store(e) => LoginError::Sessions(e),
		}
	}
}

/// Password login and session management use cases.
pub struct LoginService {
	users: Arc<dyn UserRepository>,
	sessions: Arc<dyn SessionRepository<Login>>,
	limiter: Arc<dyn RateLimiter>,
}

impl LoginService {
	pub fn new(
		users: Arc<dyn UserRepository>,
		sessions: Arc<dyn SessionRepository<Login>>,
		limiter: Arc<dyn RateLimiter>,
	) -> Self {
		Self {
			users,
			sessions,
			limiter,
		}
	}

	/// Authenticate with email and password, issuing a login session.
	///
	/// Unknown email and wrong password both return
	/// [`LoginError::InvalidCredentials`]; the unknown-email path runs a
	/// dummy Argon2 verification so the two cannot be told apart by timing.
	#[instrument(name = "login.password", skip_all)]
	pub async fn login(&self, email: &str, password: &str) -> Result<AuthenticatedUser, LoginError> {
		let decision = self.limiter.consume(&format!("login:{email}"), 1).await;
		if !decision.allowed {
			return Err(LoginError::RateLimited {
				reset: decision.reset,
			});
		}

		let Some(user) = self.users.find_by_email(email).await? else {
			verify_dummy_password();
			return Err(LoginError::InvalidCredentials);
		};
		let Some(hash) = user.password_hash.as_deref() else {
			// OAuth-only account; password login is not a credential it has.
			verify_dummy_password();
			return Err(LoginError::InvalidCredentials);
		};
		if !verify_password(password, hash) {
			return Err(LoginError::InvalidCredentials);
		}

		let (session, secret) = LoginSession::issue_for(user.id);
		self.sessions.save(&session).await?;
		let token = session.token(&secret);

		tracing::info!(user_id = %user.id, "password login succeeded");
		Ok(AuthenticatedUser {
			user,
			session,
			token,
		})
	}

	/// Resolve a login token to its user and session.
	///
	/// A session whose user has vanished is deleted and reported invalid.
	#[instrument(name = "login.authenticate", skip_all)]
	pub async fn authenticate(&self, token: &str) -> Result<(User, LoginSession), LoginError> {
		let session = validate_token(self.sessions.as_ref(), token).await?;
		match self.users.find_by_id(&session.user_id()).await? {
			Some(user) => Ok((user, session)),
			None => {
				self.sessions.delete(&session.id).await?;
				Err(LoginError::InvalidToken)
			}
		}
	}

	/// Delete the session behind a token.
	#[instrument(name = "login.logout", skip_all)]
	pub async fn logout(&self, token: &str) -> Result<(), LoginError> {
		let session = validate_token(self.sessions.as_ref(), token).await?;
		self.sessions.delete(&session.id).await?;
		tracing::info!(user_id = %session.user_id(), "logged out");
		Ok(())
	}

	/// Delete every login session a user holds.
	///
	/// Invoked on password change so a stolen device does not survive a
	/// credential rotation.
	#[instrument(name = "login.invalidate_all", skip_all, fields(user_id = %user_id))]
	pub async fn invalidate_all(&self, user_id: &UserId) -> Result<u64, LoginError> {
		Ok(self.sessions.delete_for_owner(user_id).await?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::password::hash_password;
	use crate::testing::StaticRateLimiter;
	use latch_auth_core::Gender;
	use latch_server_db::testing::create_user_test_pool;
	use latch_server_db::SqliteUserRepository;
	use latch_server_sessions::{create_session_tables, SqliteLoginSessionRepository};

	async fn service() -> (LoginService, Arc<SqliteUserRepository>) {
		let pool = create_user_test_pool().await;
		create_session_tables(&pool).await.unwrap();
		let users = Arc::new(SqliteUserRepository::new(pool.clone()));
		let service = LoginService::new(
			users.clone(),
			Arc::new(SqliteLoginSessionRepository::new(pool)),
			Arc::new(StaticRateLimiter::permissive()),
		);
		(service, users)
	}

	async fn register(users: &SqliteUserRepository, email: &str, password: &str) -> User {
		let user = User::register(email, "Tester", Gender::Other, hash_password(password).unwrap());
		users.save(&user).await.unwrap();
		user
	}

	#[tokio::test]
	async fn login_issues_a_working_session() {
		let (service, users) = service().await;
		let user = register(&users, "a@x.com", "pw123456").await;

		let auth = service.login("a@x.com", "pw123456").await.unwrap();
		assert_eq!(auth.user.id, user.id);

		let (resolved, session) = service.authenticate(&auth.token.encode()).await.unwrap();
		assert_eq!(resolved.id, user.id);
		assert_eq!(session.id, auth.session.id);
	}

	#[tokio::test]
	async fn wrong_password_and_unknown_email_are_indistinguishable() {
		let (service, users) = service().await;
		register(&users, "a@x.com", "pw123456").await;

		let wrong_password = service.login("a@x.com", "wrong-pass").await.unwrap_err();
		let unknown_email = service.login("ghost@x.com", "pw123456").await.unwrap_err();

		assert!(matches!(wrong_password, LoginError::InvalidCredentials));
		assert!(matches!(unknown_email, LoginError::InvalidCredentials));
	}

	#[tokio::test]
	async fn oauth_only_account_cannot_password_login() {
		let (service, users) = service().await;
		let user = User::from_provider_identity("o@x.com", "O", None);
		users.save(&user).await.unwrap();

		let err = service.login("o@x.com", "pw123456").await.unwrap_err();
		assert!(matches!(err, LoginError::InvalidCredentials));
	}

	#[tokio::test]
	async fn rate_limited_login_is_refused_before_credentials() {
		let pool = create_user_test_pool().await;
		create_session_tables(&pool).await.unwrap();
		let users = Arc::new(SqliteUserRepository::new(pool.clone()));
		let service = LoginService::new(
			users.clone(),
			Arc::new(SqliteLoginSessionRepository::new(pool)),
			Arc::new(StaticRateLimiter::exhausted()),
		);
		register(&users, "a@x.com", "pw123456").await;

		let err = service.login("a@x.com", "pw123456").await.unwrap_err();
		assert!(matches!(err, LoginError::RateLimited { reset: Some(_) }));
	}

	#[tokio::test]
	async fn logout_invalidates_the_session() {
		let (service, users) = service().await;
		register(&users, "a@x.com", "pw123456").await;

		let auth = service.login("a@x.com", "pw123456").await.unwrap();
		let token = auth.token.encode();

		service.logout(&token).await.unwrap();
		let err = service.authenticate(&token).await.unwrap_err();
		assert!(matches!(err, LoginError::InvalidToken));
	}

	#[tokio::test]
	async fn invalidate_all_logs_out_every_device() {
		let (service, users) = service().await;
		let user = register(&users, "a@x.com", "pw123456").await;

		let first = service.login("a@x.com", "pw123456").await.unwrap();
		let second = service.login("a@x.com", "pw123456").await.unwrap();

		let deleted = service.invalidate_all(&user.id).await.unwrap();
		assert_eq!(deleted, 2);

		for token in [first.token.encode(), second.token.encode()] {
			assert!(matches!(
				service.authenticate(&token).await.unwrap_err(),
				LoginError::InvalidToken
			));
		}
	}

	#[tokio::test]
	async fn garbage_tokens_are_invalid() {
		let (service, _) = service().await;
		for raw in ["", "nodot", ".x", "x.", "a.b.c"] {
			assert!(matches!(
				service.authenticate(raw).await.unwrap_err(),
				LoginError::InvalidToken
			));
		}
	}
}
