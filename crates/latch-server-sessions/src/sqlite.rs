// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite-backed session repositories.
//!
//! One table per session kind; the common columns (`id`, `secret_hash`,
//! `created_at`, `expires_at`) are shared, the payload columns differ.
//! Timestamps are stored as fixed-width RFC 3339 TEXT so that expiry
//! comparisons can run in SQL against the same encoding.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

use latch_auth_core::{
	AccountLink, AccountLinkPayload, EmailVerification, EmailVerificationPayload, Login,
	LoginPayload, PasswordReset, PasswordResetPayload, SecretHash, Session, SessionId, Signup,
	SignupPayload, UserId,
};

use crate::error::{Result, SessionStoreError};
use crate::repository::SessionRepository;

/// Encode a timestamp for storage.
///
/// Fixed-width (nanosecond precision, `Z` suffix) so that lexicographic
/// comparison in SQL agrees with chronological order and round-trips are
/// exact.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Decode a stored timestamp.
pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(raw)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| SessionStoreError::InvalidData(format!("invalid timestamp: {e}")))
}

fn parse_session_id(raw: &str) -> Result<SessionId> {
	raw.parse()
		.map_err(|_| SessionStoreError::InvalidData("invalid session id".into()))
}

fn parse_user_id(raw: &str) -> Result<UserId> {
	raw.parse()
		.map_err(|_| SessionStoreError::InvalidData("invalid user id".into()))
}

fn parse_secret_hash(raw: &str) -> Result<SecretHash> {
	SecretHash::from_hex(raw)
		.ok_or_else(|| SessionStoreError::InvalidData("invalid secret hash".into()))
}

/// Create all five session tables if they do not exist.
pub async fn create_session_tables(pool: &SqlitePool) -> Result<()> {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS login_sessions (
			id TEXT PRIMARY KEY,
			user_id TEXT NOT NULL,
			secret_hash TEXT NOT NULL,
			created_at TEXT NOT NULL,
			expires_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS signup_sessions (
			id TEXT PRIMARY KEY,
			email TEXT NOT NULL,
			code TEXT NOT NULL,
			email_verified INTEGER NOT NULL DEFAULT 0,
			secret_hash TEXT NOT NULL,
			created_at TEXT NOT NULL,
			expires_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS password_reset_sessions (
			id TEXT PRIMARY KEY,
			user_id TEXT NOT NULL,
			code TEXT NOT NULL,
			email_verified INTEGER NOT NULL DEFAULT 0,
			secret_hash TEXT NOT NULL,
			created_at TEXT NOT NULL,
			expires_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS email_verification_sessions (
			id TEXT PRIMARY KEY,
			user_id TEXT NOT NULL,
			email TEXT NOT NULL,
			code TEXT NOT NULL,
			secret_hash TEXT NOT NULL,
			created_at TEXT NOT NULL,
			expires_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS account_link_sessions (
			id TEXT PRIMARY KEY,
			user_id TEXT NOT NULL,
			email TEXT NOT NULL,
			provider TEXT NOT NULL,
			provider_user_id TEXT NOT NULL,
			code TEXT,
			secret_hash TEXT NOT NULL,
			created_at TEXT NOT NULL,
			expires_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await?;

	Ok(())
}

// =============================================================================
// Login sessions
// =============================================================================

/// SQLite repository for login sessions.
#[derive(Clone)]
pub struct SqliteLoginSessionRepository {
	pool: SqlitePool,
}

impl SqliteLoginSessionRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[derive(sqlx::FromRow)]
struct LoginSessionRow {
	id: String,
	user_id: String,
	secret_hash: String,
	created_at: String,
	expires_at: String,
}

impl TryFrom<LoginSessionRow> for Session<Login> {
	type Error = SessionStoreError;

	fn try_from(row: LoginSessionRow) -> Result<Self> {
		Ok(Session {
			id: parse_session_id(&row.id)?,
			secret_hash: parse_secret_hash(&row.secret_hash)?,
			created_at: parse_ts(&row.created_at)?,
			expires_at: parse_ts(&row.expires_at)?,
			payload: LoginPayload {
				user_id: parse_user_id(&row.user_id)?,
			},
		})
	}
}

#[async_trait]
impl SessionRepository<Login> for SqliteLoginSessionRepository {
	#[instrument(name = "login_sessions.find", skip_all)]
	async fn find(&self, id: &SessionId) -> Result<Option<Session<Login>>> {
		let row = sqlx::query_as::<_, LoginSessionRow>(
			"SELECT id, user_id, secret_hash, created_at, expires_at
			 FROM login_sessions WHERE id = ?",
		)
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;
		row.map(Session::try_from).transpose()
	}

	#[instrument(name = "login_sessions.save", skip_all)]
	async fn save(&self, session: &Session<Login>) -> Result<()> {
		sqlx::query(
			"INSERT OR REPLACE INTO login_sessions
			 (id, user_id, secret_hash, created_at, expires_at)
			 VALUES (?, ?, ?, ?, ?)",
		)
		.bind(session.id.to_string())
		.bind(session.payload.user_id.to_string())
		.bind(session.secret_hash.to_hex())
		.bind(fmt_ts(session.created_at))
		.bind(fmt_ts(session.expires_at))
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[instrument(name = "login_sessions.delete", skip_all)]
	async fn delete(&self, id: &SessionId) -> Result<()> {
		sqlx::query("DELETE FROM login_sessions WHERE id = ?")
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	#[instrument(name = "login_sessions.delete_for_owner", skip_all)]
	async fn delete_for_owner(&self, key: &UserId) -> Result<u64> {
		let result = sqlx::query("DELETE FROM login_sessions WHERE user_id = ?")
			.bind(key.to_string())
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}

	#[instrument(name = "login_sessions.delete_expired", skip_all)]
	async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM login_sessions WHERE expires_at <= ?")
			.bind(fmt_ts(now))
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}
}

// =============================================================================
// Signup sessions
// =============================================================================

/// SQLite repository for signup sessions.
#[derive(Clone)]
pub struct SqliteSignupSessionRepository {
	pool: SqlitePool,
}

impl SqliteSignupSessionRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[derive(sqlx::FromRow)]
struct SignupSessionRow {
	id: String,
	email: String,
	code: String,
	email_verified: i64,
	secret_hash: String,
	created_at: String,
	expires_at: String,
}

impl TryFrom<SignupSessionRow> for Session<Signup> {
	type Error = SessionStoreError;

	fn try_from(row: SignupSessionRow) -> Result<Self> {
		Ok(Session {
			id: parse_session_id(&row.id)?,
			secret_hash: parse_secret_hash(&row.secret_hash)?,
			created_at: parse_ts(&row.created_at)?,
			expires_at: parse_ts(&row.expires_at)?,
			payload: SignupPayload {
				email: row.email,
				code: row
					.code
					.parse()
					.map_err(|_| SessionStoreError::InvalidData("invalid code".into()))?,
				email_verified: row.email_verified != 0,
			},
		})
	}
}

#[async_trait]
impl SessionRepository<Signup> for SqliteSignupSessionRepository {
	#[instrument(name = "signup_sessions.find", skip_all)]
	async fn find(&self, id: &SessionId) -> Result<Option<Session<Signup>>> {
		let row = sqlx::query_as::<_, SignupSessionRow>(
			"SELECT id, email, code, email_verified, secret_hash, created_at, expires_at
			 FROM signup_sessions WHERE id = ?",
		)
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;
		row.map(Session::try_from).transpose()
	}

	#[instrument(name = "signup_sessions.save", skip_all)]
	async fn save(&self, session: &Session<Signup>) -> Result<()> {
		sqlx::query(
			"INSERT OR REPLACE INTO signup_sessions
			 (id, email, code, email_verified, secret_hash, created_at, expires_at)
			 VALUES (?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(session.id.to_string())
		.bind(&session.payload.email)
		.bind(session.payload.code.as_str())
		.bind(session.payload.email_verified as i64)
		.bind(session.secret_hash.to_hex())
		.bind(fmt_ts(session.created_at))
		.bind(fmt_ts(session.expires_at))
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[instrument(name = "signup_sessions.delete", skip_all)]
	async fn delete(&self, id: &SessionId) -> Result<()> {
		sqlx::query("DELETE FROM signup_sessions WHERE id = ?")
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	#[instrument(name = "signup_sessions.delete_for_owner", skip_all)]
	async fn delete_for_owner(&self, key: &String) -> Result<u64> {
		let result = sqlx::query("DELETE FROM signup_sessions WHERE email = ?")
			.bind(key)
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}

	#[instrument(name = "signup_sessions.delete_expired", skip_all)]
	async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM signup_sessions WHERE expires_at <= ?")
			.bind(fmt_ts(now))
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}
}

// =============================================================================
// Password-reset sessions
// =============================================================================

/// SQLite repository for password-reset sessions.
#[derive(Clone)]
pub struct SqlitePasswordResetSessionRepository {
	pool: SqlitePool,
}

impl SqlitePasswordResetSessionRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[derive(sqlx::FromRow)]
struct PasswordResetSessionRow {
	id: String,
	user_id: String,
	code: String,
	email_verified: i64,
	secret_hash: String,
	created_at: String,
	expires_at: String,
}

impl TryFrom<PasswordResetSessionRow> for Session<PasswordReset> {
	type Error = SessionStoreError;

	fn try_from(row: PasswordResetSessionRow) -> Result<Self> {
		Ok(Session {
			id: parse_session_id(&row.id)?,
			secret_hash: parse_secret_hash(&row.secret_hash)?,
			created_at: parse_ts(&row.created_at)?,
			expires_at: parse_ts(&row.expires_at)?,
			payload: PasswordResetPayload {
				user_id: parse_user_id(&row.user_id)?,
				code: row
					.code
					.parse()
					.map_err(|_| SessionStoreError::InvalidData("invalid code".into()))?,
				email_verified: row.email_verified != 0,
			},
		})
	}
}

#[async_trait]
impl SessionRepository<PasswordReset> for SqlitePasswordResetSessionRepository {
	#[instrument(name = "password_reset_sessions.find", skip_all)]
	async fn find(&self, id: &SessionId) -> Result<Option<Session<PasswordReset>>> {
		let row = sqlx::query_as::<_, PasswordResetSessionRow>(
			"SELECT id, user_id, code, email_verified, secret_hash, created_at, expires_at
			 FROM password_reset_sessions WHERE id = ?",
		)
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;
		row.map(Session::try_from).transpose()
	}

	#[instrument(name = "password_reset_sessions.save", skip_all)]
	async fn save(&self, session: &Session<PasswordReset>) -> Result<()> {
		sqlx::query(
			"INSERT OR REPLACE INTO password_reset_sessions
			 (id, user_id, code, email_verified, secret_hash, created_at, expires_at)
			 VALUES (?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(session.id.to_string())
		.bind(session.payload.user_id.to_string())
		.bind(session.payload.code.as_str())
		.bind(session.payload.email_verified as i64)
		.bind(session.secret_hash.to_hex())
		.bind(fmt_ts(session.created_at))
		.bind(fmt_ts(session.expires_at))
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[instrument(name = "password_reset_sessions.delete", skip_all)]
	async fn delete(&self, id: &SessionId) -> Result<()> {
		sqlx::query("DELETE FROM password_reset_sessions WHERE id = ?")
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	#[instrument(name = "password_reset_sessions.delete_for_owner", skip_all)]
	async fn delete_for_owner(&self, key: &UserId) -> Result<u64> {
		let result = sqlx::query("DELETE FROM password_reset_sessions WHERE user_id = ?")
			.bind(key.to_string())
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}

	#[instrument(name = "password_reset_sessions.delete_expired", skip_all)]
	async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM password_reset_sessions WHERE expires_at <= ?")
			.bind(fmt_ts(now))
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}
}

// =============================================================================
// Email-verification sessions
// =============================================================================

/// SQLite repository for email-verification sessions.
#[derive(Clone)]
pub struct SqliteEmailVerificationSessionRepository {
	pool: SqlitePool,
}

impl SqliteEmailVerificationSessionRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[derive(sqlx::FromRow)]
struct EmailVerificationSessionRow {
	id: String,
	user_id: String,
	email: String,
	code: String,
	secret_hash: String,
	created_at: String,
	expires_at: String,
}

impl TryFrom<EmailVerificationSessionRow> for Session<EmailVerification> {
	type Error = SessionStoreError;

	fn try_from(row: EmailVerificationSessionRow) -> Result<Self> {
		Ok(Session {
			id: parse_session_id(&row.id)?,
			secret_hash: parse_secret_hash(&row.secret_hash)?,
			created_at: parse_ts(&row.created_at)?,
			expires_at: parse_ts(&row.expires_at)?,
			payload: EmailVerificationPayload {
				user_id: parse_user_id(&row.user_id)?,
				email: row.email,
				code: row
					.code
					.parse()
					.map_err(|_| SessionStoreError::InvalidData("invalid code".into()))?,
			},
		})
	}
}

#[async_trait]
impl SessionRepository<EmailVerification> for SqliteEmailVerificationSessionRepository {
	#[instrument(name = "email_verification_sessions.find", skip_all)]
	async fn find(&self, id: &SessionId) -> Result<Option<Session<EmailVerification>>> {
		let row = sqlx::query_as::<_, EmailVerificationSessionRow>(
			"SELECT id, user_id, email, code, secret_hash, created_at, expires_at
			 FROM email_verification_sessions WHERE id = ?",
		)
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;
		row.map(Session::try_from).transpose()
	}

	#[instrument(name = "email_verification_sessions.save", skip_all)]
	async fn save(&self, session: &Session<EmailVerification>) -> Result<()> {
		sqlx::query(
			"INSERT OR REPLACE INTO email_verification_sessions
			 (id, user_id, email, code, secret_hash, created_at, expires_at)
			 VALUES (?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(session.id.to_string())
		.bind(session.payload.user_id.to_string())
		.bind(&session.payload.email)
		.bind(session.payload.code.as_str())
		.bind(session.secret_hash.to_hex())
		.bind(fmt_ts(session.created_at))
		.bind(fmt_ts(session.expires_at))
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[instrument(name = "email_verification_sessions.delete", skip_all)]
	async fn delete(&self, id: &SessionId) -> Result<()> {
		sqlx::query("DELETE FROM email_verification_sessions WHERE id = ?")
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	#[instrument(name = "email_verification_sessions.delete_for_owner", skip_all)]
	async fn delete_for_owner(&self, key: &UserId) -> Result<u64> {
		let result = sqlx::query("DELETE FROM email_verification_sessions WHERE user_id = ?")
			.bind(key.to_string())
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}

	#[instrument(name = "email_verification_sessions.delete_expired", skip_all)]
	async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM email_verification_sessions WHERE expires_at <= ?")
			.bind(fmt_ts(now))
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}
}

// =============================================================================
// Account-link sessions
// =============================================================================

/// SQLite repository for account-link sessions.
#[derive(Clone)]
pub struct SqliteAccountLinkSessionRepository {
	pool: SqlitePool,
}

impl SqliteAccountLinkSessionRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[derive(sqlx::FromRow)]
struct AccountLinkSessionRow {
	id: String,
	user_id: String,
	email: String,
	provider: String,
	provider_user_id: String,
	code: Option<String>,
	secret_hash: String,
	created_at: String,
	expires_at: String,
}

impl TryFrom<AccountLinkSessionRow> for Session<AccountLink> {
	type Error = SessionStoreError;

	fn try_from(row: AccountLinkSessionRow) -> Result<Self> {
		Ok(Session {
			id: parse_session_id(&row.id)?,
			secret_hash: parse_secret_hash(&row.secret_hash)?,
			created_at: parse_ts(&row.created_at)?,
			expires_at: parse_ts(&row.expires_at)?,
			payload: AccountLinkPayload {
				user_id: parse_user_id(&row.user_id)?,
				email: row.email,
				provider: row
					.provider
					.parse()
					.map_err(|_| SessionStoreError::InvalidData("invalid provider".into()))?,
				provider_user_id: row.provider_user_id,
				code: row
					.code
					.map(|c| {
						c.parse()
							.map_err(|_| SessionStoreError::InvalidData("invalid code".into()))
					})
					.transpose()?,
			},
		})
	}
}

#[async_trait]
impl SessionRepository<AccountLink> for SqliteAccountLinkSessionRepository {
	#[instrument(name = "account_link_sessions.find", skip_all)]
	async fn find(&self, id: &SessionId) -> Result<Option<Session<AccountLink>>> {
		let row = sqlx::query_as::<_, AccountLinkSessionRow>(
			"SELECT id, user_id, email, provider, provider_user_id, code,
			        secret_hash, created_at, expires_at
			 FROM account_link_sessions WHERE id = ?",
		)
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;
		row.map(Session::try_from).transpose()
	}

	#[instrument(name = "account_link_sessions.save", skip_all)]
	async fn save(&self, session: &Session<AccountLink>) -> Result<()> {
		sqlx::query(
			"INSERT OR REPLACE INTO account_link_sessions
			 (id, user_id, email, provider, provider_user_id, code,
			  secret_hash, created_at, expires_at)
			 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
		)
		.bind(session.id.to_string())
		.bind(session.payload.user_id.to_string())
		.bind(&session.payload.email)
		.bind(session.payload.provider.to_string())
		.bind(&session.payload.provider_user_id)
		.bind(session.payload.code.as_ref().map(|c| c.as_str().to_string()))
		.bind(session.secret_hash.to_hex())
		.bind(fmt_ts(session.created_at))
		.bind(fmt_ts(session.expires_at))
		.execute(&self.pool)
		.await?;
		Ok(())
	}

	#[instrument(name = "account_link_sessions.delete", skip_all)]
	async fn delete(&self, id: &SessionId) -> Result<()> {
		sqlx::query("DELETE FROM account_link_sessions WHERE id = ?")
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;
		Ok(())
	}

	#[instrument(name = "account_link_sessions.delete_for_owner", skip_all)]
	async fn delete_for_owner(&self, key: &UserId) -> Result<u64> {
		let result = sqlx::query("DELETE FROM account_link_sessions WHERE user_id = ?")
			.bind(key.to_string())
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}

	#[instrument(name = "account_link_sessions.delete_expired", skip_all)]
	async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64> {
		let result = sqlx::query("DELETE FROM account_link_sessions WHERE expires_at <= ?")
			.bind(fmt_ts(now))
			.execute(&self.pool)
			.await?;
		Ok(result.rows_affected())
	}
}
