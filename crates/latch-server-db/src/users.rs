// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! User storage.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

use latch_auth_core::{User, UserId};

use crate::error::{DbError, Result};

pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
	ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(raw)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::InvalidData(format!("invalid timestamp: {e}")))
}

/// Repository trait for user operations.
#[async_trait]
pub trait UserRepository: Send + Sync {
	async fn find_by_id(&self, id: &UserId) -> Result<Option<User>>;
	async fn find_by_email(&self, email: &str) -> Result<Option<User>>;
	/// Insert or update a user. The email unique constraint surfaces as
	/// [`DbError::Conflict`].
	async fn save(&self, user: &User) -> Result<()>;
}

/// SQLite implementation of the user repository.
#[derive(Clone)]
pub struct SqliteUserRepository {
	pool: SqlitePool,
}

impl SqliteUserRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[derive(sqlx::FromRow)]
struct UserRow {
	id: String,
	email: String,
	email_verified: i64,
	name: String,
	icon_url: Option<String>,
	gender: Option<String>,
	password_hash: Option<String>,
	created_at: String,
	updated_at: String,
}

impl TryFrom<UserRow> for User {
	type Error = DbError;

	fn try_from(row: UserRow) -> Result<Self> {
		Ok(User {
			id: row
				.id
				.parse()
				.map_err(|_| DbError::InvalidData("invalid user id".into()))?,
			email: row.email,
			email_verified: row.email_verified != 0,
			name: row.name,
			icon_url: row.icon_url,
			gender: row
				.gender
				.map(|g| {
					g.parse()
						.map_err(|e| DbError::InvalidData(format!("invalid gender: {e}")))
				})
				.transpose()?,
			password_hash: row.password_hash,
			created_at: parse_ts(&row.created_at)?,
			updated_at: parse_ts(&row.updated_at)?,
		})
	}
}

const USER_COLUMNS: &str =
	"id, email, email_verified, name, icon_url, gender, password_hash, created_at, updated_at";

#[async_trait]
impl UserRepository for SqliteUserRepository {
	#[instrument(name = "users.find_by_id", skip_all)]
	async fn find_by_id(&self, id: &UserId) -> Result<Option<User>> {
		let row = sqlx::query_as::<_, UserRow>(&format!(
			"SELECT {USER_COLUMNS} FROM users WHERE id = ?"
		))
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;
		row.map(User::try_from).transpose()
	}

	#[instrument(name = "users.find_by_email", skip_all)]
	async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
		let row = sqlx::query_as::<_, UserRow>(&format!(
			"SELECT {USER_COLUMNS} FROM users WHERE email = ?"
		))
		.bind(email)
		.fetch_optional(&self.pool)
		.await?;
		row.map(User::try_from).transpose()
	}

	#[instrument(name = "users.save", skip_all)]
	async fn save(&self, user: &User) -> Result<()> {
		let result = sqlx::query(
			"INSERT INTO users
			 (id, email, email_verified, name, icon_url, gender, password_hash, created_at, updated_at)
			 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
			 ON CONFLICT(id) DO UPDATE SET
			   email = excluded.email,
			   email_verified = excluded.email_verified,
			   name = excluded.name,
			   icon_url = excluded.icon_url,
			   gender = excluded.gender,
			   password_hash = excluded.password_hash,
			   updated_at = excluded.updated_at",
		)
		.bind(user.id.to_string())
		.bind(&user.email)
		.bind(user.email_verified as i64)
		.bind(&user.name)
		.bind(&user.icon_url)
		.bind(user.gender.map(|g| g.to_string()))
		.bind(&user.password_hash)
		.bind(fmt_ts(user.created_at))
		.bind(fmt_ts(user.updated_at))
		.execute(&self.pool)
		.await;

		match result {
			Ok(_) => Ok(()),
			Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(DbError::Conflict(
				"email already registered".to_string(),
			)),
			Err(e) => Err(e.into()),
		}
	}
}
