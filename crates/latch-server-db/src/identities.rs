// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! External-identity storage.
//!
//! Rows are unique on `(provider, provider_user_id)`: one external account
//! links to at most one local user. A user may hold one identity per
//! provider.

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::instrument;

use latch_auth_core::{ExternalIdentity, OAuthProvider, UserId};

use crate::error::{DbError, Result};
use crate::users::{fmt_ts, parse_ts};

/// Repository trait for external-identity operations.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
	/// Resolve an external account to its link, if any.
	async fn find_by_provider(
		&self,
		provider: OAuthProvider,
		provider_user_id: &str,
	) -> Result<Option<ExternalIdentity>>;

	/// Find a user's link for one provider, if any.
	async fn find_by_user_and_provider(
		&self,
		user_id: &UserId,
		provider: OAuthProvider,
	) -> Result<Option<ExternalIdentity>>;

	/// Insert a new link. A duplicate `(provider, provider_user_id)` pair
	/// surfaces as [`DbError::Conflict`].
	async fn save(&self, identity: &ExternalIdentity) -> Result<()>;

	/// Remove a user's link for one provider, returning the count.
	async fn delete_by_user_and_provider(
		&self,
		user_id: &UserId,
		provider: OAuthProvider,
	) -> Result<u64>;
}

/// SQLite implementation of the identity repository.
#[derive(Clone)]
pub struct SqliteIdentityRepository {
	pool: SqlitePool,
}

impl SqliteIdentityRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
	id: String,
	user_id: String,
	provider: String,
	provider_user_id: String,
	created_at: String,
}

impl TryFrom<IdentityRow> for ExternalIdentity {
	type Error = DbError;

	fn try_from(row: IdentityRow) -> Result<Self> {
		Ok(ExternalIdentity {
			id: row
				.id
				.parse()
				.map_err(|_| DbError::InvalidData("invalid identity id".into()))?,
			user_id: row
				.user_id
				.parse()
				.map_err(|_| DbError::InvalidData("invalid user id".into()))?,
			provider: row
				.provider
				.parse()
				.map_err(|e| DbError::InvalidData(format!("invalid provider: {e}")))?,
			provider_user_id: row.provider_user_id,
			created_at: parse_ts(&row.created_at)?,
		})
	}
}

#[async_trait]
impl IdentityRepository for SqliteIdentityRepository {
	#[instrument(name = "identities.find_by_provider", skip_all, fields(provider = %provider))]
	async fn find_by_provider(
		&self,
		provider: OAuthProvider,
		provider_user_id: &str,
	) -> Result<Option<ExternalIdentity>> {
		let row = sqlx::query_as::<_, IdentityRow>(
			"SELECT id, user_id, provider, provider_user_id, created_at
			 FROM external_identities WHERE provider = ? AND provider_user_id = ?",
		)
		.bind(provider.to_string())
		.bind(provider_user_id)
		.fetch_optional(&self.pool)
		.await?;
		row.map(ExternalIdentity::try_from).transpose()
	}

	#[instrument(name = "identities.find_by_user_and_provider", skip_all, fields(provider = %provider))]
	async fn find_by_user_and_provider(
		&self,
		user_id: &UserId,
		provider: OAuthProvider,
	) -> Result<Option<ExternalIdentity>> {
		let row = sqlx::query_as::<_, IdentityRow>(
			"SELECT id, user_id, provider, provider_user_id, created_at
			 FROM external_identities WHERE user_id = ? AND provider = ?",
		)
		.bind(user_id.to_string())
		.bind(provider.to_string())
		.fetch_optional(&self.pool)
		.await?;
		row.map(ExternalIdentity::try_from).transpose()
	}

	#[instrument(name = "identities.save", skip_all)]
	async fn save(&self, identity: &ExternalIdentity) -> Result<()> {
		let result = sqlx::query(
			"INSERT INTO external_identities
			 (id, user_id, provider, provider_user_id, created_at)
			 VALUES (?, ?, ?, ?, ?)",
		)
		.bind(identity.id.to_string())
		.bind(identity.user_id.to_string())
		.bind(identity.provider.to_string())
		.bind(&identity.provider_user_id)
		.bind(fmt_ts(identity.created_at))
		.execute(&self.pool)
		.await;

		match result {
			Ok(_) => Ok(()),
			Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(DbError::Conflict(
				"external identity already linked".to_string(),
			)),
			Err(e) => Err(e.into()),
		}
	}

	#[instrument(name = "identities.delete_by_user_and_provider", skip_all, fields(provider = %provider))]
	async fn delete_by_user_and_provider(
		&self,
		user_id: &UserId,
		provider: OAuthProvider,
	) -> Result<u64> {
		let result =
			sqlx::query("DELETE FROM external_identities WHERE user_id = ? AND provider = ?")
				.bind(user_id.to_string())
				.bind(provider.to_string())
				.execute(&self.pool)
				.await?;
		Ok(result.rows_affected())
	}
}
