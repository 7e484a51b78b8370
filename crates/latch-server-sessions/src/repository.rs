// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The session repository trait and the shared token-validation routine.
//!
//! Every session kind is stored through the same five operations. The
//! at-most-one-active-session invariant is enforced by issuing
//! [`delete_for_owner`](SessionRepository::delete_for_owner) before the
//! insert, not by a unique constraint: two racing requests can briefly leave
//! two valid sessions for one key, which is harmless — the next read works
//! on either, and the next request sweeps both.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::instrument;

use latch_auth_core::{Session, SessionId, SessionKind, SessionToken};

use crate::error::{Result, ValidateError};

/// Storage operations shared by all session kinds.
#[async_trait]
pub trait SessionRepository<K: SessionKind>: Send + Sync {
	/// Look up a session by id.
	async fn find(&self, id: &SessionId) -> Result<Option<Session<K>>>;

	/// Insert or update a session.
	async fn save(&self, session: &Session<K>) -> Result<()>;

	/// Delete a session by id. Deleting an absent id is not an error.
	async fn delete(&self, id: &SessionId) -> Result<()>;

	/// Delete every session for an owner key, returning the count.
	///
	/// Issued before each insert to keep at most one active session per key
	/// (and by the login flow's invalidate-all on password change).
	async fn delete_for_owner(&self, key: &K::OwnerKey) -> Result<u64>;

	/// Delete every session whose expiry has passed, returning the count.
	async fn delete_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Resolve a presented bearer token to a live session.
///
/// The gates, in order:
/// 1. decode — malformed tokens are [`ValidateError::Invalid`]
/// 2. lookup — unknown ids are `Invalid` (indistinguishable from bad secrets)
/// 3. expiry — expired rows are deleted and reported [`ValidateError::Expired`]
/// 4. secret — constant-time hash comparison; mismatch is `Invalid`
#[instrument(name = "session.validate", skip_all, fields(kind = K::NAME))]
pub async fn validate_token<K, R>(repo: &R, raw_token: &str) -> std::result::Result<Session<K>, ValidateError>
where
	K: SessionKind,
	R: SessionRepository<K> + ?Sized,
{
	let token = SessionToken::decode(raw_token).ok_or(ValidateError::Invalid)?;
	let id = token.session_id().ok_or(ValidateError::Invalid)?;

	let Some(session) = repo.find(&id).await? else {
		return Err(ValidateError::Invalid);
	};

	if session.is_expired() {
		tracing::debug!(kind = K::NAME, session_id = %id, "deleting expired session on access");
		repo.delete(&id).await?;
		return Err(ValidateError::Expired);
	}

	if !session.verify_secret(token.secret_part()) {
		return Err(ValidateError::Invalid);
	}

	Ok(session)
}
