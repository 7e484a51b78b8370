// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Periodic removal of expired session rows.
//!
//! Expired sessions are already treated as absent on access and deleted
//! opportunistically when presented; the sweep exists so rows belonging to
//! tokens that are never presented again do not accumulate. Intended to run
//! from a background job on an interval.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::instrument;

use crate::error::Result;
use crate::repository::SessionRepository;
use crate::sqlite::{
	SqliteAccountLinkSessionRepository, SqliteEmailVerificationSessionRepository,
	SqliteLoginSessionRepository, SqlitePasswordResetSessionRepository,
	SqliteSignupSessionRepository,
};

/// Delete expired rows across all five session tables.
///
/// Returns the total number of rows removed.
#[instrument(name = "sessions.sweep_expired", skip_all)]
pub async fn sweep_expired_sessions(pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
	let mut total = 0;

	total += SqliteLoginSessionRepository::new(pool.clone())
		.delete_expired(now)
		.await?;
	total += SqliteSignupSessionRepository::new(pool.clone())
		.delete_expired(now)
		.await?;
	total += SqlitePasswordResetSessionRepository::new(pool.clone())
		.delete_expired(now)
		.await?;
	total += SqliteEmailVerificationSessionRepository::new(pool.clone())
		.delete_expired(now)
		.await?;
	total += SqliteAccountLinkSessionRepository::new(pool.clone())
		.delete_expired(now)
		.await?;

	if total > 0 {
		tracing::info!(deleted = total, "swept expired sessions");
	}

	Ok(total)
}
