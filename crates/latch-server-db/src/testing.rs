// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory pools and schema for tests.
//!
//! Not `#[cfg(test)]`: downstream crates use these helpers in their own test
//! suites.

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

/// Create a single-connection in-memory pool.
///
/// One connection keeps every query on the same in-memory database; a larger
/// pool would hand each connection its own empty one.
pub async fn create_test_pool() -> SqlitePool {
	SqlitePoolOptions::new()
		.max_connections(1)
		.connect(":memory:")
		.await
		.unwrap()
}

pub async fn create_users_table(pool: &SqlitePool) {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS users (
			id TEXT PRIMARY KEY,
			email TEXT NOT NULL UNIQUE,
			email_verified INTEGER NOT NULL DEFAULT 0,
			name TEXT NOT NULL,
			icon_url TEXT,
			gender TEXT,
			password_hash TEXT,
			created_at TEXT NOT NULL,
			updated_at TEXT NOT NULL
		)
		"#,
	)
	.execute(pool)
	.await
	.unwrap();
}

pub async fn create_identities_table(pool: &SqlitePool) {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS external_identities (
			id TEXT PRIMARY KEY,
			user_id TEXT NOT NULL,
			provider TEXT NOT NULL,
			provider_user_id TEXT NOT NULL,
			created_at TEXT NOT NULL,
			UNIQUE(provider, provider_user_id)
		)
		"#,
	)
	.execute(pool)
	.await
	.unwrap();
}

/// Pool with the users and identities tables ready.
pub async fn create_user_test_pool() -> SqlitePool {
	let pool = create_test_pool().await;
	create_users_table(&pool).await;
	create_identities_table(&pool).await;
	pool
}
