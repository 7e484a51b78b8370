// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for session storage and validation.

use thiserror::Error;

/// Errors from session storage.
#[derive(Debug, Error)]
pub enum SessionStoreError {
	/// Database error
	#[error("database error: {0}")]
	Database(#[from] sqlx::Error),

	/// A stored row could not be mapped back to a session entity. This is
	/// data corruption, not a client error.
	#[error("invalid session data: {0}")]
	InvalidData(String),
}

/// Result type for session storage operations.
pub type Result<T> = std::result::Result<T, SessionStoreError>;

/// Outcome of presenting a bearer token.
///
/// `Invalid` deliberately covers malformed tokens, unknown ids, and wrong
/// secrets alike: distinguishing them would hand an attacker an oracle for
/// which session ids exist.
#[derive(Debug, Error)]
pub enum ValidateError {
	/// Malformed token, unknown session, or wrong secret.
	#[error("invalid session token")]
	Invalid,

	/// The session existed but its expiry has passed. The stale row has
	/// been deleted.
	#[error("session expired")]
	Expired,

	/// Storage failed; nothing can be said about the token.
	#[error(transparent)]
	Store(#[from] SessionStoreError),
}
