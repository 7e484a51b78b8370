// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session storage and token validation for Latch.
//!
//! This crate owns the persistence side of the session lifecycle:
//!
//! - [`SessionRepository`] — the five storage operations every session kind
//!   needs, generic over [`latch_auth_core::SessionKind`]
//! - [`validate_token`] — the shared decode → lookup → expiry → secret
//!   routine behind every "present a token" operation
//! - SQLite implementations for all five kinds, plus
//!   [`sweep_expired_sessions`] for background cleanup

pub mod error;
pub mod repository;
pub mod sqlite;
pub mod sweep;

pub use error::{Result, SessionStoreError, ValidateError};
pub use repository::{validate_token, SessionRepository};
pub use sqlite::{
	create_session_tables, SqliteAccountLinkSessionRepository,
	SqliteEmailVerificationSessionRepository, SqliteLoginSessionRepository,
	SqlitePasswordResetSessionRepository, SqliteSignupSessionRepository,
};
pub use sweep::sweep_expired_sessions;
