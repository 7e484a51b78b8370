// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Password hashing and verification.
//!
//! Passwords are human-chosen, so unlike session secrets they get the
//! memory-hard treatment: Argon2id with a per-hash random salt, stored as a
//! PHC string. Verification is constant-time inside the argon2 crate.

use argon2::password_hash::{
	rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use std::sync::OnceLock;
use tracing::instrument;

use crate::argon2_config::argon2_instance;

/// Minimum accepted password length.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Error for passwords that fail policy or hashing.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PasswordError {
	#[error("password must be at least {MIN_PASSWORD_LEN} characters")]
	TooShort,

	#[error("password hashing failed")]
	Hash,
}

/// Hash a password for storage.
///
/// # Errors
///
/// [`PasswordError::TooShort`] for passwords under [`MIN_PASSWORD_LEN`]
/// characters; [`PasswordError::Hash`] if Argon2 rejects its inputs.
#[instrument(name = "password.hash", skip_all)]
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
	if password.chars().count() < MIN_PASSWORD_LEN {
		return Err(PasswordError::TooShort);
	}
	let salt = SaltString::generate(&mut OsRng);
	argon2_instance()
		.hash_password(password.as_bytes(), &salt)
		.map(|hash| hash.to_string())
		.map_err(|_| PasswordError::Hash)
}

/// Verify a password against a stored PHC hash.
///
/// Returns `false` for malformed hashes rather than panicking.
#[instrument(name = "password.verify", skip_all)]
pub fn verify_password(password: &str, hash: &str) -> bool {
	let parsed = match PasswordHash::new(hash) {
		Ok(h) => h,
		Err(_) => return false,
	};
	argon2_instance()
		.verify_password(password.as_bytes(), &parsed)
		.is_ok()
}

/// Run a throwaway verification against a fixed hash.
///
/// The login flow calls this when no account exists for the presented email,
/// so the "unknown email" and "wrong password" paths cost the same wall-clock
/// time and cannot be told apart from outside.
pub fn verify_dummy_password() {
	static DUMMY_HASH: OnceLock<String> = OnceLock::new();
	let hash = DUMMY_HASH.get_or_init(|| {
		hash_password("dummy-password-for-timing").expect("static password meets policy")
	});
	let _ = verify_password("presented-password", hash);
}


#[cfg(test)]
mod proptests {
	use super::*;
	use proptest::prelude::*;

	proptest! {
		// Argon2 is slow even with test params; keep the case count low.
		#![proptest_config(ProptestConfig::with_cases(8))]

		#[test]
		fn any_accepted_password_roundtrips(password in "[a-zA-Z0-9]{8,24}") {
			let hash = hash_password(&password).unwrap();
			prop_assert!(verify_password(&password, &hash));
		}

		#[test]
		fn rejection_is_exactly_by_length(password in ".{0,7}") {
			prop_assume!(password.chars().count() < MIN_PASSWORD_LEN);
			prop_assert_eq!(hash_password(&password), Err(PasswordError::TooShort));
		}
	}
}
