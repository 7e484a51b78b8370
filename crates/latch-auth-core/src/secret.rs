// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session secret generation and hashing.
//!
//! Every session kind carries a bearer secret. The plaintext secret exists
//! only inside the token handed to the client; storage keeps a SHA-256 hash.
//! Verification recomputes the hash and compares in constant time, so neither
//! a database leak nor response timing reveals anything about live secrets.
//!
//! SHA-256 (rather than a memory-hard KDF) is deliberate here: the input is a
//! 256-bit random value, not a human-chosen password, so brute force against
//! the hash is already infeasible and the hash must stay cheap enough to run
//! on every authenticated request. Password hashing uses Argon2 elsewhere.

use rand::RngCore;
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;

use latch_common_secret::SecretString;

/// Number of random bytes in a session secret.
///
/// 32 bytes provides 256 bits of entropy, making guessing infeasible.
pub const SESSION_SECRET_BYTES: usize = 32;

/// Length of a session secret in its encoded (hex) form.
pub const SESSION_SECRET_LEN: usize = SESSION_SECRET_BYTES * 2;

// =============================================================================
// SessionSecret
// =============================================================================

/// The plaintext bearer secret of a session.
///
/// Exists only transiently between issuance and delivery to the client.
/// Never persisted; storage keeps a [`SecretHash`]. Wrapped in
/// [`SecretString`] so it cannot leak through `Debug` formatting.
#[derive(Debug, Clone)]
pub struct SessionSecret(SecretString);

impl SessionSecret {
	/// Generate a fresh secret from the OS CSPRNG.
	///
	/// The encoded form is lowercase hex: fixed length, URL-safe, and safe to
	/// embed in a cookie or JSON field without escaping.
	pub fn generate() -> Self {
		let mut bytes = [0u8; SESSION_SECRET_BYTES];
		rand::rngs::OsRng.fill_bytes(&mut bytes);
		Self(SecretString::new(hex::encode(bytes)))
	}

	/// Access the encoded secret for token assembly.
	pub fn expose(&self) -> &str {
		self.0.expose()
	}
}

impl From<String> for SessionSecret {
	fn from(value: String) -> Self {
		Self(SecretString::new(value))
	}
}

// =============================================================================
// SecretHash
// =============================================================================

/// SHA-256 hash of a session secret, as persisted.
///
/// Deliberately does not implement `PartialEq`: candidate secrets must go
/// through [`verify`](Self::verify), which compares in constant time.
#[derive(Clone)]
pub struct SecretHash([u8; 32]);

impl SecretHash {
	/// Hash a session secret for storage.
	pub fn of(secret: &SessionSecret) -> Self {
		Self::digest(secret.expose())
	}

	/// Verify a candidate secret (the secret part of a presented token)
	/// against this hash, in constant time.
	pub fn verify(&self, candidate: &str) -> bool {
		let computed = Self::digest(candidate);
		self.0.ct_eq(&computed.0).into()
	}

	/// Hex encoding for storage.
	pub fn to_hex(&self) -> String {
		hex::encode(self.0)
	}

	/// Decode a stored hash. Returns `None` if the input is not 64 hex chars.
	pub fn from_hex(value: &str) -> Option<Self> {
		let bytes = hex::decode(value).ok()?;
		let bytes: [u8; 32] = bytes.try_into().ok()?;
		Some(Self(bytes))
	}

	fn digest(input: &str) -> Self {
		let mut hasher = Sha256::new();
		hasher.update(input.as_bytes());
		Self(hasher.finalize().into())
	}
}

impl fmt::Debug for SecretHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		// Hashes of 256-bit random secrets are not sensitive, but the full
		// digest is noise in logs; show a prefix.
		write!(f, "SecretHash({}..)", &self.to_hex()[..8])
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	mod generation {
		use super::*;
		use std::collections::HashSet;

		#[test]
		fn secrets_have_fixed_hex_length() {
			let secret = SessionSecret::generate();
			assert_eq!(secret.expose().len(), SESSION_SECRET_LEN);
			assert!(secret.expose().chars().all(|c| c.is_ascii_hexdigit()));
		}

		#[test]
		fn secrets_are_unique() {
			let secrets: HashSet<String> = (0..100)
				.map(|_| SessionSecret::generate().expose().to_string())
				.collect();
			assert_eq!(secrets.len(), 100);
		}

		#[test]
		fn secret_debug_is_redacted() {
			let secret = SessionSecret::generate();
			let debug = format!("{secret:?}");
			assert!(!debug.contains(secret.expose()));
		}
	}

	mod verification {
		use super::*;

		#[test]
		fn correct_secret_verifies() {
			let secret = SessionSecret::generate();
			let hash = SecretHash::of(&secret);
			assert!(hash.verify(secret.expose()));
		}

		#[test]
		fn wrong_secret_fails() {
			let secret = SessionSecret::generate();
			let other = SessionSecret::generate();
			let hash = SecretHash::of(&secret);
			assert!(!hash.verify(other.expose()));
		}

		#[test]
		fn empty_candidate_fails() {
			let hash = SecretHash::of(&SessionSecret::generate());
			assert!(!hash.verify(""));
		}

		#[test]
		fn hashing_is_deterministic() {
			let secret = SessionSecret::generate();
			let a = SecretHash::of(&secret).to_hex();
			let b = SecretHash::of(&secret).to_hex();
			assert_eq!(a, b);
		}
	}

	mod encoding {
		use super::*;

		#[test]
		fn hex_roundtrips() {
			let hash = SecretHash::of(&SessionSecret::generate());
			let restored = SecretHash::from_hex(&hash.to_hex()).unwrap();
			assert_eq!(restored.to_hex(), hash.to_hex());
		}

		#[test]
		fn from_hex_rejects_bad_input() {
			assert!(SecretHash::from_hex("").is_none());
			assert!(SecretHash::from_hex("zz").is_none());
			assert!(SecretHash::from_hex("abcd").is_none());
			assert!(SecretHash::from_hex(&"a".repeat(63)).is_none());
		}

		#[test]
		fn debug_shows_prefix_only() {
			let hash = SecretHash::of(&SessionSecret::generate());
			let debug = format!("{hash:?}");
			assert!(debug.starts_with("SecretHash("));
			assert!(!debug.contains(&hash.to_hex()));
		}
	}
}
