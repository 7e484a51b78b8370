// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The `{id}.{secret}` bearer token shared by every session kind.
//!
//! The format is intentionally simple and public: the id part is merely a
//! lookup key, and the secret part is the actual capability. Knowing an id
//! grants nothing. The same string travels as an HTTP cookie for web clients
//! and as a JSON bearer value for mobile clients; that choice belongs to the
//! HTTP layer, not to this codec.

use std::fmt;
use std::str::FromStr;

use crate::ids::SessionId;
use crate::secret::SessionSecret;

/// Separator between the id and secret parts.
pub const TOKEN_SEPARATOR: char = '.';

/// A decoded session bearer token.
///
/// Decoding never panics: any input that does not contain exactly one
/// separator with non-empty parts on both sides yields `None`.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
	id: String,
	secret: String,
}

impl SessionToken {
	/// Assemble a token for a freshly issued session.
	pub fn new(id: SessionId, secret: &SessionSecret) -> Self {
		Self {
			id: id.to_string(),
			secret: secret.expose().to_string(),
		}
	}

	/// Assemble a token from raw parts.
	///
	/// No format validation is applied; use [`decode`](Self::decode) for
	/// untrusted input.
	pub fn from_parts(id: impl Into<String>, secret: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			secret: secret.into(),
		}
	}

	/// Encode as the wire string `{id}.{secret}`.
	pub fn encode(&self) -> String {
		format!("{}{}{}", self.id, TOKEN_SEPARATOR, self.secret)
	}

	/// Decode a wire string.
	///
	/// Returns `None` when the input lacks exactly one separator or either
	/// part is empty.
	pub fn decode(raw: &str) -> Option<Self> {
		let mut parts = raw.split(TOKEN_SEPARATOR);
		let id = parts.next()?;
		let secret = parts.next()?;
		if parts.next().is_some() || id.is_empty() || secret.is_empty() {
			return None;
		}
		Some(Self {
			id: id.to_string(),
			secret: secret.to_string(),
		})
	}

	/// The id part, unparsed.
	pub fn id_part(&self) -> &str {
		&self.id
	}

	/// The secret part. Treat as sensitive.
	pub fn secret_part(&self) -> &str {
		&self.secret
	}

	/// Parse the id part into a [`SessionId`].
	///
	/// Returns `None` for tokens whose id part is not a UUID; lookups for
	/// such tokens cannot succeed, so callers treat this as invalid.
	pub fn session_id(&self) -> Option<SessionId> {
		SessionId::from_str(&self.id).ok()
	}
}

impl fmt::Debug for SessionToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		// The secret part is a live capability; never let it reach logs.
		f.debug_struct("SessionToken")
			.field("id", &self.id)
			.field("secret", &"[REDACTED]")
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	mod decode {
		use super::*;

		#[test]
		fn splits_id_and_secret() {
			let token = SessionToken::decode("abc.def").unwrap();
			assert_eq!(token.id_part(), "abc");
			assert_eq!(token.secret_part(), "def");
		}

		#[test]
		fn rejects_empty_input() {
			assert!(SessionToken::decode("").is_none());
		}

		#[test]
		fn rejects_missing_separator() {
			assert!(SessionToken::decode("noseparator").is_none());
		}

		#[test]
		fn rejects_empty_id() {
			assert!(SessionToken::decode(".secret").is_none());
		}

		#[test]
		fn rejects_empty_secret() {
			assert!(SessionToken::decode("id.").is_none());
		}

		#[test]
		fn rejects_extra_separator() {
			assert!(SessionToken::decode("a.b.c").is_none());
			assert!(SessionToken::decode("..").is_none());
		}

		#[test]
		fn bare_separator_is_rejected() {
			assert!(SessionToken::decode(".").is_none());
		}
	}

	mod encode {
		use super::*;

		#[test]
		fn joins_with_separator() {
			let token = SessionToken::from_parts("abc", "def");
			assert_eq!(token.encode(), "abc.def");
		}

		#[test]
		fn new_uses_session_id_display_form() {
			let id = SessionId::generate();
			let secret = SessionSecret::generate();
			let token = SessionToken::new(id, &secret);
			assert_eq!(
				token.encode(),
				format!("{id}.{}", secret.expose())
			);
		}
	}

	mod session_id {
		use super::*;

		#[test]
		fn parses_uuid_id_part() {
			let id = SessionId::generate();
			let token = SessionToken::from_parts(id.to_string(), "s");
			assert_eq!(token.session_id(), Some(id));
		}

		#[test]
		fn non_uuid_id_part_yields_none() {
			let token = SessionToken::decode("not-a-uuid.secret").unwrap();
			assert!(token.session_id().is_none());
		}
	}

	#[test]
	fn debug_redacts_secret() {
		let token = SessionToken::from_parts("id", "supersecret");
		let debug = format!("{token:?}");
		assert!(!debug.contains("supersecret"));
		assert!(debug.contains("[REDACTED]"));
	}
}

#[cfg(test)]
mod proptests {
	use super::*;
	use proptest::prelude::*;

	proptest! {
		/// Any token built from non-empty, separator-free parts decodes back
		/// to exactly those parts.
		#[test]
		fn roundtrips_for_separator_free_parts(
			id in "[^.]{1,64}",
			secret in "[^.]{1,64}",
		) {
			let encoded = SessionToken::from_parts(id.clone(), secret.clone()).encode();
			let decoded = SessionToken::decode(&encoded).unwrap();
			prop_assert_eq!(decoded.id_part(), id);
			prop_assert_eq!(decoded.secret_part(), secret);
		}

		/// Decoding arbitrary input never panics and only succeeds for
		/// well-formed two-part tokens.
		#[test]
		fn decode_never_panics(raw in ".{0,200}") {
			if let Some(token) = SessionToken::decode(&raw) {
				prop_assert!(!token.id_part().is_empty());
				prop_assert!(!token.secret_part().is_empty());
				prop_assert_eq!(raw.matches(TOKEN_SEPARATOR).count(), 1);
			}
		}
	}
}
