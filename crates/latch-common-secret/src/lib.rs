// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Secret string handling for Latch.
//!
//! [`SecretString`] wraps sensitive string material (OAuth client secrets,
//! session secrets, access tokens) so that it cannot leak through `Debug` or
//! `Display` formatting. The inner value is zeroed on drop.
//!
//! # Usage
//!
//! ```
//! use latch_common_secret::SecretString;
//!
//! let secret = SecretString::new("super-secret".to_string());
//! assert_eq!(format!("{secret:?}"), "SecretString([REDACTED])");
//! assert_eq!(secret.expose(), "super-secret");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A string that must not appear in logs or error messages.
///
/// - `Debug` and `Display` print `[REDACTED]` instead of the value
/// - The value is zeroed in memory when dropped
/// - Access to the value is explicit via [`expose`](Self::expose)
///
/// Serialization is supported so secrets can travel through config
/// deserialization; serializing back out writes the plaintext, so structs
/// holding a `SecretString` must not be serialized into logs.
#[derive(Clone, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecretString(String);

impl SecretString {
	/// Wrap a secret value.
	pub fn new(value: String) -> Self {
		Self(value)
	}

	/// Access the wrapped value.
	///
	/// Call sites are intentionally explicit so secret use is grep-able.
	pub fn expose(&self) -> &String {
		&self.0
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SecretString([REDACTED])")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[REDACTED]")
	}
}

impl From<String> for SecretString {
	fn from(value: String) -> Self {
		Self::new(value)
	}
}

impl From<&str> for SecretString {
	fn from(value: &str) -> Self {
		Self::new(value.to_string())
	}
}
