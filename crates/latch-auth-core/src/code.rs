// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Numeric verification codes for email challenges.
//!
//! Codes are fixed-length decimal strings drawn from the OS CSPRNG. They gate
//! account takeover (signup, password reset, email change, account linking),
//! so a seedable PRNG is not acceptable here, and comparison is constant-time
//! to keep response timing from becoming a digit-by-digit oracle.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Number of digits in a verification code.
pub const VERIFICATION_CODE_DIGITS: usize = 8;

/// Error for code strings that are not exactly eight ASCII digits.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("verification code must be exactly {VERIFICATION_CODE_DIGITS} digits")]
pub struct CodeFormatError;

/// An eight-digit, single-use verification code.
///
/// Construction is either [`generate`](Self::generate) (CSPRNG) or
/// [`parse`](str::parse) of a stored value, which validates the format once
/// at the boundary. Candidate codes supplied by clients are compared with
/// [`matches`](Self::matches), never `==`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VerificationCode(String);

impl VerificationCode {
	/// Generate a fresh code from the OS CSPRNG.
	pub fn generate() -> Self {
		let mut rng = rand::rngs::OsRng;
		let digits: String = (0..VERIFICATION_CODE_DIGITS)
			.map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
			.collect();
		Self(digits)
	}

	/// Constant-time comparison against a client-supplied candidate.
	///
	/// Length is checked first; candidates of the wrong length fail without
	/// touching the digits (the code length is public).
	pub fn matches(&self, candidate: &str) -> bool {
		if candidate.len() != self.0.len() {
			return false;
		}
		self.0.as_bytes().ct_eq(candidate.as_bytes()).into()
	}

	/// The code digits, for rendering into an email body.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl TryFrom<String> for VerificationCode {
	type Error = CodeFormatError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		if value.len() != VERIFICATION_CODE_DIGITS
			|| !value.chars().all(|c| c.is_ascii_digit())
		{
			return Err(CodeFormatError);
		}
		Ok(Self(value))
	}
}

impl std::str::FromStr for VerificationCode {
	type Err = CodeFormatError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::try_from(s.to_string())
	}
}

impl From<VerificationCode> for String {
	fn from(code: VerificationCode) -> Self {
		code.0
	}
}

impl fmt::Debug for VerificationCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		// Codes are live credentials until consumed; keep them out of logs.
		write!(f, "VerificationCode([REDACTED])")
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	mod generation {
		use super::*;

		#[test]
		fn generates_eight_digits() {
			let code = VerificationCode::generate();
			assert_eq!(code.as_str().len(), VERIFICATION_CODE_DIGITS);
			assert!(code.as_str().chars().all(|c| c.is_ascii_digit()));
		}

		#[test]
		fn codes_vary() {
			// 10^8 possibilities; 20 draws colliding pairwise is effectively
			// impossible unless generation is broken.
			let codes: std::collections::HashSet<String> = (0..20)
				.map(|_| VerificationCode::generate().as_str().to_string())
				.collect();
			assert!(codes.len() > 1);
		}
	}

	mod matching {
		use super::*;

		#[test]
		fn correct_candidate_matches() {
			let code: VerificationCode = "01234567".parse().unwrap();
			assert!(code.matches("01234567"));
		}

		#[test]
		fn wrong_candidate_fails() {
			let code: VerificationCode = "01234567".parse().unwrap();
			assert!(!code.matches("76543210"));
		}

		#[test]
		fn wrong_length_fails() {
			let code: VerificationCode = "01234567".parse().unwrap();
			assert!(!code.matches(""));
			assert!(!code.matches("0123456"));
			assert!(!code.matches("012345678"));
		}
	}

	mod parsing {
		use super::*;

		#[test]
		fn accepts_eight_digits() {
			assert!("00000000".parse::<VerificationCode>().is_ok());
			assert!("99999999".parse::<VerificationCode>().is_ok());
		}

		#[test]
		fn rejects_bad_formats() {
			assert!("".parse::<VerificationCode>().is_err());
			assert!("1234567".parse::<VerificationCode>().is_err());
			assert!("123456789".parse::<VerificationCode>().is_err());
			assert!("1234567a".parse::<VerificationCode>().is_err());
			assert!("１２３４５６７８".parse::<VerificationCode>().is_err());
		}
	}

	#[test]
	fn debug_redacts_digits() {
		let code = VerificationCode::generate();
		let debug = format!("{code:?}");
		assert!(!debug.contains(code.as_str()));
	}
}

#[cfg(test)]
mod proptests {
	use super::*;
	use proptest::prelude::*;

	proptest! {
		#[test]
		fn generated_codes_always_well_formed(_ in 0..50u32) {
			let code = VerificationCode::generate();
			prop_assert_eq!(code.as_str().len(), VERIFICATION_CODE_DIGITS);
			prop_assert!(code.as_str().chars().all(|c| c.is_ascii_digit()));
			prop_assert!(code.matches(code.as_str()));
		}

		#[test]
		fn parse_accepts_exactly_digit_strings(s in "[0-9]{8}") {
			let code: VerificationCode = s.parse().unwrap();
			prop_assert!(code.matches(&s));
		}

		#[test]
		fn distinct_codes_never_match(a in "[0-9]{8}", b in "[0-9]{8}") {
			prop_assume!(a != b);
			let code: VerificationCode = a.parse().unwrap();
			prop_assert!(!code.matches(&b));
		}
	}
}
