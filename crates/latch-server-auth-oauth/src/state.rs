// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The signed OAuth state blob.
//!
//! The `state` parameter binds a provider callback to the request that
//! started it. It carries the flow kind, the client platform (which selects
//! the redirect allow-list), and for link flows the initiating user — all
//! HMAC-SHA256 signed so the callback can trust none of it was forged or
//! swapped. Verification runs before any other callback logic; a bad
//! signature is terminal.
//!
//! Wire format: `{base64url(json)}.{hex(hmac_sha256)}`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::env;

use latch_auth_core::UserId;
use latch_common_secret::SecretString;

type HmacSha256 = Hmac<Sha256>;

/// Which entry point started the OAuth flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OAuthFlow {
	/// Log into an existing account.
	Login,
	/// Create a new account.
	Signup,
	/// Connect a provider to the already-authenticated account.
	Link,
}

/// Which kind of client started the flow.
///
/// Selects the redirect allow-list: web clients may only return to known
/// origins, mobile clients only to the app's deep-link scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientPlatform {
	Web,
	Mobile,
}

/// The payload signed into the `state` parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthState {
	/// The entry point (login, signup, or link).
	pub flow: OAuthFlow,
	/// The client platform, for redirect validation.
	pub client_platform: ClientPlatform,
	/// The initiating user; `Some` only for link flows.
	pub user_id: Option<UserId>,
}

/// Error for states that fail signature or format checks.
///
/// One variant on purpose: the caller cannot act differently on "malformed"
/// vs "bad signature", and the distinction would only feed an oracle.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid oauth state")]
pub struct StateError;

/// HMAC-signed state codec.
#[derive(Clone)]
pub struct SignedStateCodec {
	secret: SecretString,
}

impl SignedStateCodec {
	/// Create a codec with an explicit signing secret.
	pub fn new(secret: SecretString) -> Self {
		Self { secret }
	}

	/// Load the signing secret from `LATCH_SERVER_OAUTH_STATE_SECRET`.
	pub fn from_env() -> Result<Self, MissingStateSecret> {
		let secret = env::var("LATCH_SERVER_OAUTH_STATE_SECRET").map_err(|_| MissingStateSecret)?;
		Ok(Self::new(SecretString::new(secret)))
	}

	/// Sign a payload into a state string.
	pub fn sign<P: Serialize>(&self, payload: &P) -> String {
		let json = serde_json::to_vec(payload).expect("state payload serializes");
		let encoded = URL_SAFE_NO_PAD.encode(&json);
		let signature = self.compute_signature(encoded.as_bytes());
		format!("{encoded}.{signature}")
	}

	/// Verify and decode a state string.
	///
	/// The signature is checked (constant-time, inside the HMAC
	/// verification) before the payload is even base64-decoded.
	pub fn validate<P: DeserializeOwned>(&self, state: &str) -> Result<P, StateError> {
		let (encoded, signature) = state.split_once('.').ok_or(StateError)?;

		let expected = hex::decode(signature).map_err(|_| StateError)?;
		let mut mac = HmacSha256::new_from_slice(self.secret.expose().as_bytes())
			.expect("HMAC can take key of any size");
		mac.update(encoded.as_bytes());
		mac.verify_slice(&expected).map_err(|_| StateError)?;

		let json = URL_SAFE_NO_PAD.decode(encoded).map_err(|_| StateError)?;
		serde_json::from_slice(&json).map_err(|_| StateError)
	}

	fn compute_signature(&self, payload: &[u8]) -> String {
		let mut mac = HmacSha256::new_from_slice(self.secret.expose().as_bytes())
			.expect("HMAC can take key of any size");
		mac.update(payload);
		hex::encode(mac.finalize().into_bytes())
	}
}

/// Error for a missing state-secret environment variable.
#[derive(Debug, thiserror::Error)]
#[error("missing environment variable: LATCH_SERVER_OAUTH_STATE_SECRET")]
pub struct MissingStateSecret;


#[cfg(test)]
mod proptests {
	use super::*;
	use proptest::prelude::*;

	fn arb_state() -> impl Strategy<Value = OAuthState> {
		(
			prop_oneof![
				Just(OAuthFlow::Login),
				Just(OAuthFlow::Signup),
				Just(OAuthFlow::Link),
			],
			prop_oneof![Just(ClientPlatform::Web), Just(ClientPlatform::Mobile)],
			proptest::option::of(proptest::num::u128::ANY),
		)
			.prop_map(|(flow, client_platform, user)| OAuthState {
				flow,
				client_platform,
				user_id: user.map(|u| UserId::new(uuid::Uuid::from_u128(u))),
			})
	}

	proptest! {
		#[test]
		fn any_state_roundtrips(state in arb_state(), secret in "[a-zA-Z0-9]{8,64}") {
			let codec = SignedStateCodec::new(SecretString::new(secret));
			let signed = codec.sign(&state);
			let decoded: OAuthState = codec.validate(&signed).unwrap();
			prop_assert_eq!(decoded, state);
		}

		#[test]
		fn arbitrary_input_never_validates_under_a_random_key(
			raw in ".{0,200}",
			secret in "[a-zA-Z0-9]{16,32}",
		) {
			let codec = SignedStateCodec::new(SecretString::new(secret));
			// Validation of unsigned input must fail (and never panic).
			prop_assert!(codec.validate::<OAuthState>(&raw).is_err());
		}
	}
}
