// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Post-login redirect validation.
//!
//! After a provider callback the user is forwarded to a client-supplied URL.
//! That URL is attacker-reachable input, so it is validated against an
//! allow-list chosen by the client platform from the signed state: web
//! clients may only land on configured origins, mobile clients only on the
//! app's deep-link scheme. Open redirects are how phished OAuth flows
//! exfiltrate codes; everything downstream of state verification carries an
//! already-validated URL.

use std::env;
use url::Url;

use crate::state::ClientPlatform;

/// Error for redirect URLs outside the allow-list.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("redirect uri not allowed")]
pub struct RedirectError;

/// The redirect allow-list.
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
	/// Allowed web origins (scheme + host + port), e.g. `https://app.example.com`.
	web_origins: Vec<Url>,
	/// The mobile deep-link scheme, e.g. `latch`.
	mobile_scheme: String,
}

impl RedirectPolicy {
	/// Build a policy from explicit origins and scheme.
	///
	/// Origins that fail to parse are rejected up front rather than
	/// silently never matching.
	pub fn new(
		web_origins: Vec<String>,
		mobile_scheme: impl Into<String>,
	) -> Result<Self, RedirectPolicyConfigError> {
		let web_origins = web_origins
			.iter()
			.map(|origin| {
				Url::parse(origin).map_err(|_| RedirectPolicyConfigError(origin.clone()))
			})
			.collect::<Result<Vec<_>, _>>()?;
		Ok(Self {
			web_origins,
			mobile_scheme: mobile_scheme.into(),
		})
	}

	/// Load the policy from environment variables.
	///
	/// - `LATCH_SERVER_WEB_ORIGINS`: comma-separated origins
	/// - `LATCH_SERVER_MOBILE_SCHEME`: the deep-link scheme
	pub fn from_env() -> Result<Self, RedirectPolicyConfigError> {
		let origins = env::var("LATCH_SERVER_WEB_ORIGINS")
			.map_err(|_| RedirectPolicyConfigError("LATCH_SERVER_WEB_ORIGINS".to_string()))?;
		let scheme = env::var("LATCH_SERVER_MOBILE_SCHEME")
			.map_err(|_| RedirectPolicyConfigError("LATCH_SERVER_MOBILE_SCHEME".to_string()))?;
		Self::new(
			origins.split(',').map(|s| s.trim().to_string()).collect(),
			scheme,
		)
	}

	/// Validate a client-supplied redirect for the given platform.
	///
	/// Returns the parsed URL so callers carry a typed, validated value
	/// instead of the raw string.
	pub fn validate(
		&self,
		redirect_uri: &str,
		platform: ClientPlatform,
	) -> Result<Url, RedirectError> {
		let url = Url::parse(redirect_uri).map_err(|_| RedirectError)?;

		match platform {
			ClientPlatform::Web => {
				let allowed = self
					.web_origins
					.iter()
					.any(|origin| origin.origin() == url.origin());
				if allowed {
					Ok(url)
				} else {
					Err(RedirectError)
				}
			}
			ClientPlatform::Mobile => {
				if url.scheme() == self.mobile_scheme {
					Ok(url)
				} else {
					Err(RedirectError)
				}
			}
		}
	}
}

/// Error for unparseable policy configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid redirect policy configuration: {0}")]
pub struct RedirectPolicyConfigError(String);
