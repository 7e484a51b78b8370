// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Federated login, signup, and account linking for Latch.
//!
//! This crate reconciles provider identities against local accounts:
//!
//! - [`SignedStateCodec`] — the HMAC-signed `state` blob binding callbacks
//!   to the requests that started them
//! - [`RedirectPolicy`] — the per-platform post-login redirect allow-list
//! - [`ProviderGateway`] — the seam the Discord and Google clients adapt to
//! - [`OAuthCallbackService`] — the ordered callback gates and the
//!   login/signup/link decision table
//! - [`AccountLinkService`] — challenge/confirm for linking a provider to an
//!   existing same-email account, plus provider disconnect

pub mod callback;
pub mod gateway;
pub mod link;
pub mod redirect;
pub mod state;

#[cfg(test)]
mod testkit;

pub use callback::{
	AuthorizationRequest, CallbackError, CallbackParams, CallbackSuccess, OAuthCallbackService,
};
pub use gateway::{
	generate_code_verifier, DiscordGateway, GatewayError, GoogleGateway, ProviderGateway,
	ProviderIdentity, ProviderTokens,
};
pub use link::{AccountLinkError, AccountLinkService, DisconnectError};
pub use redirect::{RedirectError, RedirectPolicy, RedirectPolicyConfigError};
pub use state::{
	ClientPlatform, MissingStateSecret, OAuthFlow, OAuthState, SignedStateCodec, StateError,
};
