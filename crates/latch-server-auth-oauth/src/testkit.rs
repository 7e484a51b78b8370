// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared fixtures for the callback and link test suites.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use latch_auth_core::OAuthProvider;
use latch_common_secret::SecretString;
use latch_server_auth::testing::{RecordingEmailGateway, StaticRateLimiter};
use latch_server_db::testing::create_user_test_pool;
use latch_server_db::{SqliteIdentityRepository, SqliteUserRepository};
use latch_server_sessions::{
	create_session_tables, SqliteAccountLinkSessionRepository, SqliteLoginSessionRepository,
};

use crate::callback::{CallbackParams, OAuthCallbackService};
use crate::gateway::{GatewayError, ProviderGateway, ProviderIdentity, ProviderTokens};
use crate::link::AccountLinkService;
use crate::redirect::RedirectPolicy;
use crate::state::{ClientPlatform, OAuthFlow, OAuthState, SignedStateCodec};

pub const WEB_REDIRECT: &str = "https://app.example.com/welcome";

/// A scripted provider gateway.
pub struct FakeGateway {
	provider: OAuthProvider,
	identity: Option<ProviderIdentity>,
	exchange_fails: bool,
	revoke_fails: bool,
	revocations: AtomicUsize,
}

impl FakeGateway {
	pub fn with_identity(identity: ProviderIdentity) -> Self {
		Self {
			provider: identity.provider,
			identity: Some(identity),
			exchange_fails: false,
			revoke_fails: false,
			revocations: AtomicUsize::new(0),
		}
	}

	pub fn failing_exchange(provider: OAuthProvider) -> Self {
		Self {
			provider,
			identity: None,
			exchange_fails: true,
			revoke_fails: false,
			revocations: AtomicUsize::new(0),
		}
	}

	pub fn failing_identity(provider: OAuthProvider) -> Self {
		Self {
			provider,
			identity: None,
			exchange_fails: false,
			revoke_fails: false,
			revocations: AtomicUsize::new(0),
		}
	}

	pub fn with_failing_revocation(mut self) -> Self {
		self.revoke_fails = true;
		self
	}

	pub fn revocation_count(&self) -> usize {
		self.revocations.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl ProviderGateway for FakeGateway {
	fn provider(&self) -> OAuthProvider {
		self.provider
	}

	fn authorization_url(&self, state: &str, code_verifier: &str) -> String {
		format!("https://provider.example/authorize?state={state}&verifier={code_verifier}")
	}

	async fn exchange_code(
		&self,
		_code: &str,
		_code_verifier: &str,
	) -> Result<ProviderTokens, GatewayError> {
		if self.exchange_fails {
			return Err(GatewayError::Exchange("invalid_grant".to_string()));
		}
		Ok(ProviderTokens {
			access_token: SecretString::new("fake-access-token".to_string()),
		})
	}

	async fn get_identity(&self, _tokens: &ProviderTokens) -> Result<ProviderIdentity, GatewayError> {
		self.identity
			.clone()
			.ok_or_else(|| GatewayError::Identity("unauthorized".to_string()))
	}

	async fn revoke_token(&self, _tokens: &ProviderTokens) -> Result<(), GatewayError> {
		self.revocations.fetch_add(1, Ordering::SeqCst);
		if self.revoke_fails {
			return Err(GatewayError::Revoke("revocation_unavailable".to_string()));
		}
		Ok(())
	}
}

/// A provider identity with a verified email.
pub fn discord_identity(provider_user_id: &str, email: &str) -> ProviderIdentity {
	ProviderIdentity {
		provider: OAuthProvider::Discord,
		provider_user_id: provider_user_id.to_string(),
		email: Some(email.to_string()),
		email_verified: true,
		name: "Nelly".to_string(),
		icon_url: Some("https://cdn.example.com/nelly.png".to_string()),
	}
}

pub fn codec() -> SignedStateCodec {
	SignedStateCodec::new(SecretString::new("test-state-secret".to_string()))
}

pub fn policy() -> RedirectPolicy {
	RedirectPolicy::new(vec!["https://app.example.com".to_string()], "latch").unwrap()
}

/// Everything the callback and link suites need, over one in-memory pool.
pub struct Harness {
	pub callbacks: OAuthCallbackService,
	pub link_service: AccountLinkService,
	pub users: Arc<SqliteUserRepository>,
	pub identities: Arc<SqliteIdentityRepository>,
	pub logins: Arc<SqliteLoginSessionRepository>,
	pub links: Arc<SqliteAccountLinkSessionRepository>,
	pub outbox: Arc<RecordingEmailGateway>,
	pub codec: SignedStateCodec,
}

pub async fn harness() -> Harness {
	let pool = create_user_test_pool().await;
	create_session_tables(&pool).await.unwrap();

	let users = Arc::new(SqliteUserRepository::new(pool.clone()));
	let identities = Arc::new(SqliteIdentityRepository::new(pool.clone()));
	let logins = Arc::new(SqliteLoginSessionRepository::new(pool.clone()));
	let links = Arc::new(SqliteAccountLinkSessionRepository::new(pool));
	let outbox = Arc::new(RecordingEmailGateway::new());

	let callbacks = OAuthCallbackService::new(
		codec(),
		policy(),
		users.clone(),
		identities.clone(),
		logins.clone(),
		links.clone(),
	);
	let link_service = AccountLinkService::new(
		links.clone(),
		logins.clone(),
		users.clone(),
		identities.clone(),
		outbox.clone(),
		Arc::new(StaticRateLimiter::permissive()),
	);

	Harness {
		callbacks,
		link_service,
		users,
		identities,
		logins,
		links,
		outbox,
		codec: codec(),
	}
}

impl Harness {
	/// Well-formed callback params for a flow.
	pub fn params(
		&self,
		flow: OAuthFlow,
		user_id: Option<latch_auth_core::UserId>,
	) -> CallbackParams {
		CallbackParams {
			state: self.codec.sign(&OAuthState {
				flow,
				client_platform: ClientPlatform::Web,
				user_id,
			}),
			redirect_uri: WEB_REDIRECT.to_string(),
			code: Some("auth-code".to_string()),
			error: None,
			code_verifier: "verifier".to_string(),
		}
	}
}
