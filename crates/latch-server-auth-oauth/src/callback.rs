// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The OAuth callback engine: ordered gates, then the reconciliation table.
//!
//! Every callback runs the same gauntlet, each step terminal on failure:
//!
//! 1. verify the signed state (nothing else is trusted before this)
//! 2. validate the post-login redirect against the platform allow-list
//! 3. surface a provider-reported error (`access_denied` vs the rest)
//! 4. exchange the authorization code for tokens
//! 5. fetch the identity, then revoke the token either way
//! 6. decide:
//!
//! | external identity | same-email user | login flow              | signup flow             |
//! |-------------------|-----------------|-------------------------|-------------------------|
//! | yes               | —               | log in                  | already registered      |
//! | no                | yes             | propose account link    | propose account link    |
//! | no                | no              | association not found   | create account + log in |
//!
//! Gate errors from step 3 on carry the already-validated redirect so the
//! HTTP layer can forward the user back to the client with an error code.

use std::sync::Arc;
use tracing::instrument;
use url::Url;

use latch_auth_core::{
	AccountLink, AccountLinkSession, ExternalIdentity, Login, LoginSession, SessionToken, User,
	UserId,
};
use latch_server_auth::AuthenticatedUser;
use latch_server_db::{DbError, IdentityRepository, UserRepository};
use latch_server_sessions::{SessionRepository, SessionStoreError};

use crate::gateway::{generate_code_verifier, ProviderGateway, ProviderIdentity};
use crate::redirect::RedirectPolicy;
use crate::state::{ClientPlatform, OAuthFlow, OAuthState, SignedStateCodec};

/// The provider error code for a user-declined consent screen.
const PROVIDER_ACCESS_DENIED: &str = "access_denied";

/// Raw inputs from the provider callback request.
#[derive(Debug, Clone)]
pub struct CallbackParams {
	/// The signed state, echoed back by the provider.
	pub state: String,
	/// The client-supplied post-login redirect.
	pub redirect_uri: String,
	/// The authorization code, absent when the provider reports an error.
	pub code: Option<String>,
	/// The provider's error code, if it reported one.
	pub error: Option<String>,
	/// The PKCE verifier minted at flow start.
	pub code_verifier: String,
}

/// A callback that ended in a live login session.
#[derive(Debug)]
pub enum CallbackSuccess {
	/// An existing account logged in.
	LoggedIn {
		auth: AuthenticatedUser,
		redirect: Url,
	},
	/// A new account was created from the provider identity and logged in.
	SignedUp {
		auth: AuthenticatedUser,
		redirect: Url,
	},
}

impl CallbackSuccess {
	/// The validated redirect to forward the user to.
	pub fn redirect(&self) -> &Url {
		match self {
			CallbackSuccess::LoggedIn { redirect, .. }
			| CallbackSuccess::SignedUp { redirect, .. } => redirect,
		}
	}
}

/// Everything a callback can end in short of a login session.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
	/// The state failed signature or format checks. Terminal; nothing in
	/// the request can be trusted, including the redirect.
	#[error("invalid oauth state")]
	InvalidState,

	/// The redirect URL is outside the platform allow-list.
	#[error("invalid redirect uri")]
	InvalidRedirectUri,

	/// The user declined the provider consent screen.
	#[error("provider access denied")]
	ProviderAccessDenied { redirect: Url },

	/// The provider reported an error other than `access_denied`.
	#[error("provider error: {message}")]
	ProviderError { message: String, redirect: Url },

	/// Missing code, or the provider rejected the exchange.
	#[error("token exchange failed")]
	TokenExchangeFailed { redirect: Url },

	/// The identity endpoint failed.
	#[error("failed to fetch provider identity")]
	GetIdentityFailed { redirect: Url },

	/// The provider reported no verified email, so reconciliation by email
	/// is impossible.
	#[error("provider email missing or unverified")]
	ProviderEmailUnverified { redirect: Url },

	/// Signup flow, but the external identity already belongs to an account.
	#[error("external identity already registered")]
	ExternalIdentityAlreadyRegistered { redirect: Url },

	/// A local account with the same email exists; linking requires the
	/// user's explicit confirmation via the persisted session and token.
	#[error("account association available")]
	AccountAssociationAvailable {
		session: AccountLinkSession,
		token: SessionToken,
		redirect: Url,
	},

	/// Login flow, but no account is linked to or matches this identity.
	#[error("no linkable account found")]
	AccountAssociationNotFound { redirect: Url },

	/// Signup race: the email got registered between fetch and insert.
	#[error("email already registered")]
	EmailAlreadyRegistered { redirect: Url },

	/// Link flow: this user already has an identity for the provider.
	#[error("provider already linked")]
	ProviderAlreadyLinked { redirect: Url },

	/// Link flow: the external identity belongs to a different user.
	#[error("account already linked to another user")]
	AccountAlreadyLinkedToAnotherUser { redirect: Url },

	#[error(transparent)]
	Sessions(#[from] SessionStoreError),

	#[error(transparent)]
	Db(#[from] DbError),
}

/// The authorization request handed back to the HTTP layer at flow start.
#[derive(Debug)]
pub struct AuthorizationRequest {
	/// Where to send the user.
	pub url: String,
	/// The signed state embedded in the URL.
	pub state: String,
	/// The PKCE verifier, to be stored client-side for the callback.
	pub code_verifier: String,
}

/// The federated login/signup/link engine.
pub struct OAuthCallbackService {
	codec: SignedStateCodec,
	redirects: RedirectPolicy,
	users: Arc<dyn UserRepository>,
	identities: Arc<dyn IdentityRepository>,
	logins: Arc<dyn SessionRepository<Login>>,
	links: Arc<dyn SessionRepository<AccountLink>>,
}

impl OAuthCallbackService {
	pub fn new(
		codec: SignedStateCodec,
		redirects: RedirectPolicy,
		users: Arc<dyn UserRepository>,
		identities: Arc<dyn IdentityRepository>,
		logins: Arc<dyn SessionRepository<Login>>,
		links: Arc<dyn SessionRepository<AccountLink>>,
	) -> Self {
		Self {
			codec,
			redirects,
			users,
			identities,
			logins,
			links,
		}
	}

	/// Start a flow: sign the state, mint a PKCE verifier, build the URL.
	#[instrument(name = "oauth.begin", skip_all, fields(provider = %gateway.provider(), flow = ?flow))]
	pub fn begin_authorization(
		&self,
		gateway: &dyn ProviderGateway,
		flow: OAuthFlow,
		client_platform: ClientPlatform,
		user_id: Option<UserId>,
	) -> AuthorizationRequest {
		let state = self.codec.sign(&OAuthState {
			flow,
			client_platform,
			user_id,
		});
		let code_verifier = generate_code_verifier();
		let url = gateway.authorization_url(&state, &code_verifier);
		AuthorizationRequest {
			url,
			state,
			code_verifier,
		}
	}

	/// Run the callback gauntlet and the reconciliation decision.
	#[instrument(name = "oauth.callback", skip_all, fields(provider = %gateway.provider()))]
	pub async fn handle_callback(
		&self,
		gateway: &dyn ProviderGateway,
		params: CallbackParams,
	) -> Result<CallbackSuccess, CallbackError> {
		// Gate 1: the state signature. Everything else is untrusted input
		// until this passes.
		let state: OAuthState = self
			.codec
			.validate(&params.state)
			.map_err(|_| CallbackError::InvalidState)?;

		// Gate 2: the redirect, against the platform's allow-list.
		let redirect = self
			.redirects
			.validate(&params.redirect_uri, state.client_platform)
			.map_err(|_| CallbackError::InvalidRedirectUri)?;

		// Gate 3: provider-reported errors.
		if let Some(error) = params.error {
			return Err(if error == PROVIDER_ACCESS_DENIED {
				CallbackError::ProviderAccessDenied { redirect }
			} else {
				CallbackError::ProviderError {
					message: error,
					redirect,
				}
			});
		}

		// Gate 4: the code exchange.
		let Some(code) = params.code else {
			return Err(CallbackError::TokenExchangeFailed { redirect });
		};
		let tokens = match gateway.exchange_code(&code, &params.code_verifier).await {
			Ok(tokens) => tokens,
			Err(e) => {
				tracing::warn!(error = %e, "token exchange failed");
				return Err(CallbackError::TokenExchangeFailed { redirect });
			}
		};

		// Gate 5: the identity fetch. The token is revoked afterwards no
		// matter how the fetch went; revocation failure is logged only.
		let identity = gateway.get_identity(&tokens).await;
		if let Err(e) = gateway.revoke_token(&tokens).await {
			tracing::warn!(error = %e, "provider token revocation failed");
		}
		let identity = match identity {
			Ok(identity) => identity,
			Err(e) => {
				tracing::warn!(error = %e, "identity fetch failed");
				return Err(CallbackError::GetIdentityFailed { redirect });
			}
		};

		// Gate 6: the decision table.
		match state.flow {
			OAuthFlow::Login => self.reconcile_login(identity, redirect).await,
			OAuthFlow::Signup => self.reconcile_signup(identity, redirect).await,
			OAuthFlow::Link => self.reconcile_link(state, identity, redirect).await,
		}
	}

	async fn reconcile_login(
		&self,
		identity: ProviderIdentity,
		redirect: Url,
	) -> Result<CallbackSuccess, CallbackError> {
		if let Some(existing) = self
			.identities
			.find_by_provider(identity.provider, &identity.provider_user_id)
			.await?
		{
			let user = self.load_linked_user(&existing).await?;
			let auth = self.issue_login(user).await?;
			tracing::info!(user_id = %auth.user.id, "oauth login");
			return Ok(CallbackSuccess::LoggedIn { auth, redirect });
		}

		let (_, same_email_user) = self.find_same_email_user(&identity, &redirect).await?;
		match same_email_user {
			Some(user) => Err(self.propose_association(user, identity, redirect).await?),
			None => Err(CallbackError::AccountAssociationNotFound { redirect }),
		}
	}

	async fn reconcile_signup(
		&self,
		identity: ProviderIdentity,
		redirect: Url,
	) -> Result<CallbackSuccess, CallbackError> {
		if self
			.identities
			.find_by_provider(identity.provider, &identity.provider_user_id)
			.await?
			.is_some()
		{
			return Err(CallbackError::ExternalIdentityAlreadyRegistered { redirect });
		}

		let (email, same_email_user) = self.find_same_email_user(&identity, &redirect).await?;
		if let Some(user) = same_email_user {
			return Err(self.propose_association(user, identity, redirect).await?);
		}

		// Fresh identity, fresh email: create the account. The provider
		// attested the email, so it starts verified.
		let user = User::from_provider_identity(email, identity.name.clone(), identity.icon_url.clone());
		match self.users.save(&user).await {
			Ok(()) => {}
			Err(DbError::Conflict(_)) => {
				return Err(CallbackError::EmailAlreadyRegistered { redirect })
			}
			Err(e) => return Err(e.into()),
		}

		let link = ExternalIdentity::link(user.id, identity.provider, identity.provider_user_id);
		match self.identities.save(&link).await {
			Ok(()) => {}
			Err(DbError::Conflict(_)) => {
				return Err(CallbackError::ExternalIdentityAlreadyRegistered { redirect })
			}
			Err(e) => return Err(e.into()),
		}

		let auth = self.issue_login(user).await?;
		tracing::info!(user_id = %auth.user.id, provider = %identity.provider, "oauth signup");
		Ok(CallbackSuccess::SignedUp { auth, redirect })
	}

	async fn reconcile_link(
		&self,
		state: OAuthState,
		identity: ProviderIdentity,
		redirect: Url,
	) -> Result<CallbackSuccess, CallbackError> {
		// Link states are minted only for authenticated users.
		let Some(user_id) = state.user_id else {
			return Err(CallbackError::InvalidState);
		};
		let Some(user) = self.users.find_by_id(&user_id).await? else {
			return Err(CallbackError::AccountAssociationNotFound { redirect });
		};

		if let Some(existing) = self
			.identities
			.find_by_provider(identity.provider, &identity.provider_user_id)
			.await?
		{
			return Err(if existing.user_id == user.id {
				CallbackError::ProviderAlreadyLinked { redirect }
			} else {
				CallbackError::AccountAlreadyLinkedToAnotherUser { redirect }
			});
		}
		if self
			.identities
			.find_by_user_and_provider(&user.id, identity.provider)
			.await?
			.is_some()
		{
			return Err(CallbackError::ProviderAlreadyLinked { redirect });
		}

		Err(self.propose_association(user, identity, redirect).await?)
	}

	/// The "same email, no external identity" outcome shared by every flow:
	/// persist an account-link session and hand its token back.
	async fn propose_association(
		&self,
		user: User,
		identity: ProviderIdentity,
		redirect: Url,
	) -> Result<CallbackError, CallbackError> {
		self.links.delete_for_owner(&user.id).await?;
		let (session, secret) = AccountLinkSession::propose(
			user.id,
			user.email.clone(),
			identity.provider,
			identity.provider_user_id,
		);
		self.links.save(&session).await?;
		let token = session.token(&secret);

		tracing::info!(user_id = %user.id, provider = %identity.provider, "account association proposed");
		Ok(CallbackError::AccountAssociationAvailable {
			session,
			token,
			redirect,
		})
	}

	/// The identity's verified email and the local user owning it, if any.
	///
	/// An identity without a verified email cannot be reconciled at all;
	/// that is surfaced before the table is consulted.
	async fn find_same_email_user(
		&self,
		identity: &ProviderIdentity,
		redirect: &Url,
	) -> Result<(String, Option<User>), CallbackError> {
		let Some(email) = identity.verified_email() else {
			return Err(CallbackError::ProviderEmailUnverified {
				redirect: redirect.clone(),
			});
		};
		let user = self.users.find_by_email(email).await?;
		Ok((email.to_string(), user))
	}

	async fn load_linked_user(&self, link: &ExternalIdentity) -> Result<User, CallbackError> {
		self.users.find_by_id(&link.user_id).await?.ok_or_else(|| {
			CallbackError::Db(DbError::Internal(format!(
				"external identity {} references missing user",
				link.id
			)))
		})
	}

	async fn issue_login(&self, user: User) -> Result<AuthenticatedUser, CallbackError> {
		let (session, secret) = LoginSession::issue_for(user.id);
		self.logins.save(&session).await?;
		let token = session.token(&secret);
		Ok(AuthenticatedUser {
			user,
			session,
			token,
		})
	}
}
