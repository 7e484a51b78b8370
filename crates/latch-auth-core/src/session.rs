// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The generic ephemeral credentialed session.
//!
//! Five flows (login, signup, password reset, email verification, account
//! linking) all need the same thing: a short-lived server-side record proving
//! a bounded capability, addressed by an opaque id, guarded by a hashed
//! bearer secret, and dead the instant its expiry passes. Instead of five
//! hand-copied entities, [`Session<K>`] is one entity parameterized by a
//! [`SessionKind`] that supplies the payload, the expiry span, and the key
//! that enforces the at-most-one-active-session rule.
//!
//! # Lifecycle
//!
//! ```text
//! Requested ──(verify code)──> EmailVerified ──(confirm)──> deleted
//!     │                             │
//!     └────────── now >= expires_at ┴──> Expired (== absent; swept on access)
//! ```
//!
//! Expiry is checked as `now >= expires_at`: a session is valid at
//! `expires_at - 1ms` and gone at `expires_at` exactly.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::code::VerificationCode;
use crate::ids::{SessionId, UserId};
use crate::secret::{SecretHash, SessionSecret};
use crate::token::SessionToken;
use crate::user::OAuthProvider;

// =============================================================================
// Expiry spans
// =============================================================================

/// Login session lifetime in days.
pub const LOGIN_SESSION_TTL_DAYS: i64 = 30;

/// Signup session lifetime in minutes, before the email is verified.
pub const SIGNUP_SESSION_PENDING_TTL_MINUTES: i64 = 30;

/// Signup session lifetime in hours, once the email is verified.
///
/// The extension gives the user time to finish filling in the account form
/// without reopening the email-interception window of the first phase.
pub const SIGNUP_SESSION_VERIFIED_TTL_HOURS: i64 = 24;

/// Password-reset session lifetime in minutes.
pub const PASSWORD_RESET_SESSION_TTL_MINUTES: i64 = 30;

/// Email-verification (address change) session lifetime in minutes.
pub const EMAIL_VERIFICATION_SESSION_TTL_MINUTES: i64 = 30;

/// Account-link session lifetime in minutes.
pub const ACCOUNT_LINK_SESSION_TTL_MINUTES: i64 = 30;

// =============================================================================
// SessionKind
// =============================================================================

/// Static configuration of one session family.
pub trait SessionKind: Send + Sync + 'static {
	/// Kind-specific fields persisted alongside the common ones.
	type Payload: Clone + fmt::Debug + Send + Sync;

	/// The key under which at most one active session may exist.
	type OwnerKey: Clone + fmt::Debug + PartialEq + Send + Sync;

	/// Kind name, used in spans and storage table names.
	const NAME: &'static str;

	/// Validity span applied at issuance.
	fn ttl() -> Duration;

	/// Extract the at-most-one key from a payload.
	fn owner_key(payload: &Self::Payload) -> Self::OwnerKey;
}

// =============================================================================
// Session
// =============================================================================

/// An ephemeral credentialed session of kind `K`.
///
/// The plaintext secret is returned exactly once, at issuance; the entity
/// keeps only its hash. Presented tokens are checked with
/// [`verify_secret`](Self::verify_secret), which compares in constant time.
pub struct Session<K: SessionKind> {
	/// Unique, never-reused identifier (UUID v7, time-ordered).
	pub id: SessionId,

	/// SHA-256 hash of the bearer secret.
	pub secret_hash: SecretHash,

	/// When the session was issued.
	pub created_at: DateTime<Utc>,

	/// When the session stops existing for all purposes.
	pub expires_at: DateTime<Utc>,

	/// Kind-specific payload.
	pub payload: K::Payload,
}

impl<K: SessionKind> Session<K> {
	/// Issue a new session with a fresh id and secret.
	///
	/// Returns the entity (hash at rest) and the plaintext secret. The
	/// caller assembles the bearer token and must not persist the secret.
	pub fn issue(payload: K::Payload) -> (Self, SessionSecret) {
		let now = Utc::now();
		let secret = SessionSecret::generate();
		let session = Self {
			id: SessionId::generate(),
			secret_hash: SecretHash::of(&secret),
			created_at: now,
			expires_at: now + K::ttl(),
			payload,
		};
		tracing::debug!(
			kind = K::NAME,
			session_id = %session.id,
			expires_at = %session.expires_at,
			"issued session"
		);
		(session, secret)
	}

	/// Assemble the bearer token for this session.
	///
	/// Only useful at issuance time, while the plaintext secret is in hand.
	pub fn token(&self, secret: &SessionSecret) -> SessionToken {
		SessionToken::new(self.id, secret)
	}

	/// Whether the session is expired at `now`.
	///
	/// Expired means `now >= expires_at`; an expired session is equivalent
	/// to an absent one everywhere except the sweep that deletes the row.
	pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
		now >= self.expires_at
	}

	/// Whether the session is expired right now.
	pub fn is_expired(&self) -> bool {
		self.is_expired_at(Utc::now())
	}

	/// Constant-time check of a presented secret against the stored hash.
	pub fn verify_secret(&self, candidate: &str) -> bool {
		self.secret_hash.verify(candidate)
	}

	/// The key enforcing the at-most-one-active-session invariant.
	pub fn owner_key(&self) -> K::OwnerKey {
		K::owner_key(&self.payload)
	}
}

impl<K: SessionKind> Clone for Session<K> {
	fn clone(&self) -> Self {
		Self {
			id: self.id,
			secret_hash: self.secret_hash.clone(),
			created_at: self.created_at,
			expires_at: self.expires_at,
			payload: self.payload.clone(),
		}
	}
}

impl<K: SessionKind> fmt::Debug for Session<K> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("Session")
			.field("kind", &K::NAME)
			.field("id", &self.id)
			.field("secret_hash", &self.secret_hash)
			.field("created_at", &self.created_at)
			.field("expires_at", &self.expires_at)
			.field("payload", &self.payload)
			.finish()
	}
}

// =============================================================================
// Login
// =============================================================================

/// Marker for login sessions: the long-lived "you are logged in" credential.
pub enum Login {}

/// Payload of a login session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginPayload {
	/// The authenticated user.
	pub user_id: UserId,
}

impl SessionKind for Login {
	type Payload = LoginPayload;
	type OwnerKey = UserId;
	const NAME: &'static str = "login";

	fn ttl() -> Duration {
		Duration::days(LOGIN_SESSION_TTL_DAYS)
	}

	fn owner_key(payload: &Self::Payload) -> Self::OwnerKey {
		payload.user_id
	}
}

/// A login session.
pub type LoginSession = Session<Login>;

impl Session<Login> {
	/// Issue a login session for an authenticated user.
	///
	/// Login sessions are the one kind without the at-most-one rule: a user
	/// may be logged in from several devices, so issuing never deletes
	/// siblings. Logout deletes one; a password change deletes all.
	pub fn issue_for(user_id: UserId) -> (Self, SessionSecret) {
		Self::issue(LoginPayload { user_id })
	}

	/// The authenticated user.
	pub fn user_id(&self) -> UserId {
		self.payload.user_id
	}
}

// =============================================================================
// Signup
// =============================================================================

/// Marker for signup sessions: pre-account email challenges.
pub enum Signup {}

/// Payload of a signup session.
#[derive(Debug, Clone)]
pub struct SignupPayload {
	/// The address being claimed. Keyed: one active signup per email.
	pub email: String,
	/// The emailed challenge code.
	pub code: VerificationCode,
	/// Whether the challenge has been passed.
	pub email_verified: bool,
}

impl SessionKind for Signup {
	type Payload = SignupPayload;
	type OwnerKey = String;
	const NAME: &'static str = "signup";

	fn ttl() -> Duration {
		Duration::minutes(SIGNUP_SESSION_PENDING_TTL_MINUTES)
	}

	fn owner_key(payload: &Self::Payload) -> Self::OwnerKey {
		payload.email.clone()
	}
}

/// A signup session.
pub type SignupSession = Session<Signup>;

impl Session<Signup> {
	/// Start a signup for an email address.
	pub fn request(email: impl Into<String>) -> (Self, SessionSecret) {
		Self::issue(SignupPayload {
			email: email.into(),
			code: VerificationCode::generate(),
			email_verified: false,
		})
	}

	/// Record a passed email challenge and extend into the second phase.
	///
	/// Callers enforce the single-use rule (`email_verified` must be false
	/// on entry) and the constant-time code comparison before calling.
	pub fn mark_email_verified(&mut self) {
		self.payload.email_verified = true;
		self.expires_at = Utc::now() + Duration::hours(SIGNUP_SESSION_VERIFIED_TTL_HOURS);
	}
}

// =============================================================================
// PasswordReset
// =============================================================================

/// Marker for password-reset sessions.
pub enum PasswordReset {}

/// Payload of a password-reset session.
#[derive(Debug, Clone)]
pub struct PasswordResetPayload {
	/// The account whose password is being reset. Keyed: one active reset
	/// per user.
	pub user_id: UserId,
	/// The emailed challenge code.
	pub code: VerificationCode,
	/// Whether the challenge has been passed.
	pub email_verified: bool,
}

impl SessionKind for PasswordReset {
	type Payload = PasswordResetPayload;
	type OwnerKey = UserId;
	const NAME: &'static str = "password_reset";

	fn ttl() -> Duration {
		Duration::minutes(PASSWORD_RESET_SESSION_TTL_MINUTES)
	}

	fn owner_key(payload: &Self::Payload) -> Self::OwnerKey {
		payload.user_id
	}
}

/// A password-reset session.
pub type PasswordResetSession = Session<PasswordReset>;

impl Session<PasswordReset> {
	/// Start a password reset for a user.
	pub fn request(user_id: UserId) -> (Self, SessionSecret) {
		Self::issue(PasswordResetPayload {
			user_id,
			code: VerificationCode::generate(),
			email_verified: false,
		})
	}

	/// Record a passed email challenge. The reset span is short enough that
	/// no second-phase extension applies.
	pub fn mark_email_verified(&mut self) {
		self.payload.email_verified = true;
	}
}

// =============================================================================
// EmailVerification
// =============================================================================

/// Marker for email-verification sessions (address changes).
pub enum EmailVerification {}

/// Payload of an email-verification session.
#[derive(Debug, Clone)]
pub struct EmailVerificationPayload {
	/// The account changing its address. Keyed: one active change per user.
	pub user_id: UserId,
	/// The new address being claimed. Denormalized so the confirm step can
	/// detect a registration race on it.
	pub email: String,
	/// The code emailed to the new address.
	pub code: VerificationCode,
}

impl SessionKind for EmailVerification {
	type Payload = EmailVerificationPayload;
	type OwnerKey = UserId;
	const NAME: &'static str = "email_verification";

	fn ttl() -> Duration {
		Duration::minutes(EMAIL_VERIFICATION_SESSION_TTL_MINUTES)
	}

	fn owner_key(payload: &Self::Payload) -> Self::OwnerKey {
		payload.user_id
	}
}

/// An email-verification session.
pub type EmailVerificationSession = Session<EmailVerification>;

impl Session<EmailVerification> {
	/// Start an address change for a user.
	///
	/// Confirmation is single-step: a correct code performs the change and
	/// deletes the session, so no intermediate verified flag exists.
	pub fn request(user_id: UserId, new_email: impl Into<String>) -> (Self, SessionSecret) {
		Self::issue(EmailVerificationPayload {
			user_id,
			email: new_email.into(),
			code: VerificationCode::generate(),
		})
	}
}

// =============================================================================
// AccountLink
// =============================================================================

/// Marker for account-link sessions: the bridge between a local account and
/// a federated identity that claims the same email.
pub enum AccountLink {}

/// Payload of an account-link session.
#[derive(Debug, Clone)]
pub struct AccountLinkPayload {
	/// The local account proposed for linking. Keyed: one active proposal
	/// per user.
	pub user_id: UserId,
	/// The shared email that triggered the proposal.
	pub email: String,
	/// The provider of the federated identity.
	pub provider: OAuthProvider,
	/// The user's id at the provider.
	pub provider_user_id: String,
	/// The emailed challenge code; `None` until the link is challenged.
	pub code: Option<VerificationCode>,
}

impl SessionKind for AccountLink {
	type Payload = AccountLinkPayload;
	type OwnerKey = UserId;
	const NAME: &'static str = "account_link";

	fn ttl() -> Duration {
		Duration::minutes(ACCOUNT_LINK_SESSION_TTL_MINUTES)
	}

	fn owner_key(payload: &Self::Payload) -> Self::OwnerKey {
		payload.user_id
	}
}

/// An account-link session.
pub type AccountLinkSession = Session<AccountLink>;

impl Session<AccountLink> {
	/// Propose linking a federated identity to an existing local account.
	///
	/// Created un-challenged; the code is minted by [`challenge`](Self::challenge)
	/// when the user asks to proceed.
	pub fn propose(
		user_id: UserId,
		email: impl Into<String>,
		provider: OAuthProvider,
		provider_user_id: impl Into<String>,
	) -> (Self, SessionSecret) {
		Self::issue(AccountLinkPayload {
			user_id,
			email: email.into(),
			provider,
			provider_user_id: provider_user_id.into(),
			code: None,
		})
	}

	/// Mint the challenge code, returning a copy for the email body.
	///
	/// Re-challenging replaces the previous code; only the latest one
	/// matches afterwards.
	pub fn challenge(&mut self) -> VerificationCode {
		let code = VerificationCode::generate();
		self.payload.code = Some(code.clone());
		code
	}

	/// True once a challenge code has been minted.
	pub fn is_challenged(&self) -> bool {
		self.payload.code.is_some()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	mod expiry {
		use super::*;

		#[test]
		fn valid_one_millisecond_before_expiry() {
			let (session, _) = LoginSession::issue_for(UserId::generate());
			let boundary = session.expires_at;
			assert!(!session.is_expired_at(boundary - Duration::milliseconds(1)));
		}

		#[test]
		fn expired_exactly_at_expiry() {
			let (session, _) = LoginSession::issue_for(UserId::generate());
			assert!(session.is_expired_at(session.expires_at));
		}

		#[test]
		fn expired_after_expiry() {
			let (session, _) = LoginSession::issue_for(UserId::generate());
			assert!(session.is_expired_at(session.expires_at + Duration::seconds(1)));
		}

		#[test]
		fn fresh_sessions_are_not_expired() {
			let (session, _) = SignupSession::request("a@x.com");
			assert!(!session.is_expired());
		}
	}

	mod issuance {
		use super::*;

		#[test]
		fn login_ttl_is_thirty_days() {
			let (session, _) = LoginSession::issue_for(UserId::generate());
			assert_eq!(
				session.expires_at - session.created_at,
				Duration::days(LOGIN_SESSION_TTL_DAYS)
			);
		}

		#[test]
		fn signup_starts_with_pending_ttl() {
			let (session, _) = SignupSession::request("a@x.com");
			assert_eq!(
				session.expires_at - session.created_at,
				Duration::minutes(SIGNUP_SESSION_PENDING_TTL_MINUTES)
			);
		}

		#[test]
		fn ids_are_never_reused() {
			let (a, _) = SignupSession::request("a@x.com");
			let (b, _) = SignupSession::request("a@x.com");
			assert_ne!(a.id, b.id);
		}

		#[test]
		fn issued_secret_verifies_and_only_it() {
			let (session, secret) = LoginSession::issue_for(UserId::generate());
			assert!(session.verify_secret(secret.expose()));
			assert!(!session.verify_secret("wrong"));
		}

		#[test]
		fn token_carries_id_and_secret() {
			let (session, secret) = LoginSession::issue_for(UserId::generate());
			let token = session.token(&secret);
			assert_eq!(token.session_id(), Some(session.id));
			assert_eq!(token.secret_part(), secret.expose());
		}
	}

	mod signup_transitions {
		use super::*;

		#[test]
		fn verification_extends_expiry() {
			let (mut session, _) = SignupSession::request("a@x.com");
			let first_phase = session.expires_at;
			session.mark_email_verified();
			assert!(session.payload.email_verified);
			assert!(session.expires_at > first_phase);
			let second_phase = session.expires_at - Utc::now();
			assert!(second_phase > Duration::hours(SIGNUP_SESSION_VERIFIED_TTL_HOURS - 1));
		}
	}

	mod password_reset_transitions {
		use super::*;

		#[test]
		fn verification_does_not_extend_expiry() {
			let (mut session, _) = PasswordResetSession::request(UserId::generate());
			let expires = session.expires_at;
			session.mark_email_verified();
			assert!(session.payload.email_verified);
			assert_eq!(session.expires_at, expires);
		}
	}

	mod account_link_transitions {
		use super::*;

		#[test]
		fn proposal_starts_unchallenged() {
			let (session, _) = AccountLinkSession::propose(
				UserId::generate(),
				"a@x.com",
				OAuthProvider::Discord,
				"snowflake-1",
			);
			assert!(!session.is_challenged());
			assert!(session.payload.code.is_none());
		}

		#[test]
		fn challenge_mints_matching_code() {
			let (mut session, _) = AccountLinkSession::propose(
				UserId::generate(),
				"a@x.com",
				OAuthProvider::Google,
				"sub-1",
			);
			let code = session.challenge();
			assert!(session.is_challenged());
			assert!(session.payload.code.as_ref().unwrap().matches(code.as_str()));
		}

		#[test]
		fn rechallenge_replaces_code() {
			let (mut session, _) = AccountLinkSession::propose(
				UserId::generate(),
				"a@x.com",
				OAuthProvider::Google,
				"sub-1",
			);
			let first = session.challenge();
			let second = session.challenge();
			let stored = session.payload.code.as_ref().unwrap();
			assert!(stored.matches(second.as_str()));
			if first.as_str() != second.as_str() {
				assert!(!stored.matches(first.as_str()));
			}
		}
	}

	mod owner_keys {
		use super::*;

		#[test]
		fn signup_is_keyed_by_email() {
			let (session, _) = SignupSession::request("key@x.com");
			assert_eq!(session.owner_key(), "key@x.com".to_string());
		}

		#[test]
		fn reset_is_keyed_by_user() {
			let user_id = UserId::generate();
			let (session, _) = PasswordResetSession::request(user_id);
			assert_eq!(session.owner_key(), user_id);
		}
	}
}
