// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core session, token, and credential types for Latch.
//!
//! This crate is the pure domain layer of the account system: no I/O, no
//! storage, no HTTP. It defines:
//!
//! - **ID newtypes** ([`UserId`], [`SessionId`], [`IdentityId`]) so ids of
//!   different entities cannot be mixed up
//! - **The token codec** ([`SessionToken`]) for the `{id}.{secret}` bearer
//!   format shared by every session kind
//! - **The secret hasher** ([`SessionSecret`], [`SecretHash`]) — plaintext
//!   secrets live only inside issued tokens; storage keeps hashes and all
//!   comparisons are constant-time
//! - **Verification codes** ([`VerificationCode`]) — eight CSPRNG digits,
//!   single-use, constant-time matched
//! - **Entities** ([`User`], [`ExternalIdentity`]) and the generic
//!   [`Session`] parameterized over the five [`SessionKind`]s
//!
//! Storage and the lifecycle use cases live in the `latch-server-*` crates.

pub mod code;
pub mod ids;
pub mod secret;
pub mod session;
pub mod token;
pub mod user;

pub use code::{CodeFormatError, VerificationCode, VERIFICATION_CODE_DIGITS};
pub use ids::{IdentityId, SessionId, UserId};
pub use secret::{SecretHash, SessionSecret, SESSION_SECRET_BYTES, SESSION_SECRET_LEN};
pub use session::{
	AccountLink, AccountLinkPayload, AccountLinkSession, EmailVerification,
	EmailVerificationPayload, EmailVerificationSession, Login, LoginPayload, LoginSession,
	PasswordReset, PasswordResetPayload, PasswordResetSession, Session, SessionKind, Signup,
	SignupPayload, SignupSession, ACCOUNT_LINK_SESSION_TTL_MINUTES,
	EMAIL_VERIFICATION_SESSION_TTL_MINUTES, LOGIN_SESSION_TTL_DAYS,
	PASSWORD_RESET_SESSION_TTL_MINUTES, SIGNUP_SESSION_PENDING_TTL_MINUTES,
	SIGNUP_SESSION_VERIFIED_TTL_HOURS,
};
pub use token::{SessionToken, TOKEN_SEPARATOR};
pub use user::{
	ExternalIdentity, Gender, OAuthProvider, ParseGenderError, ParseProviderError, User,
};
