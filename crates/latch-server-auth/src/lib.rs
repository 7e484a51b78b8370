// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Account lifecycle use cases for Latch.
//!
//! Each flow is a service over collaborator traits:
//!
//! - [`SignupService`] — request → verify emailed code → confirm, ending in
//!   a new [`latch_auth_core::User`] plus a login session
//! - [`LoginService`] — password login, token authentication, logout,
//!   invalidate-all
//! - [`PasswordResetService`] — request → verify → confirm, rotating the
//!   credential and logging out every device
//! - [`EmailChangeService`] — request → confirm against the new address
//!
//! Collaborators ([`EmailGateway`], [`CaptchaGateway`], [`RateLimiter`]) and
//! the storage traits from `latch-server-db`/`latch-server-sessions` are
//! injected as trait objects; [`testing`] provides fakes for them.

pub mod captcha;
pub mod email;
pub mod email_change;
pub mod login;
pub mod password;
pub mod password_reset;
pub mod rate_limit;
pub mod signup;
pub mod testing;

mod argon2_config;

pub use captcha::{CaptchaError, CaptchaGateway, TurnstileClient};
pub use email::{render_email, EmailError, EmailGateway, EmailTemplate};
pub use email_change::{EmailChangeChallenge, EmailChangeError, EmailChangeService};
pub use login::{AuthenticatedUser, LoginError, LoginService};
pub use password::{
	hash_password, verify_dummy_password, verify_password, PasswordError, MIN_PASSWORD_LEN,
};
pub use password_reset::{PasswordResetChallenge, PasswordResetError, PasswordResetService};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use signup::{SignupChallenge, SignupError, SignupProfile, SignupRequest, SignupService};
