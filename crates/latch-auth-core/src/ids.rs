// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! ID newtypes for auth entities.
//!
//! Each entity gets its own opaque wrapper around [`uuid::Uuid`] so that a
//! `UserId` can never be passed where a `SessionId` is expected. Construction
//! from strings goes through [`std::str::FromStr`], which validates the UUID
//! format once at the boundary.
//!
//! Session ids use UUID v7 (time-ordered), so freshly issued sessions sort
//! after older ones in storage. User and identity ids use v4.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id_type {
	($name:ident, $generate:expr, $doc:expr) => {
		#[doc = $doc]
		#[derive(
			Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
		)]
		#[serde(transparent)]
		pub struct $name(Uuid);

		impl $name {
			/// Create a new ID from a UUID.
			pub fn new(id: Uuid) -> Self {
				Self(id)
			}

			/// Generate a new random ID.
			pub fn generate() -> Self {
				Self($generate())
			}

			/// Get the inner UUID value.
			pub fn into_inner(self) -> Uuid {
				self.0
			}

			/// Get a reference to the inner UUID.
			pub fn as_uuid(&self) -> &Uuid {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				write!(f, "{}", self.0)
			}
		}

		impl FromStr for $name {
			type Err = uuid::Error;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Ok(Self(Uuid::parse_str(s)?))
			}
		}

		impl From<Uuid> for $name {
			fn from(id: Uuid) -> Self {
				Self(id)
			}
		}

		impl From<$name> for Uuid {
			fn from(id: $name) -> Self {
				id.0
			}
		}
	};
}

define_id_type!(UserId, Uuid::new_v4, "Unique identifier for a user.");
define_id_type!(
	IdentityId,
	Uuid::new_v4,
	"Unique identifier for a linked external identity."
);
define_id_type!(
	SessionId,
	Uuid::now_v7,
	"Unique identifier for a session of any kind. Time-ordered (UUID v7)."
);
