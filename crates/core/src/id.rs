// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier types.
//!
//! Locally-generated identifiers carry a short type prefix followed by a
//! nanoid suffix (`proc-`, `que-`, `req-`, `msg-`). Session identifiers are
//! assigned by the agent runtime; until the runtime reports one, a Process
//! carries a provisional `local-` identifier.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Length of the random suffix appended to generated identifiers.
const ID_SUFFIX_LEN: usize = 12;

/// Define a newtype identifier with a type prefix.
///
/// Generates `generate()` for random identifiers, `from_string()` for
/// parsing, `as_str()`, `Display`, `From<&str>`/`From<String>`,
/// `PartialEq<str>`, and `Borrow<str>` implementations.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident($prefix:literal);
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub const PREFIX: &'static str = $prefix;

            /// Generate a new random identifier with the type prefix.
            pub fn generate() -> Self {
                Self(format!("{}{}", Self::PREFIX, nanoid::nanoid!(ID_SUFFIX_LEN)))
            }

            /// Create an identifier from an existing string.
            pub fn from_string(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_id! {
    /// Identifier for one Process instance, stable for its lifetime.
    pub struct ProcessId("proc-");
}

define_id! {
    /// Identifier for a waiting-queue entry.
    pub struct QueueId("que-");
}

define_id! {
    /// Identifier for a pending input request (tool approval or prompt).
    pub struct InputRequestId("req-");
}

define_id! {
    /// Identifier assigned to a queued user message; the same identifier
    /// appears in the agent runtime's persistent log, allowing clients to
    /// de-duplicate the in-memory echo against the on-disk record.
    pub struct MessageId("msg-");
}

/// Identifier for an agent session, assigned by the agent runtime.
///
/// Provisional identifiers (prefix `local-`) are generated before the
/// runtime has reported the authoritative one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    const PROVISIONAL_PREFIX: &'static str = "local-";

    /// Create a SessionId from a runtime-assigned string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a provisional identifier for a session the runtime has not
    /// yet named.
    pub fn provisional() -> Self {
        Self(format!("{}{}", Self::PROVISIONAL_PREFIX, nanoid::nanoid!(ID_SUFFIX_LEN)))
    }

    /// True when this identifier was locally generated rather than assigned
    /// by the agent runtime.
    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(Self::PROVISIONAL_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl PartialEq<str> for SessionId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for SessionId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
