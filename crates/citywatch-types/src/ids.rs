//! Type-safe identifier wrappers.
//!
//! Operation events and channel subscriptions carry strongly-typed IDs so
//! the two can never be mixed up at a call site. Subscription IDs are
//! minted here as UUID v7 (time-ordered). Operation IDs come from the
//! upstream feed, which may send either numbers or strings.

use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
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

/// Identifier of an operation event, unique within one operations payload.
///
/// Accepts a JSON string or an integer on input and always serializes as a
/// string, so `1` and `"1"` name the same operation.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct OperationId(String);

impl OperationId {
    /// Mint a fresh identifier (UUID v7) for locally created operations.
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// The identifier as sent by the feed.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for OperationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for OperationId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<u64> for OperationId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl<'de> Deserialize<'de> for OperationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = OperationId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string or integer operation id")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<OperationId, E> {
                if v.is_empty() {
                    return Err(E::invalid_value(de::Unexpected::Str(v), &self));
                }
                Ok(OperationId::from(v))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<OperationId, E> {
                if v.is_empty() {
                    return Err(E::invalid_value(de::Unexpected::Str(&v), &self));
                }
                Ok(OperationId(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<OperationId, E> {
                Ok(OperationId::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<OperationId, E> {
                Ok(OperationId(v.to_string()))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

define_id! {
    /// Handle identifying one handler registered on a channel adapter.
    SubscriptionId
}
