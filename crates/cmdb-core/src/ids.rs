//! Strongly Typed Identifiers
//!
//! Newtype wrappers that keep tenant, model and instance identifiers apart
//! at compile time.
//!
//! # Example
//!
//! ```
//! use cmdb_core::{InstanceId, ObjectType, TenantId};
//!
//! let tenant = TenantId::from("0");
//! let object_type = ObjectType::from("host");
//! let instance: InstanceId = "42".parse().unwrap();
//!
//! assert_eq!(tenant.as_str(), "0");
//! assert_eq!(object_type.to_string(), "host");
//! assert_eq!(instance.get(), 42);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::error::CoreError;

/// Macro to define a string-backed identifier.
macro_rules! define_name_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from any string-like value.
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns true if the identifier is the empty string.
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

/// Macro to define a store-assigned numeric identifier.
macro_rules! define_numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Creates an identifier from a raw value.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw value.
            #[must_use]
            pub const fn get(&self) -> i64 {
                self.0
            }

            /// Returns true for the zero value, which means "not assigned".
            #[must_use]
            pub const fn is_zero(&self) -> bool {
                self.0 == 0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                s.trim()
                    .parse::<i64>()
                    .map(Self)
                    .map_err(|e| CoreError::InvalidId {
                        id_type: stringify!($name),
                        message: e.to_string(),
                    })
            }
        }
    };
}

define_name_id!(
    /// Owner (tenant) identifier, e.g. the supplier account `"0"`.
    TenantId
);

define_name_id!(
    /// Model identifier of a CI, e.g. `"host"` or `"bk_switch"`.
    ObjectType
);

define_numeric_id!(
    /// Store-assigned identifier of a persisted CI.
    InstanceId
);

define_numeric_id!(
    /// Business identifier. Zero means the resource belongs to no business.
    BizId
);
