//! Identifier newtypes.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an ID from an existing string.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a new unique ID using ULID.
            #[must_use]
            pub fn generate() -> Self {
                Self(ulid::Ulid::new().to_string().to_lowercase())
            }

            /// Get the ID as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }
    };
}

string_id! {
    /// Unique identifier for a registered model.
    ModelId
}

string_id! {
    /// Unique identifier for one trained version of a model.
    VersionId
}

string_id! {
    /// Unique identifier for a deployment record.
    DeploymentId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique() {
        let a = DeploymentId::generate();
        let b = DeploymentId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn display_matches_inner() {
        let id = ModelId::new("fraud-detector");
        assert_eq!(id.to_string(), "fraud-detector");
        assert_eq!(id.as_str(), "fraud-detector");
    }

    #[test]
    fn serde_is_transparent() {
        let id = VersionId::new("v42");
        let json = serde_json::to_string(&id).expect("serialise");
        assert_eq!(json, r#""v42""#);

        let parsed: VersionId = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(parsed, id);
    }
}
