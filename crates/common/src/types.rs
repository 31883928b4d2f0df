use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates the identifier from any string-like value.
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id! {
    /// Stock keeping unit. Identifies a product and every batch of it.
    Sku
}

string_id! {
    /// Unique reference of a purchased batch.
    BatchReference
}

string_id! {
    /// Identifier of the customer order an order line belongs to.
    OrderId
}

/// Optimistic-concurrency token of a product aggregate.
///
/// Starts at 0 for a product that has never been allocated against and is
/// bumped by one on every successful allocation. Storage backends refuse a
/// commit whose loaded version no longer matches the stored one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// Creates a version from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the version of a freshly created product.
    pub fn initial() -> Self {
        Self(0)
    }

    /// Returns the following version.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_ids_compare_by_value() {
        assert_eq!(Sku::new("RED-CHAIR"), Sku::from("RED-CHAIR"));
        assert_ne!(BatchReference::new("b1"), BatchReference::new("b2"));
        assert_eq!(OrderId::from("o1".to_string()).as_str(), "o1");
    }

    #[test]
    fn string_ids_serialize_transparently() {
        let json = serde_json::to_string(&Sku::new("LAMP")).unwrap();
        assert_eq!(json, "\"LAMP\"");

        let reference: BatchReference = serde_json::from_str("\"batch-001\"").unwrap();
        assert_eq!(reference.to_string(), "batch-001");
    }

    #[test]
    fn version_starts_at_zero_and_increments() {
        let version = Version::initial();
        assert_eq!(version.as_i64(), 0);
        assert_eq!(version.next(), Version::new(1));
        assert!(version.next() > version);
    }
}
