//! The typed attribute-value union consumed by the store's wire form and by
//! the expected/update maps passed into [`crate::core::transaction`].
//!
//! This is one of the design-notes call-outs: the original source passed
//! dynamically-typed `{type_tag: value}` dicts everywhere. We give that shape
//! an explicit Rust type instead, matching the six scalar/set kinds the
//! store actually supports.

use std::collections::BTreeSet;

/// A single attribute value in the store's typed wire form.
#[derive(Debug, Clone, PartialEq, PartialOrd, serde::Serialize, serde::Deserialize)]
pub enum AttributeValue {
    /// `S` — a UTF-8 string.
    S(String),
    /// `N` — a number, carried as its canonical string form.
    N(String),
    /// `B` — an opaque byte blob.
    B(Vec<u8>),
    /// `SS` — a set of strings.
    SS(BTreeSet<String>),
    /// `NS` — a set of numbers, each carried as its canonical string form.
    NS(BTreeSet<String>),
    /// `BS` — a set of byte blobs.
    BS(BTreeSet<Vec<u8>>),
}

impl AttributeValue {
    /// Builds an `S` value from anything string-like.
    pub fn s(value: impl Into<String>) -> Self {
        Self::S(value.into())
    }

    /// Builds an `N` value by formatting a number into its canonical string.
    pub fn n(value: impl ToString) -> Self {
        Self::N(value.to_string())
    }

    /// Builds a `B` value from raw bytes.
    pub fn b(value: impl Into<Vec<u8>>) -> Self {
        Self::B(value.into())
    }

    /// The type tag this value serialises under on the wire (`"S"`, `"N"`, ...).
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
            Self::B(_) => "B",
            Self::SS(_) => "SS",
            Self::NS(_) => "NS",
            Self::BS(_) => "BS",
        }
    }

    /// Returns the scalar string form for `S`/`N` values, used by the key
    /// resolver when stringifying hash/range key values.
    pub fn as_scalar_string(&self) -> Option<&str> {
        match self {
            Self::S(v) | Self::N(v) => Some(v),
            _ => None,
        }
    }
}

/// A map of attribute name to typed value — the shape of an item, a key
/// descriptor, or an `ALL_OLD` return image.
pub type AttributeMap = std::collections::BTreeMap<String, AttributeValue>;
