//! Core type definitions with validation.

use std::borrow::{Borrow, Cow};
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// An interval ends before it starts.
    #[error("interval for subject {subject} ends before it starts ({start} > {end})")]
    InvertedInterval {
        subject: String,
        start: String,
        end: String,
    },

    /// A configured duration was negative.
    #[error("{field} must be non-negative, got {days} days")]
    NegativeDuration { field: &'static str, days: i64 },

    /// A configured duration exceeds what the calendar arithmetic supports.
    #[error("{field} must be at most {max} days, got {days} days")]
    DurationTooLarge {
        field: &'static str,
        days: i64,
        max: i64,
    },

    /// An exclusion rule pattern failed to compile.
    #[error("invalid pattern in exclusion rule {rule}: {message}")]
    InvalidPattern { rule: String, message: String },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
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

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated subject identifier.
    ///
    /// Subjects are pseudonymous and opaque; every interval and event is scoped to one.
    SubjectId, "subject"
);

/// A region tag from an open set.
///
/// The well-known tags are [`RegionLabel::CORE`], [`RegionLabel::BUFFER_BEFORE`] and
/// [`RegionLabel::BUFFER_AFTER`]; any other non-empty tag is accepted so new region
/// types need no changes to the partitioning code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RegionLabel(Cow<'static, str>);

impl RegionLabel {
    /// The admission itself.
    pub const CORE: Self = Self(Cow::Borrowed("CORE"));
    /// The window leading up to an admission.
    pub const BUFFER_BEFORE: Self = Self(Cow::Borrowed("BUFFER_BEFORE"));
    /// The window following a discharge.
    pub const BUFFER_AFTER: Self = Self(Cow::Borrowed("BUFFER_AFTER"));

    /// The well-known labels, in canonical order.
    pub const WELL_KNOWN: [Self; 3] = [Self::BUFFER_AFTER, Self::BUFFER_BEFORE, Self::CORE];

    /// Creates a label after validation.
    pub fn new(label: impl Into<String>) -> Result<Self, ValidationError> {
        let label = label.into();
        let trimmed = label.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::Empty {
                field: "region label",
            });
        }
        Ok(Self(Cow::Owned(trimmed.to_string())))
    }

    /// Returns the label as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RegionLabel {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RegionLabel> for String {
    fn from(label: RegionLabel) -> Self {
        label.0.into_owned()
    }
}

impl fmt::Display for RegionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A set of region labels with a fixed lexicographic order.
///
/// The ordering makes equality and serialization stable across runs, which the
/// partitioner relies on when deciding whether two neighbouring cells coalesce.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeSet<RegionLabel>);

/// Shared empty set handed out for unmatched lookups.
pub(crate) static EMPTY_LABELS: LabelSet = LabelSet::new();

impl LabelSet {
    /// Creates an empty label set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// Creates a set holding a single label.
    #[must_use]
    pub fn single(label: RegionLabel) -> Self {
        let mut set = BTreeSet::new();
        set.insert(label);
        Self(set)
    }

    pub fn insert(&mut self, label: RegionLabel) -> bool {
        self.0.insert(label)
    }

    pub fn contains(&self, label: &RegionLabel) -> bool {
        self.0.contains(label)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates labels in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = &RegionLabel> {
        self.0.iter()
    }
}

impl FromIterator<RegionLabel> for LabelSet {
    fn from_iter<I: IntoIterator<Item = RegionLabel>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a LabelSet {
    type Item = &'a RegionLabel;
    type IntoIter = std::collections::btree_set::Iter<'a, RegionLabel>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (idx, label) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{label}")?;
        }
        f.write_str("}")
    }
}
