//! Core newtypes for type-safe index operations.
//!
//! These types prevent mixing up related but semantically different values,
//! most importantly external labels versus dense internal indices.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An externally supplied label carried alongside a stored vector.
///
/// Labels are opaque to the index: they are not required to be unique, are
/// never used for lookup, and are returned verbatim in search results. The
/// distinct newtype keeps them from being confused with internal indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Label(pub i32);

impl Label {
    /// Create a new Label.
    #[inline]
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Get the raw i32 value.
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Label({})", self.0)
    }
}

impl From<i32> for Label {
    #[inline]
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl From<Label> for i32 {
    #[inline]
    fn from(label: Label) -> Self {
        label.0
    }
}

/// The dimensionality of vectors in an index.
///
/// Bound at construction and immutable for the lifetime of the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Dimension(pub usize);

impl Dimension {
    /// Create a new Dimension.
    #[inline]
    pub const fn new(dim: usize) -> Self {
        Self(dim)
    }

    /// Get the raw usize value.
    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Check if this dimension is divisible by a given number.
    #[inline]
    pub fn is_divisible_by(self, divisor: usize) -> bool {
        divisor != 0 && self.0 % divisor == 0
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for Dimension {
    #[inline]
    fn from(dim: usize) -> Self {
        Self(dim)
    }
}

impl From<Dimension> for usize {
    #[inline]
    fn from(dim: Dimension) -> Self {
        dim.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label() {
        let label = Label::new(42);
        assert_eq!(label.as_i32(), 42);
        assert_eq!(format!("{}", label), "Label(42)");

        let negative: Label = (-7i32).into();
        assert_eq!(negative.as_i32(), -7);

        let raw: i32 = label.into();
        assert_eq!(raw, 42);
    }

    #[test]
    fn test_dimension() {
        let dim = Dimension::new(128);
        assert_eq!(dim.as_usize(), 128);
        assert!(dim.is_divisible_by(8));
        assert!(dim.is_divisible_by(16));
        assert!(!dim.is_divisible_by(3));
        assert!(!dim.is_divisible_by(0));
    }
}
