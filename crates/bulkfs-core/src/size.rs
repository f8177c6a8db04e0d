//! Aggregate byte accounting with an explicit unknown state.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Running total of the bytes held by a queue.
///
/// Adding an item of unknown size (an opaque directory, an unreadable file)
/// or overflowing the counter makes the account `Unknown`. The state is
/// sticky until [`SizeAccount::clear`] is called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeAccount {
    /// Exact number of bytes.
    Known(u64),
    /// At least one contribution could not be measured.
    Unknown,
}

impl SizeAccount {
    /// An empty account.
    pub const ZERO: Self = Self::Known(0);

    /// Add an item's size; `None` poisons the account.
    pub fn add(&mut self, size: Option<u64>) {
        *self = match (*self, size) {
            (Self::Known(total), Some(size)) => {
                total.checked_add(size).map_or(Self::Unknown, Self::Known)
            }
            _ => Self::Unknown,
        };
    }

    /// Remove an item's size. No-op once the account is unknown.
    pub fn subtract(&mut self, size: Option<u64>) {
        if let (Self::Known(total), Some(size)) = (*self, size) {
            *self = Self::Known(total.saturating_sub(size));
        }
    }

    /// Reset to zero, clearing the unknown state.
    pub fn clear(&mut self) {
        *self = Self::ZERO;
    }

    /// Check if the total is exact.
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }

    /// The exact total, if known.
    pub fn bytes(&self) -> Option<u64> {
        match self {
            Self::Known(total) => Some(*total),
            Self::Unknown => None,
        }
    }

    /// The total as a float, `NaN` when unknown.
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Known(total) => *total as f64,
            Self::Unknown => f64::NAN,
        }
    }
}

impl Default for SizeAccount {
    fn default() -> Self {
        Self::ZERO
    }
}

impl PartialEq<u64> for SizeAccount {
    fn eq(&self, other: &u64) -> bool {
        self.bytes() == Some(*other)
    }
}

impl fmt::Display for SizeAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(total) => write!(f, "{total} bytes"),
            Self::Unknown => write!(f, "unknown size"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_and_subtract() {
        let mut account = SizeAccount::default();
        account.add(Some(100));
        account.add(Some(200));
        assert_eq!(account, 300);

        account.subtract(Some(100));
        assert_eq!(account.bytes(), Some(200));
    }

    #[test]
    fn test_unknown_is_sticky() {
        let mut account = SizeAccount::ZERO;
        account.add(Some(10));
        account.add(None);
        assert!(!account.is_known());

        account.subtract(Some(10));
        account.add(Some(5));
        assert_eq!(account, SizeAccount::Unknown);
        assert!(account.as_f64().is_nan());

        account.clear();
        assert_eq!(account, 0);
    }

    #[test]
    fn test_overflow_is_unknown() {
        let mut account = SizeAccount::Known(u64::MAX);
        account.add(Some(1));
        assert_eq!(account, SizeAccount::Unknown);
    }
}
