// THEORY:
// A rank says how many leading singular triplets a reconstruction keeps. Only
// positive ranks mean anything, so the check happens once, when a `Rank` is built,
// and every compressor downstream takes the validated type. Ranks larger than a
// matrix supports are not an error: they are clamped to the number of singular
// values, which gives the lossless reconstruction.

use crate::error::{CompressError, Result};
use std::fmt;
use std::num::NonZeroUsize;

/// A validated, strictly positive truncation rank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "i64", into = "u64"))]
pub struct Rank(NonZeroUsize);

impl Rank {
    /// Validates a raw rank as received from a caller.
    pub fn new(k: i64) -> Result<Self> {
        usize::try_from(k)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(Rank)
            .ok_or(CompressError::InvalidRank { k })
    }

    pub fn get(self) -> usize {
        self.0.get()
    }

    /// The rank actually used against a decomposition with `available` singular values.
    pub fn effective(self, available: usize) -> usize {
        self.get().min(available)
    }
}

impl TryFrom<i64> for Rank {
    type Error = CompressError;

    fn try_from(k: i64) -> Result<Self> {
        Rank::new(k)
    }
}

impl From<Rank> for u64 {
    fn from(rank: Rank) -> Self {
        rank.get() as u64
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_and_negative() {
        assert_eq!(Rank::new(0), Err(CompressError::InvalidRank { k: 0 }));
        assert_eq!(Rank::new(-7), Err(CompressError::InvalidRank { k: -7 }));
    }

    #[test]
    fn clamps_to_available_singular_values() {
        let rank = Rank::new(500).unwrap();
        assert_eq!(rank.effective(256), 256);
        assert_eq!(Rank::new(3).unwrap().effective(256), 3);
    }
}
