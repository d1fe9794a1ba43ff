// THEORY:
// Every failure the compression engine can report lives in one enum. The engine
// is a set of pure transformations, so each error describes a bad input (rank,
// region, shape) or a numerical failure of the decomposition routine. None of
// them is transient: the same call with the same arguments fails the same way,
// so nothing in the engine retries.

use thiserror::Error;

/// Errors surfaced by the compression engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompressError {
    /// A rank of zero or below was requested. Ranks are rejected, never clamped upward.
    #[error("rank must be a positive integer, got {k}")]
    InvalidRank { k: i64 },

    /// The region's corners are not ordered (`x1 < x2`, `y1 < y2`).
    #[error("invalid region ({x1}, {y1}) -> ({x2}, {y2}): corners must satisfy x1 < x2 and y1 < y2")]
    InvalidRegion { x1: u32, y1: u32, x2: u32, y2: u32 },

    #[error("tile size must be at least 1 pixel")]
    InvalidTileSize,

    #[error("image must have a non-zero width and height")]
    EmptyImage,

    #[error("unsupported channel count {channels}, expected 1 (grayscale) or 3 (RGB)")]
    UnsupportedChannels { channels: usize },

    /// Two arrays that must agree in shape do not. Inside the engine this is a defect.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize, usize),
        actual: (usize, usize, usize),
    },

    #[error("singular value decomposition failed for a {rows}x{cols} channel")]
    Decomposition { rows: usize, cols: usize },
}

pub type Result<T> = std::result::Result<T, CompressError>;
