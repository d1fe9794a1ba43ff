// Summary numbers reported alongside a compression: how far the output drifted
// from the input, and how much of the dense matrix a factorization would need.

use crate::core_modules::pixel_array::pixel_array::PixelArray;
use crate::error::{CompressError, Result};

/// Dimensions of an image and the largest rank worth asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ImageInfo {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    /// `min(height, width)`: any rank at or above this reconstructs losslessly.
    pub k_max: usize,
}

impl ImageInfo {
    pub fn of(image: &PixelArray) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            channels: image.channels(),
            k_max: image.max_rank(),
        }
    }
}

/// Mean absolute difference over every sample of two same-shaped images.
pub fn mean_absolute_error(a: &PixelArray, b: &PixelArray) -> Result<f64> {
    if a.shape() != b.shape() {
        return Err(CompressError::ShapeMismatch {
            expected: a.shape(),
            actual: b.shape(),
        });
    }
    let total: u64 = a
        .as_bytes()
        .iter()
        .zip(b.as_bytes())
        .map(|(&x, &y)| x.abs_diff(y) as u64)
        .sum();
    Ok(total as f64 / a.as_bytes().len() as f64)
}

/// Fraction of the `height x width` matrix that a rank-`k` factorization stores:
/// `k_eff * (height + width + 1) / (height * width)`, with `k_eff = min(k, min(height, width))`.
pub fn storage_ratio(height: usize, width: usize, k: usize) -> f64 {
    if height == 0 || width == 0 {
        return 0.0;
    }
    let k_eff = k.min(height.min(width));
    (k_eff * (height + width + 1)) as f64 / (height * width) as f64
}
