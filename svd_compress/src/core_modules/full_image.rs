// THEORY:
// The simplest strategy: every channel of the image is compressed on its own at
// the same rank. Grayscale input is promoted to RGB first so the output is always
// a three-channel image of the same height and width. There is no coupling between
// channels and their order is preserved.

use crate::core_modules::channel::compress_channel;
use crate::core_modules::pixel_array::pixel_array::{PixelArray, RGB};
use crate::core_modules::rank::Rank;
use crate::error::{CompressError, Result};

/// Compresses every channel of `image` at rank `k`.
pub fn compress_full(image: &PixelArray, k: Rank) -> Result<PixelArray> {
    let rgb = image.to_rgb();
    tracing::debug!(
        height = rgb.height(),
        width = rgb.width(),
        k = k.get(),
        k_eff = k.effective(rgb.max_rank()),
        "full-image compression"
    );

    let [r, g, b] = rgb.rgb_channels()?;
    let planes = [
        compress_channel(&r, k)?,
        compress_channel(&g, k)?,
        compress_channel(&b, k)?,
    ];
    let out = PixelArray::from_channels(&planes)?;

    if out.shape() != (rgb.height(), rgb.width(), RGB) {
        return Err(CompressError::ShapeMismatch {
            expected: rgb.shape(),
            actual: out.shape(),
        });
    }
    Ok(out)
}
