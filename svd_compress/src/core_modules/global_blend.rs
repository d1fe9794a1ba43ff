// THEORY:
// The blended strategy is the alternative to tiling. Each channel is decomposed
// once over the whole image, and the same decomposition is rebuilt twice: a `low`
// plane at `k_base` and a `high` plane at `k_region`. A binary mask then picks
// `high` inside the region and `low` everywhere else:
//
//     out = low * (1 - mask) + high * mask
//
// Because both planes share one set of global basis vectors there are no tile
// seams. The only discontinuity is the hard edge of the mask itself.
//
// Cost: one full-image SVD per channel, which is more than the tiled strategy
// pays on large images.

use crate::core_modules::channel::ChannelSvd;
use crate::core_modules::pixel_array::pixel_array::{Channel, PixelArray, QuantizedChannel, quantize};
use crate::core_modules::rank::Rank;
use crate::core_modules::region::Region;
use crate::error::Result;
use nalgebra::DMatrix;

/// Per-pixel blend weights in [0, 1]. Binary here: 1 inside the region.
pub type Mask = DMatrix<f64>;

/// Builds the `height x width` mask of `region`, clipped to the image.
/// A region with no overlap produces an all-zero mask.
pub fn region_mask(region: &Region, width: usize, height: usize) -> Mask {
    match region.clip_to(width, height) {
        Some(clipped) => DMatrix::from_fn(height, width, |row, col| {
            if clipped.contains(row, col) { 1.0 } else { 0.0 }
        }),
        None => DMatrix::zeros(height, width),
    }
}

/// Reconstructs every channel at `k_base` and `k_region` from one global SVD and
/// blends them through the region mask.
pub fn compress_blended(
    image: &PixelArray,
    k_region: Rank,
    k_base: Rank,
    region: &Region,
) -> Result<PixelArray> {
    let rgb = image.to_rgb();
    let (height, width) = (rgb.height(), rgb.width());
    let mask = region_mask(region, width, height);
    tracing::debug!(
        height,
        width,
        k_region = k_region.get(),
        k_base = k_base.get(),
        masked = mask.sum(),
        "blended region compression"
    );

    let [r, g, b] = rgb.rgb_channels()?;
    let planes = [
        blend_channel(&r, &mask, k_region, k_base)?,
        blend_channel(&g, &mask, k_region, k_base)?,
        blend_channel(&b, &mask, k_region, k_base)?,
    ];
    PixelArray::from_channels(&planes)
}

fn blend_channel(channel: &Channel, mask: &Mask, k_region: Rank, k_base: Rank) -> Result<QuantizedChannel> {
    let svd = ChannelSvd::decompose(channel)?;
    let r_max = svd.max_rank();
    let (k_base_eff, k_region_eff) = (k_base.effective(r_max), k_region.effective(r_max));
    tracing::trace!(k_base_eff, k_region_eff, "blending channel");

    let low = svd.reconstruct(k_base_eff);
    let high = svd.reconstruct(k_region_eff);
    Ok(DMatrix::from_fn(channel.nrows(), channel.ncols(), |row, col| {
        let m = mask[(row, col)];
        quantize(low[(row, col)] * (1.0 - m) + high[(row, col)] * m)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::full_image::compress_full;
    use crate::core_modules::test_support::{max_sample_diff, solid, textured_gradient};

    fn rank(k: i64) -> Rank {
        Rank::new(k).unwrap()
    }

    #[test]
    fn mask_is_binary_and_half_open() {
        let mask = region_mask(&Region::new(2, 1, 5, 3).unwrap(), 8, 4);
        assert_eq!(mask.sum(), 6.0);
        assert_eq!(mask[(1, 2)], 1.0);
        assert_eq!(mask[(2, 4)], 1.0);
        assert_eq!(mask[(3, 4)], 0.0);
        assert_eq!(mask[(1, 5)], 0.0);
    }

    #[test]
    fn degenerate_region_equals_base_rank_everywhere() {
        let image = textured_gradient(48, 64);
        let empty = Region { x1: 10, y1: 10, x2: 10, y2: 30 };
        let out = compress_blended(&image, rank(40), rank(3), &empty).unwrap();
        assert_eq!(out, compress_full(&image, rank(3)).unwrap());

        let off_image = Region::new(100, 100, 120, 120).unwrap();
        let out = compress_blended(&image, rank(40), rank(3), &off_image).unwrap();
        assert_eq!(out, compress_full(&image, rank(3)).unwrap());
    }

    #[test]
    fn inside_uses_high_rank_and_outside_uses_low_rank() {
        let image = textured_gradient(256, 256);
        let region = Region::new(0, 0, 128, 128).unwrap();
        let out = compress_blended(&image, rank(50), rank(5), &region).unwrap();
        let high = compress_full(&image, rank(50)).unwrap();
        let low = compress_full(&image, rank(5)).unwrap();

        for row in 0..256 {
            for col in 0..256 {
                let expected = if region.contains(row, col) { &high } else { &low };
                for c in 0..3 {
                    assert_eq!(out.get(row, col, c), expected.get(row, col, c), "pixel ({row}, {col}, {c})");
                }
            }
        }
    }

    #[test]
    fn no_seams_away_from_the_mask_edge() {
        // Where tiling would cut at x = 128, the blended output is just the global
        // low-rank plane, which is identical to compressing without any region.
        let image = textured_gradient(256, 256);
        let region = Region::new(0, 0, 64, 64).unwrap();
        let out = compress_blended(&image, rank(50), rank(5), &region).unwrap();
        let low = compress_full(&image, rank(5)).unwrap();
        for row in 100..200 {
            for col in 126..130 {
                for c in 0..3 {
                    assert_eq!(out.get(row, col, c), low.get(row, col, c));
                }
            }
        }
    }

    #[test]
    fn equal_ranks_match_full_compression() {
        let image = textured_gradient(30, 50);
        let region = Region::new(5, 5, 25, 20).unwrap();
        let out = compress_blended(&image, rank(7), rank(7), &region).unwrap();
        assert_eq!(out, compress_full(&image, rank(7)).unwrap());
    }

    #[test]
    fn flat_image_is_reproduced() {
        for (height, width) in [(2, 4), (5, 5), (1, 25), (64, 48)] {
            let image = solid(height, width, [255, 255, 255]);
            let region = Region::new(0, 0, 1, 1).unwrap();
            let out = compress_blended(&image, rank(3), rank(1), &region).unwrap();
            assert!(max_sample_diff(&image, &out) <= 1, "{height}x{width}");
        }
    }
}
