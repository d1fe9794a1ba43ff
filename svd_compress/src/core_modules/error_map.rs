// THEORY:
// The error map is a diagnostic, not part of compression. It shows where a
// reconstruction lost detail by turning the per-pixel error between an original
// and its compressed version into a heatmap.
//
// Steps:
// 1.  **Error**: for every pixel, the mean over channels of |original - compressed|,
//     computed in f64 from the byte values.
// 2.  **Normalisation**: divide by (max error + EPSILON) so the worst pixel lands
//     just under 1.0. EPSILON keeps an all-zero error (identical images) finite.
// 3.  **Colour**: map the normalised value through the viridis colormap, dark
//     purple for no error up to bright yellow for the worst error.

use crate::core_modules::pixel_array::pixel_array::{PixelArray, RGB};
use crate::error::{CompressError, Result};
use nalgebra::DMatrix;

pub const EPSILON: f64 = 1e-8;

/// Viridis sampled at nine evenly spaced stops, interpolated linearly in between.
const VIRIDIS: [[f64; 3]; 9] = [
    [68.0, 1.0, 84.0],
    [71.0, 44.0, 122.0],
    [59.0, 81.0, 139.0],
    [44.0, 113.0, 142.0],
    [33.0, 144.0, 141.0],
    [39.0, 173.0, 129.0],
    [92.0, 200.0, 99.0],
    [170.0, 220.0, 50.0],
    [253.0, 231.0, 37.0],
];

/// Maps `t` in [0, 1] to an RGB colour. Values outside the range are clamped.
pub fn colormap(t: f64) -> [u8; 3] {
    let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
    let scaled = t * (VIRIDIS.len() - 1) as f64;
    let lower = (scaled.floor() as usize).min(VIRIDIS.len() - 2);
    let frac = scaled - lower as f64;
    let (a, b) = (VIRIDIS[lower], VIRIDIS[lower + 1]);
    std::array::from_fn(|c| (a[c] + (b[c] - a[c]) * frac).round().clamp(0.0, 255.0) as u8)
}

/// Mean absolute per-channel difference at every pixel.
pub fn pixel_error(original: &PixelArray, compressed: &PixelArray) -> Result<DMatrix<f64>> {
    let original = original.to_rgb();
    let compressed = compressed.to_rgb();
    if original.shape() != compressed.shape() {
        return Err(CompressError::ShapeMismatch {
            expected: original.shape(),
            actual: compressed.shape(),
        });
    }

    Ok(DMatrix::from_fn(original.height(), original.width(), |row, col| {
        (0..RGB)
            .map(|c| (original.get(row, col, c) as f64 - compressed.get(row, col, c) as f64).abs())
            .sum::<f64>()
            / RGB as f64
    }))
}

/// Renders the normalised reconstruction error of `compressed` as an RGB heatmap.
pub fn error_map(original: &PixelArray, compressed: &PixelArray) -> Result<PixelArray> {
    let error = pixel_error(original, compressed)?;
    let max = error.max();
    tracing::debug!(max_error = max, mean_error = error.mean(), "rendering error map");

    let scale = max + EPSILON;
    PixelArray::from_fn(error.nrows(), error.ncols(), RGB, |row, col, c| {
        colormap(error[(row, col)] / scale)[c]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::full_image::compress_full;
    use crate::core_modules::rank::Rank;
    use crate::core_modules::test_support::textured_gradient;

    #[test]
    fn colormap_runs_dark_to_bright() {
        assert_eq!(colormap(0.0), [68, 1, 84]);
        assert_eq!(colormap(1.0), [253, 231, 37]);
        assert_eq!(colormap(-2.0), colormap(0.0));
        assert_eq!(colormap(0.5), [33, 144, 141]);
        let luminance = |[r, g, b]: [u8; 3]| 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
        assert!(luminance(colormap(0.9)) > luminance(colormap(0.1)));
    }

    #[test]
    fn identical_images_give_uniform_dark_map() {
        let image = textured_gradient(20, 30);
        let map = error_map(&image, &image).unwrap();
        assert_eq!(map.shape(), (20, 30, 3));
        assert!(map.as_bytes().chunks(3).all(|px| px == colormap(0.0)));
    }

    #[test]
    fn worst_pixel_is_brightest() {
        let original = PixelArray::new(1, 3, 3, vec![0; 9]).unwrap();
        let compressed = PixelArray::new(1, 3, 3, vec![0, 0, 0, 30, 30, 30, 90, 90, 90]).unwrap();
        let error = pixel_error(&original, &compressed).unwrap();
        assert_eq!(error[(0, 2)], 90.0);

        let map = error_map(&original, &compressed).unwrap();
        assert_eq!(&map.as_bytes()[0..3], &colormap(0.0));
        assert_eq!(&map.as_bytes()[6..9], &colormap(1.0));
    }

    #[test]
    fn mismatched_shapes_are_rejected() {
        let a = textured_gradient(10, 10);
        let b = textured_gradient(10, 11);
        assert!(matches!(error_map(&a, &b), Err(CompressError::ShapeMismatch { .. })));
    }

    #[test]
    fn compressed_image_has_nonzero_error() {
        let image = textured_gradient(32, 32);
        let compressed = compress_full(&image, Rank::new(2).unwrap()).unwrap();
        assert!(pixel_error(&image, &compressed).unwrap().max() > 0.0);
    }
}
