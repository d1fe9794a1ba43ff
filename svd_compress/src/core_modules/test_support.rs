// Synthetic images shared by the unit tests.

use crate::core_modules::pixel_array::pixel_array::PixelArray;

/// Cheap deterministic hash of a sample position, used as full-rank texture.
pub fn noise(row: usize, col: usize, channel: usize) -> u64 {
    let mut x = (row as u64).wrapping_mul(73_856_093)
        ^ (col as u64).wrapping_mul(19_349_663)
        ^ (channel as u64 + 1).wrapping_mul(83_492_791);
    x ^= x >> 13;
    x = x.wrapping_mul(0x5bd1_e995);
    x ^= x >> 15;
    x
}

/// A smooth RGB gradient with a layer of high-rank texture on top, so truncation
/// at different ranks produces measurably different errors.
pub fn textured_gradient(height: usize, width: usize) -> PixelArray {
    let w = (width - 1).max(1) as f64;
    let h = (height - 1).max(1) as f64;
    PixelArray::from_fn(height, width, 3, |row, col, ch| {
        let base = match ch {
            0 => 180.0 * col as f64 / w,
            1 => 180.0 * row as f64 / h,
            _ => 90.0 * (col as f64 / w + row as f64 / h),
        };
        let texture = (noise(row, col, ch) % 64) as f64;
        (base + texture).min(255.0) as u8
    })
    .expect("synthetic image has a valid shape")
}

/// An image whose content repeats every `period` pixels in both directions.
pub fn periodic_texture(height: usize, width: usize, period: usize) -> PixelArray {
    PixelArray::from_fn(height, width, 3, |row, col, ch| {
        let (r, c) = (row % period, col % period);
        (60 + (r + c) % 64 + (noise(r, c, ch) % 96) as usize) as u8
    })
    .expect("synthetic image has a valid shape")
}

/// A single flat colour.
pub fn solid(height: usize, width: usize, colour: [u8; 3]) -> PixelArray {
    PixelArray::from_fn(height, width, 3, |_, _, ch| colour[ch]).expect("synthetic image has a valid shape")
}

/// Largest per-sample difference between two same-shaped images.
pub fn max_sample_diff(a: &PixelArray, b: &PixelArray) -> u8 {
    a.as_bytes()
        .iter()
        .zip(b.as_bytes())
        .map(|(&x, &y)| x.abs_diff(y))
        .max()
        .unwrap_or(0)
}
