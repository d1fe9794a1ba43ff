// THEORY:
// A `Region` is the rectangle the caller wants kept at higher fidelity. It uses
// half-open pixel coordinates, `[x1, x2) x [y1, y2)`, with x running along the
// width and y along the height.
//
// The boundary validates corners through `Region::new` and clips the result to the
// image with `clip_to`. The compressors do not trust that this happened: they clip
// again, and an empty intersection simply means "outside everywhere". That keeps
// degenerate or off-image rectangles harmless instead of undefined.

use crate::error::{CompressError, Result};

/// An axis-aligned, half-open rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Region {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

impl Region {
    /// Builds a region, rejecting rectangles whose corners are not strictly ordered.
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Result<Self> {
        if x1 >= x2 || y1 >= y2 {
            return Err(CompressError::InvalidRegion { x1, y1, x2, y2 });
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Intersects the region with a `width x height` image. `None` when nothing is left.
    pub fn clip_to(&self, width: usize, height: usize) -> Option<Region> {
        let w = u32::try_from(width).unwrap_or(u32::MAX);
        let h = u32::try_from(height).unwrap_or(u32::MAX);
        let clipped = Region {
            x1: self.x1.min(w),
            y1: self.y1.min(h),
            x2: self.x2.min(w),
            y2: self.y2.min(h),
        };
        (!clipped.is_empty()).then_some(clipped)
    }

    /// Half-open intersection test against another rectangle given by its corners.
    /// Rectangles that only share an edge do not intersect.
    pub fn intersects(&self, x1: usize, y1: usize, x2: usize, y2: usize) -> bool {
        !self.is_empty()
            && (self.x1 as usize) < x2
            && (self.x2 as usize) > x1
            && (self.y1 as usize) < y2
            && (self.y2 as usize) > y1
    }

    /// Whether the pixel at `(row, col)` lies inside the region.
    #[inline]
    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.x1 as usize) <= col
            && col < self.x2 as usize
            && (self.y1 as usize) <= row
            && row < self.y2 as usize
    }
}
