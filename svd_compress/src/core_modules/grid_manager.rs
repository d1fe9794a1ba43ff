// THEORY:
// The `TileGrid` turns an image of arbitrary size into a regular grid of square
// tiles. It is the bridge between the whole image and the per-tile compression
// paradigm: the tiled strategy never touches the image directly, it asks the grid
// for tiles and works on one rectangle at a time.
//
// Key architectural principles:
// 1.  **Full coverage**: unlike a grid that drops the remainder, the last column
//     and row of tiles are clipped to the image edge, so every pixel belongs to
//     exactly one tile. Edge tiles may therefore be narrower or shorter than
//     `tile_size`.
// 2.  **Row-major order**: tiles are indexed left to right, then top to bottom,
//     the same order the pixels themselves are stored in.
// 3.  **Geometry only**: the grid knows coordinates, not pixel data.

use crate::error::{CompressError, Result};

pub const DEFAULT_TILE_SIZE: usize = 128;

/// One rectangle of the grid, half-open: `[x1, x2) x [y1, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Column index of the tile within the grid.
    pub grid_x: usize,
    /// Row index of the tile within the grid.
    pub grid_y: usize,
    pub x1: usize,
    pub y1: usize,
    pub x2: usize,
    pub y2: usize,
}

impl Tile {
    pub fn width(&self) -> usize {
        self.x2 - self.x1
    }

    pub fn height(&self) -> usize {
        self.y2 - self.y1
    }
}

/// The regular tiling of a `width x height` image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGrid {
    image_width: usize,
    image_height: usize,
    tile_size: usize,
    /// Number of tile columns, `ceil(image_width / tile_size)`.
    grid_width: usize,
    /// Number of tile rows, `ceil(image_height / tile_size)`.
    grid_height: usize,
}

impl TileGrid {
    pub fn new(image_width: usize, image_height: usize, tile_size: usize) -> Result<Self> {
        if tile_size == 0 {
            return Err(CompressError::InvalidTileSize);
        }
        if image_width == 0 || image_height == 0 {
            return Err(CompressError::EmptyImage);
        }
        Ok(Self {
            image_width,
            image_height,
            tile_size,
            grid_width: image_width.div_ceil(tile_size),
            grid_height: image_height.div_ceil(tile_size),
        })
    }

    pub fn grid_width(&self) -> usize {
        self.grid_width
    }

    pub fn grid_height(&self) -> usize {
        self.grid_height
    }

    pub fn len(&self) -> usize {
        self.grid_width * self.grid_height
    }

    /// The tile at a row-major index.
    pub fn tile(&self, index: usize) -> Tile {
        let grid_y = index / self.grid_width;
        let grid_x = index % self.grid_width;
        let x1 = grid_x * self.tile_size;
        let y1 = grid_y * self.tile_size;
        Tile {
            grid_x,
            grid_y,
            x1,
            y1,
            x2: (x1 + self.tile_size).min(self.image_width),
            y2: (y1 + self.tile_size).min(self.image_height),
        }
    }

    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        (0..self.len()).map(|i| self.tile(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_multiple_produces_full_tiles() {
        let grid = TileGrid::new(256, 256, 128).unwrap();
        assert_eq!(grid.len(), 4);
        assert!(grid.tiles().all(|t| t.width() == 128 && t.height() == 128));
        assert_eq!(grid.tile(3), Tile { grid_x: 1, grid_y: 1, x1: 128, y1: 128, x2: 256, y2: 256 });
    }

    #[test]
    fn edge_tiles_are_clipped() {
        let grid = TileGrid::new(300, 130, 128).unwrap();
        assert_eq!((grid.grid_width(), grid.grid_height()), (3, 2));
        let last = grid.tile(grid.len() - 1);
        assert_eq!((last.x1, last.y1, last.x2, last.y2), (256, 128, 300, 130));
        assert_eq!((last.width(), last.height()), (44, 2));
    }

    #[test]
    fn tiles_cover_every_pixel_once() {
        let grid = TileGrid::new(37, 23, 8).unwrap();
        let mut hits = vec![0u8; 37 * 23];
        for tile in grid.tiles() {
            for y in tile.y1..tile.y2 {
                for x in tile.x1..tile.x2 {
                    hits[y * 37 + x] += 1;
                }
            }
        }
        assert!(hits.iter().all(|&h| h == 1));
    }

    #[test]
    fn zero_tile_size_is_rejected() {
        assert_eq!(TileGrid::new(10, 10, 0), Err(CompressError::InvalidTileSize));
    }
}
