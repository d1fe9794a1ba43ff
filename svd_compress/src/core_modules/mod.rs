pub mod channel;
pub mod error_map;
pub mod full_image;
pub mod global_blend;
pub mod grid_manager;
pub mod metrics;
pub mod pixel_array;
pub mod rank;
pub mod region;
pub mod tiled_region;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;
