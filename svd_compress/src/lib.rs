// THEORY:
// This file is the entry point of the `svd_compress` library crate. It exposes
// the `CompressionPipeline` and its configuration types as the high-level
// interface, while the individual strategies in `core_modules` stay available
// to callers that want one of them directly.
//
// The engine is region-aware low-rank compression: each colour channel is
// approximated by a truncated singular value decomposition, and a rectangular
// region of interest can be kept at a higher rank than the rest of the image,
// either tile by tile or by blending two global reconstructions. An error-map
// renderer shows where detail was lost.
//
// Everything under `core_modules` is synchronous and pure. `parallel_pipeline`
// is the optional async layer that moves those calls onto worker threads.

pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;

pub use crate::core_modules::channel::{ChannelSvd, compress_channel};
pub use crate::core_modules::error_map::error_map;
pub use crate::core_modules::full_image::compress_full;
pub use crate::core_modules::global_blend::compress_blended;
pub use crate::core_modules::grid_manager::DEFAULT_TILE_SIZE;
pub use crate::core_modules::tiled_region::compress_tiled;
pub use crate::core_modules::utils::image_helper::image_helper;
pub use crate::error::{CompressError, Result};
pub use crate::parallel_pipeline::{ParallelPipeline, PoolError, WorkerPoolConfig};
pub use crate::pipeline::{
    CompressionConfig, CompressionPipeline, ImageInfo, PixelArray, Rank, Region, Report, Strategy, inspect,
};
