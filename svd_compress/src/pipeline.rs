// THEORY:
// The `pipeline` module is the top-level API of the engine. It wraps the three
// mutually exclusive compression strategies behind one configuration type and
// one entry point, so a front end only has to decode an image, pick a
// `Strategy`, and encode whatever `Report` comes back.
//
// Stages of a run:
// 1.  **Promotion**: the input is promoted to RGB. Every strategy works on three
//     channels and the report's images always have three.
// 2.  **Compression**: exactly one strategy runs. Strategies are never composed.
// 3.  **Diagnostics**: optionally, the error map of (original, output) is rendered,
//     and the summary metrics are always computed.
//
// The pipeline holds no state between runs. `run` takes `&self` and may be called
// from any number of threads at once.

use crate::core_modules::error_map::error_map;
use crate::core_modules::full_image::compress_full;
use crate::core_modules::global_blend::compress_blended;
use crate::core_modules::grid_manager::DEFAULT_TILE_SIZE;
use crate::core_modules::metrics::{mean_absolute_error, storage_ratio};
use crate::core_modules::tiled_region::compress_tiled;
use crate::error::Result;
use std::time::Instant;

// Re-export key data structures for the public API.
pub use crate::core_modules::metrics::ImageInfo;
pub use crate::core_modules::pixel_array::pixel_array::PixelArray;
pub use crate::core_modules::rank::Rank;
pub use crate::core_modules::region::Region;

/// Which compression strategy to run, with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "strategy", rename_all = "snake_case"))]
pub enum Strategy {
    /// Every channel of the whole image at rank `k`.
    Full { k: Rank },
    /// Independent per-tile decompositions, `k_region` on tiles overlapping the region.
    Tiled {
        k_region: Rank,
        k_base: Rank,
        region: Region,
    },
    /// One global decomposition per channel, blended through a region mask.
    Blended {
        k_region: Rank,
        k_base: Rank,
        region: Region,
    },
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Full { .. } => "full",
            Strategy::Tiled { .. } => "tiled",
            Strategy::Blended { .. } => "blended",
        }
    }

    /// The rank used away from any region; the one that bounds storage.
    pub fn base_rank(&self) -> Rank {
        match *self {
            Strategy::Full { k } => k,
            Strategy::Tiled { k_base, .. } | Strategy::Blended { k_base, .. } => k_base,
        }
    }
}

/// Configuration for the CompressionPipeline.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CompressionConfig {
    pub strategy: Strategy,
    /// Side of the square tiles used by `Strategy::Tiled`. Ignored otherwise.
    #[cfg_attr(feature = "serde", serde(default = "default_tile_size"))]
    pub tile_size: usize,
    /// Also render the error map of (original, output).
    #[cfg_attr(feature = "serde", serde(default))]
    pub with_error_map: bool,
}

#[cfg(feature = "serde")]
fn default_tile_size() -> usize {
    DEFAULT_TILE_SIZE
}

impl CompressionConfig {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            tile_size: DEFAULT_TILE_SIZE,
            with_error_map: false,
        }
    }

    pub fn with_tile_size(mut self, tile_size: usize) -> Self {
        self.tile_size = tile_size;
        self
    }

    pub fn with_error_map(mut self, enabled: bool) -> Self {
        self.with_error_map = enabled;
        self
    }
}

/// The output of one pipeline run.
#[derive(Debug, Clone)]
pub struct Report {
    /// The compressed image, always RGB.
    pub image: PixelArray,
    /// Heatmap of the reconstruction error, when requested.
    pub error_map: Option<PixelArray>,
    /// Mean absolute difference between the promoted input and `image`.
    pub mean_absolute_error: f64,
    /// Storage a factorization at the base rank would need, relative to the dense image.
    pub storage_ratio: f64,
}

/// The main, top-level struct for the compression engine.
#[derive(Debug, Clone)]
pub struct CompressionPipeline {
    config: CompressionConfig,
}

impl CompressionPipeline {
    pub fn new(config: CompressionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    /// Runs the configured strategy over `image`.
    pub fn run(&self, image: &PixelArray) -> Result<Report> {
        let started = Instant::now();
        let original = image.to_rgb();

        let output = match self.config.strategy {
            Strategy::Full { k } => compress_full(&original, k)?,
            Strategy::Tiled { k_region, k_base, region } => {
                compress_tiled(&original, k_region, k_base, &region, self.config.tile_size)?
            }
            Strategy::Blended { k_region, k_base, region } => {
                compress_blended(&original, k_region, k_base, &region)?
            }
        };

        let heatmap = if self.config.with_error_map {
            Some(error_map(&original, &output)?)
        } else {
            None
        };

        let report = Report {
            mean_absolute_error: mean_absolute_error(&original, &output)?,
            storage_ratio: storage_ratio(
                original.height(),
                original.width(),
                self.config.strategy.base_rank().get(),
            ),
            image: output,
            error_map: heatmap,
        };

        tracing::debug!(
            strategy = self.config.strategy.name(),
            height = original.height(),
            width = original.width(),
            mae = report.mean_absolute_error,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "compression finished"
        );
        Ok(report)
    }
}

/// Reports dimensions and the largest useful rank of `image`.
pub fn inspect(image: &PixelArray) -> ImageInfo {
    ImageInfo::of(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::test_support::textured_gradient;

    fn rank(k: i64) -> Rank {
        Rank::new(k).unwrap()
    }

    #[test]
    fn runs_each_strategy_with_rgb_output() {
        let gray = PixelArray::from_fn(40, 56, 1, |r, c, _| ((r * 3 + c * 5) % 256) as u8).unwrap();
        let region = Region::new(8, 8, 24, 24).unwrap();
        for strategy in [
            Strategy::Full { k: rank(4) },
            Strategy::Tiled { k_region: rank(16), k_base: rank(2), region },
            Strategy::Blended { k_region: rank(16), k_base: rank(2), region },
        ] {
            let config = CompressionConfig::new(strategy).with_tile_size(16);
            let pipeline = CompressionPipeline::new(config.clone());
            assert_eq!(pipeline.config(), &config);
            let report = pipeline.run(&gray).unwrap();
            assert_eq!(report.image.shape(), (40, 56, 3), "{}", strategy.name());
            assert!(report.error_map.is_none());
        }
    }

    #[test]
    fn error_map_is_attached_on_request() {
        let image = textured_gradient(32, 32);
        let config = CompressionConfig::new(Strategy::Full { k: rank(3) }).with_error_map(true);
        let report = CompressionPipeline::new(config).run(&image).unwrap();
        let map = report.error_map.expect("error map requested");
        assert_eq!(map.shape(), (32, 32, 3));
        assert!(report.mean_absolute_error > 0.0);
        assert_eq!(report.storage_ratio, 3.0 * 65.0 / 1024.0);
    }

    #[test]
    fn invalid_tile_size_surfaces_as_error() {
        let image = textured_gradient(16, 16);
        let region = Region::new(0, 0, 8, 8).unwrap();
        let config = CompressionConfig::new(Strategy::Tiled { k_region: rank(4), k_base: rank(1), region })
            .with_tile_size(0);
        assert!(CompressionPipeline::new(config).run(&image).is_err());
    }

    #[test]
    fn inspect_reports_k_max() {
        let image = textured_gradient(30, 70);
        let info = inspect(&image);
        assert_eq!((info.width, info.height, info.channels, info.k_max), (70, 30, 3, 30));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn config_reads_from_json() {
        let config: CompressionConfig = serde_json::from_str(
            r#"{"strategy": {"strategy": "tiled", "k_region": 50, "k_base": 5,
                "region": {"x1": 0, "y1": 0, "x2": 128, "y2": 128}}}"#,
        )
        .unwrap();
        assert_eq!(config.tile_size, DEFAULT_TILE_SIZE);
        assert!(!config.with_error_map);
        assert_eq!(
            config.strategy,
            Strategy::Tiled { k_region: rank(50), k_base: rank(5), region: Region::new(0, 0, 128, 128).unwrap() }
        );

        let zero_rank = serde_json::from_str::<CompressionConfig>(r#"{"strategy": {"strategy": "full", "k": 0}}"#);
        assert!(zero_rank.is_err());
    }
}
