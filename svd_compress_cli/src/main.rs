use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use svd_compress::{
    CompressionConfig, CompressionPipeline, DEFAULT_TILE_SIZE, Rank, Region, Strategy, image_helper, inspect,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum RegionMode {
    /// Per-tile decompositions, sharp tiles wherever they overlap the region.
    Tiled,
    /// One global decomposition, two ranks blended through a region mask.
    Blended,
}

/// Compress an image with truncated SVD, optionally keeping a region sharper.
#[derive(Debug, Parser)]
#[command(name = "svd-compress", version)]
struct Args {
    /// Image to read (any format the `image` crate decodes).
    input: PathBuf,

    /// Where to write the compressed PNG.
    output: Option<PathBuf>,

    /// Rank for the whole image.
    #[arg(short, long, conflicts_with_all = ["k_region", "k_base", "region"])]
    k: Option<i64>,

    /// Rank inside the region.
    #[arg(long, requires = "region")]
    k_region: Option<i64>,

    /// Rank outside the region.
    #[arg(long, requires = "region")]
    k_base: Option<i64>,

    /// Region of interest as x1,y1,x2,y2 in pixels.
    #[arg(long, value_parser = parse_region)]
    region: Option<Region>,

    #[arg(long, value_enum, default_value_t = RegionMode::Tiled)]
    strategy: RegionMode,

    #[arg(long, default_value_t = DEFAULT_TILE_SIZE)]
    tile_size: usize,

    /// Also write the error heatmap to this path.
    #[arg(long)]
    error_map: Option<PathBuf>,

    /// Print dimensions and the largest useful rank, then exit.
    #[arg(long)]
    info: bool,
}

fn parse_region(raw: &str) -> Result<Region, String> {
    let parts: Vec<u32> = raw
        .split(',')
        .map(|p| p.trim().parse::<u32>().map_err(|e| format!("{p:?}: {e}")))
        .collect::<Result<_, _>>()?;
    let &[x1, y1, x2, y2] = parts.as_slice() else {
        return Err(format!("expected x1,y1,x2,y2, got {raw:?}"));
    };
    Region::new(x1, y1, x2, y2).map_err(|e| e.to_string())
}

fn strategy(args: &Args, width: usize, height: usize) -> Result<Strategy> {
    if let Some(k) = args.k {
        return Ok(Strategy::Full { k: Rank::new(k)? });
    }
    let Some(region) = args.region else {
        bail!("pass --k, or --k-region, --k-base and --region");
    };
    let (Some(k_region), Some(k_base)) = (args.k_region, args.k_base) else {
        bail!("--region needs both --k-region and --k-base");
    };
    let region = region
        .clip_to(width, height)
        .with_context(|| format!("region {region:?} lies outside the {width}x{height} image"))?;
    let (k_region, k_base) = (Rank::new(k_region)?, Rank::new(k_base)?);
    Ok(match args.strategy {
        RegionMode::Tiled => Strategy::Tiled { k_region, k_base, region },
        RegionMode::Blended => Strategy::Blended { k_region, k_base, region },
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let args = Args::parse();
    let image = image_helper::open(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;

    if args.info {
        let info = inspect(&image);
        println!(
            "{}: {}x{} ({} channel(s)), k_max = {}",
            args.input.display(),
            info.width,
            info.height,
            info.channels,
            info.k_max
        );
        return Ok(());
    }

    let Some(output) = args.output.as_ref() else {
        bail!("an output path is required unless --info is given");
    };

    let config = CompressionConfig::new(strategy(&args, image.width(), image.height())?)
        .with_tile_size(args.tile_size)
        .with_error_map(args.error_map.is_some());
    let pipeline = CompressionPipeline::new(config);
    let report = pipeline.run(&image).context("compression failed")?;

    image_helper::save(output, &report.image).with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(
        strategy = pipeline.config().strategy.name(),
        output = %output.display(),
        mae = report.mean_absolute_error,
        storage_ratio = report.storage_ratio,
        "compressed image written"
    );

    if let (Some(path), Some(map)) = (args.error_map.as_ref(), report.error_map.as_ref()) {
        image_helper::save(path, map).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(output = %path.display(), "error map written");
    }

    Ok(())
}
