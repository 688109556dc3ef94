//! Sentinel-2 STAC Item generator
//!
//! Usage:
//!     s2-stac create-item S2B_MSIL2A_..._T01UBT_....SAFE items/
//!     s2-stac create-items --file-list scenes.txt --output items/ --jobs 8
//!     s2-stac fix-geometry --input footprint.geojson
//!     s2-stac validate --item-dir items/

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rayon::prelude::*;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sentinel2_stac::catalog::{
    create_item, load_providers, validate_item_dir, ItemOptions, STAC_VERSION,
};
use sentinel2_stac::metadata::SceneMetadata;
use sentinel2_stac::{
    AntimeridianStrategy, FootprintPipeline, Geometry, GeometryConfig, GeometryError,
    MetadataError,
};

// =============================================================================
// CLI Definition
// =============================================================================

#[derive(Parser)]
#[command(name = "s2-stac")]
#[command(about = "Create STAC Items from Sentinel-2 metadata")]
struct Cli {
    #[command(flatten)]
    geometry: GeometryArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Footprint settings shared by every subcommand
#[derive(Args)]
struct GeometryArgs {
    /// How footprints crossing the antimeridian are written: split or normalize
    #[arg(long, global = true, env = "S2_ANTIMERIDIAN_STRATEGY")]
    antimeridian_strategy: Option<AntimeridianStrategy>,

    /// Decimal places kept for output coordinates
    #[arg(long, global = true, env = "S2_COORD_PRECISION")]
    coord_precision: Option<u32>,

    /// Largest accepted footprint area in square degrees
    #[arg(long, global = true, env = "S2_MAX_AREA")]
    max_area: Option<f64>,

    /// Simplification tolerance for reprojected tile geometries
    #[arg(long, global = true, env = "S2_SIMPLIFY_TOLERANCE")]
    tolerance: Option<f64>,

    /// Fail instead of using the product footprint when a tile has no data geometry
    #[arg(long, global = true)]
    no_fallback_geometry: bool,
}

impl GeometryArgs {
    fn config(&self) -> GeometryConfig {
        let mut config = GeometryConfig::from_env();
        if let Some(strategy) = self.antimeridian_strategy {
            config.antimeridian_strategy = strategy;
        }
        if let Some(precision) = self.coord_precision {
            config.coordinate_precision = precision;
        }
        if let Some(max_area) = self.max_area {
            config.max_area = max_area;
        }
        if let Some(tolerance) = self.tolerance {
            config.simplify_tolerance = tolerance;
        }
        if self.no_fallback_geometry {
            config.allow_fallback_geometry = false;
        }
        config
    }
}

#[derive(Args)]
struct ItemArgs {
    /// JSON file with additional providers
    #[arg(long)]
    providers: Option<PathBuf>,

    /// URL prefix replacing the scene directory in asset hrefs
    #[arg(long)]
    asset_href_prefix: Option<String>,
}

impl ItemArgs {
    fn options(&self) -> Result<ItemOptions> {
        Ok(ItemOptions {
            additional_providers: match &self.providers {
                Some(path) => load_providers(path)?,
                None => Vec::new(),
            },
            asset_href_prefix: self.asset_href_prefix.clone(),
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create one item from a SAFE product or a Sinergise tile directory
    CreateItem {
        /// Scene directory
        src: PathBuf,

        /// Output directory
        dst: PathBuf,

        #[command(flatten)]
        item: ItemArgs,
    },
    /// Create items for every scene listed in a file
    CreateItems {
        /// File with one scene directory per line
        #[arg(long)]
        file_list: PathBuf,

        /// Output directory
        #[arg(short, long, default_value = "items")]
        output: PathBuf,

        /// Worker threads (default: number of CPUs)
        #[arg(short, long)]
        jobs: Option<usize>,

        #[command(flatten)]
        item: ItemArgs,
    },
    /// Run the footprint stages on a GeoJSON geometry in WGS84
    FixGeometry {
        /// GeoJSON geometry or feature
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Validate written items
    Validate {
        /// Directory of item JSON files
        #[arg(short, long, default_value = "items")]
        item_dir: PathBuf,
    },
}

// =============================================================================
// Scene Processing
// =============================================================================

fn process_scene(
    src: &Path,
    dst: &Path,
    config: &GeometryConfig,
    options: &ItemOptions,
) -> Result<(String, PathBuf)> {
    let scene = SceneMetadata::from_path(src, config.allow_fallback_geometry)
        .with_context(|| format!("Failed to read metadata from {:?}", src))?;

    let pipeline = FootprintPipeline::new(config.clone());
    let footprint = pipeline
        .run(&scene.footprint)
        .with_context(|| format!("Failed to build footprint for {}", scene.scene_id))?;

    let item = create_item(&scene, &footprint, options)?;
    let path = item.write_to_dir(dst)?;
    Ok((item.id, path))
}

/// Short error kind for batch reports
fn error_kind(err: &anyhow::Error) -> &'static str {
    if let Some(e) = err.downcast_ref::<GeometryError>() {
        return e.kind();
    }
    match err.downcast_ref::<MetadataError>() {
        Some(MetadataError::Geometry(e)) => e.kind(),
        Some(MetadataError::NoGeometry(_)) => "NoGeometry",
        Some(_) => "MetadataError",
        None => "Error",
    }
}

fn read_file_list(path: &Path) -> Result<Vec<PathBuf>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read file list {:?}", path))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(PathBuf::from)
        .collect())
}

fn read_geojson_geometry(path: &Path) -> Result<Geometry> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    let geojson: geojson::GeoJson = text
        .parse()
        .with_context(|| format!("Failed to parse GeoJSON {:?}", path))?;
    let geometry = match geojson {
        geojson::GeoJson::Geometry(g) => g,
        geojson::GeoJson::Feature(f) => match f.geometry {
            Some(g) => g,
            None => bail!("Feature in {:?} has no geometry", path),
        },
        geojson::GeoJson::FeatureCollection(_) => {
            bail!("{:?} is a FeatureCollection; pass a single geometry", path)
        }
    };
    Ok(Geometry::from_geojson(&geometry)?)
}

// =============================================================================
// Main
// =============================================================================

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.geometry.config();
    info!(
        "Antimeridian strategy {}, precision {}, max area {}",
        config.antimeridian_strategy, config.coordinate_precision, config.max_area
    );

    match cli.command {
        Commands::CreateItem { src, dst, item } => {
            let options = item.options()?;
            let (id, path) = process_scene(&src, &dst, &config, &options)?;
            println!("Wrote {} to {:?}", id, path);
        }

        Commands::CreateItems {
            file_list,
            output,
            jobs,
            item,
        } => {
            println!("=== Sentinel-2 STAC Items (STAC {}) ===\n", STAC_VERSION);

            println!("1. Reading scene list...");
            let scenes = read_file_list(&file_list)?;
            println!("   {} scene(s)\n", scenes.len());

            let options = item.options()?;
            let mut builder = rayon::ThreadPoolBuilder::new();
            if let Some(jobs) = jobs {
                builder = builder.num_threads(jobs);
            }
            let pool = builder.build().context("Failed to start worker pool")?;

            println!("2. Creating items in {:?}...", output);
            let results: Vec<(PathBuf, Result<(String, PathBuf)>)> = pool.install(|| {
                scenes
                    .par_iter()
                    .map(|src| (src.clone(), process_scene(src, &output, &config, &options)))
                    .collect()
            });

            let mut failures = 0;
            for (src, result) in &results {
                match result {
                    Ok((id, _)) => println!("   [{}] ok", id),
                    Err(e) => {
                        failures += 1;
                        error!("{:?}: {:#}", src, e);
                        println!("   [{}] {}: {:#}", src.display(), error_kind(e), e);
                    }
                }
            }

            println!("\n=== Summary ===");
            println!("Scenes: {}", results.len());
            println!("Items written: {}", results.len() - failures);
            println!("Failures: {}", failures);

            if failures > 0 {
                std::process::exit(1);
            }
        }

        Commands::FixGeometry { input } => {
            let geometry = read_geojson_geometry(&input)?;
            let output = FootprintPipeline::new(config)
                .from_geographic(&geometry)
                .with_context(|| format!("Failed to fix geometry from {:?}", input))?;

            let result = serde_json::json!({
                "geometry": output.geometry.to_geojson(),
                "bbox": output.bbox.to_vec(),
                "centroid": output.centroid,
                "area": output.area,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        }

        Commands::Validate { item_dir } => {
            println!("=== STAC Item Validator (v{}) ===\n", STAC_VERSION);
            println!("Validating {:?}...", item_dir);

            let (count, issues) = validate_item_dir(&item_dir, config.max_area)?;

            println!("\n=== Validation Results ===");
            println!("Items checked: {}", count);
            println!("Issues found: {}", issues.len());

            if !issues.is_empty() {
                for issue in issues.iter().take(30) {
                    println!("  - [{}] {}: {}", issue.severity, issue.item_id, issue.message);
                }
                if issues.len() > 30 {
                    println!("  ... and {} more", issues.len() - 30);
                }
            }

            std::process::exit(if issues.iter().any(|i| i.severity == "error") { 1 } else { 0 });
        }
    }

    Ok(())
}
