use std::path::PathBuf;

use cascore::config::LoaderConfig;
use cascore::layout::pad::Region;
use clap::Parser;
use rustcascade::data::contrast::contrast_map;
use rustcascade::data::loader::DataLoader;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Inspect raw CASCADE TOF and PAD detector files.
#[derive(Parser, Debug)]
#[command(name = "rustcascade", version, about)]
struct Args {
    /// Raw detector file
    file: PathBuf,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Treat the file as a single PAD frame
    #[arg(long)]
    pad: bool,

    /// Foil to evaluate
    #[arg(long, default_value_t = 0)]
    foil: i32,

    /// Pixel column, whole frame if omitted
    #[arg(short, long, requires = "y")]
    x: Option<i32>,

    /// Pixel row, whole frame if omitted
    #[arg(short, long, requires = "x")]
    y: Option<i32>,

    /// Export the evaluated histogram as text
    #[arg(long)]
    export: Option<PathBuf>,

    /// Also compute contrast and phase maps over the configured pixel blocks
    #[arg(long)]
    map: bool,

    /// Worker threads for the contrast map
    #[arg(long, default_value_t = 4)]
    threads: usize,

    /// Debug output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config = match &args.config {
        Some(path) => LoaderConfig::from_json_file(path)?,
        None => LoaderConfig::default(),
    };
    let settings = config.minimizer.clone();
    let contrast_block = config.contrast_block_size;
    let phase_block = config.phase_block_size;
    let mut loader = DataLoader::new(config);

    if args.pad {
        let data = loader.load_pad_file(&args.file, None)?;
        println!("{}", data.layout());
        println!("total counts: {}", data.total());
        return Ok(());
    }

    let data = loader.load_tof_file(&args.file, None)?;
    println!("{}", data.layout());

    let region = match (args.x, args.y) {
        (Some(x), Some(y)) => Region::pixel(x, y),
        _ => data.layout().pad().full_region(),
    };
    let histogram = data.roi_histogram(args.foil, region)?;
    info!("Evaluating foil {} in {}: {}", args.foil, region, histogram);

    match histogram.fit_sinusoid(&settings) {
        Ok(fit) => {
            println!("{}", fit);
            match fit.contrast() {
                Ok(contrast) => println!(
                    "contrast: {:.5} ± {:.5}, phase: {:.5} ± {:.5}",
                    contrast.contrast, contrast.contrast_error, contrast.phase, contrast.phase_error
                ),
                Err(e) => println!("error: {}", e),
            }
        }
        Err(e) => println!("error: {}", e),
    }

    if let Some(path) = &args.export {
        histogram.save(path)?;
        info!("Histogram written to {}", path.display());
    }

    if args.map {
        let map = contrast_map(&data, args.foil, contrast_block, &settings, args.threads);
        println!(
            "contrast map: {}x{} blocks of {}x{} pixels, {} fitted, mean contrast: {}",
            map.columns,
            map.rows,
            map.block[0],
            map.block[1],
            map.fitted(),
            map.mean_contrast().map_or("n/a".to_string(), |c| format!("{:.5}", c))
        );

        let phases = contrast_map(&data, args.foil, phase_block, &settings, args.threads);
        println!(
            "phase map: {}x{} blocks of {}x{} pixels, {} fitted",
            phases.columns, phases.rows, phases.block[0], phases.block[1], phases.fitted()
        );
    }

    Ok(())
}
