use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "layout-extractor-rust",
    version,
    about = "Detect layout regions in PDF pages and extract their text"
)]
struct Cli {
    /// PDF files to process
    #[arg(required_unless_present = "show_tesseract_languages")]
    inputs: Vec<PathBuf>,

    /// Page number to process (1-based)
    #[arg(short = 'p', long = "page", default_value_t = 1)]
    page: usize,

    /// Precomputed detections JSON instead of running the detector command
    #[arg(short = 'D', long = "detections")]
    detections: Option<PathBuf>,

    /// Write the JSON result to this file instead of stdout
    #[arg(short = 'o', long = "output")]
    output: Option<PathBuf>,

    /// Save an annotated page image and one crop per region
    #[arg(long = "debug")]
    debug: bool,

    /// Directory for debug images (default: ~/.layout-extractor-rust/.cache/debug)
    #[arg(long = "debug-dir")]
    debug_dir: Option<PathBuf>,

    /// Read extra settings from a local TOML file
    #[arg(short = 'r', long = "read-settings")]
    read_settings: Option<String>,

    /// Extract regions on worker threads
    #[arg(long = "parallel")]
    parallel: bool,

    /// Enable verbose logging
    #[arg(long = "verbose")]
    verbose: bool,

    /// Show installed tesseract languages and exit
    #[arg(long = "show-tesseract-languages")]
    show_tesseract_languages: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    layout_extractor_rust::logging::init(cli.verbose)?;

    let config = layout_extractor_rust::Config {
        inputs: cli.inputs,
        page: cli.page,
        detections: cli.detections,
        debug: cli.debug || cli.debug_dir.is_some(),
        debug_dir: cli.debug_dir,
        settings_path: cli.read_settings,
        parallel: cli.parallel,
        show_tesseract_languages: cli.show_tesseract_languages,
    };
    let output = layout_extractor_rust::run(config).await?;

    match cli.output {
        Some(path) => std::fs::write(&path, format!("{}\n", output))
            .with_context(|| format!("failed to write output: {}", path.display()))?,
        None => println!("{}", output),
    }
    Ok(())
}
