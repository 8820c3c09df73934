use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub mod debug;
pub mod error;
pub mod extract;
pub mod geometry;
pub mod layout;
pub mod logging;
pub mod ocr;
mod paths;
pub mod pdf;
pub mod pipeline;
mod process;
pub mod settings;
#[cfg(test)]
mod test_util;
mod text;

pub use debug::LabelColors;
pub use error::{ConfigError, OcrError, PipelineError, RegionFailure};
pub use extract::{ExtractionMethod, NativeTextSource, PdfTextLayer, ScanHeuristic};
pub use geometry::{BBox, CoordinateMapper, Rect};
pub use layout::{LayoutDetector, MergeThresholds, MergedRegion, RawDetection, merge_regions};
pub use ocr::{OcrEngine, OcrProfile, TesseractOcr};
pub use pdf::{PdfDocument, PdfTools};
pub use pipeline::{ExtractedBlock, PageExtraction, Pipeline, PipelineOptions, RasterPage};
pub use text::normalize_block_text;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub inputs: Vec<PathBuf>,
    /// 1-based page number.
    pub page: usize,
    pub detections: Option<PathBuf>,
    pub debug: bool,
    pub debug_dir: Option<PathBuf>,
    pub settings_path: Option<String>,
    pub parallel: bool,
    pub show_tesseract_languages: bool,
}

/// One input's entry in the report: its blocks, or why it failed.
#[derive(Debug, Serialize)]
struct DocumentOutput {
    file: PathBuf,
    page: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(flatten)]
    extraction: Option<PageExtraction>,
}

/// Runs the pipeline on every input and returns the JSON report.
pub async fn run(config: Config) -> Result<String> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let settings = settings::load_settings(settings_path)?;

    if config.show_tesseract_languages {
        let langs = ocr::list_tesseract_languages(&settings.ocr.program)?;
        return Ok(langs.join("\n"));
    }

    if config.inputs.is_empty() {
        return Err(anyhow!("no input PDF given"));
    }
    let page_index = config
        .page
        .checked_sub(1)
        .ok_or_else(|| anyhow!("page numbers start at 1"))?;

    let detector = build_detector(&config, &settings)?;
    let ocr: Arc<dyn OcrEngine> =
        Arc::new(TesseractOcr::with_installed_languages(settings.ocr.clone())?);

    let mut handles = Vec::new();
    for input in &config.inputs {
        let mut options = pipeline_options(&settings);
        options.parallel |= config.parallel;
        if config.debug {
            let debug = debug::build_debug_config(input, config.debug_dir.as_deref())?
                .with_crop_padding(settings.debug_crop_padding);
            options.debug = Some(debug.for_page(page_index));
        }
        let pipeline = Pipeline::new(detector.clone(), ocr.clone(), options);
        let path = input.clone();
        handles.push((
            input.clone(),
            tokio::task::spawn_blocking(move || pipeline.process_document(&path, page_index)),
        ));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (file, handle) in handles {
        let result = match handle.await {
            Ok(result) => result.map_err(anyhow::Error::from),
            Err(err) => Err(anyhow!("worker stopped: {}", err)),
        };
        results.push((file, result));
    }
    render_report(config.page, results)
}

/// Serializes per-file results. A single input prints one object and fails
/// with its error. Several inputs print an array where each failed file
/// carries an `error` entry; the run fails only when every file failed.
fn render_report(page: usize, results: Vec<(PathBuf, Result<PageExtraction>)>) -> Result<String> {
    let single = results.len() == 1;
    let mut outputs = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for (file, result) in results {
        match result {
            Ok(extraction) => {
                info!(
                    "{}: {} blocks extracted",
                    file.display(),
                    extraction.blocks.len()
                );
                outputs.push(DocumentOutput {
                    file,
                    page,
                    error: None,
                    extraction: Some(extraction),
                });
            }
            Err(err) if single => {
                return Err(err.context(format!("failed to process {}", file.display())));
            }
            Err(err) => {
                let message = format!("{:#}", err);
                warn!("{}: {}", file.display(), message);
                failures.push(format!("{}: {}", file.display(), message));
                outputs.push(DocumentOutput {
                    file,
                    page,
                    error: Some(message),
                    extraction: None,
                });
            }
        }
    }
    if !outputs.is_empty() && failures.len() == outputs.len() {
        return Err(anyhow!("every document failed:\n{}", failures.join("\n")));
    }

    let json = if single {
        serde_json::to_string_pretty(&outputs[0])
    } else {
        serde_json::to_string_pretty(&outputs)
    };
    json.with_context(|| "failed to serialize output")
}

pub fn pipeline_options(settings: &settings::Settings) -> PipelineOptions {
    PipelineOptions {
        thresholds: settings.merge,
        heuristic: settings.heuristic,
        zoom: settings.zoom,
        render_timeout: settings.render_timeout,
        parallel: settings.parallel,
        tools: pdf::PdfTools::default(),
        colors: settings.colors.clone(),
        debug: None,
    }
}

fn build_detector(
    config: &Config,
    settings: &settings::Settings,
) -> Result<Arc<dyn LayoutDetector>> {
    let filter = settings.detector.filter();
    if let Some(path) = config.detections.as_deref() {
        if config.inputs.len() > 1 {
            return Err(anyhow!("--detections applies to a single input PDF"));
        }
        return Ok(Arc::new(layout::JsonDetections::from_path(path, &filter)?));
    }
    let Some(command) = settings.detector.command.as_deref() else {
        return Err(anyhow!(
            "no layout detector configured: pass --detections or set [detector] command in settings"
        ));
    };
    Ok(Arc::new(
        layout::CommandDetector::new(command, settings.detector.args.clone())
            .with_timeout(settings.detector.timeout)
            .with_filter(filter),
    ))
}
