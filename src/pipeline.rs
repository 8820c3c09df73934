use image::DynamicImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

use crate::debug::{DebugConfig, LabelColors, OverlayBox, save_overlay, save_region_crop};
use crate::error::{ConfigError, PipelineError};
use crate::extract::{
    ExtractionContext, ExtractionMethod, NativeTextSource, RegionText, ScanHeuristic,
    extract_region,
};
use crate::geometry::{BBox, CoordinateMapper};
use crate::layout::{LayoutDetector, MergeThresholds, MergedRegion, merge_regions};
use crate::ocr::OcrEngine;
use crate::pdf::{PdfDocument, PdfTools};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub thresholds: MergeThresholds,
    pub heuristic: ScanHeuristic,
    /// Raster scale relative to 72 DPI.
    pub zoom: f32,
    pub render_timeout: Duration,
    pub parallel: bool,
    pub tools: PdfTools,
    pub colors: LabelColors,
    pub debug: Option<DebugConfig>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            thresholds: MergeThresholds::default(),
            heuristic: ScanHeuristic::default(),
            zoom: 2.0,
            render_timeout: Duration::from_secs(60),
            parallel: false,
            tools: PdfTools::default(),
            colors: LabelColors::default(),
            debug: None,
        }
    }
}

impl PipelineOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.thresholds.validate()?;
        self.heuristic.validate()?;
        if !self.zoom.is_finite() || self.zoom <= 0.0 {
            return Err(ConfigError::InvalidZoom(self.zoom));
        }
        if self.render_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout("render.timeout_secs"));
        }
        Ok(())
    }
}

/// A rendered page together with its size in native units.
#[derive(Debug, Clone)]
pub struct RasterPage {
    pub image: DynamicImage,
    pub page_width: f64,
    pub page_height: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtractedBlock {
    pub id: usize,
    #[serde(rename = "type")]
    pub block_type: String,
    pub coordinates: BBox,
    pub content: String,
    pub extraction_method: ExtractionMethod,
    pub ui_color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageExtraction {
    pub blocks: Vec<ExtractedBlock>,
    pub debug_image: Option<PathBuf>,
}

/// Detect, merge and extract one page at a time. Collaborators are shared
/// read-only and may be used from several pipelines at once.
#[derive(Clone)]
pub struct Pipeline {
    detector: Arc<dyn LayoutDetector>,
    ocr: Arc<dyn OcrEngine>,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        detector: Arc<dyn LayoutDetector>,
        ocr: Arc<dyn OcrEngine>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            detector,
            ocr,
            options,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Processes one page (0-based) of a PDF file.
    pub fn process_document(
        &self,
        path: &Path,
        page: usize,
    ) -> Result<PageExtraction, PipelineError> {
        self.options.validate()?;
        let document =
            PdfDocument::open_with(path, self.options.tools.clone(), self.options.render_timeout)?;
        document.check_page(page)?;
        info!(
            "pipeline: {} page {}/{}",
            path.display(),
            page + 1,
            document.page_count()
        );

        // A page whose text layer cannot be read fails before anything is rendered.
        let text_layer = document.text_layer(page)?;
        let (page_width, page_height) = match document.crop_box_size(page)? {
            Some(size) => size,
            None => text_layer.page_size(),
        };
        let image = document.rasterize(page, self.options.zoom)?;
        let raster = RasterPage {
            image,
            page_width,
            page_height,
        };
        self.process_raster(&raster, &text_layer)
    }

    /// Processes an already rendered page against its text layer.
    pub fn process_raster(
        &self,
        page: &RasterPage,
        text_source: &dyn NativeTextSource,
    ) -> Result<PageExtraction, PipelineError> {
        self.options.validate()?;
        let image = &page.image;
        let mapper = CoordinateMapper::new(
            page.page_width,
            page.page_height,
            image.width(),
            image.height(),
        )
        .map_err(PipelineError::Coordinates)?;

        let detections = self
            .detector
            .detect(image)
            .map_err(|err| PipelineError::Detection(format!("{:#}", err)))?;
        let mut regions = merge_regions(&detections, self.options.thresholds);
        regions.sort_by_key(|region| region.bbox.y1);
        info!(
            "pipeline: {} detections merged into {} regions",
            detections.len(),
            regions.len()
        );

        let ctx = ExtractionContext {
            mapper: &mapper,
            text_source,
            ocr: self.ocr.as_ref(),
            image: Some(image),
            heuristic: self.options.heuristic,
        };
        let texts = if self.options.parallel {
            extract_parallel(&regions, ctx)
        } else {
            regions
                .iter()
                .map(|region| extract_region(&region.bbox, &ctx))
                .collect()
        };

        let mut blocks: Vec<ExtractedBlock> = regions
            .into_iter()
            .zip(texts)
            .enumerate()
            .map(|(id, (region, text))| build_block(id, region, text, &self.options.colors))
            .collect();

        let debug_image = self
            .options
            .debug
            .as_ref()
            .and_then(|config| write_debug_artifacts(config, image, &mut blocks));

        Ok(PageExtraction {
            blocks,
            debug_image,
        })
    }
}

fn build_block(
    id: usize,
    region: MergedRegion,
    text: RegionText,
    colors: &LabelColors,
) -> ExtractedBlock {
    debug!(
        "block {}: {} via {} ({} chars)",
        id,
        region.label,
        text.method.as_str(),
        text.content.chars().count()
    );
    ExtractedBlock {
        id,
        ui_color: colors.color_for(&region.label).to_string(),
        block_type: region.label,
        coordinates: region.bbox,
        content: text.content,
        extraction_method: text.method,
        confidence: region.confidence,
        image_path: None,
        error: text.failure.map(|failure| failure.to_string()),
    }
}

/// Extracts on scoped worker threads. Each worker takes a contiguous chunk,
/// and chunks are joined in order so results line up with `regions`.
fn extract_parallel(regions: &[MergedRegion], ctx: ExtractionContext<'_>) -> Vec<RegionText> {
    if regions.is_empty() {
        return Vec::new();
    }
    let workers = num_cpus::get().clamp(1, regions.len());
    let chunk_size = regions.len().div_ceil(workers);
    debug!(
        "pipeline: extracting {} regions on {} workers",
        regions.len(),
        workers
    );

    thread::scope(|scope| {
        let handles: Vec<_> = regions
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|region| extract_region(&region.bbox, &ctx))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
            })
            .collect()
    })
}

fn write_debug_artifacts(
    config: &DebugConfig,
    image: &DynamicImage,
    blocks: &mut [ExtractedBlock],
) -> Option<PathBuf> {
    for block in blocks.iter_mut() {
        block.image_path =
            save_region_crop(config, image, block.id, &block.block_type, &block.coordinates);
    }
    let boxes: Vec<OverlayBox<'_>> = blocks
        .iter()
        .map(|block| OverlayBox {
            bbox: block.coordinates,
            label: &block.block_type,
            color: &block.ui_color,
            method: block.extraction_method,
        })
        .collect();
    save_overlay(config, image, &boxes)
}
