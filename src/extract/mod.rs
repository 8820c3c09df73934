//! Per-region text extraction: the page's own text layer first, OCR for
//! regions that look scanned.

mod native;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ConfigError, RegionFailure};
use crate::geometry::{BBox, CoordinateMapper};
use crate::ocr::OcrEngine;
use crate::text::normalize_block_text;

pub use native::{NativeTextSource, PdfTextLayer, TextLine, TextWord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Native,
    Ocr,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Native => "native",
            ExtractionMethod::Ocr => "ocr",
        }
    }
}

/// Decides when a region is treated as a scanned image: a large box with
/// almost no native text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanHeuristic {
    /// Native text shorter than this (in characters) counts as missing.
    pub min_native_chars: usize,
    /// Box area in raster pixels that must be exceeded.
    pub min_scan_area: i64,
}

impl Default for ScanHeuristic {
    fn default() -> Self {
        Self {
            min_native_chars: 3,
            min_scan_area: 500,
        }
    }
}

impl ScanHeuristic {
    pub fn is_scan(&self, native_chars: usize, area: i64) -> bool {
        native_chars < self.min_native_chars && area > self.min_scan_area
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_scan_area < 0 {
            return Err(ConfigError::NegativeScanArea(self.min_scan_area));
        }
        Ok(())
    }
}

/// Text of one region and how it was obtained.
#[derive(Debug)]
pub struct RegionText {
    pub content: String,
    pub method: ExtractionMethod,
    /// Set when extraction failed; `content` then holds the failure marker.
    pub failure: Option<RegionFailure>,
}

impl RegionText {
    fn ok(content: String, method: ExtractionMethod) -> Self {
        Self {
            content,
            method,
            failure: None,
        }
    }

    fn failed(failure: RegionFailure, method: ExtractionMethod) -> Self {
        Self {
            content: failure.marker(),
            method,
            failure: Some(failure),
        }
    }
}

/// Everything a region extraction reads. Shared, read-only, per page.
#[derive(Clone, Copy)]
pub struct ExtractionContext<'a> {
    pub mapper: &'a CoordinateMapper,
    pub text_source: &'a dyn NativeTextSource,
    pub ocr: &'a dyn OcrEngine,
    /// The raster used for detection; OCR needs it for cropping.
    pub image: Option<&'a DynamicImage>,
    pub heuristic: ScanHeuristic,
}

/// Extracts the text inside `bbox` (raster pixels). Never fails: problems
/// are reported through [`RegionText::failure`].
pub fn extract_region(bbox: &BBox, ctx: &ExtractionContext<'_>) -> RegionText {
    let rect = ctx.mapper.to_native(bbox);
    let (native_text, native_failure) = match ctx.text_source.text_in(&rect) {
        Ok(text) => (normalize_block_text(&text), None),
        Err(err) => (
            String::new(),
            Some(RegionFailure::NativeText(err.to_string())),
        ),
    };

    let is_scan = ctx
        .heuristic
        .is_scan(native_text.chars().count(), bbox.area());

    match (is_scan, ctx.image) {
        (true, Some(image)) => {
            if let Some(failure) = native_failure {
                debug!("native text unavailable, using ocr: {}", failure);
            }
            recognize_region(bbox, image, ctx.ocr)
        }
        _ => match native_failure {
            Some(failure) => {
                warn!("region {:?}: {}", <[i32; 4]>::from(*bbox), failure);
                RegionText::failed(failure, ExtractionMethod::Native)
            }
            None => RegionText::ok(native_text, ExtractionMethod::Native),
        },
    }
}

fn recognize_region(bbox: &BBox, image: &DynamicImage, ocr: &dyn OcrEngine) -> RegionText {
    let Some(crop_box) = bbox.clamp_to(image.width(), image.height()) else {
        return RegionText::failed(
            RegionFailure::Crop {
                x1: bbox.x1,
                y1: bbox.y1,
                x2: bbox.x2,
                y2: bbox.y2,
                width: image.width(),
                height: image.height(),
            },
            ExtractionMethod::Ocr,
        );
    };
    let crop = image.crop_imm(
        crop_box.x1 as u32,
        crop_box.y1 as u32,
        crop_box.width() as u32,
        crop_box.height() as u32,
    );
    match ocr.recognize(&crop) {
        Ok(text) => RegionText::ok(normalize_block_text(&text), ExtractionMethod::Ocr),
        Err(err) => {
            warn!("region {:?}: ocr failed: {}", <[i32; 4]>::from(*bbox), err);
            RegionText::failed(RegionFailure::Ocr(err), ExtractionMethod::Ocr)
        }
    }
}
