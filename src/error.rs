use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Invalid configuration, detected before any page work starts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("merge threshold '{name}' must be >= 0 (got {value})")]
    NegativeThreshold { name: &'static str, value: i32 },

    #[error("render zoom must be a positive finite number (got {0})")]
    InvalidZoom(f32),

    #[error("minimum scan area must be >= 0 (got {0})")]
    NegativeScanArea(i64),

    #[error("ocr languages is empty")]
    EmptyOcrLanguages,

    #[error("timeout '{0}' must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("page dimensions must be positive and finite (got {width}x{height})")]
    InvalidPageSize { width: f64, height: f64 },

    #[error("raster image has a zero dimension ({width}x{height})")]
    ZeroSizedImage { width: u32, height: u32 },
}

/// Failures that abort a whole page invocation.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to open document {}: {message}", path.display())]
    DocumentOpen { path: PathBuf, message: String },

    #[error("document has no pages: {}", .0.display())]
    NoPages(PathBuf),

    #[error("page {page} is out of range (document has {count} pages)")]
    PageOutOfRange { page: usize, count: usize },

    #[error("failed to rasterize page: {0}")]
    Rasterize(String),

    #[error("cannot map coordinates: {0}")]
    Coordinates(ConfigError),

    #[error("layout detection failed: {0}")]
    Detection(String),

    #[error("failed to load native text layer: {0}")]
    TextLayer(String),
}

/// Errors raised by an OCR engine for a single crop.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("external tool not found: {0}")]
    ToolNotFound(String),

    #[error("ocr failed: {0}")]
    Failed(String),

    #[error("ocr timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to encode crop: {0}")]
    Encode(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A per-region failure. It is stored on the block instead of being raised.
#[derive(Debug, Error)]
pub enum RegionFailure {
    #[error("OCR Error: {0}")]
    Ocr(#[from] OcrError),

    #[error("Crop Error: box {x1},{y1},{x2},{y2} is empty inside a {width}x{height} image")]
    Crop {
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
        width: u32,
        height: u32,
    },

    #[error("Native Text Error: {0}")]
    NativeText(String),
}

impl RegionFailure {
    /// Visible marker placed in the block content.
    pub fn marker(&self) -> String {
        format!("[{}]", self)
    }
}
