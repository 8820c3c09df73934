mod tesseract;

use image::DynamicImage;
use std::time::Duration;

use crate::error::OcrError;

pub use tesseract::{TesseractOcr, list_tesseract_languages};

/// Optical recognition of one cropped region.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, crop: &DynamicImage) -> Result<String, OcrError>;
}

/// Recognition parameters. The defaults read a single uniform block of
/// French or English text.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrProfile {
    pub program: String,
    pub languages: String,
    /// Tesseract page segmentation mode.
    pub psm: u32,
    pub oem: Option<u32>,
    pub dpi: Option<u32>,
    pub timeout: Duration,
}

impl Default for OcrProfile {
    fn default() -> Self {
        Self {
            program: "tesseract".to_string(),
            languages: "fra+eng".to_string(),
            psm: 6,
            oem: None,
            dpi: None,
            timeout: Duration::from_secs(60),
        }
    }
}
