mod detector;
mod detections;
mod merge;

use image::DynamicImage;
use serde::Serialize;

use crate::geometry::BBox;

pub use detector::{CommandDetector, JsonDetections};
pub use detections::{DetectionFilter, parse_detections};
pub use merge::{MergeThresholds, merge_regions};

/// One labeled box as produced by the layout detector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawDetection {
    pub label: String,
    pub bbox: BBox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

impl RawDetection {
    pub fn new(label: impl Into<String>, bbox: BBox) -> Self {
        Self {
            label: label.into(),
            bbox,
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// A region after merging. `bbox` is the union of every absorbed detection
/// and all of them share `label`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedRegion {
    pub label: String,
    pub bbox: BBox,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Indices of the absorbed detections in the merger's input.
    #[serde(skip)]
    pub sources: Vec<usize>,
}

impl From<&MergedRegion> for RawDetection {
    fn from(region: &MergedRegion) -> Self {
        RawDetection {
            label: region.label.clone(),
            bbox: region.bbox,
            confidence: region.confidence,
        }
    }
}

/// Visual layout detector. Implementations own their model and its lifecycle;
/// the pipeline only borrows them.
pub trait LayoutDetector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> anyhow::Result<Vec<RawDetection>>;
}
