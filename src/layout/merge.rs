use crate::error::ConfigError;

use super::{MergedRegion, RawDetection};

/// Pixel thresholds for the merge sweep, calibrated for a 300 DPI raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeThresholds {
    /// Maximum left-edge offset (exclusive) for two boxes to share a column.
    pub horizontal: i32,
    /// Maximum gap (exclusive) between a box's bottom and the next box's top.
    pub vertical: i32,
}

impl Default for MergeThresholds {
    fn default() -> Self {
        Self {
            horizontal: 15,
            vertical: 15,
        }
    }
}

impl MergeThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horizontal < 0 {
            return Err(ConfigError::NegativeThreshold {
                name: "horizontal_threshold",
                value: self.horizontal,
            });
        }
        if self.vertical < 0 {
            return Err(ConfigError::NegativeThreshold {
                name: "vertical_threshold",
                value: self.vertical,
            });
        }
        Ok(())
    }
}

/// Merges fragmented detections (typically one box per text line) into
/// paragraph-level regions.
///
/// Detections are stably sorted by their top edge and swept once; each
/// detection either joins the running region or closes it. Labels are never
/// mixed.
pub fn merge_regions(detections: &[RawDetection], thresholds: MergeThresholds) -> Vec<MergedRegion> {
    let mut order: Vec<usize> = (0..detections.len()).collect();
    order.sort_by_key(|&idx| detections[idx].bbox.y1);

    let mut sweep = order.into_iter();
    let Some(first) = sweep.next() else {
        return Vec::new();
    };

    let (mut merged, last) = sweep.fold(
        (Vec::new(), MergedRegion::start(first, &detections[first])),
        |(mut merged, current), idx| {
            let next = &detections[idx];
            if current.accepts(next, thresholds) {
                (merged, current.absorb(idx, next))
            } else {
                merged.push(current);
                (merged, MergedRegion::start(idx, next))
            }
        },
    );
    merged.push(last);
    merged
}

impl MergedRegion {
    fn start(idx: usize, detection: &RawDetection) -> Self {
        MergedRegion {
            label: detection.label.clone(),
            bbox: detection.bbox,
            confidence: detection.confidence,
            sources: vec![idx],
        }
    }

    /// Offsets are taken in i64 so far-apart coordinates cannot overflow.
    fn accepts(&self, next: &RawDetection, thresholds: MergeThresholds) -> bool {
        if self.label != next.label {
            return false;
        }
        let x_offset = (i64::from(self.bbox.x1) - i64::from(next.bbox.x1)).abs();
        let vertical_gap = i64::from(next.bbox.y1) - i64::from(self.bbox.y2);
        x_offset < i64::from(thresholds.horizontal) && vertical_gap < i64::from(thresholds.vertical)
    }

    fn absorb(mut self, idx: usize, next: &RawDetection) -> Self {
        self.bbox = self.bbox.union(&next.bbox);
        self.confidence = match (self.confidence, next.confidence) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        self.sources.push(idx);
        self
    }
}
