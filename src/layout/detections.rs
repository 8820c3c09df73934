use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::geometry::BBox;

use super::RawDetection;

/// Parsed coordinates are clipped to this many pixels either side of zero.
const MAX_PIXEL: f64 = 1_000_000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DetectionFilter {
    /// Detections reporting a lower confidence are dropped.
    pub min_confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct DetectionRecord {
    #[serde(alias = "type", alias = "class")]
    label: String,
    #[serde(default, alias = "box", alias = "coordinates", alias = "xyxy")]
    bbox: Option<[f64; 4]>,
    #[serde(default)]
    polygon: Option<Vec<[f64; 2]>>,
    #[serde(default, alias = "conf", alias = "score")]
    confidence: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DetectionPayload {
    List(Vec<DetectionRecord>),
    Wrapped { detections: Vec<DetectionRecord> },
}

/// Parses detector JSON: either a list of detections or `{"detections": [...]}`.
///
/// Coordinates are clipped to +/-1e6 and truncated to whole pixels. A
/// polygon is reduced to its bounding box. Reversed corners are normalized;
/// empty boxes are dropped.
pub fn parse_detections(json: &str, filter: &DetectionFilter) -> Result<Vec<RawDetection>> {
    let payload: DetectionPayload =
        serde_json::from_str(json).with_context(|| "failed to parse detections json")?;
    let records = match payload {
        DetectionPayload::List(records) => records,
        DetectionPayload::Wrapped { detections } => detections,
    };

    let mut detections = Vec::with_capacity(records.len());
    for (idx, record) in records.into_iter().enumerate() {
        let label = record.label.trim();
        if label.is_empty() {
            warn!("detection {}: empty label, skipped", idx);
            continue;
        }
        let Some(bbox) = record_bbox(&record) else {
            warn!("detection {} ({}): no bbox or polygon, skipped", idx, label);
            continue;
        };
        if !bbox.is_valid() {
            warn!(
                "detection {} ({}): empty box {:?}, skipped",
                idx,
                label,
                <[i32; 4]>::from(bbox)
            );
            continue;
        }
        if let (Some(min), Some(conf)) = (filter.min_confidence, record.confidence) {
            if conf < min {
                debug!(
                    "detection {} ({}): confidence {:.2} below {:.2}",
                    idx, label, conf, min
                );
                continue;
            }
        }
        detections.push(RawDetection {
            label: label.to_string(),
            bbox,
            confidence: record.confidence,
        });
    }
    Ok(detections)
}

fn record_bbox(record: &DetectionRecord) -> Option<BBox> {
    if let Some([x1, y1, x2, y2]) = record.bbox {
        return Some(BBox::from_corners(pixel(x1), pixel(y1), pixel(x2), pixel(y2)));
    }
    let polygon = record.polygon.as_ref().filter(|points| !points.is_empty())?;
    let xs = polygon.iter().map(|point| point[0]);
    let ys = polygon.iter().map(|point| point[1]);
    let min_x = xs.clone().fold(f64::INFINITY, f64::min);
    let max_x = xs.fold(f64::NEG_INFINITY, f64::max);
    let min_y = ys.clone().fold(f64::INFINITY, f64::min);
    let max_y = ys.fold(f64::NEG_INFINITY, f64::max);
    Some(BBox::new(pixel(min_x), pixel(min_y), pixel(max_x), pixel(max_y)))
}

/// NaN becomes 0.
fn pixel(value: f64) -> i32 {
    value.clamp(-MAX_PIXEL, MAX_PIXEL) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_field_names() {
        let json = r#"[
            {"label": "Title", "bbox": [10.7, 20.2, 300.9, 60.0], "confidence": 0.91},
            {"type": "Text", "coordinates": [10, 70, 300, 90]},
            {"class": "Table", "box": [5, 100, 400, 300], "conf": 0.5}
        ]"#;
        let detections = parse_detections(json, &DetectionFilter::default()).expect("parse");
        assert_eq!(detections.len(), 3);
        assert_eq!(detections[0].label, "Title");
        assert_eq!(detections[0].bbox, BBox::new(10, 20, 300, 60));
        assert_eq!(detections[0].confidence, Some(0.91));
        assert_eq!(detections[1].label, "Text");
        assert_eq!(detections[1].confidence, None);
        assert_eq!(detections[2].label, "Table");
        assert_eq!(detections[2].confidence, Some(0.5));
    }

    #[test]
    fn reduces_polygons_to_bounds() {
        let json = r#"{"detections": [
            {"label": "Text", "polygon": [[12, 40], [200, 38], [201, 70], [11, 72]]}
        ]}"#;
        let detections = parse_detections(json, &DetectionFilter::default()).expect("parse");
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, BBox::new(11, 38, 201, 72));
    }

    #[test]
    fn normalizes_reversed_corners_and_drops_empty_boxes() {
        let json = r#"[
            {"label": "Text", "bbox": [300, 90, 10, 70]},
            {"label": "Text", "bbox": [10, 70, 10, 90]},
            {"label": "  ", "bbox": [10, 70, 20, 90]},
            {"label": "Text"}
        ]"#;
        let detections = parse_detections(json, &DetectionFilter::default()).expect("parse");
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].bbox, BBox::new(10, 70, 300, 90));
    }

    #[test]
    fn filters_low_confidence() {
        let json = r#"[
            {"label": "Text", "bbox": [0, 0, 10, 10], "confidence": 0.2},
            {"label": "Text", "bbox": [0, 20, 10, 30], "confidence": 0.3},
            {"label": "Text", "bbox": [0, 40, 10, 50]}
        ]"#;
        let filter = DetectionFilter {
            min_confidence: Some(0.25),
        };
        let detections = parse_detections(json, &filter).expect("parse");
        let tops: Vec<i32> = detections.iter().map(|d| d.bbox.y1).collect();
        assert_eq!(tops, vec![20, 40]);
    }

    #[test]
    fn huge_coordinates_are_clipped() {
        let json = r#"[
            {"label": "Text", "bbox": [-1e12, 10, 100, 60]},
            {"label": "Title", "polygon": [[100, 70], [1e300, 90]]}
        ]"#;
        let detections = parse_detections(json, &DetectionFilter::default()).expect("parse");
        assert_eq!(detections[0].bbox, BBox::new(-1_000_000, 10, 100, 60));
        assert_eq!(detections[1].bbox, BBox::new(100, 70, 1_000_000, 90));
        assert_eq!(crate::layout::merge_regions(&detections, Default::default()).len(), 2);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(parse_detections("{\"boxes\": 3}", &DetectionFilter::default()).is_err());
    }
}
