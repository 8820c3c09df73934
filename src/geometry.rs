use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Axis-aligned box in raster pixel space, serialized as `[x1, y1, x2, y2]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl From<[i32; 4]> for BBox {
    fn from(value: [i32; 4]) -> Self {
        BBox::new(value[0], value[1], value[2], value[3])
    }
}

impl From<BBox> for [i32; 4] {
    fn from(value: BBox) -> Self {
        [value.x1, value.y1, value.x2, value.y2]
    }
}

impl BBox {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Builds a box from two arbitrary corners.
    pub fn from_corners(ax: i32, ay: i32, bx: i32, by: i32) -> Self {
        Self {
            x1: ax.min(bx),
            y1: ay.min(by),
            x2: ax.max(bx),
            y2: ay.max(by),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }

    pub fn width(&self) -> i32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> i32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn area(&self) -> i64 {
        i64::from(self.width()) * i64::from(self.height())
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    pub fn contains(&self, other: &BBox) -> bool {
        self.x1 <= other.x1 && self.y1 <= other.y1 && self.x2 >= other.x2 && self.y2 >= other.y2
    }

    /// Grows the box by `pad` on every side, then clips it to the image.
    pub fn padded(&self, pad: i32, width: u32, height: u32) -> Option<BBox> {
        BBox {
            x1: self.x1 - pad,
            y1: self.y1 - pad,
            x2: self.x2 + pad,
            y2: self.y2 + pad,
        }
        .clamp_to(width, height)
    }

    /// Clips the box to `[0, width] x [0, height]`; `None` if nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<BBox> {
        let max_x = i32::try_from(width).unwrap_or(i32::MAX);
        let max_y = i32::try_from(height).unwrap_or(i32::MAX);
        let clamped = BBox {
            x1: self.x1.clamp(0, max_x),
            y1: self.y1.clamp(0, max_y),
            x2: self.x2.clamp(0, max_x),
            y2: self.y2.clamp(0, max_y),
        };
        clamped.is_valid().then_some(clamped)
    }

    pub fn to_rect(&self) -> Rect {
        Rect {
            x0: f64::from(self.x1),
            y0: f64::from(self.y1),
            x1: f64::from(self.x2),
            y1: f64::from(self.y2),
        }
    }
}

/// Floating point rectangle, used for the page's native coordinate space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl Rect {
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.y0 && y <= self.y1
    }

    pub fn center(&self) -> (f64, f64) {
        ((self.x0 + self.x1) * 0.5, (self.y0 + self.y1) * 0.5)
    }
}

/// Maps raster pixels to native page units with one scale factor per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
    scale_x: f64,
    scale_y: f64,
}

impl CoordinateMapper {
    pub fn new(
        page_width: f64,
        page_height: f64,
        image_width: u32,
        image_height: u32,
    ) -> Result<Self, ConfigError> {
        if image_width == 0 || image_height == 0 {
            return Err(ConfigError::ZeroSizedImage {
                width: image_width,
                height: image_height,
            });
        }
        let valid = |value: f64| value.is_finite() && value > 0.0;
        if !valid(page_width) || !valid(page_height) {
            return Err(ConfigError::InvalidPageSize {
                width: page_width,
                height: page_height,
            });
        }
        Ok(Self {
            scale_x: page_width / f64::from(image_width),
            scale_y: page_height / f64::from(image_height),
        })
    }

    pub fn scale_x(&self) -> f64 {
        self.scale_x
    }

    pub fn scale_y(&self) -> f64 {
        self.scale_y
    }

    /// Raster box to native rectangle. No rounding on this path.
    pub fn to_native(&self, bbox: &BBox) -> Rect {
        self.map_rect(&bbox.to_rect())
    }

    pub fn map_rect(&self, rect: &Rect) -> Rect {
        Rect {
            x0: rect.x0 * self.scale_x,
            y0: rect.y0 * self.scale_y,
            x1: rect.x1 * self.scale_x,
            y1: rect.y1 * self.scale_y,
        }
    }

    /// The reciprocal mapping (native units back to raster pixels).
    pub fn inverse(&self) -> CoordinateMapper {
        CoordinateMapper {
            scale_x: 1.0 / self.scale_x,
            scale_y: 1.0 / self.scale_y,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_each_axis_independently() {
        let mapper = CoordinateMapper::new(612.0, 792.0, 1224, 1584 * 2).expect("mapper");
        assert!((mapper.scale_x() - 0.5).abs() < 1e-12);
        assert!((mapper.scale_y() - 0.25).abs() < 1e-12);

        let rect = mapper.to_native(&BBox::new(10, 20, 30, 41));
        assert_eq!(rect, Rect::new(5.0, 5.0, 15.0, 10.25));
    }

    #[test]
    fn rejects_zero_sized_image() {
        let err = CoordinateMapper::new(612.0, 792.0, 0, 100).unwrap_err();
        assert_eq!(
            err,
            ConfigError::ZeroSizedImage {
                width: 0,
                height: 100
            }
        );
        assert!(CoordinateMapper::new(612.0, 792.0, 100, 0).is_err());
    }

    #[test]
    fn rejects_degenerate_page() {
        assert!(CoordinateMapper::new(0.0, 792.0, 100, 100).is_err());
        assert!(CoordinateMapper::new(612.0, f64::NAN, 100, 100).is_err());
    }

    #[test]
    fn native_round_trip_restores_box() {
        let mapper = CoordinateMapper::new(595.28, 841.89, 1191, 1684).expect("mapper");
        let inverse = mapper.inverse();
        for bbox in [
            BBox::new(0, 0, 1191, 1684),
            BBox::new(10, 10, 200, 30),
            BBox::new(333, 777, 901, 1203),
        ] {
            let back = inverse.map_rect(&mapper.to_native(&bbox));
            let original = bbox.to_rect();
            assert!((back.x0 - original.x0).abs() < 1e-9);
            assert!((back.y0 - original.y0).abs() < 1e-9);
            assert!((back.x1 - original.x1).abs() < 1e-9);
            assert!((back.y1 - original.y1).abs() < 1e-9);
        }
    }

    #[test]
    fn union_covers_both_boxes() {
        let a = BBox::new(10, 10, 200, 30);
        let b = BBox::new(12, 32, 205, 50);
        let union = a.union(&b);
        assert_eq!(union, BBox::new(10, 10, 205, 50));
        assert!(union.contains(&a));
        assert!(union.contains(&b));
    }

    #[test]
    fn clamp_and_pad_stay_inside_image() {
        let bbox = BBox::new(-5, 2, 120, 90);
        assert_eq!(bbox.clamp_to(100, 80), Some(BBox::new(0, 2, 100, 80)));
        assert_eq!(BBox::new(150, 10, 180, 20).clamp_to(100, 80), None);
        assert_eq!(
            BBox::new(2, 3, 50, 60).padded(5, 100, 62),
            Some(BBox::new(0, 0, 55, 62))
        );
    }

    #[test]
    fn extents_saturate_instead_of_overflowing() {
        let wide = BBox::new(i32::MIN, 0, i32::MAX, 10);
        assert_eq!(wide.width(), i32::MAX);
        assert_eq!(wide.area(), i64::from(i32::MAX) * 10);
    }

    #[test]
    fn crop_box_page_maps_to_half_scale_raster() {
        // 540x720pt CropBox rendered at 144 DPI.
        let mapper = CoordinateMapper::new(540.0, 720.0, 1080, 1440).expect("mapper");
        let rect = mapper.to_native(&BBox::new(72, 144, 1080, 1440));
        assert_eq!((rect.x0, rect.y0, rect.x1, rect.y1), (36.0, 72.0, 540.0, 720.0));
    }

    #[test]
    fn serializes_as_array() {
        let json = serde_json::to_string(&BBox::new(1, 2, 3, 4)).expect("json");
        assert_eq!(json, "[1,2,3,4]");
        let parsed: BBox = serde_json::from_str("[5,6,7,8]").expect("parse");
        assert_eq!(parsed, BBox::new(5, 6, 7, 8));
    }
}
