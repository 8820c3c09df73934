//! Debug artifacts: an annotated copy of the page raster and one padded crop
//! per region. Nothing here is allowed to fail a page run.

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::DynamicImage;
use resvg::render;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tiny_skia::Pixmap;
use tracing::{info, warn};
use usvg::{Options, Tree, fontdb};

use crate::extract::ExtractionMethod;
use crate::geometry::BBox;
use crate::paths;

const TAG_WIDTH: i32 = 150;
const TAG_HEIGHT: i32 = 20;
const STROKE_WIDTH: u32 = 3;
const DEFAULT_COLOR: &str = "gray";

/// Colour per region label. Drives both the overlay and each block's
/// `ui_color`; unknown labels get gray.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelColors(HashMap<String, String>);

impl LabelColors {
    pub fn insert(&mut self, label: impl Into<String>, color: impl Into<String>) {
        self.0.insert(label.into(), color.into());
    }

    pub fn color_for(&self, label: &str) -> &str {
        self.0.get(label).map(String::as_str).unwrap_or(DEFAULT_COLOR)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelColors {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut colors = LabelColors::default();
        for (label, color) in iter {
            colors.insert(label, color);
        }
        colors
    }
}

#[derive(Debug, Clone)]
pub struct DebugConfig {
    output_dir: PathBuf,
    base_name: String,
    crop_padding: i32,
}

impl DebugConfig {
    pub fn new(output_dir: PathBuf, base_name: &str) -> Self {
        Self {
            output_dir,
            base_name: sanitize_filename_component(base_name),
            crop_padding: 5,
        }
    }

    pub fn with_crop_padding(mut self, padding: i32) -> Self {
        self.crop_padding = padding.max(0);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Config for one page of a multi-page run; file names gain `_pageNN`.
    pub fn for_page(&self, index: usize) -> DebugConfig {
        DebugConfig {
            base_name: format!("{}_page{:02}", self.base_name, index + 1),
            ..self.clone()
        }
    }

    pub fn overlay_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}_layout.png", self.base_name))
    }

    pub fn crop_path(&self, id: usize, label: &str) -> PathBuf {
        self.output_dir.join(format!(
            "{}_zone_{}_{}.png",
            self.base_name,
            id,
            sanitize_filename_component(label)
        ))
    }
}

/// Builds a config whose files are named after `src_path`, inside `dir` or the
/// default debug directory.
pub fn build_debug_config(src_path: &Path, dir: Option<&Path>) -> Result<DebugConfig> {
    let dir = dir.map(Path::to_path_buf).unwrap_or_else(paths::debug_dir);
    let base = src_path
        .file_stem()
        .and_then(|value| value.to_str())
        .unwrap_or("input");
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create debug dir: {}", dir.display()))?;
    Ok(DebugConfig::new(dir, base))
}

/// One annotated region on the overlay.
#[derive(Debug, Clone, Copy)]
pub struct OverlayBox<'a> {
    pub bbox: BBox,
    pub label: &'a str,
    pub color: &'a str,
    pub method: ExtractionMethod,
}

/// Saves a crop of `bbox` grown by the configured padding. Returns the path
/// when the file was written.
pub fn save_region_crop(
    config: &DebugConfig,
    image: &DynamicImage,
    id: usize,
    label: &str,
    bbox: &BBox,
) -> Option<PathBuf> {
    let Some(padded) = bbox.padded(config.crop_padding, image.width(), image.height()) else {
        warn!("debug: region {} lies outside the raster, no crop saved", id);
        return None;
    };
    let crop = image.crop_imm(
        padded.x1 as u32,
        padded.y1 as u32,
        padded.width() as u32,
        padded.height() as u32,
    );
    let path = config.crop_path(id, label);
    match crop.save(&path) {
        Ok(()) => Some(path),
        Err(err) => {
            warn!("debug: failed to save {}: {}", path.display(), err);
            None
        }
    }
}

/// Renders and saves the annotated page. Returns the path when written.
pub fn save_overlay(
    config: &DebugConfig,
    image: &DynamicImage,
    boxes: &[OverlayBox<'_>],
) -> Option<PathBuf> {
    let path = config.overlay_path();
    let result = encode_png(image)
        .map(|png| render_overlay_svg(&png, image.width(), image.height(), boxes))
        .and_then(|svg| render_svg_bytes(&svg))
        .and_then(|bytes| {
            std::fs::write(&path, bytes)
                .with_context(|| format!("failed to write {}", path.display()))
        });
    match result {
        Ok(()) => {
            info!("debug: overlay written to {}", path.display());
            Some(path)
        }
        Err(err) => {
            warn!("debug: overlay skipped: {:#}", err);
            None
        }
    }
}

pub fn render_overlay_svg(
    image_png: &[u8],
    width: u32,
    height: u32,
    boxes: &[OverlayBox<'_>],
) -> String {
    let data_uri = format!("data:image/png;base64,{}", BASE64.encode(image_png));

    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    svg.push_str(&format!(
        r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
        uri = data_uri,
        w = width,
        h = height
    ));

    for item in boxes {
        let color = escape_xml(item.color);
        let BBox { x1, y1, .. } = item.bbox;
        svg.push_str(&format!(
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" stroke="{c}" stroke-width="{s}"/>"#,
            x = x1,
            y = y1,
            w = item.bbox.width(),
            h = item.bbox.height(),
            c = color,
            s = STROKE_WIDTH
        ));
        // The tag sits above the box and may run off the top edge.
        svg.push_str(&format!(
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="{c}"/>"#,
            x = x1,
            y = y1 - TAG_HEIGHT,
            w = TAG_WIDTH,
            h = TAG_HEIGHT,
            c = color
        ));
        svg.push_str(&format!(
            r#"<text x="{x}" y="{y}" font-family="sans-serif" font-size="12" fill="white">{t}</text>"#,
            x = x1 + 5,
            y = y1 - 5,
            t = escape_xml(&format!("{} ({})", item.label, item.method.as_str()))
        ));
    }

    svg.push_str("</svg>");
    svg
}

pub fn render_svg_bytes(svg: &str) -> Result<Vec<u8>> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    let options = Options {
        fontdb: Arc::new(db),
        ..Options::default()
    };
    let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse SVG")?;
    let size = tree.size().to_int_size();
    let mut pixmap =
        Pixmap::new(size.width(), size.height()).ok_or_else(|| anyhow!("empty SVG size"))?;
    let mut pixmap_mut = pixmap.as_mut();
    render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
    let image = image::RgbaImage::from_raw(size.width(), size.height(), pixmap.data().to_vec())
        .ok_or_else(|| anyhow!("failed to build image buffer from SVG"))?;
    encode_png(&DynamicImage::ImageRgba8(image))
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .with_context(|| "failed to encode png")?;
    Ok(bytes)
}

fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::new();
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else if ch.is_whitespace() {
            out.push('_');
        }
    }
    if out.is_empty() {
        "input".to_string()
    } else {
        out
    }
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
