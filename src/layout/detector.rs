use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use std::time::Duration;
use tracing::{info, warn};

use super::{DetectionFilter, LayoutDetector, RawDetection, parse_detections};
use crate::process::output_with_timeout;

const IMAGE_PLACEHOLDER: &str = "{image}";

/// Runs an external detector program on a temporary PNG of the page.
///
/// The program receives the image path (substituted for `{image}` in the
/// arguments, or appended last) and must print detections JSON on stdout.
#[derive(Debug, Clone)]
pub struct CommandDetector {
    program: String,
    args: Vec<String>,
    timeout: Duration,
    filter: DetectionFilter,
}

impl CommandDetector {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(120),
            filter: DetectionFilter::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_filter(mut self, filter: DetectionFilter) -> Self {
        self.filter = filter;
        self
    }

    fn build_args(&self, image_path: &Path) -> Vec<String> {
        let image = image_path.to_string_lossy();
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(IMAGE_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(IMAGE_PLACEHOLDER, image.as_ref())
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !substituted {
            args.push(image.to_string());
        }
        args
    }
}

impl LayoutDetector for CommandDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>> {
        let mut tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for layout detection")?;
        image
            .write_to(&mut tmp, image::ImageFormat::Png)
            .with_context(|| "failed to write temp image for layout detection")?;
        tmp.flush().ok();

        let args = self.build_args(tmp.path());
        info!("detector: running {}", self.program);
        let output = output_with_timeout(Command::new(&self.program).args(&args), self.timeout)
            .with_context(|| format!("failed to run detector '{}'", self.program))?
            .ok_or_else(|| {
                anyhow!(
                    "detector '{}' timed out after {:?}",
                    self.program,
                    self.timeout
                )
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "detector '{}' failed: {}",
                self.program,
                stderr.trim()
            ));
        }
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detections = parse_detections(&stdout, &self.filter)?;
        info!("detector: {} detections", detections.len());
        Ok(detections)
    }
}

/// Detections computed ahead of time, e.g. by a separate model run.
#[derive(Debug, Clone, Default)]
pub struct JsonDetections {
    detections: Vec<RawDetection>,
}

impl JsonDetections {
    pub fn new(detections: Vec<RawDetection>) -> Self {
        Self { detections }
    }

    pub fn from_path(path: &Path, filter: &DetectionFilter) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read detections: {}", path.display()))?;
        let detections = parse_detections(&content, filter)
            .with_context(|| format!("invalid detections file: {}", path.display()))?;
        Ok(Self { detections })
    }
}

impl LayoutDetector for JsonDetections {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<RawDetection>> {
        let width = i32::try_from(image.width()).unwrap_or(i32::MAX);
        let height = i32::try_from(image.height()).unwrap_or(i32::MAX);
        let outside = self
            .detections
            .iter()
            .filter(|d| d.bbox.x2 > width || d.bbox.y2 > height || d.bbox.x1 < 0 || d.bbox.y1 < 0)
            .count();
        if outside > 0 {
            warn!(
                "{} precomputed detections exceed the {}x{} raster; were they made at another zoom?",
                outside, width, height
            );
        }
        Ok(self.detections.clone())
    }
}
