use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::debug::LabelColors;
use crate::error::ConfigError;
use crate::extract::ScanHeuristic;
use crate::layout::{DetectionFilter, MergeThresholds};
use crate::ocr::OcrProfile;
use crate::paths;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    pub command: Option<String>,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub min_confidence: Option<f32>,
}

impl DetectorSettings {
    pub fn filter(&self) -> DetectionFilter {
        DetectionFilter {
            min_confidence: self.min_confidence,
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout: Duration::from_secs(120),
            min_confidence: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub merge: MergeThresholds,
    pub heuristic: ScanHeuristic,
    pub parallel: bool,
    pub ocr: OcrProfile,
    pub zoom: f32,
    pub render_timeout: Duration,
    pub detector: DetectorSettings,
    pub colors: LabelColors,
    pub debug_crop_padding: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            merge: MergeThresholds::default(),
            heuristic: ScanHeuristic::default(),
            parallel: false,
            ocr: OcrProfile::default(),
            zoom: 2.0,
            render_timeout: Duration::from_secs(60),
            detector: DetectorSettings::default(),
            colors: LabelColors::default(),
            debug_crop_padding: 5,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    merge: Option<MergeSettings>,
    extraction: Option<ExtractionSettings>,
    ocr: Option<OcrSettings>,
    render: Option<RenderSettings>,
    detector: Option<DetectorFileSettings>,
    debug: Option<DebugSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct MergeSettings {
    horizontal_threshold: Option<i32>,
    vertical_threshold: Option<i32>,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractionSettings {
    min_native_chars: Option<usize>,
    min_scan_area: Option<i64>,
    parallel: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    program: Option<String>,
    languages: Option<String>,
    psm: Option<u32>,
    oem: Option<u32>,
    dpi: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderSettings {
    zoom: Option<f32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DetectorFileSettings {
    command: Option<String>,
    args: Option<Vec<String>>,
    timeout_secs: Option<u64>,
    min_confidence: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct DebugSettings {
    crop_padding: Option<i32>,
    colors: Option<HashMap<String, String>>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    let defaults: SettingsFile =
        toml::from_str(DEFAULT_SETTINGS_TOML).with_context(|| "failed to parse built-in settings")?;
    settings.merge(defaults);
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = paths::settings_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    settings
        .validate()
        .with_context(|| "invalid settings")?;
    Ok(settings)
}

impl Settings {
    /// Rejects values no page run could work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.merge.validate()?;
        self.heuristic.validate()?;
        if !self.zoom.is_finite() || self.zoom <= 0.0 {
            return Err(ConfigError::InvalidZoom(self.zoom));
        }
        if self.ocr.languages.trim().is_empty() {
            return Err(ConfigError::EmptyOcrLanguages);
        }
        for (name, timeout) in [
            ("ocr.timeout_secs", self.ocr.timeout),
            ("render.timeout_secs", self.render_timeout),
            ("detector.timeout_secs", self.detector.timeout),
        ] {
            if timeout.is_zero() {
                return Err(ConfigError::ZeroTimeout(name));
            }
        }
        Ok(())
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(merge) = incoming.merge {
            if let Some(value) = merge.horizontal_threshold {
                self.merge.horizontal = value;
            }
            if let Some(value) = merge.vertical_threshold {
                self.merge.vertical = value;
            }
        }
        if let Some(extraction) = incoming.extraction {
            if let Some(value) = extraction.min_native_chars {
                self.heuristic.min_native_chars = value;
            }
            if let Some(value) = extraction.min_scan_area {
                self.heuristic.min_scan_area = value;
            }
            if let Some(value) = extraction.parallel {
                self.parallel = value;
            }
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(program) = ocr.program {
                if !program.trim().is_empty() {
                    self.ocr.program = program;
                }
            }
            if let Some(languages) = ocr.languages {
                self.ocr.languages = languages;
            }
            if let Some(psm) = ocr.psm {
                self.ocr.psm = psm;
            }
            if ocr.oem.is_some() {
                self.ocr.oem = ocr.oem;
            }
            if ocr.dpi.is_some() {
                self.ocr.dpi = ocr.dpi;
            }
            if let Some(secs) = ocr.timeout_secs {
                self.ocr.timeout = Duration::from_secs(secs);
            }
        }
        if let Some(render) = incoming.render {
            if let Some(zoom) = render.zoom {
                self.zoom = zoom;
            }
            if let Some(secs) = render.timeout_secs {
                self.render_timeout = Duration::from_secs(secs);
            }
        }
        if let Some(detector) = incoming.detector {
            if let Some(command) = detector.command {
                let command = command.trim().to_string();
                self.detector.command = (!command.is_empty()).then_some(command);
            }
            if let Some(args) = detector.args {
                self.detector.args = args;
            }
            if let Some(secs) = detector.timeout_secs {
                self.detector.timeout = Duration::from_secs(secs);
            }
            if detector.min_confidence.is_some() {
                self.detector.min_confidence = detector.min_confidence;
            }
        }
        if let Some(debug) = incoming.debug {
            if let Some(padding) = debug.crop_padding {
                self.debug_crop_padding = padding.max(0);
            }
            if let Some(map) = debug.colors {
                for (label, color) in map {
                    if !color.trim().is_empty() {
                        self.colors.insert(label, color);
                    }
                }
            }
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = paths::settings_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}
