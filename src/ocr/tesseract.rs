use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

use super::{OcrEngine, OcrProfile};
use crate::error::OcrError;
use crate::process::output_with_timeout;

pub fn list_tesseract_languages(program: &str) -> Result<Vec<String>> {
    let output = Command::new(program)
        .arg("--list-langs")
        .output()
        .with_context(|| format!("failed to run {} --list-langs", program))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("{} --list-langs failed: {}", program, stderr.trim()));
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut langs = Vec::new();
    for (idx, line) in stdout.lines().enumerate() {
        if idx == 0 {
            continue;
        }
        let value = line.trim();
        if !value.is_empty() {
            langs.push(value.to_string());
        }
    }
    Ok(langs)
}

/// Keeps the requested languages that tesseract actually has. When the
/// installed list cannot be read the request is passed through unchanged.
pub(super) fn normalize_ocr_languages(requested: &str, available: Option<&[String]>) -> Result<String> {
    let trimmed = requested.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("ocr languages is empty"));
    }

    let Some(available) = available else {
        return Ok(trimmed.to_string());
    };

    let mut chosen = Vec::new();
    let mut missing = Vec::new();
    for raw in trimmed.split(['+', ',', ' ']) {
        let lang = raw.trim();
        if lang.is_empty() {
            continue;
        }
        if available.iter().any(|value| value == lang) {
            chosen.push(lang.to_string());
        } else {
            missing.push(lang.to_string());
        }
    }

    if chosen.is_empty() {
        return Err(anyhow!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        ));
    }
    if !missing.is_empty() {
        warn!(
            "ocr language(s) not available: {} (available: {})",
            missing.join(", "),
            available.join(", ")
        );
    }

    Ok(chosen.join("+"))
}

/// OCR through the `tesseract` command line tool.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    profile: OcrProfile,
}

impl TesseractOcr {
    /// Uses the profile as is, without asking tesseract which languages exist.
    pub fn new(profile: OcrProfile) -> Self {
        Self { profile }
    }

    /// Narrows the profile's languages to the installed ones.
    pub fn with_installed_languages(profile: OcrProfile) -> Result<Self> {
        let available = list_tesseract_languages(&profile.program).ok();
        let languages = normalize_ocr_languages(&profile.languages, available.as_deref())?;
        Ok(Self {
            profile: OcrProfile {
                languages,
                ..profile
            },
        })
    }

    pub fn profile(&self) -> &OcrProfile {
        &self.profile
    }

    fn build_command(&self, path: &Path) -> Command {
        let mut command = Command::new(&self.profile.program);
        command
            .arg(path)
            .arg("stdout")
            .arg("-l")
            .arg(&self.profile.languages)
            .arg("--psm")
            .arg(self.profile.psm.to_string());
        if let Some(oem) = self.profile.oem {
            command.arg("--oem").arg(oem.to_string());
        }
        if let Some(dpi) = self.profile.dpi {
            command.arg("--dpi").arg(dpi.to_string());
        }
        command
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, crop: &DynamicImage) -> Result<String, OcrError> {
        let mut tmp = tempfile::Builder::new().suffix(".png").tempfile()?;
        crop.write_to(&mut tmp, image::ImageFormat::Png)
            .map_err(|err| OcrError::Encode(err.to_string()))?;
        tmp.flush()?;

        let mut command = self.build_command(tmp.path());
        let output = match output_with_timeout(&mut command, self.profile.timeout) {
            Ok(Some(output)) => output,
            Ok(None) => return Err(OcrError::Timeout(self.profile.timeout)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(OcrError::ToolNotFound(format!(
                    "{} (install tesseract-ocr)",
                    self.profile.program
                )));
            }
            Err(err) => return Err(OcrError::Io(err)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Failed(stderr.trim().to_string()));
        }
        let text = String::from_utf8_lossy(&output.stdout).to_string();
        debug!(
            "ocr: {}x{} crop -> {} chars",
            crop.width(),
            crop.height(),
            text.chars().count()
        );
        Ok(text)
    }
}
