use image::DynamicImage;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tempfile::tempdir;
use tracing::debug;

use crate::error::PipelineError;
use crate::extract::PdfTextLayer;
use crate::process::{command_exists, output_with_timeout};

const POINTS_PER_INCH: f32 = 72.0;

/// Programs used to read PDFs. Bare names are looked up on `PATH`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfTools {
    pub pdfinfo: String,
    pub pdftotext: String,
    pub pdftoppm: String,
    pub mutool: String,
}

impl Default for PdfTools {
    fn default() -> Self {
        Self {
            pdfinfo: "pdfinfo".to_string(),
            pdftotext: "pdftotext".to_string(),
            pdftoppm: "pdftoppm".to_string(),
            mutool: "mutool".to_string(),
        }
    }
}

/// A PDF on disk, read through the poppler and mupdf command line tools.
///
/// Every tool works on the page's CropBox: `mutool draw` renders it by
/// default and the poppler tools get `-cropbox`. Raster pixels, page size and
/// word boxes therefore share one origin and one extent.
#[derive(Debug, Clone)]
pub struct PdfDocument {
    path: PathBuf,
    page_count: usize,
    timeout: Duration,
    tools: PdfTools,
}

impl PdfDocument {
    /// Checks the file and reads its page count with `pdfinfo`.
    pub fn open(path: &Path, timeout: Duration) -> Result<Self, PipelineError> {
        Self::open_with(path, PdfTools::default(), timeout)
    }

    pub fn open_with(path: &Path, tools: PdfTools, timeout: Duration) -> Result<Self, PipelineError> {
        let open_error = |message: String| PipelineError::DocumentOpen {
            path: path.to_path_buf(),
            message,
        };
        if !path.is_file() {
            return Err(open_error("file not found".to_string()));
        }

        let output = run_tool(Command::new(&tools.pdfinfo).arg(path), "pdfinfo", timeout)
            .map_err(open_error)?;
        let info = String::from_utf8_lossy(&output);
        let page_count = parse_page_count(&info)
            .ok_or_else(|| open_error("pdfinfo did not report a page count".to_string()))?;
        if page_count == 0 {
            return Err(PipelineError::NoPages(path.to_path_buf()));
        }
        debug!("pdf: {} has {} pages", path.display(), page_count);
        Ok(Self {
            path: path.to_path_buf(),
            page_count,
            timeout,
            tools,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    /// Validates a 0-based page index.
    pub fn check_page(&self, page: usize) -> Result<(), PipelineError> {
        if page >= self.page_count {
            return Err(PipelineError::PageOutOfRange {
                page: page + 1,
                count: self.page_count,
            });
        }
        Ok(())
    }

    /// Width and height of the page's CropBox in points, as reported by
    /// `pdfinfo -box`. `None` when pdfinfo does not print one.
    pub fn crop_box_size(&self, page: usize) -> Result<Option<(f64, f64)>, PipelineError> {
        self.check_page(page)?;
        let page_number = (page + 1).to_string();
        let output = run_tool(
            Command::new(&self.tools.pdfinfo)
                .arg("-f")
                .arg(&page_number)
                .arg("-l")
                .arg(&page_number)
                .arg("-box")
                .arg(&self.path),
            "pdfinfo",
            self.timeout,
        )
        .map_err(|message| PipelineError::DocumentOpen {
            path: self.path.clone(),
            message,
        })?;
        Ok(parse_crop_box_size(&String::from_utf8_lossy(&output)))
    }

    /// Renders one page at `zoom` times 72 DPI.
    pub fn rasterize(&self, page: usize, zoom: f32) -> Result<DynamicImage, PipelineError> {
        self.check_page(page)?;
        let dpi = dpi_for_zoom(zoom).to_string();
        let page_number = (page + 1).to_string();
        let dir = tempdir().map_err(|err| PipelineError::Rasterize(err.to_string()))?;

        let rendered = if command_exists(&self.tools.mutool) {
            let out = dir.path().join("page.png");
            run_tool(
                &mut self.mutool_command(&dpi, &page_number, &out),
                "mutool",
                self.timeout,
            )
            .map_err(PipelineError::Rasterize)?;
            out
        } else if command_exists(&self.tools.pdftoppm) {
            let prefix = dir.path().join("page");
            run_tool(
                &mut self.pdftoppm_command(&dpi, &page_number, &prefix),
                "pdftoppm",
                self.timeout,
            )
            .map_err(PipelineError::Rasterize)?;
            prefix.with_extension("png")
        } else {
            return Err(PipelineError::Rasterize(
                "pdf rendering requires mutool or pdftoppm (install mupdf or poppler)".to_string(),
            ));
        };

        let image = image::open(&rendered)
            .map_err(|err| PipelineError::Rasterize(format!("failed to read rendered page: {}", err)))?;
        debug!(
            "pdf: page {} rendered at {} dpi ({}x{})",
            page_number,
            dpi,
            image.width(),
            image.height()
        );
        Ok(image)
    }

    /// Loads the page's embedded words with `pdftotext -bbox-layout`.
    pub fn text_layer(&self, page: usize) -> Result<PdfTextLayer, PipelineError> {
        self.check_page(page)?;
        let page_number = (page + 1).to_string();
        let output = run_tool(
            &mut self.pdftotext_command(&page_number),
            "pdftotext",
            self.timeout,
        )
        .map_err(PipelineError::TextLayer)?;
        let xhtml = String::from_utf8_lossy(&output);
        let layer =
            PdfTextLayer::parse(&xhtml).map_err(|err| PipelineError::TextLayer(format!("{:#}", err)))?;
        debug!(
            "pdf: page {} text layer has {} words",
            page_number,
            layer.word_count()
        );
        Ok(layer)
    }

    fn mutool_command(&self, dpi: &str, page_number: &str, out: &Path) -> Command {
        let mut command = Command::new(&self.tools.mutool);
        command
            .arg("draw")
            .arg("-r")
            .arg(dpi)
            .arg("-o")
            .arg(out)
            .arg(&self.path)
            .arg(page_number);
        command
    }

    fn pdftoppm_command(&self, dpi: &str, page_number: &str, prefix: &Path) -> Command {
        let mut command = Command::new(&self.tools.pdftoppm);
        command
            .arg("-png")
            .arg("-cropbox")
            .arg("-r")
            .arg(dpi)
            .arg("-f")
            .arg(page_number)
            .arg("-l")
            .arg(page_number)
            .arg("-singlefile")
            .arg(&self.path)
            .arg(prefix);
        command
    }

    fn pdftotext_command(&self, page_number: &str) -> Command {
        let mut command = Command::new(&self.tools.pdftotext);
        command
            .arg("-bbox-layout")
            .arg("-cropbox")
            .arg("-f")
            .arg(page_number)
            .arg("-l")
            .arg(page_number)
            .arg(&self.path)
            .arg("-");
        command
    }
}

pub fn dpi_for_zoom(zoom: f32) -> u32 {
    (zoom * POINTS_PER_INCH).round() as u32
}

fn parse_page_count(info: &str) -> Option<usize> {
    info.lines().find_map(|line| {
        let value = line.strip_prefix("Pages:")?;
        value.trim().parse::<usize>().ok()
    })
}

/// Reads `Page    1 CropBox:     x0     y0     x1     y1` from `pdfinfo -box`,
/// swapping the sides when `Page    1 rot:  90` turns the page.
fn parse_crop_box_size(info: &str) -> Option<(f64, f64)> {
    let quarter_turn = info.lines().any(|line| {
        line.split_once("rot:")
            .and_then(|(_, rot)| rot.trim().parse::<i32>().ok())
            .is_some_and(|rot| rot.rem_euclid(180) == 90)
    });
    let (width, height) = info.lines().find_map(|line| {
        let (_, coords) = line.split_once("CropBox:")?;
        let values: Vec<f64> = coords
            .split_whitespace()
            .map(|value| value.parse::<f64>().ok())
            .collect::<Option<_>>()?;
        let [x0, y0, x1, y1] = values.as_slice() else {
            return None;
        };
        let (width, height) = ((x1 - x0).abs(), (y1 - y0).abs());
        (width > 0.0 && height > 0.0).then_some((width, height))
    })?;
    Some(if quarter_turn { (height, width) } else { (width, height) })
}

/// Runs a tool and returns its stdout, or a message fit for an error variant.
fn run_tool(command: &mut Command, name: &str, timeout: Duration) -> Result<Vec<u8>, String> {
    let output = match output_with_timeout(command, timeout) {
        Ok(Some(output)) => output,
        Ok(None) => return Err(format!("{} timed out after {:?}", name, timeout)),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(format!("{} not found (install poppler-utils)", name));
        }
        Err(err) => return Err(format!("failed to run {}: {}", name, err)),
    };
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("{} failed: {}", name, stderr.trim()));
    }
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(page_count: usize) -> PdfDocument {
        PdfDocument {
            path: PathBuf::from("cv.pdf"),
            page_count,
            timeout: Duration::from_secs(5),
            tools: PdfTools::default(),
        }
    }

    fn args(command: &Command) -> Vec<String> {
        command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn reads_page_count_from_pdfinfo() {
        let info = "Creator:        Writer\nProducer:       LibreOffice 7.3\nPages:          3\nEncrypted:      no\n";
        assert_eq!(parse_page_count(info), Some(3));
        assert_eq!(parse_page_count("Pages:          0\n"), Some(0));
        assert_eq!(parse_page_count("Title: x\n"), None);
    }

    #[test]
    fn reads_crop_box_from_pdfinfo() {
        let info = "Page    1 size: 612 x 792 pts (letter)\n\
                    Page    1 rot:  0\n\
                    Page    1 MediaBox:     0.00     0.00   612.00   792.00\n\
                    Page    1 CropBox:     36.00    36.00   576.00   756.00\n";
        assert_eq!(parse_crop_box_size(info), Some((540.0, 720.0)));

        let rotated = info.replace("rot:  0", "rot:  90");
        assert_eq!(parse_crop_box_size(&rotated), Some((720.0, 540.0)));
        assert_eq!(parse_crop_box_size("Pages: 1\n"), None);
    }

    #[test]
    fn poppler_tools_read_the_crop_box() {
        let document = document(1);
        let text = args(&document.pdftotext_command("1"));
        assert_eq!(&text[..2], ["-bbox-layout", "-cropbox"]);
        assert_eq!(text.last().map(String::as_str), Some("-"));

        let render = args(&document.pdftoppm_command("144", "1", Path::new("/tmp/page")));
        assert!(render.iter().any(|arg| arg == "-cropbox"));
        assert!(render.windows(2).any(|pair| pair == ["-r", "144"]));

        let mutool = args(&document.mutool_command("144", "1", Path::new("/tmp/page.png")));
        assert_eq!(mutool[0], "draw");
        assert_eq!(mutool.last().map(String::as_str), Some("1"));
    }

    #[test]
    fn zoom_maps_to_dpi() {
        assert_eq!(dpi_for_zoom(2.0), 144);
        assert_eq!(dpi_for_zoom(1.0), 72);
        assert_eq!(dpi_for_zoom(4.1667), 300);
    }

    #[test]
    fn missing_file_fails_to_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = PdfDocument::open(&dir.path().join("absent.pdf"), Duration::from_secs(5))
            .unwrap_err();
        assert!(matches!(err, PipelineError::DocumentOpen { .. }));
    }

    #[test]
    fn page_range_is_checked() {
        let document = document(2);
        assert!(document.check_page(1).is_ok());
        let err = document.check_page(2).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::PageOutOfRange { page: 3, count: 2 }
        ));
    }

    #[cfg(unix)]
    #[test]
    fn configured_pdfinfo_reports_pages_and_crop_box() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pdf = dir.path().join("cv.pdf");
        std::fs::write(&pdf, b"%PDF-1.4\n").expect("write pdf");
        let pdfinfo = crate::test_util::write_script(
            dir.path(),
            "pdfinfo",
            "echo 'Pages: 2'\necho 'Page    1 CropBox:     0.00     0.00   300.00   400.00'",
        );
        let tools = PdfTools {
            pdfinfo: pdfinfo.to_string_lossy().into_owned(),
            ..PdfTools::default()
        };
        let document = PdfDocument::open_with(&pdf, tools, Duration::from_secs(10)).expect("open");
        assert_eq!(document.page_count(), 2);
        assert_eq!(document.crop_box_size(0).expect("box"), Some((300.0, 400.0)));
    }
}
