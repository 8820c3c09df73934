use std::sync::Arc;

use image::DynamicImage;
use layout_extractor_rust::layout::{DetectionFilter, JsonDetections, parse_detections};
use layout_extractor_rust::{
    LabelColors, OcrEngine, OcrError, PdfTextLayer, Pipeline, PipelineOptions, RasterPage,
};

const TEXT_LAYER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml">
<body>
<doc>
  <page width="300.000000" height="400.000000">
    <flow>
      <block xMin="20" yMin="20" xMax="80" yMax="38">
        <line xMin="20" yMin="20" xMax="80" yMax="38">
          <word xMin="20" yMin="20" xMax="45" yMax="38">Jean</word>
          <word xMin="48" yMin="20" xMax="80" yMax="38">Dupont</word>
        </line>
      </block>
      <block xMin="20" yMin="62" xMax="90" yMax="90">
        <line xMin="20" yMin="62" xMax="90" yMax="74">
          <word xMin="20" yMin="62" xMax="40" yMax="74">Rust</word>
          <word xMin="44" yMin="62" xMax="90" yMax="74">developer</word>
        </line>
        <line xMin="21" yMin="78" xMax="45" yMax="90">
          <word xMin="21" yMin="78" xMax="45" yMax="90">Paris</word>
        </line>
      </block>
    </flow>
  </page>
</doc>
</body>
</html>"#;

const DETECTIONS: &str = r#"{"detections": [
  {"type": "Picture", "box": [40, 300, 300, 500], "score": 0.7},
  {"type": "Text", "box": [42, 154, 540, 184], "score": 0.85},
  {"type": "Title", "box": [40, 40, 400, 80], "score": 0.91},
  {"type": "Text", "box": [40, 120, 560, 150], "score": 0.8}
]}"#;

struct ScriptedOcr(Result<&'static str, &'static str>);

impl OcrEngine for ScriptedOcr {
    fn recognize(&self, _crop: &DynamicImage) -> Result<String, OcrError> {
        self.0
            .map(|text| text.to_string())
            .map_err(|reason| OcrError::Failed(reason.to_string()))
    }
}

fn run(ocr: ScriptedOcr) -> Vec<layout_extractor_rust::ExtractedBlock> {
    let detections = parse_detections(DETECTIONS, &DetectionFilter::default()).unwrap();
    let pipeline = Pipeline::new(
        Arc::new(JsonDetections::new(detections)),
        Arc::new(ocr),
        PipelineOptions {
            colors: [("Title", "#d32f2f"), ("Text", "#1976d2")]
                .into_iter()
                .collect::<LabelColors>(),
            ..PipelineOptions::default()
        },
    );
    let layer = PdfTextLayer::parse(TEXT_LAYER).unwrap();
    let (page_width, page_height) = layer.page_size();
    let raster = RasterPage {
        image: DynamicImage::new_rgb8(600, 800),
        page_width,
        page_height,
    };
    pipeline.process_raster(&raster, &layer).unwrap().blocks
}

#[test]
fn page_blocks_snapshot() {
    let blocks = run(ScriptedOcr(Ok("Signature\nillisible\n")));
    let summary = blocks
        .iter()
        .map(|block| {
            format!(
                "{} {} {:?} {} {} {}",
                block.id,
                block.block_type,
                <[i32; 4]>::from(block.coordinates),
                block.extraction_method.as_str(),
                block.ui_color,
                block.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    insta::assert_snapshot!(summary, @r"
    0 Title [40, 40, 400, 80] native #d32f2f Jean Dupont
    1 Text [40, 120, 560, 184] native #1976d2 Rust developer Paris
    2 Picture [40, 300, 300, 500] ocr gray Signature illisible
    ");
}

#[test]
fn json_output_uses_wire_names() {
    let blocks = run(ScriptedOcr(Ok("Signature")));
    let value = serde_json::to_value(&blocks).unwrap();
    assert_eq!(value[1]["type"], "Text");
    assert_eq!(value[1]["extraction_method"], "native");
    assert_eq!(value[1]["ui_color"], "#1976d2");
    assert_eq!(value[2]["ui_color"], "gray");
    assert_eq!(value[1]["coordinates"], serde_json::json!([40, 120, 560, 184]));
    assert!((value[1]["confidence"].as_f64().unwrap() - 0.85).abs() < 1e-6);
    assert_eq!(value[2]["extraction_method"], "ocr");
    assert!(value[2].get("error").is_none());
    assert!(value[2].get("image_path").is_none());
}

#[test]
fn ocr_failure_is_kept_on_the_block() {
    let blocks = run(ScriptedOcr(Err("tesseract crashed")));
    assert_eq!(blocks.len(), 3);
    let picture = &blocks[2];
    assert_eq!(picture.content, "[OCR Error: ocr failed: tesseract crashed]");
    assert_eq!(
        picture.error.as_deref(),
        Some("OCR Error: ocr failed: tesseract crashed")
    );
    assert_eq!(blocks[0].content, "Jean Dupont");
}
