use anyhow::{Context, Result, anyhow};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::geometry::Rect;

/// Read access to a page's embedded text layer in native coordinates.
///
/// Rectangles partly or fully outside the page are allowed and simply match
/// fewer words.
pub trait NativeTextSource: Sync {
    fn text_in(&self, rect: &Rect) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextWord {
    pub text: String,
    pub bbox: Rect,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextLine {
    pub words: Vec<TextWord>,
}

/// Words of one PDF page, as reported by `pdftotext -bbox-layout`.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfTextLayer {
    width: f64,
    height: f64,
    lines: Vec<TextLine>,
}

impl PdfTextLayer {
    pub fn new(width: f64, height: f64, lines: Vec<TextLine>) -> Self {
        Self {
            width,
            height,
            lines,
        }
    }

    /// Page size in points.
    pub fn page_size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn word_count(&self) -> usize {
        self.lines.iter().map(|line| line.words.len()).sum()
    }

    /// Parses the XHTML produced by `pdftotext -bbox-layout`. Only the first
    /// `<page>` is read.
    pub fn parse(xhtml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xhtml);
        reader.trim_text(false);

        let mut size: Option<(f64, f64)> = None;
        let mut lines: Vec<TextLine> = Vec::new();
        let mut in_line = false;
        let mut word: Option<(Rect, String)> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => match e.name().as_ref() {
                    b"page" => {
                        if size.is_some() {
                            break;
                        }
                        size = Some((attr_f64(&e, b"width")?, attr_f64(&e, b"height")?));
                    }
                    b"line" => {
                        lines.push(TextLine::default());
                        in_line = true;
                    }
                    b"word" => {
                        let rect = Rect::new(
                            attr_f64(&e, b"xMin")?,
                            attr_f64(&e, b"yMin")?,
                            attr_f64(&e, b"xMax")?,
                            attr_f64(&e, b"yMax")?,
                        );
                        word = Some((rect, String::new()));
                    }
                    _ => {}
                },
                Ok(Event::Empty(e)) => {
                    if e.name().as_ref() == b"page" && size.is_none() {
                        size = Some((attr_f64(&e, b"width")?, attr_f64(&e, b"height")?));
                    }
                }
                Ok(Event::Text(t)) => {
                    if let Some((_, text)) = word.as_mut() {
                        match t.unescape() {
                            Ok(value) => text.push_str(value.as_ref()),
                            Err(_) => text.push_str(&String::from_utf8_lossy(&t)),
                        }
                    }
                }
                Ok(Event::End(e)) => match e.name().as_ref() {
                    b"word" => {
                        if let Some((bbox, text)) = word.take() {
                            let text = text.trim().to_string();
                            if text.is_empty() {
                                continue;
                            }
                            let entry = TextWord { text, bbox };
                            match lines.last_mut() {
                                Some(line) if in_line => line.words.push(entry),
                                _ => lines.push(TextLine { words: vec![entry] }),
                            }
                        }
                    }
                    b"line" => in_line = false,
                    b"page" => break,
                    _ => {}
                },
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => return Err(anyhow!("invalid text layer xhtml: {}", err)),
            }
        }

        let (width, height) = size.ok_or_else(|| anyhow!("text layer has no page element"))?;
        lines.retain(|line| !line.words.is_empty());
        Ok(Self {
            width,
            height,
            lines,
        })
    }
}

impl NativeTextSource for PdfTextLayer {
    /// A word is inside `rect` when its centre is.
    fn text_in(&self, rect: &Rect) -> Result<String> {
        let mut out: Vec<String> = Vec::new();
        for line in &self.lines {
            let words: Vec<&str> = line
                .words
                .iter()
                .filter(|word| {
                    let (cx, cy) = word.bbox.center();
                    rect.contains_point(cx, cy)
                })
                .map(|word| word.text.as_str())
                .collect();
            if !words.is_empty() {
                out.push(words.join(" "));
            }
        }
        Ok(out.join("\n"))
    }
}

fn attr_f64(element: &BytesStart<'_>, key: &[u8]) -> Result<f64> {
    for attr in element.attributes() {
        let attr = attr.with_context(|| "invalid attribute in text layer")?;
        if attr.key.as_ref() == key {
            let value = attr
                .unescape_value()
                .with_context(|| "invalid attribute value in text layer")?;
            return value.trim().parse::<f64>().with_context(|| {
                format!(
                    "attribute {} is not a number: {}",
                    String::from_utf8_lossy(key),
                    value
                )
            });
        }
    }
    Err(anyhow!(
        "missing attribute {} on <{}>",
        String::from_utf8_lossy(key),
        String::from_utf8_lossy(element.name().as_ref())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd">
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
<title></title>
</head>
<body>
<doc>
  <page width="595.276000" height="841.890000">
    <flow>
      <block xMin="56.0" yMin="40.0" xMax="300.0" yMax="80.0">
        <line xMin="56.0" yMin="40.0" xMax="300.0" yMax="58.0">
          <word xMin="56.0" yMin="40.0" xMax="110.0" yMax="58.0">Jean</word>
          <word xMin="114.0" yMin="40.0" xMax="180.0" yMax="58.0">Dupont</word>
        </line>
        <line xMin="56.0" yMin="62.0" xMax="300.0" yMax="80.0">
          <word xMin="56.0" yMin="62.0" xMax="150.0" yMax="80.0">R&amp;D</word>
          <word xMin="154.0" yMin="62.0" xMax="300.0" yMax="80.0">engineer</word>
        </line>
      </block>
      <block xMin="56.0" yMin="400.0" xMax="200.0" yMax="415.0">
        <line xMin="56.0" yMin="400.0" xMax="200.0" yMax="415.0">
          <word xMin="56.0" yMin="400.0" xMax="200.0" yMax="415.0">Experience</word>
        </line>
      </block>
    </flow>
  </page>
  <page width="595.276000" height="841.890000">
    <flow>
      <block xMin="1" yMin="1" xMax="2" yMax="2">
        <line xMin="1" yMin="1" xMax="2" yMax="2">
          <word xMin="1" yMin="1" xMax="2" yMax="2">ignored</word>
        </line>
      </block>
    </flow>
  </page>
</doc>
</body>
</html>"#;

    #[test]
    fn parses_first_page_words() {
        let layer = PdfTextLayer::parse(SAMPLE).expect("parse");
        assert_eq!(layer.page_size(), (595.276, 841.89));
        assert_eq!(layer.word_count(), 5);
    }

    #[test]
    fn keeps_line_structure_inside_rect() {
        let layer = PdfTextLayer::parse(SAMPLE).expect("parse");
        let text = layer
            .text_in(&Rect::new(50.0, 35.0, 310.0, 85.0))
            .expect("text");
        assert_eq!(text, "Jean Dupont\nR&D engineer");
    }

    #[test]
    fn uses_word_centres() {
        let layer = PdfTextLayer::parse(SAMPLE).expect("parse");
        let text = layer
            .text_in(&Rect::new(50.0, 35.0, 140.0, 60.0))
            .expect("text");
        assert_eq!(text, "Jean");
    }

    #[test]
    fn out_of_page_rect_is_empty() {
        let layer = PdfTextLayer::parse(SAMPLE).expect("parse");
        let text = layer
            .text_in(&Rect::new(2000.0, 2000.0, 3000.0, 3000.0))
            .expect("text");
        assert_eq!(text, "");
    }

    #[test]
    fn missing_page_is_an_error() {
        assert!(PdfTextLayer::parse("<doc></doc>").is_err());
    }
}
