use crate::classifier::DiagnosisResult;
use crate::conditions::{SkinCondition, DISCLAIMER};
use crate::error::{Error, Result};
use crate::models::{format_confidence, ScanRecord, SCAN_ID_FORMAT};
use crate::scans::encode_jpeg;
use chrono::{DateTime, Local};
use image::DynamicImage;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::path::{Path, PathBuf};

pub const REPORT_TITLE: &str = "Skin Scan Report";
const REPORT_DATE_FORMAT: &str = "%B %d, %Y %H:%M:%S";
const DISCLAIMER_TEXT: &str = concat!(
    "This report was generated by an automated image classifier running on this device. ",
    "It is not a medical diagnosis and does not replace an examination by a qualified ",
    "healthcare professional. If you notice a new, changing, bleeding or otherwise unusual ",
    "skin lesion, consult a dermatologist."
);

// A4 in points.
const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 56.0;
const IMAGE_WIDTH: f32 = 300.0;
const IMAGE_MAX_HEIGHT: f32 = 360.0;
const REPORT_JPEG_QUALITY: u8 = 100;

pub struct ReportInput {
    pub generated_at: DateTime<Local>,
    pub condition: String,
    pub confidence: f64,
    pub description: String,
    pub recommendations: String,
    pub image_path: Option<PathBuf>,
}

impl ReportInput {
    pub fn from_result(result: &DiagnosisResult, image_path: Option<PathBuf>) -> Self {
        Self {
            generated_at: Local::now(),
            condition: result.label.clone(),
            confidence: result.confidence as f64,
            description: result.description.clone(),
            recommendations: result.recommendation.clone(),
            image_path,
        }
    }

    pub fn from_scan(scan: &ScanRecord) -> Self {
        let description = SkinCondition::from_label(&scan.condition)
            .map(|c| c.description().to_string())
            .unwrap_or_default();
        Self {
            generated_at: Local::now(),
            condition: scan.condition.clone(),
            confidence: scan.confidence,
            description,
            recommendations: scan.recommendations.clone(),
            image_path: Some(PathBuf::from(&scan.image_path)),
        }
    }
}

#[derive(Clone, Copy)]
enum Font {
    Regular,
    Bold,
    Italic,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
            Font::Italic => "F3",
        }
    }
}

struct EmbeddedImage {
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
}

/// Lays text and the scan image out top to bottom, starting a new page when
/// the current one is full.
struct PageWriter {
    pages: Vec<Vec<Operation>>,
    y: f32,
}

impl PageWriter {
    fn new() -> Self {
        Self {
            pages: vec![Vec::new()],
            y: PAGE_HEIGHT - MARGIN,
        }
    }

    fn ops(&mut self) -> &mut Vec<Operation> {
        if self.pages.is_empty() {
            self.pages.push(Vec::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn ensure_space(&mut self, height: f32) {
        if self.y - height < MARGIN {
            self.pages.push(Vec::new());
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn paragraph(&mut self, font: Font, size: f32, text: &str) {
        let leading = size * 1.4;
        for line in wrap_text(text, max_chars(size)) {
            self.ensure_space(leading);
            self.y -= leading;
            let y = self.y;
            self.ops().extend([
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec![font.resource().into(), size.into()]),
                Operation::new("Td", vec![MARGIN.into(), y.into()]),
                Operation::new("Tj", vec![Object::string_literal(line)]),
                Operation::new("ET", vec![]),
            ]);
        }
        self.space(size * 0.6);
    }

    fn space(&mut self, height: f32) {
        self.y -= height;
    }

    fn image(&mut self, name: &str, width: f32, height: f32) {
        self.ensure_space(height);
        self.y -= height;
        let y = self.y;
        self.ops().extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0.0f32.into(),
                    0.0f32.into(),
                    height.into(),
                    MARGIN.into(),
                    y.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.as_bytes().to_vec())]),
            Operation::new("Q", vec![]),
        ]);
        self.space(12.0);
    }
}

// Helvetica averages a little over half an em per character.
fn max_chars(size: f32) -> usize {
    ((PAGE_WIDTH - 2.0 * MARGIN) / (size * 0.52)).floor().max(1.0) as usize
}

/// Greedy word wrap. Explicit newlines are kept, blank lines survive as
/// empty lines and leading indentation is preserved.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for raw in text.split('\n') {
        let indent_len = raw.len() - raw.trim_start().len();
        let indent = &raw[..indent_len];
        let mut current = String::from(indent);
        for word in raw.split_whitespace() {
            let needed = if current.trim().is_empty() {
                word.len()
            } else {
                word.len() + 1
            };
            if current.len() + needed > width && !current.trim().is_empty() {
                lines.push(std::mem::replace(&mut current, String::from(indent)));
            }
            if !current.trim().is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
        lines.push(current);
    }
    lines
}

fn load_report_image(path: &Path) -> Option<EmbeddedImage> {
    let img: DynamicImage = match image::open(path) {
        Ok(img) => img,
        Err(err) => {
            log::warn!("Report image {} skipped: {}", path.display(), err);
            return None;
        }
    };
    match encode_jpeg(&img, REPORT_JPEG_QUALITY) {
        Ok(jpeg) => Some(EmbeddedImage {
            jpeg,
            width: img.width(),
            height: img.height(),
        }),
        Err(err) => {
            log::warn!("Report image {} skipped: {}", path.display(), err);
            None
        }
    }
}

pub fn render_pdf(input: &ReportInput) -> Result<Vec<u8>> {
    let image = input.image_path.as_deref().and_then(load_report_image);

    let mut writer = PageWriter::new();
    writer.paragraph(Font::Bold, 20.0, REPORT_TITLE);
    writer.paragraph(
        Font::Regular,
        11.0,
        &format!("Date: {}", input.generated_at.format(REPORT_DATE_FORMAT)),
    );
    if let Some(img) = &image {
        let height = (IMAGE_WIDTH * img.height as f32 / img.width.max(1) as f32).min(IMAGE_MAX_HEIGHT);
        writer.image("Im1", IMAGE_WIDTH, height);
    }
    writer.paragraph(Font::Bold, 16.0, "Diagnosis Details");
    writer.paragraph(Font::Regular, 11.0, &format!("Condition: {}", input.condition));
    writer.paragraph(Font::Regular, 11.0, &format_confidence(input.confidence));
    writer.paragraph(Font::Bold, 16.0, "Condition Description");
    writer.paragraph(Font::Regular, 11.0, &input.description);
    writer.paragraph(Font::Bold, 16.0, "Recommendations");
    writer.paragraph(Font::Regular, 11.0, &input.recommendations);
    writer.paragraph(Font::Bold, 14.0, "Disclaimer");
    writer.paragraph(Font::Italic, 10.0, &format!("{DISCLAIMER} {DISCLAIMER_TEXT}"));

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular = add_font(&mut doc, "Helvetica");
    let bold = add_font(&mut doc, "Helvetica-Bold");
    let italic = add_font(&mut doc, "Helvetica-Oblique");
    let mut resources = dictionary! {
        "Font" => dictionary! {
            "F1" => regular,
            "F2" => bold,
            "F3" => italic,
        },
    };
    if let Some(img) = image {
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => img.width as i64,
                "Height" => img.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8i64,
                "Filter" => "DCTDecode",
            },
            img.jpeg,
        ));
        resources.set("XObject", dictionary! { "Im1" => image_id });
    }
    let resources_id = doc.add_object(resources);

    let mut kids: Vec<Object> = Vec::with_capacity(writer.pages.len());
    for operations in writer.pages {
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0i64.into(), 0i64.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| Error::Report(format!("Failed to serialize PDF: {e}")))?;
    Ok(out)
}

fn add_font(doc: &mut Document, base: &str) -> ObjectId {
    doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => base,
        "Encoding" => "WinAnsiEncoding",
    })
}

/// Renders the report into `dest_dir` as `skin_scan_<timestamp>.pdf`.
pub fn write_report(dest_dir: &Path, input: &ReportInput) -> Result<PathBuf> {
    std::fs::create_dir_all(dest_dir)?;
    let name = format!(
        "skin_scan_{}.pdf",
        input.generated_at.format(SCAN_ID_FORMAT)
    );
    let path = dest_dir.join(name);
    let bytes = render_pdf(input)?;
    std::fs::write(&path, bytes)?;
    log::info!("Report written to {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn input(recommendations: String, image_path: Option<PathBuf>) -> ReportInput {
        let result = DiagnosisResult::for_condition(SkinCondition::Melanoma, 0.7);
        ReportInput {
            recommendations,
            ..ReportInput::from_result(&result, image_path)
        }
    }

    #[test]
    fn wraps_on_word_boundaries() {
        let lines = wrap_text("one two three four five", 9);
        assert_eq!(lines, vec!["one two", "three", "four five"]);
    }

    #[test]
    fn wrap_keeps_blank_lines_and_indent() {
        let lines = wrap_text("Header\n\n   - Asymmetry", 40);
        assert_eq!(lines, vec!["Header", "", "   - Asymmetry"]);
    }

    #[test]
    fn renders_a_loadable_pdf() {
        let rec = SkinCondition::Melanoma.recommendation().to_string();
        let bytes = render_pdf(&input(rec, None)).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));
        let doc = Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn long_text_flows_onto_more_pages() {
        let rec = (0..150)
            .map(|i| format!("{i}. Keep monitoring the lesion"))
            .collect::<Vec<_>>()
            .join("\n");
        let bytes = render_pdf(&input(rec, None)).unwrap();
        let doc = Document::load_mem(&bytes).unwrap();
        assert!(doc.get_pages().len() > 1);
    }

    #[test]
    fn embeds_scan_image_and_writes_file() {
        let dir = std::env::temp_dir().join(format!("dermalyze_report_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let img_path = dir.join("scan.png");
        RgbImage::from_pixel(60, 40, Rgb([120, 80, 60])).save(&img_path).unwrap();

        let rec = SkinCondition::Melanoma.recommendation().to_string();
        let with_image = input(rec.clone(), Some(img_path));
        let path = write_report(&dir, &with_image).unwrap();
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("skin_scan_"));

        let with_bytes = std::fs::read(&path).unwrap();
        let without = render_pdf(&input(rec, Some(dir.join("missing.png")))).unwrap();
        assert!(with_bytes.len() > without.len());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
