//! Synthetic PDF construction for unit tests.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream};

/// What to draw on one synthetic page.
#[derive(Debug, Clone, Default)]
pub struct PageSpec {
    lines: Vec<String>,
    image: bool,
    raw: Vec<Operation>,
    media_box: Option<(f32, f32)>,
}

impl PageSpec {
    /// A page showing `text` on one line.
    pub fn text(text: &str) -> Self {
        Self::lines(&[text])
    }

    /// A page showing each entry on its own line.
    pub fn lines(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            ..Default::default()
        }
    }

    /// A page with an empty content stream.
    pub fn blank() -> Self {
        Self::default()
    }

    /// A page that only paints an image, like a scan.
    pub fn image_only() -> Self {
        Self {
            image: true,
            ..Default::default()
        }
    }

    /// A page with exactly these content operations.
    pub fn raw(operations: Vec<Operation>) -> Self {
        Self {
            raw: operations,
            ..Default::default()
        }
    }

    /// Give the page its own media box.
    pub fn with_media_box(mut self, width: f32, height: f32) -> Self {
        self.media_box = Some((width, height));
        self
    }

    fn operations(&self) -> Vec<Operation> {
        let mut ops = Vec::new();
        if self.image {
            ops.push(Operation::new("q", vec![]));
            ops.push(Operation::new(
                "cm",
                vec![
                    500.into(),
                    0.into(),
                    0.into(),
                    700.into(),
                    50.into(),
                    50.into(),
                ],
            ));
            ops.push(Operation::new("Do", vec![Object::Name(b"Im1".to_vec())]));
            ops.push(Operation::new("Q", vec![]));
        }
        if !self.lines.is_empty() {
            ops.push(Operation::new("BT", vec![]));
            ops.push(Operation::new(
                "Tf",
                vec![Object::Name(b"F1".to_vec()), 12.into()],
            ));
            ops.push(Operation::new("Td", vec![72.into(), 720.into()]));
            for (i, line) in self.lines.iter().enumerate() {
                if i > 0 {
                    ops.push(Operation::new("Td", vec![0.into(), (-14).into()]));
                }
                ops.push(Operation::new(
                    "Tj",
                    vec![Object::string_literal(line.as_str())],
                ));
            }
            ops.push(Operation::new("ET", vec![]));
        }
        ops.extend(self.raw.iter().cloned());
        ops
    }
}

/// Builds small but structurally valid PDFs with `lopdf`.
#[derive(Debug, Clone)]
pub struct PdfBuilder {
    pages: Vec<PageSpec>,
    fonts: Vec<(String, Dictionary)>,
    default_media_box: (f32, f32),
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            fonts: Vec::new(),
            default_media_box: (612.0, 792.0),
        }
    }

    /// Media box set on the `Pages` node and inherited by pages without one.
    pub fn default_media_box(mut self, width: f32, height: f32) -> Self {
        self.default_media_box = (width, height);
        self
    }

    /// Add a font resource next to the default `F1`.
    pub fn font(mut self, name: &str, dict: Dictionary) -> Self {
        self.fonts.push((name.to_string(), dict));
        self
    }

    pub fn page(mut self, page: PageSpec) -> Self {
        self.pages.push(page);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let image_id = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0x80],
        ));
        let mut fonts = dictionary! { "F1" => font_id };
        for (name, dict) in self.fonts {
            fonts.set(name, doc.add_object(dict));
        }
        let resources_id = doc.add_object(dictionary! {
            "Font" => fonts,
            "XObject" => dictionary! { "Im1" => image_id },
        });

        let mut kids: Vec<Object> = Vec::with_capacity(self.pages.len());
        for spec in &self.pages {
            let content = Content {
                operations: spec.operations(),
            };
            let bytes = content.encode().unwrap_or_default();
            let content_id = doc.add_object(Stream::new(dictionary! {}, bytes));

            let mut page = dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            };
            if let Some((w, h)) = spec.media_box {
                page.set("MediaBox", media_box(w, h));
            }
            kids.push(doc.add_object(page).into());
        }

        let (w, h) = self.default_media_box;
        let count = kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => media_box(w, h),
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        doc.save_to(&mut out).expect("in-memory save");
        out
    }
}

fn media_box(width: f32, height: f32) -> Object {
    Object::Array(vec![
        0.into(),
        0.into(),
        Object::Real(width),
        Object::Real(height),
    ])
}

/// A line of `n` non-whitespace characters.
pub fn filler(n: usize) -> String {
    "x".repeat(n)
}

/// A minimal DOCX package with one paragraph per entry.
pub fn docx(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let body: String = paragraphs
        .iter()
        .map(|p| format!(r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#, p))
        .collect();
    let xml = format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>{}</w:body></w:document>"#,
        body
    );

    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
    writer.start_file("word/document.xml", options).expect("zip entry");
    writer.write_all(xml.as_bytes()).expect("zip write");
    writer.finish().expect("zip finish").into_inner()
}
