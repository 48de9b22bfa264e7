// Builds the lopdf object graph for one book.

use crate::error::RenderError;
use crate::layout::{Font, fit_lines, text_width, to_win_ansi, word_spacing, wrap};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use std::io::Write;

pub const PAGE_WIDTH: f32 = 595.0;
pub const PAGE_HEIGHT: f32 = 842.0;
pub const MARGIN: f32 = 50.0;

const BODY_SIZE: f32 = 14.0;
const BODY_LEADING: f32 = 20.0;
const FOOTER_SIZE: f32 = 10.0;
const IMAGE_REGION_HEIGHT: f32 = 430.0;
const GAP: f32 = 24.0;
const PLACEHOLDER_TEXT: &str = "Image not available";

type Rgb = (f32, f32, f32);

const INK: Rgb = (0.15, 0.15, 0.2);
const MUTED: Rgb = (0.4, 0.4, 0.4);
const PLACEHOLDER_FILL: Rgb = (0.94, 0.94, 0.94);
const PLACEHOLDER_STROKE: Rgb = (0.8, 0.8, 0.8);

/// JPEG payload and pixel size of an image to embed.
#[derive(Debug, Clone)]
pub struct EmbeddedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy)]
struct Rect {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

/// Scales `(w, h)` to fit `bounds` keeping the aspect ratio, centered.
fn fit_rect(w: u32, h: u32, bounds: Rect) -> Rect {
    let (w, h) = (w.max(1) as f32, h.max(1) as f32);
    let scale = (bounds.width / w).min(bounds.height / h);
    let (width, height) = (w * scale, h * scale);
    Rect {
        x: bounds.x + (bounds.width - width) / 2.0,
        y: bounds.y + (bounds.height - height) / 2.0,
        width,
        height,
    }
}

/// Accumulates operations for one page.
struct PageCanvas {
    content: Content,
    xobjects: Dictionary,
}

impl PageCanvas {
    fn new() -> Self {
        Self {
            content: Content { operations: vec![] },
            xobjects: Dictionary::new(),
        }
    }

    fn op(&mut self, operator: &str, operands: Vec<Object>) {
        self.content.operations.push(Operation::new(operator, operands));
    }

    fn fill_color(&mut self, (r, g, b): Rgb) {
        self.op("rg", vec![r.into(), g.into(), b.into()]);
    }

    fn text(&mut self, text: &str, font: Font, size: f32, x: f32, y: f32, color: Rgb) {
        self.op("BT", vec![]);
        self.op("Tf", vec![Object::Name(font.resource_name().as_bytes().to_vec()), size.into()]);
        self.fill_color(color);
        self.op("Td", vec![x.into(), y.into()]);
        self.op("Tj", vec![Object::String(to_win_ansi(text), StringFormat::Literal)]);
        self.op("ET", vec![]);
    }

    fn centered_text(&mut self, text: &str, font: Font, size: f32, y: f32, color: Rgb) {
        let x = (PAGE_WIDTH - text_width(text, font, size)) / 2.0;
        self.text(text, font, size, x.max(MARGIN), y, color);
    }

    /// Draws justified lines top-down from `top`. The last line is left-aligned.
    fn justified(&mut self, lines: &[String], font: Font, size: f32, x: f32, top: f32, width: f32) {
        self.op("BT", vec![]);
        self.op("Tf", vec![Object::Name(font.resource_name().as_bytes().to_vec()), size.into()]);
        self.fill_color(INK);
        self.op("TL", vec![BODY_LEADING.into()]);
        self.op("Td", vec![x.into(), (top - size).into()]);
        for (i, line) in lines.iter().enumerate() {
            let is_last = i + 1 == lines.len();
            let spacing = if is_last {
                0.0
            } else {
                word_spacing(line, font, size, width)
            };
            self.op("Tw", vec![spacing.into()]);
            if i > 0 {
                self.op("T*", vec![]);
            }
            self.op("Tj", vec![Object::String(to_win_ansi(line), StringFormat::Literal)]);
        }
        self.op("Tw", vec![0.0_f32.into()]);
        self.op("ET", vec![]);
    }

    fn image(&mut self, name: &str, id: ObjectId, rect: Rect) {
        self.xobjects.set(name.as_bytes(), Object::Reference(id));
        self.op("q", vec![]);
        self.op(
            "cm",
            vec![rect.width.into(), 0.into(), 0.into(), rect.height.into(), rect.x.into(), rect.y.into()],
        );
        self.op("Do", vec![Object::Name(name.as_bytes().to_vec())]);
        self.op("Q", vec![]);
    }

    fn placeholder(&mut self, rect: Rect) {
        self.fill_color(PLACEHOLDER_FILL);
        let (r, g, b) = PLACEHOLDER_STROKE;
        self.op("RG", vec![r.into(), g.into(), b.into()]);
        self.op("w", vec![2.0_f32.into()]);
        self.op("re", vec![rect.x.into(), rect.y.into(), rect.width.into(), rect.height.into()]);
        self.op("B", vec![]);
        let size = 12.0;
        let x = rect.x + (rect.width - text_width(PLACEHOLDER_TEXT, Font::Regular, size)) / 2.0;
        let y = rect.y + rect.height / 2.0 - size / 2.0;
        self.text(PLACEHOLDER_TEXT, Font::Regular, size, x, y, MUTED);
    }
}

/// Writes cover, story and colophon pages into an A4 document.
pub struct BookPdfWriter {
    document: Document,
    pages_id: ObjectId,
    fonts_id: ObjectId,
    page_ids: Vec<ObjectId>,
    image_count: usize,
}

impl Default for BookPdfWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BookPdfWriter {
    pub fn new() -> Self {
        let mut document = Document::with_version("1.7");
        let pages_id = document.new_object_id();

        let mut fonts = Dictionary::new();
        for font in [Font::Regular, Font::Bold] {
            let font_id = document.add_object(dictionary! {
                "Type" => "Font",
                "Subtype" => "Type1",
                "BaseFont" => font.base_font(),
                "Encoding" => "WinAnsiEncoding",
            });
            fonts.set(font.resource_name().as_bytes(), Object::Reference(font_id));
        }
        let fonts_id = document.add_object(fonts);

        Self {
            document,
            pages_id,
            fonts_id,
            page_ids: Vec::new(),
            image_count: 0,
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    fn add_image(&mut self, image: &EmbeddedImage) -> ObjectId {
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => image.width as i64,
                "Height" => image.height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            image.data.clone(),
        );
        self.document.add_object(stream)
    }

    /// Image in `bounds`, or the placeholder rectangle when there is none.
    fn draw_image_or_placeholder(&mut self, canvas: &mut PageCanvas, image: Option<&EmbeddedImage>, bounds: Rect) {
        match image {
            Some(image) => {
                let id = self.add_image(image);
                self.image_count += 1;
                let name = format!("Im{}", self.image_count);
                canvas.image(&name, id, fit_rect(image.width, image.height, bounds));
            }
            None => {
                let rect = fit_rect(4, 3, bounds);
                canvas.placeholder(rect);
            }
        }
    }

    fn finish_page(&mut self, canvas: PageCanvas) -> Result<ObjectId, RenderError> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&canvas.content.encode()?)?;
        let compressed = encoder.finish()?;
        let content_id = self
            .document
            .add_object(Stream::new(dictionary! {"Filter" => "FlateDecode"}, compressed));

        let mut resources = dictionary! { "Font" => self.fonts_id };
        if !canvas.xobjects.is_empty() {
            resources.set("XObject", Object::Dictionary(canvas.xobjects));
        }
        let page_id = self.document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            "Contents" => content_id,
            "Resources" => resources,
        });
        self.page_ids.push(page_id);
        Ok(page_id)
    }

    fn footer(canvas: &mut PageCanvas, number: usize) {
        canvas.centered_text(&number.to_string(), Font::Regular, FOOTER_SIZE, MARGIN / 2.0, MUTED);
    }

    pub fn cover(
        &mut self,
        title: &str,
        author: &str,
        subtitle: &str,
        image: Option<&EmbeddedImage>,
    ) -> Result<(), RenderError> {
        let mut canvas = PageCanvas::new();
        let content_width = PAGE_WIDTH - 2.0 * MARGIN;
        let mut y = PAGE_HEIGHT - MARGIN - 28.0;
        for line in wrap(title, Font::Bold, 28.0, content_width).iter().take(3) {
            canvas.centered_text(line, Font::Bold, 28.0, y, INK);
            y -= 34.0;
        }
        y -= 6.0;
        canvas.centered_text(&format!("by {}", author), Font::Regular, 16.0, y, INK);
        y -= 24.0;
        canvas.centered_text(subtitle, Font::Regular, 12.0, y, MUTED);
        y -= GAP;

        let bounds = Rect {
            x: MARGIN,
            y: MARGIN,
            width: content_width,
            height: (y - MARGIN).max(100.0),
        };
        self.draw_image_or_placeholder(&mut canvas, image, bounds);
        self.finish_page(canvas)?;
        Ok(())
    }

    /// One story page: image on top, justified text below, number in the footer.
    pub fn story_page(&mut self, number: usize, text: &str, image: Option<&EmbeddedImage>) -> Result<(), RenderError> {
        let mut canvas = PageCanvas::new();
        let content_width = PAGE_WIDTH - 2.0 * MARGIN;
        let image_top = PAGE_HEIGHT - MARGIN;
        let bounds = Rect {
            x: MARGIN,
            y: image_top - IMAGE_REGION_HEIGHT,
            width: content_width,
            height: IMAGE_REGION_HEIGHT,
        };
        self.draw_image_or_placeholder(&mut canvas, image, bounds);

        let text_top = bounds.y - GAP;
        let text_bottom = MARGIN + FOOTER_SIZE;
        let max_lines = ((text_top - text_bottom) / BODY_LEADING).floor().max(1.0) as usize;
        let lines = fit_lines(text, Font::Regular, BODY_SIZE, content_width, max_lines);
        if lines.is_empty() {
            log::debug!("Story page {} has no text", number);
        } else {
            canvas.justified(&lines, Font::Regular, BODY_SIZE, MARGIN, text_top, content_width);
        }

        Self::footer(&mut canvas, number);
        self.finish_page(canvas)?;
        Ok(())
    }

    /// Closing page listing `(label, value)` facts and a note.
    pub fn colophon(&mut self, facts: &[(&str, String)], note: &str) -> Result<(), RenderError> {
        let mut canvas = PageCanvas::new();
        let content_width = PAGE_WIDTH - 2.0 * MARGIN;
        let mut y = PAGE_HEIGHT - MARGIN - 20.0;
        canvas.text("About this book", Font::Bold, 20.0, MARGIN, y, INK);
        y -= 36.0;

        for (label, value) in facts {
            let label = format!("{}:", label);
            canvas.text(&label, Font::Bold, 12.0, MARGIN, y, INK);
            let indent = 150.0;
            for line in wrap(value, Font::Regular, 12.0, content_width - indent).iter().take(3) {
                canvas.text(line, Font::Regular, 12.0, MARGIN + indent, y, INK);
                y -= 18.0;
            }
            if value.trim().is_empty() {
                y -= 18.0;
            }
        }

        y -= GAP;
        for line in wrap(note, Font::Regular, 10.0, content_width) {
            canvas.text(&line, Font::Regular, 10.0, MARGIN, y, MUTED);
            y -= 14.0;
        }
        self.finish_page(canvas)?;
        Ok(())
    }

    /// Links the page tree and catalog. The document is ready to save.
    pub fn finish(mut self) -> Result<Document, RenderError> {
        if self.page_ids.is_empty() {
            return Err(RenderError::NoPages);
        }
        let kids: Vec<Object> = self.page_ids.iter().map(|id| Object::Reference(*id)).collect();
        let count = self.page_ids.len() as i64;
        self.document.objects.insert(
            self.pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.document.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.document.trailer.set("Root", catalog_id);
        Ok(self.document)
    }
}
