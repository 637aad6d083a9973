use super::font::{TextStyle, to_latin1};
use super::{ColourSpace, EmbeddedImage, ImageEncoding, PageSurface, RenderError, Rgb};
use crate::geometry::Rect;
use crate::imaging::png_bit_depth;
use crate::wrap::TextMeasure;
use image::ImageFormat;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream, StringFormat, dictionary};
use std::io::Write;

const POINTS_PER_INCH: f64 = 72.0;
const FONT_RESOURCE: &str = "F1";

#[derive(Default)]
struct PageContent {
    operations: Vec<Operation>,
    images: Vec<(String, ObjectId)>,
}

/// PDF page surface. Pages are accumulated in memory and the document is
/// assembled in [`PageSurface::finish`].
pub struct PdfSurface {
    doc: Document,
    width_pt: f64,
    height_pt: f64,
    style: TextStyle,
    font_id: ObjectId,
    pages: Vec<PageContent>,
    image_count: usize,
    finished: bool,
}

fn real(v: f64) -> Object {
    Object::Real(v as f32)
}

impl PdfSurface {
    /// Every page has the same physical size, in inches.
    pub fn new(width_in: f64, height_in: f64, style: TextStyle) -> Self {
        let mut doc = Document::with_version("1.5");
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => style.font.base_name(),
            "Encoding" => "WinAnsiEncoding",
        });

        Self {
            doc,
            width_pt: width_in * POINTS_PER_INCH,
            height_pt: height_in * POINTS_PER_INCH,
            style,
            font_id,
            pages: Vec::new(),
            image_count: 0,
            finished: false,
        }
    }

    fn current(&mut self) -> Result<&mut PageContent, RenderError> {
        if self.finished {
            return Err(RenderError::Finished);
        }
        self.pages.last_mut().ok_or(RenderError::NoPage)
    }

    /// Top-left inch coordinates to a PDF bottom-left rectangle in points.
    fn to_pdf_rect(&self, rect: &Rect) -> [f64; 4] {
        [
            rect.x * POINTS_PER_INCH,
            self.height_pt - rect.bottom() * POINTS_PER_INCH,
            rect.width * POINTS_PER_INCH,
            rect.height * POINTS_PER_INCH,
        ]
    }

    fn image_stream(image: &EmbeddedImage) -> Result<Stream, RenderError> {
        let colour_space = match image.colour {
            ColourSpace::Gray => "DeviceGray",
            ColourSpace::Rgb => "DeviceRGB",
        };
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(image.width),
            "Height" => i64::from(image.height),
            "ColorSpace" => colour_space,
            "BitsPerComponent" => 8_i64,
        };

        match image.encoding {
            ImageEncoding::Jpeg => {
                dict.set("Filter", "DCTDecode");
                Ok(Stream::new(dict, image.bytes.clone()).with_compression(false))
            }
            ImageEncoding::Png => {
                if png_bit_depth(&image.bytes).is_some_and(|depth| depth > 8) {
                    return Err(RenderError::UnsupportedImage(
                        "16-bit depth not supported in PNG".into(),
                    ));
                }
                let decoded = image::load_from_memory_with_format(&image.bytes, ImageFormat::Png)
                    .map_err(|e| RenderError::UnsupportedImage(e.to_string()))?;
                let samples = match image.colour {
                    ColourSpace::Gray => decoded.to_luma8().into_raw(),
                    ColourSpace::Rgb => decoded.to_rgb8().into_raw(),
                };
                dict.set("Width", i64::from(decoded.width()));
                dict.set("Height", i64::from(decoded.height()));
                Ok(Stream::new(dict, samples))
            }
        }
    }
}

impl TextMeasure for PdfSurface {
    fn string_width(&self, text: &str) -> f64 {
        self.style.string_width(text)
    }
}

impl PageSurface for PdfSurface {
    fn add_page(&mut self) {
        self.pages.push(PageContent::default());
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn fill_rect(&mut self, rect: Rect, colour: Rgb) -> Result<(), RenderError> {
        let [x, y, w, h] = self.to_pdf_rect(&rect);
        let [r, g, b] = colour.map(|c| real(c as f64 / 255.0));
        self.current()?.operations.extend([
            Operation::new("q", vec![]),
            Operation::new("rg", vec![r, g, b]),
            Operation::new("re", vec![real(x), real(y), real(w), real(h)]),
            Operation::new("f", vec![]),
            Operation::new("Q", vec![]),
        ]);
        Ok(())
    }

    fn draw_image(&mut self, image: &EmbeddedImage, rect: Rect) -> Result<(), RenderError> {
        self.current()?;
        let stream = Self::image_stream(image)?;
        let id = self.doc.add_object(stream);
        self.image_count += 1;
        let name = format!("Im{}", self.image_count);

        let [x, y, w, h] = self.to_pdf_rect(&rect);
        let page = self.current()?;
        page.operations.extend([
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![real(w), real(0.0), real(0.0), real(h), real(x), real(y)],
            ),
            Operation::new("Do", vec![Object::Name(name.clone().into_bytes())]),
            Operation::new("Q", vec![]),
        ]);
        page.images.push((name, id));
        Ok(())
    }

    fn draw_text(&mut self, x: f64, y: f64, text: &str) -> Result<(), RenderError> {
        let x_pt = x * POINTS_PER_INCH;
        let y_pt = self.height_pt - y * POINTS_PER_INCH;
        let size = self.style.size_pt;
        let [r, g, b] = self.style.colour.map(|c| real(c as f64 / 255.0));
        let encoded = to_latin1(text);

        self.current()?.operations.extend([
            Operation::new("BT", vec![]),
            Operation::new(
                "Tf",
                vec![Object::Name(FONT_RESOURCE.as_bytes().to_vec()), real(size)],
            ),
            Operation::new("rg", vec![r, g, b]),
            Operation::new("Td", vec![real(x_pt), real(y_pt)]),
            Operation::new("Tj", vec![Object::String(encoded, StringFormat::Literal)]),
            Operation::new("ET", vec![]),
        ]);
        Ok(())
    }

    fn line_height(&self) -> f64 {
        self.style.line_height()
    }

    fn finish(&mut self, out: &mut dyn Write) -> Result<(), RenderError> {
        if self.finished {
            return Err(RenderError::Finished);
        }
        self.finished = true;

        let pages_id = self.doc.new_object_id();
        let media_box = vec![real(0.0), real(0.0), real(self.width_pt), real(self.height_pt)];
        let mut kids = Vec::with_capacity(self.pages.len());

        for page in std::mem::take(&mut self.pages) {
            let content = Content {
                operations: page.operations,
            };
            let content_id = self
                .doc
                .add_object(Stream::new(Dictionary::new(), content.encode()?));

            let mut xobjects = Dictionary::new();
            for (name, id) in page.images {
                xobjects.set(name, id);
            }

            let page_id = self.doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => media_box.clone(),
                "Contents" => content_id,
                "Resources" => dictionary! {
                    "Font" => dictionary! { FONT_RESOURCE => self.font_id },
                    "XObject" => xobjects,
                },
            });
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        self.doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);
        self.doc.compress();

        let mut out = out;
        self.doc.save_to(&mut out)?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{jpeg_bytes, png16_bytes, png_bytes};

    fn surface() -> PdfSurface {
        PdfSurface::new(8.5, 11.0, TextStyle::default())
    }

    fn render(mut s: PdfSurface) -> Document {
        let mut bytes = Vec::new();
        s.finish(&mut bytes).unwrap();
        Document::load_mem(&bytes).unwrap()
    }

    fn jpeg(width: u32, height: u32) -> EmbeddedImage {
        EmbeddedImage {
            encoding: ImageEncoding::Jpeg,
            bytes: jpeg_bytes(width, height),
            width,
            height,
            colour: ColourSpace::Rgb,
        }
    }

    #[test]
    fn empty_document_has_no_pages() {
        let doc = render(surface());
        assert_eq!(doc.get_pages().len(), 0);
    }

    #[test]
    fn pages_are_written_in_order_with_media_box() {
        let mut s = surface();
        s.add_page();
        s.add_page();
        s.add_page();
        assert_eq!(s.page_count(), 3);

        let doc = render(s);
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 3);

        let first = doc.get_dictionary(pages[&1]).unwrap();
        let media_box = first.get(b"MediaBox").unwrap().as_array().unwrap();
        assert_eq!(media_box[2].as_float().unwrap(), 612.0);
        assert_eq!(media_box[3].as_float().unwrap(), 792.0);
    }

    #[test]
    fn drawing_requires_a_page() {
        let mut s = surface();
        assert!(matches!(
            s.fill_rect(Rect::new(0.0, 0.0, 1.0, 1.0), [0, 0, 0]),
            Err(RenderError::NoPage)
        ));
        assert!(matches!(s.draw_text(1.0, 1.0, "x"), Err(RenderError::NoPage)));
    }

    #[test]
    fn images_become_xobjects() {
        let mut s = surface();
        s.add_page();
        s.draw_image(&jpeg(20, 10), Rect::new(1.0, 1.0, 2.0, 1.0)).unwrap();
        s.add_page();
        s.draw_image(
            &EmbeddedImage {
                encoding: ImageEncoding::Png,
                bytes: png_bytes(4, 4),
                width: 4,
                height: 4,
                colour: ColourSpace::Rgb,
            },
            Rect::new(1.0, 1.0, 1.0, 1.0),
        )
        .unwrap();

        let doc = render(s);
        let xobjects = doc
            .objects
            .values()
            .filter_map(|o| o.as_stream().ok())
            .filter(|s| {
                s.dict
                    .get(b"Subtype")
                    .and_then(|v| v.as_name())
                    .is_ok_and(|n| n == b"Image")
            })
            .count();
        assert_eq!(xobjects, 2);
    }

    #[test]
    fn deep_png_is_rejected() {
        let mut s = surface();
        s.add_page();
        let image = EmbeddedImage {
            encoding: ImageEncoding::Png,
            bytes: png16_bytes(4, 4),
            width: 4,
            height: 4,
            colour: ColourSpace::Rgb,
        };
        assert!(matches!(
            s.draw_image(&image, Rect::new(0.0, 0.0, 1.0, 1.0)),
            Err(RenderError::UnsupportedImage(_))
        ));
    }

    #[test]
    fn text_lands_in_content_stream() {
        let mut s = surface();
        s.add_page();
        s.draw_text(1.0, 2.0, "Hello caption").unwrap();

        let doc = render(s);
        let pages = doc.get_pages();
        let content = doc.get_page_content(pages[&1]).unwrap();
        let decoded = Content::decode(&content).unwrap();
        let tj = decoded
            .operations
            .iter()
            .find(|op| op.operator == "Tj")
            .unwrap();
        assert_eq!(tj.operands[0].as_str().unwrap(), b"Hello caption");
    }

    #[test]
    fn finish_twice_fails() {
        let mut s = surface();
        s.add_page();
        let mut out = Vec::new();
        s.finish(&mut out).unwrap();
        assert!(matches!(s.finish(&mut out), Err(RenderError::Finished)));
    }

    #[test]
    fn measures_with_style_font() {
        let s = surface();
        assert!(s.string_width("WWW") > s.string_width("iii"));
        assert!(s.line_height() > 0.0);
    }
}
