//! The pdf-writer backend.
//!
//! pdf-writer can only write, so rotation cannot edit the source in place.
//! Instead every source page is rendered with hayro, the pixels are turned
//! with tiny-skia, and a fresh document is assembled from the result.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use hayro::{render, Pdf, RenderSettings};
use hayro_interpret::InterpreterSettings;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use pdf_writer::{Content, Filter, Finish, Name, Rect, Ref};
use tiny_skia::{FilterQuality, Pixmap, PixmapPaint, Transform};

use crate::backend::{load_rgb, write_file};
use crate::config::{PageSize, Rotation};
use crate::inspect::{self, PageInfo};
use crate::staging::StagedImage;

const JPEG_QUALITY: u8 = 85;
const IMAGE_NAME: Name<'static> = Name(b"Im0");

/// A JPEG-encoded page image and the page it fills.
struct EncodedPage {
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
    page_size: PageSize,
}

/// Assemble a document with pdf-writer, images embedded as JPEG.
pub fn create_pdf_writer(
    images: &[StagedImage],
    page_size: PageSize,
    destination: &Path,
) -> Result<usize, String> {
    let pages = images
        .iter()
        .map(|staged| encode_jpeg(load_rgb(staged)?, page_size))
        .collect::<Result<Vec<_>, String>>()?;

    write_file(destination, &assemble(&pages))?;

    Ok(pages.len())
}

/// Rotate by re-rendering every page and turning its pixels.
///
/// Page bounds come from the source media box, and each page is rendered at
/// the resolution of the image it draws, so neither is snapped to the
/// rendering grid.
pub fn rotate_raster(source: &Path, rotation: Rotation, destination: &Path) -> Result<usize, String> {
    let buf = std::fs::read(source).map_err(|e| format!("unable to read {}: {}", source.display(), e))?;
    let geometry = source_pages(&buf)?;

    let data = Arc::new(buf);
    let pdf = Pdf::new(data).map_err(|e| format!("failed to parse PDF: {:?}", e))?;

    let interpreter_settings = InterpreterSettings::default();

    let renderable = pdf.pages().iter().count();
    if renderable != geometry.len() {
        return Err(format!(
            "{} has {} renderable pages but {} in its page tree",
            source.display(),
            renderable,
            geometry.len()
        ));
    }

    let mut pages = Vec::new();
    for (page, source_page) in pdf.pages().iter().zip(&geometry) {
        let (x_scale, y_scale) = source_page.scale();
        let render_settings = RenderSettings {
            x_scale,
            y_scale,
            ..Default::default()
        };

        let png = render(page, &interpreter_settings, &render_settings).take_png();
        let rendered = Pixmap::decode_png(&png).map_err(|_| "unable to generate pixmap".to_string())?;
        let turned = turn(&rendered, rotation).ok_or_else(|| "empty page".to_string())?;

        pages.push(encode_jpeg(to_rgb(&turned)?, source_page.visible().swapped())?);
    }

    if pages.is_empty() {
        return Err(format!("{} has no pages", source.display()));
    }

    write_file(destination, &assemble(&pages))?;

    Ok(pages.len())
}

/// Geometry of a source page, read from its page tree entry.
struct SourcePage {
    info: PageInfo,
    pixels: Option<(u32, u32)>,
}

impl SourcePage {
    fn quarter_turned(&self) -> bool {
        self.info.rotation % 180 == 90
    }

    /// The page as displayed, after its own `/Rotate`.
    fn visible(&self) -> PageSize {
        let media = PageSize {
            width: self.info.width,
            height: self.info.height,
        };
        if self.quarter_turned() {
            media.swapped()
        } else {
            media
        }
    }

    /// Render scale that maps the page image one pixel to one pixel.
    fn scale(&self) -> (f32, f32) {
        let Some((w, h)) = self.pixels else {
            return (1.0, 1.0);
        };
        if self.info.width <= 0.0 || self.info.height <= 0.0 {
            return (1.0, 1.0);
        }

        let (x, y) = (w as f32 / self.info.width, h as f32 / self.info.height);
        if self.quarter_turned() {
            (y, x)
        } else {
            (x, y)
        }
    }
}

fn source_pages(buf: &[u8]) -> Result<Vec<SourcePage>, String> {
    let doc = lopdf::Document::load_mem(buf).map_err(|e| format!("failed to parse PDF: {}", e))?;

    doc.get_pages()
        .into_values()
        .map(|id| {
            Ok(SourcePage {
                info: inspect::page_info(&doc, id)?,
                pixels: inspect::image_size(&doc, id),
            })
        })
        .collect()
}

/// Turn a pixmap a quarter in the given direction.
fn turn(pixmap: &Pixmap, rotation: Rotation) -> Option<Pixmap> {
    let (w, h) = (pixmap.width() as f32, pixmap.height() as f32);
    let mut turned = Pixmap::new(pixmap.height(), pixmap.width())?;

    // Maps (x, y) to (h - y, x) or (y, w - x) in y-down pixel space.
    let transform = match rotation {
        Rotation::Clockwise => Transform::from_row(0.0, 1.0, -1.0, 0.0, h, 0.0),
        Rotation::CounterClockwise => Transform::from_row(0.0, -1.0, 1.0, 0.0, 0.0, w),
    };

    let paint = PixmapPaint {
        quality: FilterQuality::Nearest,
        ..Default::default()
    };
    turned.draw_pixmap(0, 0, pixmap.as_ref(), &paint, transform, None);

    Some(turned)
}

fn to_rgb(pixmap: &Pixmap) -> Result<RgbImage, String> {
    let raw = pixmap
        .pixels()
        .iter()
        .flat_map(|p| {
            let c = p.demultiply();
            [c.red(), c.green(), c.blue()]
        })
        .collect();

    RgbImage::from_raw(pixmap.width(), pixmap.height(), raw)
        .ok_or_else(|| "pixel buffer does not match page size".to_string())
}

fn encode_jpeg(rgb: RgbImage, page_size: PageSize) -> Result<EncodedPage, String> {
    let (width, height) = rgb.dimensions();
    let mut jpeg = Vec::new();
    DynamicImage::ImageRgb8(rgb)
        .write_to(&mut Cursor::new(&mut jpeg), ImageOutputFormat::Jpeg(JPEG_QUALITY))
        .map_err(|e| format!("JPEG encoding failed: {}", e))?;

    Ok(EncodedPage {
        jpeg,
        width,
        height,
        page_size,
    })
}

fn assemble(pages: &[EncodedPage]) -> Vec<u8> {
    let mut alloc = Ref::new(1);
    let catalog_id = alloc.bump();
    let tree_id = alloc.bump();

    // Three objects per page: page, content stream, image.
    let ids: Vec<(Ref, Ref, Ref)> = pages
        .iter()
        .map(|_| (alloc.bump(), alloc.bump(), alloc.bump()))
        .collect();

    let mut pdf = pdf_writer::Pdf::new();
    pdf.catalog(catalog_id).pages(tree_id);
    pdf.pages(tree_id)
        .kids(ids.iter().map(|(page_id, _, _)| *page_id))
        .count(pages.len() as i32);

    for (page, (page_id, content_id, image_id)) in pages.iter().zip(ids) {
        let PageSize { width, height } = page.page_size;

        let mut writer = pdf.page(page_id);
        writer.media_box(Rect::new(0.0, 0.0, width, height));
        writer.parent(tree_id);
        writer.contents(content_id);
        writer.resources().x_objects().pair(IMAGE_NAME, image_id);
        writer.finish();

        let mut image = pdf.image_xobject(image_id, &page.jpeg);
        image.filter(Filter::DctDecode);
        image.width(page.width as i32);
        image.height(page.height as i32);
        image.color_space().device_rgb();
        image.bits_per_component(8);
        image.finish();

        let mut content = Content::new();
        content.save_state();
        content.transform([width, 0.0, 0.0, height, 0.0, 0.0]);
        content.x_object(IMAGE_NAME);
        content.restore_state();
        pdf.stream(content_id, &content.finish());
    }

    pdf.finish()
}
