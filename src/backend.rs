//! The backends under comparison and the contract they share.

use std::fmt;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use image::DynamicImage;
use lopdf::content::{Content, Operation as ContentOp};
use lopdf::{dictionary, Dictionary, Object, Stream};
use printpdf::{Image, ImageTransform, Mm, PdfDocument};
use serde::{Deserialize, Serialize};

use crate::config::{PageSize, Rotation};
use crate::staging::StagedImage;
use crate::{inspect, raster, raw, Error, Result};

/// A document produced by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Where the document was written.
    pub path: PathBuf,
    /// Number of pages the backend wrote.
    pub page_count: usize,
}

/// The two operations every backend implements.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Assemble a document from staged images.
    Create,
    /// Turn every page of an existing document.
    Rotate,
}

impl Operation {
    /// Get the name of the operation.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Rotate => "rotate",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A PDF backend used to assemble and rotate documents. The set is closed:
/// every variant is dispatched by `match`, never through a plugin table.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Object-model writer and reader (lopdf).
    Lopdf,
    /// Write-only serializer (pdf-writer); rotates by re-rendering with hayro.
    #[serde(rename = "pdf-writer")]
    PdfWriter,
    /// Layer-based writer (printpdf); rotates through lopdf.
    Printpdf,
    /// Hand-serialized streaming writer; rotates by patching bytes.
    Raw,
}

impl Backend {
    /// Every backend, in the order a run visits them.
    pub const ALL: [Backend; 4] = [
        Backend::Lopdf,
        Backend::PdfWriter,
        Backend::Printpdf,
        Backend::Raw,
    ];

    /// Get the name of the backend.
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Lopdf => "lopdf",
            Backend::PdfWriter => "pdf-writer",
            Backend::Printpdf => "printpdf",
            Backend::Raw => "raw",
        }
    }

    /// Assemble one page per staged image, in order, each image stretched to
    /// fill `page_size`, and write the result to `destination`.
    pub fn create(
        &self,
        images: &[StagedImage],
        page_size: PageSize,
        destination: &Path,
    ) -> Result<Document> {
        let res = match self {
            Backend::Lopdf => create_lopdf(images, page_size, destination),
            Backend::PdfWriter => raster::create_pdf_writer(images, page_size, destination),
            Backend::Printpdf => create_printpdf(images, page_size, destination),
            Backend::Raw => raw::create_raw(images, page_size, destination),
        };

        self.contain(Operation::Create, res)
            .map(|page_count| Document {
                path: destination.to_path_buf(),
                page_count,
            })
    }

    /// Read the document at `source`, turn every page a quarter in the
    /// given direction and write the result to `destination`.
    pub fn rotate(&self, source: &Path, rotation: Rotation, destination: &Path) -> Result<Document> {
        let res = match self {
            Backend::Lopdf | Backend::Printpdf => rotate_lopdf(source, rotation, destination),
            Backend::PdfWriter => raster::rotate_raster(source, rotation, destination),
            Backend::Raw => raw::rotate_raw(source, rotation, destination),
        };

        self.contain(Operation::Rotate, res)
            .map(|page_count| Document {
                path: destination.to_path_buf(),
                page_count,
            })
    }

    // Library errors never leave a backend as anything but `Error::Backend`.
    fn contain(&self, operation: Operation, res: Result<usize, String>) -> Result<usize> {
        res.map_err(|cause| Error::backend(*self, operation, cause))
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Backend::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("unknown backend '{}'", s)))
    }
}

/// Decode a staged image as 8-bit RGB.
pub(crate) fn load_rgb(image: &StagedImage) -> Result<image::RgbImage, String> {
    image::open(&image.path)
        .map(|img| img.to_rgb8())
        .map_err(|e| format!("unable to read {}: {}", image.path.display(), e))
}

pub(crate) fn write_file(path: &Path, buf: &[u8]) -> Result<(), String> {
    fs::write(path, buf).map_err(|e| format!("unable to write {}: {}", path.display(), e))
}

/// Assemble a document with lopdf.
pub fn create_lopdf(
    images: &[StagedImage],
    page_size: PageSize,
    destination: &Path,
) -> Result<usize, String> {
    let mut doc = lopdf::Document::with_version("1.7");
    let pages_id = doc.new_object_id();
    let mut page_ids = Vec::with_capacity(images.len());

    for staged in images {
        let rgb = load_rgb(staged)?;

        let image_dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => rgb.width() as i64,
            "Height" => rgb.height() as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8_i64,
        };
        let image_id = doc.add_object(Stream::new(image_dict, rgb.into_raw()));

        let content = Content {
            operations: vec![
                ContentOp::new("q", vec![]),
                ContentOp::new(
                    "cm",
                    vec![
                        page_size.width.into(),
                        Object::Integer(0),
                        Object::Integer(0),
                        page_size.height.into(),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                ContentOp::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                ContentOp::new("Q", vec![]),
            ],
        };
        let encoded = content.encode().map_err(|e| e.to_string())?;
        let content_id = doc.add_object(Stream::new(Dictionary::new(), encoded));

        let page = dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                page_size.width.into(),
                page_size.height.into(),
            ],
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image_id },
            },
            "Contents" => content_id,
        };
        page_ids.push(doc.add_object(page));
    }

    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
        "Count" => page_ids.len() as i64,
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    doc.compress();
    doc.save(destination)
        .map_err(|e| format!("unable to write {}: {}", destination.display(), e))?;

    Ok(page_ids.len())
}

/// Rotate every page by editing its `/Rotate` entry with lopdf.
pub fn rotate_lopdf(source: &Path, rotation: Rotation, destination: &Path) -> Result<usize, String> {
    let mut doc = lopdf::Document::load(source)
        .map_err(|e| format!("unable to read {}: {}", source.display(), e))?;

    let page_ids: Vec<_> = doc.get_pages().into_values().collect();

    for page_id in &page_ids {
        let current = inspect::page_rotation(&doc, *page_id);
        let page = doc
            .get_object_mut(*page_id)
            .and_then(Object::as_dict_mut)
            .map_err(|e| format!("malformed page {:?}: {}", page_id, e))?;
        page.set("Rotate", rotation.apply(current));
    }

    doc.save(destination)
        .map_err(|e| format!("unable to write {}: {}", destination.display(), e))?;

    Ok(page_ids.len())
}

/// Assemble a document with printpdf.
pub fn create_printpdf(
    images: &[StagedImage],
    page_size: PageSize,
    destination: &Path,
) -> Result<usize, String> {
    let (first, rest) = images
        .split_first()
        .ok_or_else(|| "no images to assemble".to_string())?;

    let width = pt_to_mm(page_size.width);
    let height = pt_to_mm(page_size.height);
    let (doc, page, layer) = PdfDocument::new("pdfbench", width, height, "Layer 1");

    let mut targets = vec![doc.get_page(page).get_layer(layer)];
    for _ in rest {
        let (page, layer) = doc.add_page(width, height, "Layer 1");
        targets.push(doc.get_page(page).get_layer(layer));
    }

    for (staged, layer) in std::iter::once(first).chain(rest).zip(targets) {
        let rgb = load_rgb(staged)?;
        // At 72 dpi one pixel is one point, so the scale is page over image.
        let transform = ImageTransform {
            translate_x: Some(Mm(0.0)),
            translate_y: Some(Mm(0.0)),
            scale_x: Some(page_size.width / rgb.width() as f32),
            scale_y: Some(page_size.height / rgb.height() as f32),
            dpi: Some(72.0),
            ..Default::default()
        };
        Image::from_dynamic_image(&DynamicImage::ImageRgb8(rgb)).add_to_layer(layer, transform);
    }

    let file = File::create(destination)
        .map_err(|e| format!("unable to write {}: {}", destination.display(), e))?;
    doc.save(&mut BufWriter::new(file))
        .map_err(|e| format!("unable to write {}: {}", destination.display(), e))?;

    Ok(images.len())
}

fn pt_to_mm(pt: f32) -> Mm {
    Mm(pt * 25.4 / 72.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Fill;
    use crate::source::generate;
    use crate::staging::StagingArea;
    use tempdir::TempDir;

    const SMALL: PageSize = PageSize {
        width: 60.0,
        height: 80.0,
    };

    fn staged(count: usize) -> StagingArea {
        let images = generate(count, 30, 40, Fill::Noise { seed: Some(1) }).unwrap();
        StagingArea::stage(&images).unwrap()
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for backend in Backend::ALL {
            assert_eq!(backend.name().parse::<Backend>().unwrap(), backend);
        }
        assert_eq!("PDF-Writer".parse::<Backend>().unwrap(), Backend::PdfWriter);
        assert!(matches!("reportlab".parse::<Backend>(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn every_backend_creates_one_page_per_image() {
        let area = staged(3);
        let out = TempDir::new("pdfbench-out").unwrap();

        for backend in Backend::ALL {
            let dest = out.path().join(format!("{}.pdf", backend.name()));
            let doc = backend.create(area.images(), SMALL, &dest).unwrap();
            assert_eq!(doc.page_count, 3, "{}", backend);
            assert_eq!(inspect::page_count(&dest).unwrap(), 3, "{}", backend);
        }

        // Inputs are untouched.
        assert_eq!(area.remaining(), 3);
    }

    #[test]
    fn every_backend_preserves_page_count_on_rotate() {
        let area = staged(2);
        let out = TempDir::new("pdfbench-out").unwrap();

        for backend in Backend::ALL {
            let created = out.path().join(format!("{}.pdf", backend.name()));
            let rotated = out.path().join(format!("{}-rotated.pdf", backend.name()));
            backend.create(area.images(), SMALL, &created).unwrap();
            let doc = backend.rotate(&created, Rotation::Clockwise, &rotated).unwrap();
            assert_eq!(doc.page_count, 2, "{}", backend);
            assert_eq!(inspect::page_count(&rotated).unwrap(), 2, "{}", backend);
        }
    }

    #[test]
    fn lopdf_rotation_is_cyclic() {
        let area = staged(2);
        let out = TempDir::new("pdfbench-out").unwrap();
        let mut current = out.path().join("r0.pdf");
        Backend::Lopdf.create(area.images(), SMALL, &current).unwrap();

        for i in 1..=4 {
            let next = out.path().join(format!("r{}.pdf", i));
            Backend::Lopdf.rotate(&current, Rotation::Clockwise, &next).unwrap();
            let expected = (90 * i) % 360;
            let pages = inspect::pages(&next).unwrap();
            assert!(pages.iter().all(|p| p.rotation == expected), "step {}", i);
            current = next;
        }
    }

    #[test]
    fn counter_clockwise_rotation() {
        let area = staged(1);
        let out = TempDir::new("pdfbench-out").unwrap();
        let created = out.path().join("printpdf.pdf");
        let rotated = out.path().join("printpdf-rotated.pdf");
        Backend::Printpdf.create(area.images(), SMALL, &created).unwrap();
        Backend::Printpdf
            .rotate(&created, Rotation::CounterClockwise, &rotated)
            .unwrap();
        assert_eq!(inspect::pages(&rotated).unwrap()[0].rotation, 270);
    }

    #[test]
    fn unwritable_destination_is_a_backend_failure() {
        let area = staged(1);
        let out = TempDir::new("pdfbench-out").unwrap();
        // A directory where the document should go.
        let dest = out.path().join("blocked.pdf");
        fs::create_dir(&dest).unwrap();

        for backend in Backend::ALL {
            match backend.create(area.images(), SMALL, &dest) {
                Err(Error::Backend {
                    backend: b,
                    operation: Operation::Create,
                    ..
                }) => assert_eq!(b, backend),
                other => panic!("{}: expected backend failure, got {:?}", backend, other),
            }
        }
    }

    #[test]
    fn unreadable_source_is_a_backend_failure() {
        let out = TempDir::new("pdfbench-out").unwrap();
        let source = out.path().join("missing.pdf");
        let dest = out.path().join("rotated.pdf");

        for backend in Backend::ALL {
            assert!(matches!(
                backend.rotate(&source, Rotation::Clockwise, &dest),
                Err(Error::Backend {
                    operation: Operation::Rotate,
                    ..
                })
            ));
        }
    }
}
