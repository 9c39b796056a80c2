//! Structural inspection of produced documents.
//!
//! Only structure is checked: page count, page orientation and page bounds.
//! Nothing here renders or compares content.

use std::path::Path;

use lopdf::{Dictionary, Object, ObjectId};

/// Orientation and bounds of one page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageInfo {
    /// The effective `/Rotate` value, normalised to `0..360`.
    pub rotation: i64,
    /// Width of the media box in points.
    pub width: f32,
    /// Height of the media box in points.
    pub height: f32,
}

/// Read every page of the document at `path`.
pub fn pages(path: &Path) -> Result<Vec<PageInfo>, String> {
    let doc = lopdf::Document::load(path)
        .map_err(|e| format!("unable to read {}: {}", path.display(), e))?;

    doc.get_pages()
        .into_values()
        .map(|id| page_info(&doc, id))
        .collect()
}

/// Orientation and bounds of one page of a loaded document.
pub(crate) fn page_info(doc: &lopdf::Document, page_id: ObjectId) -> Result<PageInfo, String> {
    let (width, height) =
        media_box(doc, page_id).ok_or_else(|| format!("page {:?} has no usable media box", page_id))?;
    Ok(PageInfo {
        rotation: page_rotation(doc, page_id),
        width,
        height,
    })
}

/// Pixel size of the largest image XObject a page draws from.
pub(crate) fn image_size(doc: &lopdf::Document, page_id: ObjectId) -> Option<(u32, u32)> {
    let resources = inherited(doc, page_id, b"Resources")?.as_dict().ok()?;
    let xobjects = resolve(doc, resources.get(b"XObject").ok()?)?.as_dict().ok()?;

    xobjects
        .iter()
        .filter_map(|(_, obj)| {
            let dict = &resolve(doc, obj)?.as_stream().ok()?.dict;
            let width = dict.get(b"Width").and_then(Object::as_i64).ok()?;
            let height = dict.get(b"Height").and_then(Object::as_i64).ok()?;
            Some((u32::try_from(width).ok()?, u32::try_from(height).ok()?))
        })
        .max_by_key(|(w, h)| u64::from(*w) * u64::from(*h))
}

fn resolve<'a>(doc: &'a lopdf::Document, obj: &'a Object) -> Option<&'a Object> {
    match obj {
        Object::Reference(id) => doc.get_object(*id).ok(),
        other => Some(other),
    }
}

/// Count the pages of the document at `path`.
pub fn page_count(path: &Path) -> Result<usize, String> {
    let doc = lopdf::Document::load(path)
        .map_err(|e| format!("unable to read {}: {}", path.display(), e))?;
    Ok(doc.get_pages().len())
}

/// The effective rotation of a page, following inheritance through the page tree.
pub fn page_rotation(doc: &lopdf::Document, page_id: ObjectId) -> i64 {
    inherited(doc, page_id, b"Rotate")
        .and_then(|obj| obj.as_i64().ok())
        .unwrap_or(0)
        .rem_euclid(360)
}

fn media_box(doc: &lopdf::Document, page_id: ObjectId) -> Option<(f32, f32)> {
    let rect = inherited(doc, page_id, b"MediaBox")?.as_array().ok()?;
    let coords: Vec<f32> = rect.iter().filter_map(number).collect();
    match coords.as_slice() {
        [x0, y0, x1, y1] => Some(((x1 - x0).abs(), (y1 - y0).abs())),
        _ => None,
    }
}

fn number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r as f32),
        _ => None,
    }
}

// Walks `/Parent` links; the depth bound guards against cyclic trees.
fn inherited<'a>(doc: &'a lopdf::Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut dict: &Dictionary = doc.get_dictionary(page_id).ok()?;

    for _ in 0..32 {
        if let Ok(value) = dict.get(key) {
            return resolve(doc, value);
        }
        let parent = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
        dict = doc.get_dictionary(parent).ok()?;
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;
    use tempdir::TempDir;

    fn write_tree(path: &Path) {
        let mut doc = lopdf::Document::with_version("1.7");
        let pages_id = doc.new_object_id();
        let own = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Rotate" => 180_i64,
        });
        let inheriting = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(own), Object::Reference(inheriting)],
                "Count" => 2_i64,
                "Rotate" => 90_i64,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Integer(100),
                    Object::Integer(50),
                ],
            }),
        );
        let catalog = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog);
        doc.save(path).unwrap();
    }

    #[test]
    fn follows_inheritance() {
        let dir = TempDir::new("pdfbench-inspect").unwrap();
        let path = dir.path().join("tree.pdf");
        write_tree(&path);

        let pages = pages(&path).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].rotation, 180);
        assert_eq!(pages[1].rotation, 90);
        assert_eq!((pages[1].width, pages[1].height), (100.0, 50.0));
        assert_eq!(page_count(&path).unwrap(), 2);
    }

    #[test]
    fn finds_the_largest_page_image() {
        let mut doc = lopdf::Document::with_version("1.7");
        let small = doc.add_object(lopdf::Stream::new(
            dictionary! { "Subtype" => "Image", "Width" => 4_i64, "Height" => 4_i64 },
            vec![0; 48],
        ));
        let large = doc.add_object(lopdf::Stream::new(
            dictionary! { "Subtype" => "Image", "Width" => 30_i64, "Height" => 20_i64 },
            vec![0; 1800],
        ));
        let page = doc.add_object(dictionary! {
            "Type" => "Page",
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => small, "Im1" => large },
            },
        });
        let bare = doc.add_object(dictionary! { "Type" => "Page" });

        assert_eq!(image_size(&doc, page), Some((30, 20)));
        assert_eq!(image_size(&doc, bare), None);
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir = TempDir::new("pdfbench-inspect").unwrap();
        let path = dir.path().join("garbage.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();
        assert!(page_count(&path).is_err());
    }
}
