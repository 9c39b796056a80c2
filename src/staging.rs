//! Scoped temporary storage for generated images.
//!
//! Backends consume images by path rather than as decoded objects, so every
//! backend goes through its own decode path. The staging area owns the files:
//! no backend may delete them, and they are released exactly once, either
//! explicitly or when the area is dropped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempdir::TempDir;
use tiny_skia::Pixmap;
use walkdir::WalkDir;

use crate::{Error, Result};

/// A generated image persisted as a PNG file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedImage {
    /// Location of the encoded image.
    pub path: PathBuf,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// A temporary directory holding one PNG per page.
pub struct StagingArea {
    dir: Option<TempDir>,
    images: Vec<StagedImage>,
}

impl StagingArea {
    /// Encode every image to its own file, in order.
    ///
    /// On failure, the files already written are removed and the error names
    /// the index of the image that could not be staged.
    pub fn stage(images: &[Pixmap]) -> Result<Self> {
        let dir = TempDir::new("pdfbench").map_err(|e| Error::io(std::env::temp_dir(), e))?;
        Self::stage_into(dir, images)
    }

    /// Like [`StagingArea::stage`], but creates the temporary directory under `root`.
    pub fn stage_in(root: &Path, images: &[Pixmap]) -> Result<Self> {
        let dir = TempDir::new_in(root, "pdfbench").map_err(|e| Error::io(root, e))?;
        Self::stage_into(dir, images)
    }

    fn stage_into(dir: TempDir, images: &[Pixmap]) -> Result<Self> {
        let mut area = StagingArea {
            dir: Some(dir),
            images: Vec::with_capacity(images.len()),
        };

        for (index, pixmap) in images.iter().enumerate() {
            let path = area.path().join(format!("page-{:05}.png", index));

            match write_png(pixmap, &path) {
                Ok(()) => area.images.push(StagedImage {
                    path,
                    width: pixmap.width(),
                    height: pixmap.height(),
                }),
                Err(source) => {
                    let _ = fs::remove_file(&path);
                    area.release();
                    return Err(Error::Io {
                        index: Some(index),
                        path,
                        source,
                    });
                }
            }
        }

        log::debug!("staged {} images in {}", area.images.len(), area.path().display());

        Ok(area)
    }

    /// The staged images, in generation order.
    pub fn images(&self) -> &[StagedImage] {
        &self.images
    }

    /// The staging directory. Empty once released.
    pub fn path(&self) -> &Path {
        self.dir.as_ref().map(|d| d.path()).unwrap_or(Path::new(""))
    }

    /// Number of files currently present in the staging directory.
    pub fn remaining(&self) -> usize {
        let Some(dir) = &self.dir else {
            return 0;
        };

        WalkDir::new(dir.path())
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count()
    }

    /// Whether the staged files have been released.
    pub fn is_released(&self) -> bool {
        self.dir.is_none()
    }

    /// Delete every staged file and the directory holding them.
    ///
    /// Calling this more than once is harmless. Files that are already gone
    /// are reported but do not fail the release. Returns the number of files
    /// that were missing.
    pub fn release(&mut self) -> usize {
        let Some(dir) = self.dir.take() else {
            return 0;
        };

        let mut missing = 0;

        for image in self.images.drain(..) {
            match fs::remove_file(&image.path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    log::warn!("staged image {} was already removed", image.path.display());
                    missing += 1;
                }
                Err(e) => log::warn!("unable to remove {}: {}", image.path.display(), e),
            }
        }

        let path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            log::warn!("unable to remove staging directory {}: {}", path.display(), e);
        }

        missing
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        self.release();
    }
}

fn write_png(pixmap: &Pixmap, path: &Path) -> io::Result<()> {
    pixmap
        .save_png(path)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    // Make sure the file is complete and decodable before anyone sees it.
    let size = imagesize::size(path)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
    if size.width != pixmap.width() as usize || size.height != pixmap.height() as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "staged image is {}x{}, expected {}x{}",
                size.width,
                size.height,
                pixmap.width(),
                pixmap.height()
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Fill;
    use crate::source::generate;

    #[test]
    fn stages_one_file_per_image_in_order() {
        let images = generate(5, 20, 30, Fill::default()).unwrap();
        let area = StagingArea::stage(&images).unwrap();

        assert_eq!(area.images().len(), 5);
        assert_eq!(area.remaining(), 5);
        for (i, staged) in area.images().iter().enumerate() {
            assert!(staged.path.ends_with(format!("page-{:05}.png", i)));
            assert_eq!((staged.width, staged.height), (20, 30));
            let decoded = image::open(&staged.path).unwrap();
            assert_eq!((decoded.width(), decoded.height()), (20, 30));
        }
    }

    #[test]
    fn release_removes_everything() {
        let images = generate(3, 8, 8, Fill::default()).unwrap();
        let mut area = StagingArea::stage(&images).unwrap();
        let dir = area.path().to_path_buf();
        let paths: Vec<_> = area.images().iter().map(|s| s.path.clone()).collect();

        assert_eq!(area.release(), 0);
        assert!(area.is_released());
        assert_eq!(area.remaining(), 0);
        assert!(!dir.exists());
        assert!(paths.iter().all(|p| !p.exists()));
    }

    #[test]
    fn release_tolerates_missing_files_and_repeats() {
        let images = generate(3, 8, 8, Fill::default()).unwrap();
        let mut area = StagingArea::stage(&images).unwrap();
        fs::remove_file(&area.images()[1].path).unwrap();

        assert_eq!(area.release(), 1);
        assert_eq!(area.release(), 0);
    }

    #[test]
    fn drop_releases() {
        let images = generate(2, 8, 8, Fill::default()).unwrap();
        let area = StagingArea::stage(&images).unwrap();
        let dir = area.path().to_path_buf();
        assert!(dir.exists());
        drop(area);
        assert!(!dir.exists());
    }

    #[test]
    fn stage_in_uses_given_root() {
        let root = TempDir::new("pdfbench-root").unwrap();
        let images = generate(1, 8, 8, Fill::default()).unwrap();
        let area = StagingArea::stage_in(root.path(), &images).unwrap();
        assert!(area.path().starts_with(root.path()));
    }

    #[test]
    fn failed_write_names_the_index_and_leaves_nothing() {
        let dir = TempDir::new("pdfbench-staging").unwrap();
        let root = dir.path().to_path_buf();
        // A directory where the second page belongs makes its write fail.
        fs::create_dir(root.join("page-00001.png")).unwrap();
        let images = generate(3, 8, 8, Fill::default()).unwrap();

        match StagingArea::stage_into(dir, &images) {
            Err(Error::Io { index, path, .. }) => {
                assert_eq!(index, Some(1));
                assert!(path.ends_with("page-00001.png"));
            }
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("staging should have failed"),
        }

        assert!(!root.join("page-00000.png").exists());
        assert!(!root.join("page-00002.png").exists());
        assert!(!root.exists());
    }

    #[test]
    fn stage_in_missing_root_fails_without_leftovers() {
        let root = TempDir::new("pdfbench-root").unwrap();
        let missing = root.path().join("does-not-exist");
        let images = generate(1, 8, 8, Fill::default()).unwrap();
        assert!(matches!(
            StagingArea::stage_in(&missing, &images),
            Err(Error::Io { index: None, .. })
        ));
        assert!(!missing.exists());
    }
}
