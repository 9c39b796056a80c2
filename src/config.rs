//! Run configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::backend::Backend;
use crate::{Error, Result};

/// Page count used when none is given.
pub const DEFAULT_PAGES: usize = 50;

/// Size of a document page in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    /// Width in points.
    pub width: f32,
    /// Height in points.
    pub height: f32,
}

impl PageSize {
    /// US Letter, 612 × 792 pt.
    pub const LETTER: PageSize = PageSize {
        width: 612.0,
        height: 792.0,
    };

    /// The same page turned a quarter.
    pub fn swapped(self) -> PageSize {
        PageSize {
            width: self.height,
            height: self.width,
        }
    }
}

impl Default for PageSize {
    fn default() -> Self {
        Self::LETTER
    }
}

/// Direction of the quarter turn applied by `rotate`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rotation {
    /// 90° to the right.
    #[default]
    Clockwise,
    /// 90° to the left.
    CounterClockwise,
}

impl Rotation {
    /// The angle in degrees that gets added to a page's `/Rotate` entry.
    pub fn degrees(&self) -> i64 {
        match self {
            Rotation::Clockwise => 90,
            Rotation::CounterClockwise => 270,
        }
    }

    /// Apply this rotation to an existing page angle, normalised to `0..360`.
    pub fn apply(&self, angle: i64) -> i64 {
        (angle + self.degrees()).rem_euclid(360)
    }
}

/// How generated images are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fill {
    /// Uniform random RGB noise. A seed makes the content reproducible.
    Noise {
        /// Seed for the generator; a fresh one is drawn when absent.
        seed: Option<u64>,
    },
    /// A single opaque colour.
    Solid([u8; 3]),
}

impl Default for Fill {
    fn default() -> Self {
        Fill::Noise { seed: None }
    }
}

/// Configuration for one benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchConfig {
    /// Number of pages (and generated images).
    pub pages: usize,
    /// Width of each generated image in pixels.
    pub width: u32,
    /// Height of each generated image in pixels.
    pub height: u32,
    /// Page size every backend lays images out on.
    pub page_size: PageSize,
    /// Pixel content of the generated images.
    pub fill: Fill,
    /// Direction of the rotate operation.
    pub rotation: Rotation,
    /// Directory the per-backend documents are written to.
    pub output_dir: PathBuf,
    /// Backends to run, in order.
    pub backends: Vec<Backend>,
    /// Remove the per-backend documents once the run is over.
    pub clean_outputs: bool,
    /// Suppress the progress stream on stdout.
    pub quiet: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            pages: DEFAULT_PAGES,
            width: 612,
            height: 792,
            page_size: PageSize::LETTER,
            fill: Fill::default(),
            rotation: Rotation::default(),
            output_dir: PathBuf::from("."),
            backends: Backend::ALL.to_vec(),
            clean_outputs: false,
            quiet: false,
        }
    }
}

impl BenchConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if any value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.pages == 0 {
            return Err(Error::InvalidInput("page count must be > 0".to_string()));
        }

        if self.width == 0 || self.height == 0 {
            return Err(Error::InvalidInput(format!(
                "image dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }

        // NaN fails both comparisons, so test for the positive case.
        if !(self.page_size.width > 0.0 && self.page_size.height > 0.0) {
            return Err(Error::InvalidInput(format!(
                "page size must be positive, got {}x{}",
                self.page_size.width, self.page_size.height
            )));
        }

        if self.backends.is_empty() {
            return Err(Error::InvalidInput("no backends selected".to_string()));
        }

        Ok(())
    }

    /// Where `backend` writes the document produced by `create`.
    pub fn document_path(&self, backend: Backend) -> PathBuf {
        self.output_dir.join(format!("{}.pdf", backend.name()))
    }

    /// Where `backend` writes the document produced by `rotate`.
    pub fn rotated_path(&self, backend: Backend) -> PathBuf {
        self.output_dir.join(format!("{}-rotated.pdf", backend.name()))
    }
}

/// Parse a page count given on the command line or in the environment.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] for anything but a positive integer.
pub fn parse_page_count(arg: &str) -> Result<usize> {
    let pages: i64 = arg
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("page count must be a number, got '{}'", arg)))?;

    if pages <= 0 {
        return Err(Error::InvalidInput(format!(
            "page count must be positive, got {}",
            pages
        )));
    }

    usize::try_from(pages).map_err(|_| Error::InvalidInput(format!("page count {} is too large", pages)))
}
