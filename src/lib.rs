/*!
# Motivation
The purpose of this crate is to compare different ways of assembling PDF documents from images
and of rotating their pages, under the exact same input. Choosing a PDF library by reading its
README is not enough: two libraries that produce equally valid documents can differ by an order
of magnitude in wall time and in memory once the page count grows. The only way to know is to
run them side by side on the same pages and measure.

`pdfbench` generates a set of synthetic page images, writes them to a temporary directory, and then
lets every backend build a document from those files and rotate every page of it by a quarter turn.
Each operation is timed and followed by a sample of the process' resident memory.

# Backends
This crate compares four different backends:
- lopdf (object model, used for both writing and rotating)
- pdf-writer (write-only; rotation re-renders every page with hayro and turns the pixels)
- printpdf (layer based writer; rotation goes through lopdf since printpdf cannot read)
- raw (a hand-serialized streaming writer that rotates by patching bytes in place)

All backends read the same staged PNG files and write their results next to each other,
as `<backend>.pdf` and `<backend>-rotated.pdf`, so they can be inspected after the run.

# Measuring
A run is a single shot: there are no warm-up rounds, no repetitions and no statistics. The
backends run one after another on the calling thread, because anything running concurrently
would show up in both the timings and the memory samples. A backend that fails is reported
as a failure and the remaining ones still run.

# Other notes
Only the structure of the produced documents is checked (page count, page orientation). Nothing
verifies that a rotated page looks right; the rotation direction is configurable, but whether
every viewer agrees on what "clockwise" means for a given document is out of scope.
*/

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;

pub mod backend;
pub mod config;
pub mod harness;
pub mod inspect;
pub mod measure;
mod raster;
mod raw;
pub mod report;
pub mod source;
pub mod staging;

pub use backend::{Backend, Document, Operation};
pub use config::{BenchConfig, Fill, PageSize, Rotation};
pub use error::{Error, Result};
pub use harness::{Failure, Harness, Measurement, RunReport, Stage};
pub use measure::{measure, MemoryProbe, ProcessMemory, Timed};
pub use staging::{StagedImage, StagingArea};
