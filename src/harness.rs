//! The benchmark run.
//!
//! A run generates images, stages them, then visits each backend in turn:
//! `create` is measured, then `rotate` on what `create` produced. A backend
//! that fails is recorded and skipped; the others still run. Only invalid
//! configuration, generation failure or staging I/O abort the run.
//!
//! Everything happens on the calling thread, one operation at a time, so
//! the timings and memory samples are not disturbed by concurrent work.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize, Serializer};

use crate::backend::{Backend, Document, Operation};
use crate::config::BenchConfig;
use crate::measure::{measure, to_mb, MemoryProbe, Timed};
use crate::source;
use crate::staging::{StagedImage, StagingArea};
use crate::{Error, Result};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Nothing has happened yet.
    Init,
    /// Images exist in memory.
    Generated,
    /// Images are on disk and ready for the backends.
    Staged,
    /// `create` is running for a backend.
    Creating(Backend),
    /// `create` succeeded for a backend.
    Created(Backend),
    /// `rotate` is running for a backend.
    Rotating(Backend),
    /// `rotate` succeeded for a backend.
    Rotated(Backend),
    /// Staged images are gone.
    CleanedUp,
    /// The report is ready.
    Done,
}

/// One successful, timed backend operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// The backend that ran.
    pub backend: Backend,
    /// What it ran.
    pub operation: Operation,
    /// Wall-clock duration of the operation.
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs", deserialize_with = "from_secs")]
    pub elapsed: Duration,
    /// Resident memory sampled right after the operation.
    pub memory_bytes: Option<u64>,
    /// Pages in the document the operation produced.
    pub page_count: usize,
}

/// One failed backend operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    /// The backend that failed.
    pub backend: Backend,
    /// What failed.
    pub operation: Operation,
    /// Time until the failure surfaced.
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs", deserialize_with = "from_secs")]
    pub elapsed: Duration,
    /// Resident memory sampled right after the failure surfaced.
    pub memory_bytes: Option<u64>,
    /// Why it failed.
    pub cause: String,
}

/// Everything a run produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// Number of pages per document.
    pub pages: usize,
    /// Resident memory before any work.
    pub baseline_memory_bytes: Option<u64>,
    /// Resident memory once the images were staged.
    pub staged_memory_bytes: Option<u64>,
    /// Successful operations, in the order they ran.
    pub measurements: Vec<Measurement>,
    /// Failed operations, in the order they ran.
    pub failures: Vec<Failure>,
    /// Documents written by the backends that are still on disk.
    pub outputs: Vec<PathBuf>,
}

impl RunReport {
    /// The measurement for one backend operation, if it succeeded.
    pub fn measurement(&self, backend: Backend, operation: Operation) -> Option<&Measurement> {
        self.measurements
            .iter()
            .find(|m| m.backend == backend && m.operation == operation)
    }

    /// The failure of one backend operation, if it failed.
    pub fn failure(&self, backend: Backend, operation: Operation) -> Option<&Failure> {
        self.failures
            .iter()
            .find(|f| f.backend == backend && f.operation == operation)
    }
}

fn as_secs<S: Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

fn from_secs<'de, D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Duration, D::Error> {
    let secs = f64::deserialize(d)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

/// Drives one benchmark run.
pub struct Harness<P> {
    config: BenchConfig,
    probe: P,
    stage: Stage,
    history: Vec<Stage>,
}

impl<P: MemoryProbe> Harness<P> {
    /// Create a harness with the given configuration and memory probe.
    pub fn new(config: BenchConfig, probe: P) -> Self {
        Self {
            config,
            probe,
            stage: Stage::Init,
            history: vec![Stage::Init],
        }
    }

    /// The stage the run is in.
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Every stage the run has passed through, in order.
    pub fn history(&self) -> &[Stage] {
        &self.history
    }

    /// The memory probe, e.g. to inspect a fake after a run.
    pub fn probe(&self) -> &P {
        &self.probe
    }

    /// Execute the run and return its report.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a bad configuration (before any
    /// file is touched) and [`Error::Io`] if the output directory cannot be
    /// created or the images cannot be staged. Backend failures are never
    /// returned here; they are part of the report.
    pub fn run(&mut self) -> Result<RunReport> {
        self.config.validate()?;

        let mut report = RunReport {
            pages: self.config.pages,
            baseline_memory_bytes: self.probe.sample(),
            ..Default::default()
        };
        self.memory_line(report.baseline_memory_bytes);

        self.say(format!("Generating {} images", self.config.pages));
        let images = source::generate(
            self.config.pages,
            self.config.width,
            self.config.height,
            self.config.fill,
        )?;
        self.enter(Stage::Generated);

        fs::create_dir_all(&self.config.output_dir)
            .map_err(|e| Error::io(&self.config.output_dir, e))?;

        self.say("Staging images".to_string());
        let mut staging = StagingArea::stage(&images)?;
        drop(images);
        self.enter(Stage::Staged);
        report.staged_memory_bytes = self.probe.sample();
        self.memory_line(report.staged_memory_bytes);

        let backends = self.config.backends.clone();
        for (i, backend) in backends.into_iter().enumerate() {
            if i > 0 {
                self.probe.reclaim();
            }
            self.run_backend(backend, staging.images(), &mut report);
        }

        let missing = staging.release();
        if missing > 0 {
            log::warn!("{} staged images were already gone at cleanup", missing);
        }
        self.enter(Stage::CleanedUp);
        self.say("Cleaned up staged images".to_string());

        if self.config.clean_outputs {
            for path in report.outputs.drain(..) {
                if let Err(e) = fs::remove_file(&path) {
                    log::warn!("unable to remove {}: {}", path.display(), e);
                }
            }
        }

        self.enter(Stage::Done);
        Ok(report)
    }

    fn run_backend(&mut self, backend: Backend, images: &[StagedImage], report: &mut RunReport) {
        let document = self.config.document_path(backend);
        let rotated_path = self.config.rotated_path(backend);
        let page_size = self.config.page_size;
        let rotation = self.config.rotation;

        self.say(format!("[{}] Generating a {}-page PDF", backend, images.len()));
        self.enter(Stage::Creating(backend));
        let created = measure(|| {
            contain_panic(backend, Operation::Create, || {
                backend.create(images, page_size, &document)
            })
        });
        let Some(created) = self.record(backend, Operation::Create, created, report) else {
            return;
        };
        self.enter(Stage::Created(backend));

        self.say(format!("[{}] Rotating each page of PDF", backend));
        self.enter(Stage::Rotating(backend));
        let rotated = measure(|| {
            contain_panic(backend, Operation::Rotate, || {
                backend.rotate(&created.path, rotation, &rotated_path)
            })
        });
        if self.record(backend, Operation::Rotate, rotated, report).is_some() {
            self.enter(Stage::Rotated(backend));
        }
    }

    fn record(
        &mut self,
        backend: Backend,
        operation: Operation,
        timed: Timed<Result<Document>>,
        report: &mut RunReport,
    ) -> Option<Document> {
        let Timed { value, elapsed } = timed;

        match value {
            Ok(document) => {
                let memory_bytes = self.probe.sample();
                self.say(format!("Time taken: {:.3}", elapsed.as_secs_f64()));
                self.memory_line(memory_bytes);

                report.outputs.push(document.path.clone());
                report.measurements.push(Measurement {
                    backend,
                    operation,
                    elapsed,
                    memory_bytes,
                    page_count: document.page_count,
                });
                Some(document)
            }
            Err(err) => {
                let memory_bytes = self.probe.sample();
                log::warn!("{}", err);
                self.say(format!("[{}] {} failed: {}", backend, operation, err));

                let cause = match err {
                    Error::Backend { cause, .. } => cause,
                    other => other.to_string(),
                };
                remove_partial(&self.output_path(backend, operation));
                report.failures.push(Failure {
                    backend,
                    operation,
                    elapsed,
                    memory_bytes,
                    cause,
                });
                None
            }
        }
    }

    fn output_path(&self, backend: Backend, operation: Operation) -> PathBuf {
        match operation {
            Operation::Create => self.config.document_path(backend),
            Operation::Rotate => self.config.rotated_path(backend),
        }
    }

    fn enter(&mut self, stage: Stage) {
        log::debug!("{:?} -> {:?}", self.stage, stage);
        self.stage = stage;
        self.history.push(stage);
    }

    fn say(&self, line: String) {
        if !self.config.quiet {
            println!("{}", line);
        }
    }

    fn memory_line(&self, bytes: Option<u64>) {
        match bytes {
            Some(bytes) => self.say(format!("Memory usage: {:.2} MB", to_mb(bytes))),
            None => self.say("Memory usage: unavailable".to_string()),
        }
    }
}

// A panic inside a backend library fails that operation only.
fn contain_panic<T>(
    backend: Backend,
    operation: Operation,
    op: impl FnOnce() -> Result<T>,
) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(op)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown cause".to_string());
        Err(Error::backend(backend, operation, format!("panicked: {}", message)))
    })
}

// A failed operation may leave a truncated file behind.
fn remove_partial(path: &Path) {
    if path.is_file() {
        if let Err(e) = fs::remove_file(path) {
            log::warn!("unable to remove partial output {}: {}", path.display(), e);
        }
    }
}
