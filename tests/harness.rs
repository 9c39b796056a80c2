use std::fs;
use std::path::Path;

use pdfbench::inspect;
use pdfbench::source::generate;
use pdfbench::{
    Backend, BenchConfig, Error, Fill, Harness, MemoryProbe, Operation, PageSize, Rotation,
    Stage, StagingArea,
};
use tempdir::TempDir;

struct FixedMemory(u64);

impl MemoryProbe for FixedMemory {
    fn sample(&mut self) -> Option<u64> {
        Some(self.0)
    }
}

fn small_config(dir: &Path, pages: usize) -> BenchConfig {
    BenchConfig {
        pages,
        width: 20,
        height: 26,
        page_size: PageSize {
            width: 40.0,
            height: 52.0,
        },
        output_dir: dir.to_path_buf(),
        quiet: true,
        ..Default::default()
    }
}

#[test]
fn single_solid_page_through_every_backend() {
    let dir = TempDir::new("pdfbench-it").unwrap();
    let config = BenchConfig {
        fill: Fill::Solid([0, 128, 255]),
        ..small_config(dir.path(), 1)
    };
    let mut harness = Harness::new(config.clone(), FixedMemory(64 << 20));
    let report = harness.run().unwrap();

    assert_eq!(harness.stage(), Stage::Done);
    assert!(report.failures.is_empty(), "{:?}", report.failures);
    assert_eq!(report.measurements.len(), 8);

    for backend in Backend::ALL {
        for operation in [Operation::Create, Operation::Rotate] {
            let m = report.measurement(backend, operation).unwrap();
            assert_eq!(m.page_count, 1);
            assert_eq!(m.memory_bytes, Some(64 << 20));
        }
        assert_eq!(inspect::page_count(&config.document_path(backend)).unwrap(), 1);
        assert_eq!(inspect::page_count(&config.rotated_path(backend)).unwrap(), 1);
    }

    // Backends run in a fixed order, create before rotate.
    let order: Vec<_> = report
        .measurements
        .iter()
        .map(|m| (m.backend, m.operation))
        .collect();
    let expected: Vec<_> = Backend::ALL
        .iter()
        .flat_map(|b| [(*b, Operation::Create), (*b, Operation::Rotate)])
        .collect();
    assert_eq!(order, expected);
    assert_eq!(report.outputs.len(), 8);
}

#[test]
fn failing_backend_is_isolated() {
    let dir = TempDir::new("pdfbench-it").unwrap();
    let config = small_config(dir.path(), 2);
    // Block the lopdf document with a directory so its create fails.
    fs::create_dir(config.document_path(Backend::Lopdf)).unwrap();

    let mut harness = Harness::new(config.clone(), FixedMemory(1));
    let report = harness.run().unwrap();

    assert_eq!(report.failures.len(), 1);
    let failure = report.failure(Backend::Lopdf, Operation::Create).unwrap();
    assert!(!failure.cause.is_empty());
    assert!(report.measurement(Backend::Lopdf, Operation::Rotate).is_none());
    assert!(report.failure(Backend::Lopdf, Operation::Rotate).is_none());
    assert!(!config.rotated_path(Backend::Lopdf).exists());

    for backend in [Backend::PdfWriter, Backend::Printpdf, Backend::Raw] {
        assert_eq!(report.measurement(backend, Operation::Create).unwrap().page_count, 2);
        assert_eq!(report.measurement(backend, Operation::Rotate).unwrap().page_count, 2);
    }
    assert_eq!(harness.stage(), Stage::Done);
}

#[test]
fn rotation_direction_reaches_the_documents() {
    let dir = TempDir::new("pdfbench-it").unwrap();
    let config = BenchConfig {
        rotation: Rotation::CounterClockwise,
        ..small_config(dir.path(), 2)
    };
    Harness::new(config.clone(), FixedMemory(1)).run().unwrap();

    for backend in [Backend::Lopdf, Backend::Printpdf, Backend::Raw] {
        let pages = inspect::pages(&config.rotated_path(backend)).unwrap();
        assert!(pages.iter().all(|p| p.rotation == 270), "{}", backend);
    }

    // pdf-writer turns the pixels, so the page itself changes shape.
    let pages = inspect::pages(&config.rotated_path(Backend::PdfWriter)).unwrap();
    let turned = config.page_size.swapped();
    assert!(pages
        .iter()
        .all(|p| p.rotation == 0 && (p.width, p.height) == (turned.width, turned.height)));
}

#[test]
fn negative_or_zero_pages_are_rejected_before_io() {
    let dir = TempDir::new("pdfbench-it").unwrap();
    let out = dir.path().join("never-created");

    let mut harness = Harness::new(small_config(&out, 0), FixedMemory(1));
    assert!(matches!(harness.run(), Err(Error::InvalidInput(_))));
    assert!(!out.exists());

    assert!(matches!(
        pdfbench::config::parse_page_count("-5"),
        Err(Error::InvalidInput(_))
    ));
}

#[test]
fn fifty_letter_pages_stage_and_release() {
    let config = BenchConfig::default();
    let images = generate(50, config.width, config.height, Fill::default()).unwrap();
    assert_eq!(images.len(), 50);

    let mut area = StagingArea::stage(&images).unwrap();
    assert_eq!(area.images().len(), 50);
    assert_eq!(area.remaining(), 50);
    for image in area.images() {
        assert_eq!((image.width, image.height), (612, 792));
    }

    area.release();
    assert_eq!(area.remaining(), 0);
}

#[test]
fn rotating_four_times_restores_orientation() {
    let dir = TempDir::new("pdfbench-it").unwrap();
    let images = generate(3, 10, 10, Fill::Noise { seed: Some(11) }).unwrap();
    let area = StagingArea::stage(&images).unwrap();
    // Off the whole-point grid, so no backend may snap bounds to it.
    let size = PageSize {
        width: 30.5,
        height: 45.25,
    };

    for backend in Backend::ALL {
        let mut current = dir.path().join(format!("{}-0.pdf", backend));
        backend.create(area.images(), size, &current).unwrap();
        let original = inspect::pages(&current).unwrap();

        for i in 1..=4 {
            let next = dir.path().join(format!("{}-{}.pdf", backend, i));
            let doc = backend.rotate(&current, Rotation::Clockwise, &next).unwrap();
            assert_eq!(doc.page_count, 3);
            current = next;
        }

        assert_eq!(inspect::pages(&current).unwrap(), original, "{}", backend);
    }
}
