use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use pdfbench::config::{parse_page_count, DEFAULT_PAGES};
use pdfbench::report::{write_json, write_summary};
use pdfbench::{Backend, BenchConfig, Fill, Harness, PageSize, ProcessMemory, Result, Rotation};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliRotation {
    /// 90° to the right
    Clockwise,
    /// 90° to the left
    CounterClockwise,
}

impl From<CliRotation> for Rotation {
    fn from(rotation: CliRotation) -> Self {
        match rotation {
            CliRotation::Clockwise => Rotation::Clockwise,
            CliRotation::CounterClockwise => Rotation::CounterClockwise,
        }
    }
}

#[derive(Parser)]
#[command(name = "pdfbench")]
#[command(about = "Compare PDF backends at assembling images into pages and rotating them", long_about = None)]
struct Cli {
    /// Number of pages to generate
    #[arg(env = "PDFBENCH_PAGES", value_parser = page_count)]
    pages: Option<usize>,

    /// Width of each generated image in pixels
    #[arg(long, default_value_t = 612)]
    width: u32,

    /// Height of each generated image in pixels
    #[arg(long, default_value_t = 792)]
    height: u32,

    /// Directory the documents are written to
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Backends to run (comma-separated), in order
    #[arg(short, long, value_delimiter = ',', value_parser = backend)]
    backends: Vec<Backend>,

    /// Direction of the quarter turn
    #[arg(short, long, value_enum, default_value = "clockwise")]
    rotation: CliRotation,

    /// Seed for the noise generator
    #[arg(long, conflicts_with = "solid")]
    seed: Option<u64>,

    /// Fill every image with one colour instead of noise, as R,G,B
    #[arg(long, value_delimiter = ',', num_args = 3)]
    solid: Option<Vec<u8>>,

    /// Remove the documents after the run
    #[arg(long)]
    clean: bool,

    /// Also write the report as JSON to this file
    #[arg(long)]
    json: Option<PathBuf>,

    /// Only print the final summary
    #[arg(short, long)]
    quiet: bool,
}

fn page_count(arg: &str) -> std::result::Result<usize, String> {
    parse_page_count(arg).map_err(|e| e.to_string())
}

fn backend(arg: &str) -> std::result::Result<Backend, String> {
    arg.parse::<Backend>().map_err(|e| e.to_string())
}

impl Cli {
    fn into_config(self) -> BenchConfig {
        let fill = match self.solid.as_deref() {
            Some(&[r, g, b]) => Fill::Solid([r, g, b]),
            _ => Fill::Noise { seed: self.seed },
        };

        BenchConfig {
            pages: self.pages.unwrap_or(DEFAULT_PAGES),
            width: self.width,
            height: self.height,
            page_size: PageSize::LETTER,
            fill,
            rotation: self.rotation.into(),
            output_dir: self.output,
            backends: if self.backends.is_empty() {
                Backend::ALL.to_vec()
            } else {
                self.backends
            },
            clean_outputs: self.clean,
            quiet: self.quiet,
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let json = cli.json.clone();
    let config = cli.into_config();

    let mut harness = Harness::new(config, ProcessMemory::new());
    let report = harness.run()?;

    let mut stdout = std::io::stdout().lock();
    write_summary(&report, &mut stdout).map_err(|e| pdfbench::Error::Report(e.to_string()))?;

    if let Some(path) = json {
        write_json(&report, &path)?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
