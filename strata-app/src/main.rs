//! Strata
//!
//! Command line front-end for the out-of-core point-cloud streaming engine.
//!
//! Subcommands:
//! - `info`: header, index layout and warnings of a point file
//! - `sample`: uniform preview sample and its bounds
//! - `convert`: rewrite a file in another data encoding
//! - `simulate`: run a streaming session against an orbiting camera

mod camera;
mod commands;
mod config;
mod errors;

use clap::{Parser, Subcommand, ValueEnum};
use config::{AppConfig, LoggingConfig};
use errors::AppError;
use std::path::PathBuf;
use std::time::Duration;
use strata_data::DataEncoding;

/// Strata - out-of-core point cloud streaming
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show header and index information
    Info {
        file: PathBuf,
        /// ASCII rows per indexed offset
        #[arg(long, default_value_t = 16)]
        ascii_stride: usize,
    },
    /// Load a uniform sample of points
    Sample {
        file: PathBuf,
        #[arg(short = 'n', long, default_value_t = 10_000)]
        count: usize,
        /// Print the first N sampled points
        #[arg(long, default_value_t = 0)]
        show: usize,
    },
    /// Rewrite a point file in another encoding
    Convert {
        input: PathBuf,
        output: PathBuf,
        #[arg(short, long, value_enum, default_value_t = Encoding::Binary)]
        encoding: Encoding,
    },
    /// Stream a file through an orbiting camera
    Simulate {
        #[arg(required_unless_present = "dump_config")]
        file: Option<PathBuf>,
        #[arg(short, long, default_value_t = 300)]
        frames: u64,
        /// Milliseconds to wait between ticks
        #[arg(long, default_value_t = 16)]
        frame_ms: u64,
        /// Radians the camera orbits per frame
        #[arg(long, default_value_t = 0.05)]
        orbit_step: f32,
        /// Override the preview sample size
        #[arg(long)]
        preview_points: Option<usize>,
        /// Override the point budget
        #[arg(long)]
        budget: Option<usize>,
        /// Print the effective configuration and exit
        #[arg(long)]
        dump_config: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Encoding {
    Ascii,
    Binary,
    #[value(name = "binary_compressed")]
    BinaryCompressed,
}

impl From<Encoding> for DataEncoding {
    fn from(encoding: Encoding) -> Self {
        match encoding {
            Encoding::Ascii => DataEncoding::Ascii,
            Encoding::Binary => DataEncoding::Binary,
            Encoding::BinaryCompressed => DataEncoding::BinaryCompressed,
        }
    }
}

fn init_logging(logging: &LoggingConfig) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level)),
        )
        .with_target(false)
        .init();
}

fn run(args: Args) -> Result<(), AppError> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    init_logging(&config.logging);

    match args.command {
        Command::Info { file, ascii_stride } => commands::info(&file, ascii_stride),
        Command::Sample { file, count, show } => commands::sample(&file, count, show),
        Command::Convert {
            input,
            output,
            encoding,
        } => commands::convert(&input, &output, encoding.into()),
        Command::Simulate {
            file,
            frames,
            frame_ms,
            orbit_step,
            preview_points,
            budget,
            dump_config,
        } => {
            if let Some(points) = preview_points {
                config.session.preview_points = points;
            }
            if let Some(budget) = budget {
                config.session.scheduler.point_budget = budget;
            }
            if dump_config {
                println!("{}", config.to_json()?);
                return Ok(());
            }
            let file = file.ok_or(AppError::MissingArgument("FILE"))?;
            commands::simulate(
                &file,
                &config,
                frames,
                Duration::from_millis(frame_ms),
                orbit_step,
            )
        }
    }
}

fn main() {
    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Application error: {}", e);
        std::process::exit(1);
    }
}
