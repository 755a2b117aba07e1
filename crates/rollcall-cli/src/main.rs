mod capture;
mod config;
mod engine;
mod preview;
mod table;
mod track;
mod train;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use config::Config;
use preview::ObserveMode;
use rollcall_core::attendance::{self, AttendanceError};
use rollcall_core::{LbphParams, Roster};
use rollcall_hw::Camera;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face recognition attendance system")]
struct Cli {
    /// Data root (default: $ROLLCALL_DATA_DIR or the current directory)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directories
    Init,
    /// Register a student by capturing face samples
    Capture {
        /// Student ID (whole number)
        #[arg(long)]
        id: String,
        /// Student name (letters and spaces)
        #[arg(long)]
        name: String,
        /// Run without the preview window
        #[arg(long)]
        headless: bool,
    },
    /// Train the recognizer on all captured samples
    Train,
    /// Take attendance from the camera
    Track {
        /// Run without the preview window
        #[arg(long)]
        headless: bool,
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },
    /// Print the attendance table for a day
    Show {
        /// Day as YYYYMMDD (default: today)
        #[arg(long, value_parser = parse_day)]
        date: Option<NaiveDate>,
    },
    /// List registered students
    Roster,
    /// List V4L2 capture devices
    Devices,
    /// Print contact information
    Contact,
}

fn parse_day(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y%m%d").map_err(|e| format!("expected YYYYMMDD: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.data_dir)?;
    let layout = config.layout();
    layout
        .ensure()
        .with_context(|| format!("cannot prepare data directory {}", layout.root().display()))?;
    tracing::debug!(?config, "configuration loaded");

    match cli.command {
        Commands::Init => {
            for dir in layout.directories() {
                println!("{}", dir.display());
            }
            println!("Data directories ready");
        }
        Commands::Capture { id, name, headless } => {
            let mode = ObserveMode::new(config.preview && !headless, None);
            capture::run(&config, &id, &name, mode).await?;
        }
        Commands::Train => {
            let summary = train::train(&layout, LbphParams::default())?;
            println!(
                "Trained on {} images of {} students ({} skipped)",
                summary.samples, summary.students, summary.skipped
            );
            println!("Model saved to {}", layout.model_path().display());
        }
        Commands::Track { headless, duration } => {
            let mode = ObserveMode::new(
                config.preview && !headless,
                duration.map(Duration::from_secs),
            );
            track::run(&config, mode).await?;
        }
        Commands::Show { date } => {
            let day = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            match attendance::read_day(&layout.attendance_path(day)) {
                Ok(records) => println!("{}", table::attendance(&records)),
                Err(AttendanceError::NoRecords(_)) => {
                    println!("No attendance records found for {}", day.format("%Y-%m-%d"));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Roster => {
            let roster = Roster::load(&layout.roster_path())?;
            println!("{}", table::roster(roster.entries()));
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Contact => {
            println!("rollcall {}", env!("CARGO_PKG_VERSION"));
            println!("Please contact us on: {}", config.contact);
        }
    }

    Ok(())
}
