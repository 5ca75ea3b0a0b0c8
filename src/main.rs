//! Command-line entry point: one batch per invocation.

use clap::Parser;
use namestamp::{
    BatchConfig, MemoryStore, Record, RemoteStore, TracingProgress, records_from_csv,
    records_from_lines, records_from_xlsx, run_batch,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "namestamp")]
#[command(
    version,
    about = "Stamp recipient names onto a certificate template and upload one PDF per name"
)]
struct Args {
    /// Names table: .csv or .xlsx (first column) or a plain list, one name per line
    #[arg(long)]
    names: PathBuf,

    /// Template file: PDF, PNG or JPEG
    #[arg(long)]
    template: PathBuf,

    /// TOML batch configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Destination folder name (overrides the config)
    #[arg(long)]
    folder: Option<String>,

    /// Font file (overrides the config)
    #[arg(long)]
    font: Option<PathBuf>,

    /// File name prefix (overrides the config)
    #[arg(long)]
    prefix: Option<String>,

    /// The CSV or workbook has no header row
    #[arg(long)]
    no_header: bool,

    /// Keep artifacts in memory instead of uploading
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // stdout carries the JSON summary; logs go to stderr.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = match &args.config {
        Some(path) => BatchConfig::load(path)?,
        None => BatchConfig::default(),
    };
    if let Some(folder) = args.folder {
        config.folder_name = folder;
    }
    if let Some(font) = args.font {
        config.font_path = font;
    }
    if let Some(prefix) = args.prefix {
        config.label_prefix = prefix;
    }
    config.validate()?;

    let records = read_records(&args.names, !args.no_header)?;
    tracing::info!(records = records.len(), dry_run = args.dry_run, "starting batch");

    let memory;
    #[cfg(feature = "drive")]
    let drive;
    let store: &dyn RemoteStore = if args.dry_run {
        memory = MemoryStore::new();
        &memory
    } else {
        #[cfg(feature = "drive")]
        {
            drive = namestamp::DriveStore::from_config(&config.drive)?;
            &drive
        }
        #[cfg(not(feature = "drive"))]
        {
            return Err("built without the drive feature; use --dry-run".into());
        }
    };

    let mut progress = TracingProgress;
    let result = run_batch(&config, store, &args.template, &records, &mut progress)?;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.is_complete_success() {
        std::process::exit(2);
    }
    Ok(())
}

fn read_records(path: &Path, has_header: bool) -> Result<Vec<Record>, Box<dyn std::error::Error>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let unreadable = |err: std::io::Error| format!("names file {} unreadable: {err}", path.display());
    let records = match extension.as_str() {
        "xlsx" => records_from_xlsx(&std::fs::read(path).map_err(unreadable)?, has_header)?,
        "csv" => records_from_csv(&std::fs::read_to_string(path).map_err(unreadable)?, has_header),
        _ => records_from_lines(&std::fs::read_to_string(path).map_err(unreadable)?),
    };
    Ok(records)
}
