//! Exhume - deleted-file recovery tool
//!
//! Front-end over the scanning and recovery engine: opens the device,
//! detects the filesystem, runs the scan stages, and writes selected
//! results to a destination folder.

use anyhow::{Context, Result};
use clap::Parser;
use exhume::application::dto::ScanOptions;
use exhume::application::{RecoverFilesUseCase, ScanVolumeUseCase};
use exhume::domain::entities::{format_file_size, DeletedEntry, ScanConfig};
use exhume::domain::repositories::BlockDevice;
use exhume::domain::services::SignatureCatalog;
use exhume::infrastructure::block_device::FileBlockDevice;
use exhume::infrastructure::file_systems::detect_filesystem;
use exhume::presentation::cli::{Cli, Commands, ProgressReporter};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Scan {
            device,
            folder_filter,
            filename_filter,
            no_mft,
            no_usn,
            no_carving,
            sector_size,
            json,
        } => run_scan(
            &device,
            &folder_filter,
            &filename_filter,
            !no_mft,
            !no_usn,
            !no_carving,
            sector_size,
            json,
        ),

        Commands::Recover {
            device,
            output,
            source_drive,
            filename_filter,
            no_carving,
            sector_size,
        } => run_recover(
            &device,
            &output,
            source_drive,
            &filename_filter,
            !no_carving,
            sector_size,
        ),

        Commands::ListSignatures => {
            list_signatures();
            Ok(())
        }

        Commands::Info { device } => show_device_info(&device),
    }
}

fn open_device(path: &str, sector_size: u64) -> Result<FileBlockDevice> {
    FileBlockDevice::open_with_sector_size(path, sector_size)
        .with_context(|| format!("Failed to open {} (raw devices need elevated privileges)", path))
}

#[allow(clippy::too_many_arguments)]
fn run_scan(
    device_path: &str,
    folder_filter: &str,
    filename_filter: &str,
    mft: bool,
    usn: bool,
    carving: bool,
    sector_size: u64,
    json: Option<PathBuf>,
) -> Result<()> {
    let mut device = open_device(device_path, sector_size)?;
    let fs_type = detect_filesystem(&device);

    println!("Scanning: {}", device_path);
    println!(
        "Size: {} ({} bytes), filesystem: {}\n",
        format_file_size(device.total_bytes()),
        device.total_bytes(),
        fs_type
    );

    let options = ScanOptions::new()
        .with_filters(folder_filter, filename_filter)
        .with_stages(mft, usn, carving)
        .with_config(ScanConfig::load());

    let results = Mutex::new(Vec::<DeletedEntry>::new());
    let reporter = ProgressReporter::new("Scanning for deleted files...");
    let cancel = AtomicBool::new(false);

    let found = {
        let mut on_found = |entry: DeletedEntry| {
            results.lock().push(entry);
        };
        let mut on_progress = |msg: &str, fraction: f32| reporter.update(msg, fraction);
        ScanVolumeUseCase::new().execute(
            &mut device,
            fs_type,
            &options,
            &mut on_found,
            &mut on_progress,
            &cancel,
        )
    };
    reporter.finish("Scan finished");

    let results = results.into_inner();
    println!("\nFound {} deleted file(s):\n", results.len());
    for entry in &results {
        println!(
            "  {:<48} {:>12}  {}  {}",
            entry.path,
            entry.size_formatted,
            if entry.is_recoverable { "recoverable" } else { "metadata" },
            entry.filesystem_type,
        );
    }

    if let Some(json_path) = json {
        std::fs::write(&json_path, serde_json::to_string_pretty(&results)?)?;
        println!("\nResults written to {}", json_path.display());
    }

    if !found {
        println!("\nNo recoverable entries were produced.");
    }
    Ok(())
}

fn run_recover(
    device_path: &str,
    output: &Path,
    source_drive: Option<char>,
    filename_filter: &str,
    carving: bool,
    sector_size: u64,
) -> Result<()> {
    let mut device = open_device(device_path, sector_size)?;
    let fs_type = detect_filesystem(&device);

    println!("Device: {}", device_path);
    println!("Output: {}\n", output.display());
    println!("Phase 1: scanning for recoverable files...\n");

    let options = ScanOptions::new()
        .with_filters("", filename_filter)
        .with_stages(true, true, carving)
        .with_config(ScanConfig::load());

    let results = Mutex::new(Vec::<DeletedEntry>::new());
    let reporter = ProgressReporter::new("Scanning...");
    let cancel = AtomicBool::new(false);

    {
        let mut on_found = |entry: DeletedEntry| {
            if entry.is_recoverable {
                results.lock().push(entry);
            }
        };
        let mut on_progress = |msg: &str, fraction: f32| reporter.update(msg, fraction);
        ScanVolumeUseCase::new().execute(
            &mut device,
            fs_type,
            &options,
            &mut on_found,
            &mut on_progress,
            &cancel,
        );
    }
    let results = results.into_inner();
    reporter.finish(&format!("Found {} recoverable files", results.len()));

    if results.is_empty() {
        println!("\nNothing to recover.");
        return Ok(());
    }

    println!("\nPhase 2: recovering {} files...\n", results.len());
    let reporter = ProgressReporter::new("Recovering...");
    let ok = {
        let mut on_progress = |msg: &str, fraction: f32| reporter.update(msg, fraction);
        RecoverFilesUseCase::new().execute(
            &device,
            &results,
            source_drive,
            output,
            &mut on_progress,
        )
    };
    reporter.finish("Recovery finished");

    if !ok {
        anyhow::bail!("no files could be recovered");
    }
    println!("\nFiles saved to {}", output.display());
    Ok(())
}

fn list_signatures() {
    println!("\nSignature catalog:\n");
    let catalog = SignatureCatalog::all();
    for sig in catalog.signatures() {
        let magic: Vec<String> = sig.magic.iter().map(|b| format!("{:02X}", b)).collect();
        println!(
            "  .{:<5} {:<34} magic {} at offset {}",
            sig.extension,
            sig.description,
            magic.join(" "),
            sig.magic_offset,
        );
    }
    println!();
}

fn show_device_info(device_path: &str) -> Result<()> {
    let device = open_device(device_path, 512)?;
    let fs_type = detect_filesystem(&device);

    println!("\nDevice information\n");
    println!("  Path:        {}", device_path);
    println!(
        "  Size:        {} ({} bytes)",
        format_file_size(device.total_bytes()),
        device.total_bytes()
    );
    println!("  Sector size: {} bytes", device.sector_size());
    println!("  Filesystem:  {}", fs_type);
    println!();
    Ok(())
}
