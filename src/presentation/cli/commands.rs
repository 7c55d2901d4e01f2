//! clap command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "exhume")]
#[command(version)]
#[command(about = "Recover deleted files from NTFS, exFAT and FAT32 volumes", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan a device or image for deleted files
    Scan {
        /// Raw device or disk-image path
        #[arg(short, long)]
        device: String,

        /// Only report files whose virtual path contains this text
        #[arg(long, default_value = "")]
        folder_filter: String,

        /// Only report files whose name contains this text
        #[arg(long, default_value = "")]
        filename_filter: String,

        /// Skip the MFT walk stage (NTFS)
        #[arg(long)]
        no_mft: bool,

        /// Skip the USN journal stage (NTFS)
        #[arg(long)]
        no_usn: bool,

        /// Skip the signature-carving stage (NTFS)
        #[arg(long)]
        no_carving: bool,

        /// Logical sector size override
        #[arg(long, default_value = "512")]
        sector_size: u64,

        /// Write the result list as JSON to this path
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Scan, then recover everything recoverable into a folder
    Recover {
        /// Raw device or disk-image path
        #[arg(short, long)]
        device: String,

        /// Destination folder (must not be on the scanned volume)
        #[arg(short, long, default_value = "./recovered")]
        output: PathBuf,

        /// Source drive letter, for destination validation
        #[arg(long)]
        source_drive: Option<char>,

        /// Only recover files whose name contains this text
        #[arg(long, default_value = "")]
        filename_filter: String,

        /// Skip the signature-carving stage (NTFS)
        #[arg(long)]
        no_carving: bool,

        /// Logical sector size override
        #[arg(long, default_value = "512")]
        sector_size: u64,
    },

    /// List the signature catalog used by the carver
    ListSignatures,

    /// Show device geometry and the detected filesystem
    Info {
        /// Raw device or disk-image path
        #[arg(short, long)]
        device: String,
    },
}
