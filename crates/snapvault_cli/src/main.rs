//! SnapVault CLI
//!
//! Command-line tools for SnapVault archives.
//!
//! # Commands
//!
//! - `backup` - Write an archive of a store snapshot
//! - `inspect` - Validate an archive and display its manifest
//! - `plan` - Show the order an archive would be restored in
//! - `restore` - Restore an archive into a store snapshot

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// SnapVault command-line backup tools.
#[derive(Parser)]
#[command(name = "snapvault")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the catalog schema (JSON)
    #[arg(global = true, long)]
    schema: Option<PathBuf>,

    /// Path to the store snapshot (JSON)
    #[arg(global = true, long)]
    store: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an archive of the store
    Backup {
        /// Directory to write the archive into
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// User recorded as the archive's creator
        #[arg(short, long, default_value = "admin")]
        user: String,

        /// IANA timezone for the timestamp and file name
        #[arg(short, long)]
        timezone: Option<String>,
    },

    /// Validate an archive and display its manifest
    Inspect {
        /// Archive to inspect
        archive: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the order an archive's entity types would load in
    Plan {
        /// Archive to plan
        archive: PathBuf,
    },

    /// Restore an archive into the store
    Restore {
        /// Archive to restore
        archive: PathBuf,

        /// Delete existing records of the archived entity types first
        #[arg(short, long)]
        clear: bool,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Backup {
            output_dir,
            user,
            timezone,
        } => {
            let schema = cli.schema.ok_or("--schema is required for backup")?;
            let store = cli.store.ok_or("--store is required for backup")?;
            commands::backup::run(&schema, &store, &output_dir, &user, timezone)?;
        }
        Commands::Inspect { archive, format } => {
            commands::inspect::run(&archive, &format)?;
        }
        Commands::Plan { archive } => {
            let schema = cli.schema.ok_or("--schema is required for plan")?;
            commands::plan::run(&schema, &archive)?;
        }
        Commands::Restore { archive, clear } => {
            let schema = cli.schema.ok_or("--schema is required for restore")?;
            let store = cli.store.ok_or("--store is required for restore")?;
            commands::restore::run(&schema, &store, &archive, clear)?;
        }
        Commands::Version => {
            println!("SnapVault CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("SnapVault Core v{}", snapvault_core::VERSION);
            println!("Archive format v{}", snapvault_core::FORMAT_VERSION);
        }
    }

    Ok(())
}
