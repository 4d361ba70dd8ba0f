//! Backup command.

use super::open_service;
use snapvault_core::Requester;
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Writes an archive of the store snapshot into `output_dir`.
pub fn run(
    schema: &Path,
    store: &Path,
    output_dir: &Path,
    user: &str,
    timezone: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if !store.exists() {
        return Err(format!("No store snapshot found at {store:?}").into());
    }
    info!("Creating backup of {:?}", store);

    let service = open_service(schema, Some(store))?;
    let mut requester = Requester::new(user);
    if let Some(tz) = timezone {
        requester = requester.with_timezone(tz);
    }
    let archive = service.create_backup(&requester)?;

    fs::create_dir_all(output_dir)?;
    let output_path = output_dir.join(&archive.filename);
    let mut file = fs::File::create(&output_path)?;
    file.write_all(&archive.data)?;
    file.sync_all()?;

    println!("✓ Backup created successfully");
    println!("  Path: {:?}", output_path);
    println!("  Size: {} bytes", archive.data.len());
    println!(
        "  Entity types: {}",
        archive.manifest.entity_types_count.unwrap_or_default()
    );
    println!(
        "  Records: {}",
        archive.manifest.total_records.unwrap_or_default()
    );
    println!("  Timestamp: {}", archive.manifest.timestamp);
    for failure in &archive.diagnostics {
        println!("  ✗ Omitted {}: {}", failure.entity_type, failure.message);
    }

    Ok(())
}
