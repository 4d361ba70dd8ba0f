//! Inspect command implementation.

use serde::Serialize;
use snapvault_core::{ArchiveSource, ArchiveValidator, Manifest};
use std::path::Path;

/// Archive inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Archive path.
    pub path: String,
    /// Archive size in bytes.
    pub size: u64,
    /// The validated manifest.
    pub manifest: Manifest,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut source = ArchiveSource::open(path)?;
    let size = source.size()?;
    let manifest = ArchiveValidator::default().validate(&mut source)?;

    let result = InspectResult {
        path: path.display().to_string(),
        size,
        manifest,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    let manifest = &result.manifest;
    let or_unknown = |value: Option<String>| value.unwrap_or_else(|| "unknown".to_string());

    println!("Backup Information");
    println!("==================");
    println!("  Path: {}", result.path);
    println!("  File size: {} bytes", result.size);
    println!("  Format version: {}", manifest.version);
    println!("  Created: {}", manifest.timestamp);
    println!("  Database engine: {}", manifest.database_engine);
    println!("  App version: {}", or_unknown(manifest.app_version.clone()));
    println!(
        "  Entity types: {}",
        or_unknown(manifest.entity_types_count.map(|n| n.to_string()))
    );
    println!(
        "  Records: {}",
        or_unknown(manifest.total_records.map(|n| n.to_string()))
    );
    println!("  Includes media: {}", manifest.includes_media);
    println!("  Created by: {}", or_unknown(manifest.created_by.clone()));
    println!("  Timezone: {}", or_unknown(manifest.timezone.clone()));
}
