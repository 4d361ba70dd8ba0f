//! Restore command.

use super::open_service;
use snapvault_core::{ArchiveSource, CoreError, LoadOutcome, RestoreResult};
use std::path::Path;
use tracing::info;

/// Restores an archive into the store snapshot, saving it on success.
pub fn run(
    schema: &Path,
    store: &Path,
    archive: &Path,
    clear: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Restoring {:?} into {:?}", archive, store);

    let service = open_service(schema, Some(store))?;
    let mut source = ArchiveSource::open(archive)?;

    match service.restore_from_backup(&mut source, clear) {
        Ok(result) => {
            service.store().save_snapshot(store)?;
            println!("✓ Restore completed");
            print_result(&result);
            Ok(())
        }
        Err(CoreError::RestoreAborted { reason, result }) => {
            println!("✗ Restore aborted; nothing was changed");
            print_result(&result);
            Err(reason.into())
        }
        Err(err) => Err(err.into()),
    }
}

fn print_result(result: &RestoreResult) {
    println!("  Entity types restored: {}", result.entity_types_restored);
    println!("  Records restored: {}", result.records_restored);
    for report in &result.reports {
        match &report.outcome {
            LoadOutcome::Restored(count) => println!("    {} ({count})", report.entity_type),
            LoadOutcome::Failed(_) => println!("    {} (failed)", report.entity_type),
        }
    }
    for entity_type in &result.skipped {
        println!("  Skipped unknown: {entity_type}");
    }
    for error in &result.errors {
        println!("  ✗ {error}");
    }
}
