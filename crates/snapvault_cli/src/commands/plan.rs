//! Plan command.

use super::open_service;
use snapvault_core::ArchiveSource;
use std::path::Path;

/// Prints the order the archive's entity types would be restored in.
pub fn run(schema: &Path, archive: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let service = open_service(schema, None)?;
    let mut source = ArchiveSource::open(archive)?;
    let plan = service.load_plan(&mut source)?;

    println!("Load order");
    println!("==========");
    for (position, entity_type) in plan.order.order.iter().enumerate() {
        let records = plan
            .records
            .iter()
            .find(|(t, _)| t == entity_type)
            .map_or(0, |(_, n)| *n);
        let marker = if plan.order.cyclic.contains(entity_type) {
            " (circular)"
        } else {
            ""
        };
        println!("  {:>3}. {entity_type} [{records} records]{marker}", position + 1);
    }

    if !plan.skipped.is_empty() {
        println!();
        println!("Skipped (unknown entity types)");
        for entity_type in &plan.skipped {
            println!("  - {entity_type}");
        }
    }

    Ok(())
}
