//! Units command.

use crate::config::{BackendKind, Settings};
use crate::storage::RepositoryMetadata;
use crate::storage::disk::snapshot_path;

/// Run units command - list every unit in the disk store.
pub fn run_units(settings: &Settings) -> anyhow::Result<()> {
    if settings.repository.backend == BackendKind::Memory {
        println!("Memory backend: units do not outlive a session.");
        return Ok(());
    }

    let root = settings.storage_root();
    let Some(metadata) = RepositoryMetadata::load(&root)? else {
        println!("No repository at {}", root.display());
        return Ok(());
    };

    if metadata.version != settings.repository.persist_version {
        println!(
            "Repository at {} has version {} (configured {}); it will be discarded on next use.",
            root.display(),
            metadata.version,
            settings.repository.persist_version
        );
    }

    if metadata.units.is_empty() {
        println!("No units");
        return Ok(());
    }

    println!("{:>6}  {:<9}  UNIT", "ID", "PERSISTED");
    for (unit, descriptor) in metadata.units.iter() {
        let persisted = snapshot_path(&root, unit).exists();
        println!(
            "{:>6}  {:<9}  {descriptor}",
            unit.value(),
            if persisted { "yes" } else { "no" }
        );
    }
    Ok(())
}
