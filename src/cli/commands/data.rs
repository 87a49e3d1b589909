//! Key/value commands (put, get, remove, clean).
//!
//! Each command runs one repository session: startup, open the unit, do the
//! work, close the unit, shutdown.

use std::collections::HashSet;

use anyhow::Context;

use crate::cli::UnitArgs;
use crate::config::Settings;
use crate::repository::{Repository, RepositoryBuilder};
use crate::types::{FileSystemRef, Key, Persistent, UnitDescriptor, UnitId};

impl UnitArgs {
    pub fn descriptor(&self) -> UnitDescriptor {
        match &self.file_system {
            Some(ns) => UnitDescriptor::new(&self.unit, FileSystemRef::named(ns)),
            None => UnitDescriptor::local(&self.unit),
        }
    }
}

/// Run `work` between startup and shutdown of a repository built from
/// `settings`.
fn with_repository<T>(
    settings: &Settings,
    work: impl FnOnce(&Repository) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let version = i32::try_from(settings.repository.persist_version)
        .context("repository.persist_version is out of range")?;

    let repository = RepositoryBuilder::from_settings(settings).build();
    repository.startup(version)?;

    let session = work(&repository);

    // Always shut down so the disk backend flushes, but report the session
    // error first.
    let shutdown = repository.shutdown();
    let output = session?;
    shutdown?;
    Ok(output)
}

fn with_open_unit<T>(
    repository: &Repository,
    id: UnitId,
    clean_on_close: bool,
    work: impl FnOnce(&Repository, UnitId) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    repository.open_unit(id)?;
    let output = work(repository, id)?;
    repository.close_unit(id, clean_on_close, &HashSet::new())?;
    Ok(output)
}

/// Open the unit named by `unit`, registering it if it is new.
fn with_unit<T>(
    settings: &Settings,
    unit: &UnitArgs,
    clean_on_close: bool,
    work: impl FnOnce(&Repository, UnitId) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    with_repository(settings, |repository| {
        let id = repository.unit_id(&unit.descriptor())?;
        with_open_unit(repository, id, clean_on_close, work)
    })
}

pub fn run_put(settings: &Settings, unit: &UnitArgs, key: &str, value: &str) -> anyhow::Result<()> {
    let value: serde_json::Value =
        serde_json::from_str(value).with_context(|| format!("value for '{key}' is not valid JSON"))?;

    with_unit(settings, unit, false, |repository, id| {
        repository.put(Key::new(id, key), Persistent::new(value))?;
        Ok(())
    })?;

    crate::log_event!("cli", "put", "{} {key}", unit.descriptor());
    Ok(())
}

pub fn run_get(settings: &Settings, unit: &UnitArgs, key: &str) -> anyhow::Result<bool> {
    // Reads never register a unit.
    let value = with_repository(settings, |repository| {
        match repository.lookup_unit(&unit.descriptor())? {
            Some(id) => with_open_unit(repository, id, false, |repository, id| {
                Ok(repository.get(&Key::new(id, key))?)
            }),
            None => Ok(None),
        }
    })?;

    match value {
        Some(value) => {
            println!("{}", serde_json::to_string_pretty(value.value())?);
            Ok(true)
        }
        None => {
            eprintln!("No value for '{key}' in unit {}", unit.descriptor());
            Ok(false)
        }
    }
}

pub fn run_remove(settings: &Settings, unit: &UnitArgs, key: &str) -> anyhow::Result<()> {
    with_unit(settings, unit, false, |repository, id| {
        Ok(repository.remove(&Key::new(id, key))?)
    })
}

pub fn run_clean(settings: &Settings, unit: &UnitArgs) -> anyhow::Result<()> {
    with_unit(settings, unit, true, |_, _| Ok(()))?;
    println!("Cleaned unit {}", unit.descriptor());
    Ok(())
}
