//! `alias` subcommands over the JSON alias file.

use std::path::Path;

use anyhow::{Result, bail};
use serde::Serialize;
use tracing::info;

use super::App;
use crate::alias::{AliasEntry, AliasStore, normalize_alias_name};
use crate::cli::AliasCommand;
use crate::output::{OutputFormat, Report};

impl Report for AliasEntry {
    fn table(&self) -> String {
        format!("{} => {}\n", self.name, self.target)
    }

    fn quiet(&self) -> Option<String> {
        Some(self.name.clone())
    }
}

#[derive(Debug, Serialize)]
pub struct UnsetReport {
    pub name: String,
    pub removed: bool,
}

impl Report for UnsetReport {
    fn table(&self) -> String {
        if self.removed {
            format!("Removed alias {}\n", self.name)
        } else {
            format!("No alias named {}\n", self.name)
        }
    }

    fn quiet(&self) -> Option<String> {
        self.removed.then(|| self.name.clone())
    }
}

pub fn dispatch(app: &App, command: AliasCommand) -> Result<()> {
    let path = app.ctx.alias_file.as_path();
    match command {
        AliasCommand::List => {
            let entries = AliasStore::load(path)?.entries();
            if entries.is_empty() && app.format == OutputFormat::Table {
                println!("No aliases defined.");
                return Ok(());
            }
            app.emit(&entries)
        }
        AliasCommand::Set { name, target } => {
            // Store the resolved id so the alias survives selector drift.
            let resolved = app.resolve_pane(&target)?;
            let entry = set(path, &name, &resolved.to_string())?;
            app.emit(&entry)
        }
        AliasCommand::Unset { name } => app.emit(&unset(path, &name)?),
        AliasCommand::Resolve { name } => app.emit(&resolve(path, &name)?),
    }
}

pub fn set(path: &Path, name: &str, target: &str) -> Result<AliasEntry> {
    let name = normalize_alias_name(name)?;
    let mut store = AliasStore::load(path)?;
    if let Some(previous) = store.set(name.clone(), target.to_string()) {
        info!(alias = %name, from = %previous, to = target, "alias updated");
    }
    store.save(path)?;
    Ok(AliasEntry {
        name,
        target: target.to_string(),
    })
}

pub fn unset(path: &Path, name: &str) -> Result<UnsetReport> {
    let name = normalize_alias_name(name)?;
    let mut store = AliasStore::load(path)?;
    let removed = store.remove(&name).is_some();
    if removed {
        store.save(path)?;
    }
    Ok(UnsetReport { name, removed })
}

pub fn resolve(path: &Path, name: &str) -> Result<AliasEntry> {
    let name = normalize_alias_name(name)?;
    let store = AliasStore::load(path)?;
    let Some(target) = store.get(&name) else {
        bail!("unknown alias: @{name}");
    };
    Ok(AliasEntry {
        target: target.to_string(),
        name,
    })
}
