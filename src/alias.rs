//! Alias name → pane id mapping stored as a small JSON object.
//!
//! The file is read whole on every lookup and rewritten atomically (temp file
//! in the same directory, then rename). Concurrent writers are not locked;
//! the last writer wins.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::error::{PaneError, Result};

const RESERVED: &[&str] = &["current", "active", "managed"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AliasEntry {
    pub name: String,
    pub target: String,
}

/// Normalize a user-supplied alias name: trim, drop a leading `@`, lowercase.
pub fn normalize_alias_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    let trimmed = trimmed.strip_prefix('@').unwrap_or(trimmed).to_lowercase();
    if trimmed.is_empty() {
        return Err(PaneError::InvalidAlias("alias name is required".to_string()));
    }
    if RESERVED.contains(&trimmed.as_str()) {
        return Err(PaneError::InvalidAlias(format!("'{trimmed}' is reserved")));
    }
    let valid = trimmed
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'));
    if !valid {
        return Err(PaneError::InvalidAlias(format!("'{name}'")));
    }
    Ok(trimmed)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasStore {
    aliases: BTreeMap<String, String>,
}

impl AliasStore {
    pub fn from_map(aliases: BTreeMap<String, String>) -> Self {
        Self { aliases }
    }

    /// Load the alias file. A missing or empty file is an empty store.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(file_error(path, e)),
        };
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let aliases = serde_json::from_str(&data).map_err(|e| file_error(path, e))?;
        Ok(Self { aliases })
    }

    /// Write the store via temp file + rename so readers never see a torn file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| file_error(path, e))?;

        let data = serde_json::to_string_pretty(&self.aliases).map_err(|e| file_error(path, e))?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| file_error(path, e))?;
        tmp.write_all(data.as_bytes())
            .and_then(|_| tmp.write_all(b"\n"))
            .map_err(|e| file_error(path, e))?;
        tmp.persist(path).map_err(|e| file_error(path, e.error))?;

        debug!(path = %path.display(), count = self.aliases.len(), "alias file saved");
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    /// Insert or replace an alias; returns the previous target.
    pub fn set(&mut self, name: String, target: String) -> Option<String> {
        self.aliases.insert(name, target)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.aliases.remove(name)
    }

    /// Entries sorted by name.
    pub fn entries(&self) -> Vec<AliasEntry> {
        self.aliases
            .iter()
            .map(|(name, target)| AliasEntry {
                name: name.clone(),
                target: target.clone(),
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

fn file_error(path: &Path, err: impl std::fmt::Display) -> PaneError {
    PaneError::AliasFile {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
