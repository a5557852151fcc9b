use std::path::{Path, PathBuf};

pub const APP_DIR: &str = "panectl";
pub const PROJECT_DIR: &str = ".panectl";
pub const CONFIG_FILENAME: &str = "config.toml";
const ALIASES_FILENAME: &str = "aliases.json";

/// Search upward from `start` for a `.panectl/config.toml` file.
pub fn find_project_config(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(PROJECT_DIR).join(CONFIG_FILENAME);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// `<user config dir>/panectl/config.toml`, when a config dir is known.
pub fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILENAME))
}

/// Default alias file location.
///
/// Prefers the platform config dir, then a dotfile in the home directory,
/// then a relative `aliases.json`.
pub fn default_alias_file() -> PathBuf {
    if let Some(dir) = dirs::config_dir() {
        return dir.join(APP_DIR).join(ALIASES_FILENAME);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".panectl-aliases.json");
    }
    PathBuf::from(ALIASES_FILENAME)
}
