//! Ambient environment captured once per invocation.
//!
//! Target resolution never reads process environment directly; it gets a
//! [`Context`] so tests can describe "inside tmux" or "outside tmux"
//! without touching real globals.

use std::path::PathBuf;

use crate::config::ToolConfig;
use crate::paths;

pub const ENV_TMUX: &str = "TMUX";
pub const ENV_TMUX_PANE: &str = "TMUX_PANE";
pub const ENV_ALIASES: &str = "PANECTL_ALIASES";
pub const ENV_SESSION: &str = "PANECTL_SESSION";

#[derive(Debug, Clone)]
pub struct Context {
    /// Value of `$TMUX` when running inside a tmux client.
    pub tmux: Option<String>,
    /// Value of `$TMUX_PANE` (for example `%3`).
    pub tmux_pane: Option<String>,
    pub alias_file: PathBuf,
    pub managed_session: String,
}

impl Context {
    /// Snapshot the process environment, layered over the loaded config.
    pub fn from_process(config: &ToolConfig) -> Self {
        let var = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let alias_file = var(ENV_ALIASES)
            .map(PathBuf::from)
            .or_else(|| config.aliases_file.clone())
            .unwrap_or_else(paths::default_alias_file);
        let managed_session = var(ENV_SESSION).unwrap_or_else(|| config.managed_session.clone());

        Self {
            tmux: var(ENV_TMUX),
            tmux_pane: var(ENV_TMUX_PANE),
            alias_file,
            managed_session,
        }
    }

    pub fn in_tmux(&self) -> bool {
        self.tmux.is_some()
    }
}
