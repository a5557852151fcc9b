//! Typed failures shared by target resolution, the tmux client, and the
//! run/wait core.
//!
//! Every variant carries a stable machine-readable code so callers (and
//! scripts parsing stderr) can tell an idle timeout apart from a missing
//! tmux binary without matching on message text.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PaneError>;

#[derive(Debug, Error)]
pub enum PaneError {
    #[error("--pane is required")]
    PaneRequired,

    #[error("invalid pane id '{0}'; expected session:window.pane")]
    InvalidPane(String),

    #[error("unknown pane selector: {0}")]
    UnknownSelector(String),

    #[error("no active pane found")]
    NoActivePane,

    #[error("no current pane found")]
    NoCurrentPane,

    #[error("not inside tmux; {0} requires a tmux client")]
    NotInTmux(String),

    #[error("timeout waiting for idle after {}ms", waited.as_millis())]
    IdleTimeout { waited: Duration },

    #[error("exit code not found")]
    ExitCodeNotFound,

    #[error("command exited with {0}")]
    CommandExit(i32),

    #[error("unsupported signal: {0}")]
    UnsupportedSignal(String),

    #[error("invalid alias name: {0}")]
    InvalidAlias(String),

    #[error("alias file {}: {message}", path.display())]
    AliasFile { path: PathBuf, message: String },

    #[error("tmux not found in PATH")]
    TmuxMissing(#[source] std::io::Error),

    #[error("no tmux server running")]
    NoServer,

    #[error("tmux session not found: {0}")]
    SessionNotFound(String),

    #[error("tmux {command}: {message}")]
    Tmux { command: String, message: String },
}

impl PaneError {
    /// Stable code printed at the CLI boundary ahead of the message.
    pub fn code(&self) -> &'static str {
        match self {
            PaneError::PaneRequired => "ERR_PANE_REQUIRED",
            PaneError::InvalidPane(_) => "ERR_INVALID_PANE",
            PaneError::UnknownSelector(_) => "ERR_UNKNOWN_SELECTOR",
            PaneError::NoActivePane => "ERR_NO_ACTIVE_PANE",
            PaneError::NoCurrentPane => "ERR_NO_CURRENT_PANE",
            PaneError::NotInTmux(_) => "ERR_NOT_IN_TMUX",
            PaneError::IdleTimeout { .. } => "ERR_IDLE_TIMEOUT",
            PaneError::ExitCodeNotFound | PaneError::CommandExit(_) => "ERR_COMMAND_EXIT",
            PaneError::UnsupportedSignal(_) => "ERR_SIGNAL_UNSUPPORTED",
            PaneError::InvalidAlias(_) => "ERR_INVALID_ALIAS",
            PaneError::AliasFile { .. } => "ERR_ALIAS_FILE",
            PaneError::TmuxMissing(_) => "ERR_TMUX_MISSING",
            PaneError::NoServer => "ERR_NO_SERVER",
            PaneError::SessionNotFound(_) => "ERR_SESSION_NOT_FOUND",
            PaneError::Tmux { .. } => "ERR_TMUX",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PaneError::IdleTimeout { .. })
    }

    /// The remote command's status when this error reports a non-zero exit.
    pub fn remote_exit_code(&self) -> Option<i32> {
        match self {
            PaneError::CommandExit(code) => Some(*code),
            _ => None,
        }
    }

    pub(crate) fn tmux(command: &str, message: impl Into<String>) -> Self {
        PaneError::Tmux {
            command: command.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(PaneError::PaneRequired.code(), "ERR_PANE_REQUIRED");
        assert_eq!(PaneError::CommandExit(7).code(), "ERR_COMMAND_EXIT");
        assert_eq!(PaneError::ExitCodeNotFound.code(), "ERR_COMMAND_EXIT");
        assert_eq!(
            PaneError::IdleTimeout {
                waited: Duration::from_secs(1)
            }
            .code(),
            "ERR_IDLE_TIMEOUT"
        );
    }

    #[test]
    fn only_idle_timeout_is_timeout() {
        let timeout = PaneError::IdleTimeout {
            waited: Duration::from_millis(1500),
        };
        assert!(timeout.is_timeout());
        assert_eq!(timeout.to_string(), "timeout waiting for idle after 1500ms");

        // Message text mentioning "timeout" must not be mistaken for one.
        let other = PaneError::tmux("capture-pane", "timeout talking to server");
        assert!(!other.is_timeout());
    }

    #[test]
    fn command_exit_carries_remote_code() {
        let err = PaneError::CommandExit(7);
        assert_eq!(err.remote_exit_code(), Some(7));
        assert_eq!(err.to_string(), "command exited with 7");
        assert_eq!(PaneError::ExitCodeNotFound.remote_exit_code(), None);
    }

    #[test]
    fn tmux_errors_include_subcommand() {
        let err = PaneError::tmux("list-panes", "boom");
        assert_eq!(err.to_string(), "tmux list-panes: boom");
        assert_eq!(err.code(), "ERR_TMUX");
    }
}
