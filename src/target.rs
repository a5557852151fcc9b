//! Pane target parsing and selector resolution.
//!
//! A raw `--pane` value is either an explicit `session:window.pane` id or an
//! `@` selector: `@current`, `@active`, or `@<alias>`. Resolution happens
//! once per invocation; the resulting [`PaneTarget`] is immutable.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::alias::{AliasStore, normalize_alias_name};
use crate::context::Context;
use crate::error::{PaneError, Result};
use crate::tmux::PaneDirectory;

static PANE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^:.\s][^:.]*):(\d+)\.(\d+)$").expect("valid pane id regex"));

/// One pane, addressed as `session:window.pane`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PaneTarget {
    session: String,
    window: u32,
    pane: u32,
}

impl PaneTarget {
    pub fn new(session: impl Into<String>, window: u32, pane: u32) -> Self {
        Self {
            session: session.into(),
            window,
            pane,
        }
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn pane(&self) -> u32 {
        self.pane
    }

    /// `session:window` prefix shared by every pane in the same window.
    pub fn window_key(&self) -> String {
        format!("{}:{}", self.session, self.window)
    }
}

impl fmt::Display for PaneTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}.{}", self.session, self.window, self.pane)
    }
}

impl FromStr for PaneTarget {
    type Err = PaneError;

    fn from_str(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let caps = PANE_ID
            .captures(trimmed)
            .ok_or_else(|| PaneError::InvalidPane(trimmed.to_string()))?;
        let window = caps[2]
            .parse()
            .map_err(|_| PaneError::InvalidPane(trimmed.to_string()))?;
        let pane = caps[3]
            .parse()
            .map_err(|_| PaneError::InvalidPane(trimmed.to_string()))?;
        Ok(Self::new(&caps[1], window, pane))
    }
}

/// Parsed form of a raw `--pane` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Explicit(String),
    Current,
    Active,
    Alias(String),
}

impl Selector {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PaneError::PaneRequired);
        }
        let Some(rest) = trimmed.strip_prefix('@') else {
            return Ok(Selector::Explicit(trimmed.to_string()));
        };
        Ok(match rest {
            "current" => Selector::Current,
            "active" => Selector::Active,
            _ => Selector::Alias(rest.to_string()),
        })
    }
}

/// Resolve a raw `--pane` value to a validated target.
pub fn resolve_pane_target(
    raw: &str,
    ctx: &Context,
    directory: &dyn PaneDirectory,
) -> Result<PaneTarget> {
    let resolved = match Selector::parse(raw)? {
        Selector::Explicit(id) => id,
        Selector::Current => {
            if !ctx.in_tmux() {
                return Err(PaneError::NotInTmux("@current".to_string()));
            }
            match directory.current_pane(ctx.tmux_pane.as_deref())? {
                Some(id) if !id.trim().is_empty() => id,
                _ => return Err(PaneError::NoCurrentPane),
            }
        }
        Selector::Active => {
            let mut active: Vec<String> = directory
                .list_panes()?
                .into_iter()
                .filter(|p| p.active)
                .map(|p| p.formatted_id())
                .collect();
            active.sort();
            active.into_iter().next().ok_or(PaneError::NoActivePane)?
        }
        Selector::Alias(alias) => {
            let name = normalize_alias_name(&alias)?;
            let store = AliasStore::load(&ctx.alias_file)?;
            store
                .get(&name)
                .map(str::to_string)
                .ok_or_else(|| PaneError::UnknownSelector(format!("@{alias}")))?
        }
    };
    debug!(raw = raw, resolved = %resolved, "resolved pane target");
    resolved.parse()
}

/// Resolve a session filter value. Empty input means "all sessions".
pub fn resolve_session_target(
    raw: &str,
    ctx: &Context,
    directory: &dyn PaneDirectory,
) -> Result<Option<String>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let Some(rest) = trimmed.strip_prefix('@') else {
        return Ok(Some(trimmed.to_string()));
    };
    match rest {
        "current" => {
            if !ctx.in_tmux() {
                return Err(PaneError::NotInTmux("@current".to_string()));
            }
            let id = directory
                .current_pane(ctx.tmux_pane.as_deref())?
                .ok_or(PaneError::NoCurrentPane)?;
            let target: PaneTarget = id.parse()?;
            Ok(Some(target.session().to_string()))
        }
        "managed" => Ok(Some(ctx.managed_session.clone())),
        _ => Err(PaneError::UnknownSelector(trimmed.to_string())),
    }
}
