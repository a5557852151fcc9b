//! Read-only views of the tmux server plus session lifecycle.

use std::collections::BTreeMap;

use anyhow::{Context as _, Result, bail};
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use tracing::info;

use super::{App, confirm};
use crate::cli::LocateField;
use crate::output::{OutputFormat, Report, active_label, format_relative};
use crate::tmux::{PaneDirectory, PaneRecord, SessionRecord, WindowRecord};

/// Compact pane entry for `list`.
#[derive(Debug, Clone, Serialize)]
pub struct PaneInfo {
    pub formatted_id: String,
    pub session: String,
    pub window_index: u32,
    pub title: String,
    pub command: String,
    pub active: bool,
}

impl PaneInfo {
    fn line(&self) -> String {
        format!(
            "{}  title={}  cmd={}  ({})",
            self.formatted_id,
            self.title,
            self.command,
            active_label(self.active)
        )
    }
}

/// Panes for `list`, grouped by window unless flat.
#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct PaneList {
    panes: Vec<PaneInfo>,
    #[serde(skip)]
    flat: bool,
}

impl PaneList {
    fn new(records: Vec<PaneRecord>, flat: bool) -> Self {
        let mut panes: Vec<PaneInfo> = records
            .into_iter()
            .map(|p| PaneInfo {
                formatted_id: p.formatted_id(),
                session: p.session,
                window_index: p.window_index,
                title: p.title,
                command: p.command,
                active: p.active,
            })
            .collect();
        panes.sort_by(|a, b| a.formatted_id.cmp(&b.formatted_id));
        Self { panes, flat }
    }
}

impl Report for PaneList {
    fn table(&self) -> String {
        if self.panes.is_empty() {
            return "No tmux panes found.\n".to_string();
        }
        let mut out = String::new();
        if self.flat {
            out.push_str("Available tmux panes:\n");
            for pane in &self.panes {
                out.push_str(&format!("  - {}\n", pane.line()));
            }
            return out;
        }

        let mut grouped: BTreeMap<&str, BTreeMap<u32, Vec<&PaneInfo>>> = BTreeMap::new();
        for pane in &self.panes {
            grouped
                .entry(pane.session.as_str())
                .or_default()
                .entry(pane.window_index)
                .or_default()
                .push(pane);
        }
        out.push_str("Tmux windows and panes:\n");
        for (session, windows) in grouped {
            out.push_str(&format!("{session}:\n"));
            for (window, panes) in windows {
                let active = panes.iter().any(|p| p.active);
                out.push_str(&format!("  {session}:{window}  ({})\n", active_label(active)));
                for pane in panes {
                    out.push_str(&format!("    - {}\n", pane.line()));
                }
            }
        }
        out
    }

    fn quiet(&self) -> Option<String> {
        let ids: Vec<&str> = self.panes.iter().map(|p| p.formatted_id.as_str()).collect();
        (!ids.is_empty()).then(|| ids.join("\n"))
    }
}

pub fn list(app: &App, flat: bool) -> Result<()> {
    let records = app.tmux.list_panes()?;
    app.emit(&PaneList::new(records, flat))
}

/// Filters for `panes`. String filters are case-insensitive substrings.
#[derive(Debug, Default)]
pub struct PaneFilter {
    pub session: Option<String>,
    pub window: Option<u32>,
    pub command: Option<String>,
    pub title: Option<String>,
    pub path: Option<String>,
}

fn contains_ci(value: &str, needle: Option<&str>) -> bool {
    match needle.map(str::trim).filter(|n| !n.is_empty()) {
        Some(needle) => value.to_lowercase().contains(&needle.to_lowercase()),
        None => true,
    }
}

impl PaneFilter {
    /// `session` here is already resolved from any selector.
    fn matches(&self, pane: &PaneRecord, session: Option<&str>) -> bool {
        session.is_none_or(|s| pane.session == s)
            && self.window.is_none_or(|w| pane.window_index == w)
            && contains_ci(&pane.command, self.command.as_deref())
            && contains_ci(&pane.title, self.title.as_deref())
            && contains_ci(&pane.path, self.path.as_deref())
    }
}

#[derive(Debug, Serialize)]
pub struct PaneSnapshot {
    pub formatted_id: String,
    #[serde(flatten)]
    pub pane: PaneRecord,
}

impl Report for PaneSnapshot {
    fn table(&self) -> String {
        let p = &self.pane;
        let mut window = format!("{}:{}", p.session, p.window_index);
        if !p.window_name.trim().is_empty() {
            window.push_str(&format!(" ({})", p.window_name));
        }
        format!(
            "  {}  {}  pid={}  cmd={}  path={}  title={}  win={} ({})  activity={}\n",
            self.formatted_id,
            active_label(p.active),
            p.pid.map_or_else(|| "-".to_string(), |pid| pid.to_string()),
            p.command,
            p.path,
            p.title,
            window,
            active_label(p.window_active),
            format_relative(p.activity_at, Utc::now()),
        )
    }

    fn quiet(&self) -> Option<String> {
        Some(self.formatted_id.clone())
    }
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct PaneTable(Vec<PaneSnapshot>);

impl Report for PaneTable {
    fn table(&self) -> String {
        if self.0.is_empty() {
            return "No tmux panes found.\n".to_string();
        }
        format!("Panes:\n{}", self.0.table())
    }

    fn quiet(&self) -> Option<String> {
        self.0.quiet()
    }
}

pub fn select_panes(records: Vec<PaneRecord>, filter: &PaneFilter, session: Option<&str>) -> Vec<PaneSnapshot> {
    let mut items: Vec<PaneSnapshot> = records
        .into_iter()
        .filter(|p| filter.matches(p, session))
        .map(|pane| PaneSnapshot {
            formatted_id: pane.formatted_id(),
            pane,
        })
        .collect();
    items.sort_by(|a, b| {
        (&a.pane.session, a.pane.window_index, a.pane.pane_index)
            .cmp(&(&b.pane.session, b.pane.window_index, b.pane.pane_index))
    });
    items
}

pub fn panes(app: &App, filter: &PaneFilter) -> Result<()> {
    let session = app.resolve_session(filter.session.as_deref())?;
    let records = app.tmux.list_panes()?;
    app.emit(&PaneTable(select_panes(records, filter, session.as_deref())))
}

/// How `locate` compares its query against a field.
#[derive(Debug)]
pub enum Matcher {
    /// Case-insensitive substring.
    Substring(String),
    Regex(Regex),
    /// Case-insensitive subsequence: `ns` matches `node server`.
    Fuzzy(String),
}

impl Matcher {
    pub fn new(query: &str, regex: bool, fuzzy: bool) -> Result<Self> {
        if regex && fuzzy {
            bail!("use either --regex or --fuzzy, not both");
        }
        if regex {
            let re = Regex::new(query).with_context(|| format!("invalid regex: {query}"))?;
            return Ok(Matcher::Regex(re));
        }
        if fuzzy {
            return Ok(Matcher::Fuzzy(query.trim().to_lowercase()));
        }
        Ok(Matcher::Substring(query.to_lowercase()))
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Matcher::Substring(needle) => value.to_lowercase().contains(needle.as_str()),
            Matcher::Regex(re) => re.is_match(value),
            Matcher::Fuzzy(query) => {
                let mut wanted = query.chars().peekable();
                for c in value.to_lowercase().chars() {
                    if wanted.peek() == Some(&c) {
                        wanted.next();
                    }
                }
                wanted.peek().is_none()
            }
        }
    }
}

fn locate_fields(pane: &PaneRecord, field: LocateField) -> Vec<&str> {
    match field {
        LocateField::Command => vec![pane.command.as_str()],
        LocateField::Title => vec![pane.title.as_str()],
        LocateField::Path => vec![pane.path.as_str()],
        LocateField::Any => vec![pane.command.as_str(), pane.title.as_str(), pane.path.as_str()],
    }
}

pub fn locate_panes(
    records: Vec<PaneRecord>,
    field: LocateField,
    matcher: &Matcher,
    session: Option<&str>,
    window: Option<u32>,
) -> Vec<PaneSnapshot> {
    let filter = PaneFilter {
        window,
        ..PaneFilter::default()
    };
    let mut items = select_panes(records, &filter, session);
    items.retain(|snap| {
        locate_fields(&snap.pane, field)
            .into_iter()
            .any(|value| matcher.matches(value))
    });
    items
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
struct LocateResults(Vec<PaneSnapshot>);

impl Report for LocateResults {
    fn table(&self) -> String {
        if self.0.is_empty() {
            return "No matching panes found.\n".to_string();
        }
        let mut out = "Matching panes:\n".to_string();
        for snap in &self.0 {
            let p = &snap.pane;
            out.push_str(&format!(
                "  {}  cmd={}  title={}  path={}\n",
                snap.formatted_id, p.command, p.title, p.path
            ));
        }
        out
    }

    fn quiet(&self) -> Option<String> {
        self.0.quiet()
    }
}

pub fn locate(
    app: &App,
    query: &str,
    field: LocateField,
    regex: bool,
    fuzzy: bool,
    session: Option<&str>,
    window: Option<u32>,
) -> Result<()> {
    let query = query.trim();
    if query.is_empty() {
        bail!("query is required");
    }
    let matcher = Matcher::new(query, regex, fuzzy)?;
    let session = app.resolve_session(session)?;
    let records = app.tmux.list_panes()?;
    app.emit(&LocateResults(locate_panes(
        records,
        field,
        &matcher,
        session.as_deref(),
        window,
    )))
}

impl Report for SessionRecord {
    fn table(&self) -> String {
        let attached = if self.attached > 0 { "attached" } else { "detached" };
        format!(
            "  {:<20} windows={:<3} {:<9} activity={}\n",
            self.name,
            self.windows,
            attached,
            format_relative(self.activity_at, Utc::now())
        )
    }

    fn quiet(&self) -> Option<String> {
        Some(self.name.clone())
    }
}

pub fn sessions(app: &App) -> Result<()> {
    let mut sessions = app.tmux.list_sessions()?;
    sessions.sort_by(|a, b| a.name.cmp(&b.name));
    if sessions.is_empty() && app.format == OutputFormat::Table {
        println!("No tmux sessions found.");
        return Ok(());
    }
    app.emit(&sessions)
}

impl Report for WindowRecord {
    fn table(&self) -> String {
        let mark = if self.active { "*" } else { " " };
        format!("{mark} {}:{}  {}\n", self.session, self.window_index, self.name)
    }

    fn quiet(&self) -> Option<String> {
        Some(format!("{}:{}", self.session, self.window_index))
    }
}

pub fn windows(app: &App, session: Option<&str>) -> Result<()> {
    let session = match app.resolve_session(session)? {
        Some(s) => Some(s),
        // Inside tmux, default to the current session.
        None => app.own_pane().map(|p| p.session().to_string()),
    };
    let windows = app.tmux.list_windows(session.as_deref())?;
    app.emit(&windows)
}

#[derive(Debug, Serialize)]
pub struct StatusPane {
    pub id: String,
    pub title: String,
    pub command: String,
    pub active: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusSnapshot {
    pub in_tmux: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pane_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pane_index: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub panes: Vec<StatusPane>,
    pub managed_session: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmux_version: Option<String>,
}

impl Report for StatusSnapshot {
    fn table(&self) -> String {
        let mut out = match &self.pane_id {
            None => format!(
                "Managed session: {}\nNot currently inside tmux.\n",
                self.managed_session
            ),
            Some(pane_id) => {
                let mut out = format!("Current: {pane_id}\n");
                out.push_str(&format!(
                    "Window:  {}:{}",
                    self.session.as_deref().unwrap_or("?"),
                    self.window_index.unwrap_or(0)
                ));
                if let Some(name) = self.window_name.as_deref().filter(|n| !n.is_empty()) {
                    out.push_str(&format!(" ({name})"));
                }
                out.push('\n');
                if !self.panes.is_empty() {
                    out.push_str("\nPanes:\n");
                    for p in &self.panes {
                        let mark = if p.active { "*" } else { " " };
                        out.push_str(&format!("{mark} {:<14} {:<16} {}\n", p.id, p.command, p.title));
                    }
                }
                out
            }
        };
        if let Some(version) = &self.tmux_version {
            out.push_str(&format!("\n{version}\n"));
        }
        out
    }

    fn quiet(&self) -> Option<String> {
        Some(self.pane_id.clone().unwrap_or_else(|| self.managed_session.clone()))
    }
}

pub fn status(app: &App) -> Result<()> {
    let mut snapshot = StatusSnapshot {
        in_tmux: app.ctx.in_tmux(),
        pane_id: None,
        session: None,
        window_index: None,
        window_name: None,
        pane_index: None,
        panes: Vec::new(),
        managed_session: app.ctx.managed_session.clone(),
        tmux_version: app.tmux.version().ok(),
    };
    if let Some(current) = app.own_pane() {
        let window_key = current.window_key();
        let records = app.tmux.list_panes()?;
        snapshot.window_name = records
            .iter()
            .find(|p| p.target().window_key() == window_key)
            .map(|p| p.window_name.clone());
        snapshot.panes = records
            .into_iter()
            .filter(|p| p.target().window_key() == window_key)
            .map(|p| StatusPane {
                id: p.formatted_id(),
                title: p.title,
                command: p.command,
                active: p.active,
            })
            .collect();
        snapshot.pane_id = Some(current.to_string());
        snapshot.session = Some(current.session().to_string());
        snapshot.window_index = Some(current.window());
        snapshot.pane_index = Some(current.pane());
    }
    app.emit(&snapshot)
}

#[derive(Debug, Serialize)]
pub struct SessionAction {
    pub session: String,
    pub dry_run: bool,
    pub killed: bool,
}

impl Report for SessionAction {
    fn table(&self) -> String {
        if self.dry_run {
            format!("[dry-run] Would kill tmux session {}\n", self.session)
        } else if self.killed {
            format!("Killed tmux session {}\n", self.session)
        } else {
            "Aborted. No sessions were killed.\n".to_string()
        }
    }

    fn quiet(&self) -> Option<String> {
        Some(self.session.clone())
    }
}

pub fn attach(app: &App, session: Option<&str>) -> Result<()> {
    if app.ctx.in_tmux() {
        bail!("already inside tmux; open a new terminal to attach");
    }
    let session = app
        .resolve_session(session)?
        .unwrap_or_else(|| app.ctx.managed_session.clone());
    app.tmux.ensure_session(&session)?;
    info!(session = %session, "attaching");
    app.tmux.attach(&session)?;
    Ok(())
}

pub fn cleanup(app: &App, session: Option<&str>, dry_run: bool, yes: bool) -> Result<()> {
    let session = app
        .resolve_session(session)?
        .unwrap_or_else(|| app.ctx.managed_session.clone());
    let mut result = SessionAction {
        session: session.clone(),
        dry_run,
        killed: false,
    };
    if dry_run {
        return app.emit(&result);
    }
    if !yes && !confirm(&format!("Kill tmux session {session}?"))? {
        return app.emit(&result);
    }
    app.tmux.kill_session(&session)?;
    result.killed = true;
    app.emit(&result)
}
