//! `ensure`: make a session, named window, and optional titled pane exist
//! without creating duplicates.

use anyhow::{Context as _, Result, bail};
use serde::Serialize;
use tracing::{debug, info};

use super::App;
use crate::cli::EnsureArgs;
use crate::output::Report;
use crate::sentinel::shell_quote_single;
use crate::target::PaneTarget;
use crate::tmux::{Split, Workspace};

/// A resolved `ensure` invocation.
#[derive(Debug, Clone, Default)]
pub struct EnsureRequest {
    pub session: String,
    pub window: String,
    pub pane_title: Option<String>,
    /// Minimum pane count for the window; 0 leaves it alone.
    pub panes: usize,
    pub layout: Option<String>,
    pub split: Option<Split>,
    /// Shell text for the first created pane (cwd and env applied).
    pub command: Option<String>,
    /// Shell text for filler panes: cwd and env only.
    pub spawn: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnsureReport {
    pub session: String,
    pub window: String,
    pub window_index: u32,
    pub pane_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pane_title: Option<String>,
    pub created_session: bool,
    pub created_window: bool,
    pub created_pane: bool,
    pub added_panes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_applied: Option<String>,
}

impl Report for EnsureReport {
    fn table(&self) -> String {
        let mut out = if self.created_window {
            format!(
                "Ensured window {:?} in session {:?} (index {}).\n",
                self.window, self.session, self.window_index
            )
        } else {
            format!(
                "Window {:?} already exists in session {:?} (index {}).\n",
                self.window, self.session, self.window_index
            )
        };
        let status = if self.created_pane { "created" } else { "existing" };
        match &self.pane_title {
            Some(title) => out.push_str(&format!("Pane {} ({status}, title={title:?}).\n", self.pane_id)),
            None => out.push_str(&format!("Pane {} ({status}).\n", self.pane_id)),
        }
        if self.added_panes > 0 {
            out.push_str(&format!("Added panes: {}\n", self.added_panes));
        }
        if let Some(layout) = &self.layout_applied {
            out.push_str(&format!("Layout applied: {layout}\n"));
        }
        out
    }

    fn quiet(&self) -> Option<String> {
        Some(self.pane_id.clone())
    }
}

/// Parse repeated `KEY=VAL` flags. Keys are shell identifiers.
pub fn parse_env(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|item| {
            let Some((key, value)) = item.trim().split_once('=') else {
                bail!("invalid env {item:?}; expected KEY=VAL");
            };
            let key = key.trim();
            let valid = key
                .chars()
                .enumerate()
                .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()));
            if key.is_empty() || !valid {
                bail!("invalid env key {key:?}");
            }
            Ok((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Shell text that applies `cwd` and `env` before `command`. With neither,
/// the command passes through; with no command, the user's shell is exec'd.
pub fn pane_command(command: &str, cwd: Option<&str>, env: &[(String, String)]) -> Option<String> {
    let command = command.trim();
    let cwd = cwd.map(str::trim).filter(|c| !c.is_empty());
    if cwd.is_none() && env.is_empty() {
        return (!command.is_empty()).then(|| command.to_string());
    }
    let command = if command.is_empty() {
        r#"exec "${SHELL:-sh}""#
    } else {
        command
    };
    let mut line = String::new();
    if let Some(dir) = cwd {
        line.push_str(&format!("cd {} && ", shell_quote_single(dir)));
    }
    for (key, value) in env {
        line.push_str(&format!("{key}={} ", shell_quote_single(value)));
    }
    line.push_str(command);
    Some(format!("( {line} )"))
}

fn window_target(session: &str, index: u32) -> String {
    format!("{session}:{index}")
}

/// Bring the workspace to the requested shape, creating only what is missing.
pub fn ensure<W: Workspace + ?Sized>(ws: &W, req: &EnsureRequest) -> Result<EnsureReport> {
    let window_name = req.window.trim();
    if window_name.is_empty() {
        bail!("--window is required");
    }
    let title = req.pane_title.as_deref().map(str::trim).filter(|t| !t.is_empty());

    let created_session = ws
        .ensure_session(&req.session)
        .with_context(|| format!("failed to ensure session {:?}", req.session))?;
    let existing = ws
        .session_windows(&req.session)?
        .into_iter()
        .filter(|w| w.name == window_name)
        .min_by_key(|w| w.window_index);

    let mut created_window = false;
    let mut created_pane = false;
    let mut added_panes = 0;
    let target: PaneTarget;
    let index: u32;
    let mut current: usize;

    match existing {
        None => {
            let pane = ws.new_window(&req.session, Some(window_name), req.command.as_deref())?;
            info!(session = %req.session, window = window_name, pane = %pane, "window created");
            created_window = true;
            created_pane = true;
            index = pane.window();
            if let Some(title) = title {
                ws.set_pane_title(&pane, title)?;
            }
            target = pane;
            current = 1;
        }
        Some(window) => {
            index = window.window_index;
            debug!(session = %req.session, window = window_name, index, "window exists");
            let mut panes: Vec<_> = ws
                .list_panes()?
                .into_iter()
                .filter(|p| p.session == req.session && p.window_index == index)
                .collect();
            panes.sort_by_key(|p| p.pane_index);
            current = panes.len();

            let titled = title.and_then(|t| panes.iter().find(|p| p.title == t));
            target = match (title, titled) {
                (_, Some(pane)) => pane.target(),
                (Some(title), None) => {
                    let pane = ws.split_window(
                        Some(&window_target(&req.session, index)),
                        req.split,
                        req.command.as_deref(),
                    )?;
                    ws.set_pane_title(&pane, title)?;
                    created_pane = true;
                    current += 1;
                    pane
                }
                (None, None) => panes
                    .iter()
                    .find(|p| p.active)
                    .or_else(|| panes.first())
                    .map(|p| p.target())
                    .context("no panes found in window")?,
            };
        }
    }

    let window = window_target(&req.session, index);
    while current < req.panes {
        ws.split_window(Some(&window), req.split, req.spawn.as_deref())?;
        added_panes += 1;
        current += 1;
    }

    let mut layout_applied = None;
    if let Some(layout) = req.layout.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        if created_window || created_pane || added_panes > 0 {
            ws.select_layout(&window, layout)?;
            layout_applied = Some(layout.to_string());
        }
    }

    Ok(EnsureReport {
        session: req.session.clone(),
        window: window_name.to_string(),
        window_index: index,
        pane_id: target.to_string(),
        pane_title: title.map(str::to_string),
        created_session,
        created_window,
        created_pane,
        added_panes,
        layout_applied,
    })
}

pub fn run(app: &App, args: &EnsureArgs) -> Result<()> {
    let env = parse_env(&args.env)?;
    let session = match app.resolve_session(args.session.as_deref())? {
        Some(name) => name,
        None => match app.own_pane() {
            Some(pane) => pane.session().to_string(),
            None => app.ctx.managed_session.clone(),
        },
    };
    let req = EnsureRequest {
        session,
        window: args.window.clone(),
        pane_title: args.pane_title.clone(),
        panes: args.panes,
        layout: args.layout.clone(),
        split: args.split.map(Split::from),
        command: pane_command(&args.command.join(" "), args.cwd.as_deref(), &env),
        spawn: pane_command("", args.cwd.as_deref(), &env),
    };
    app.emit(&ensure(&app.tmux, &req)?)
}
