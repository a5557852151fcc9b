//! tmux client for panectl.
//!
//! Wraps the tmux CLI: pane/window/session discovery, capture-pane text,
//! literal and named-key injection via send-keys, and pane lifecycle. The
//! run/wait core only sees the [`PaneSource`] and [`CommandInjector`]
//! traits; target resolution only sees [`PaneDirectory`].

use std::ffi::OsStr;
use std::process::{Command, Output};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{PaneError, Result};
use crate::target::PaneTarget;

const FORMATTED_ID: &str = "#{session_name}:#{window_index}.#{pane_index}";

const PANE_FORMAT: &str = concat!(
    "#{session_name}\t#{window_index}\t#{window_name}\t#{?window_active,1,0}\t",
    "#{pane_index}\t#{pane_id}\t#{?pane_active,1,0}\t#{pane_current_command}\t",
    "#{pane_title}\t#{pane_current_path}\t#{pane_pid}\t#{pane_activity}"
);

const SESSION_FORMAT: &str = "#{session_name}\t#{session_windows}\t#{session_attached}\t#{session_created}\t#{session_activity}";

const WINDOW_FORMAT: &str = "#{session_name}\t#{window_index}\t#{?window_active,1,0}\t#{window_name}";

/// Visible pane text and last-activity time.
pub trait PaneSource {
    /// Pane buffer text, limited to the last `max_lines` lines (0 = unlimited).
    fn capture(&self, pane: &PaneTarget, max_lines: usize) -> Result<String>;

    /// Last-activity timestamp, or `None` when tmux does not expose one.
    fn last_activity(&self, pane: &PaneTarget) -> Result<Option<SystemTime>>;
}

/// Keystroke injection into a pane.
pub trait CommandInjector {
    /// Type `text` literally; optionally press Enter after `enter_delay`.
    fn send_literal(
        &self,
        pane: &PaneTarget,
        text: &str,
        press_enter: bool,
        enter_delay: Duration,
    ) -> Result<()>;

    /// Send tmux key names such as `C-c`, `Enter`, or `Up`.
    fn send_keys(&self, pane: &PaneTarget, keys: &[String]) -> Result<()>;

    fn interrupt(&self, pane: &PaneTarget) -> Result<()> {
        self.send_keys(pane, &["C-c".to_string()])
    }

    fn escape(&self, pane: &PaneTarget) -> Result<()> {
        self.send_keys(pane, &["Escape".to_string()])
    }
}

/// Pane discovery used by selector resolution.
pub trait PaneDirectory {
    fn list_panes(&self) -> Result<Vec<PaneRecord>>;

    /// Formatted id of the invoking client's pane. `hint` is `$TMUX_PANE`.
    fn current_pane(&self, hint: Option<&str>) -> Result<Option<String>>;
}

/// Window and pane creation, used by `ensure` and `launch`.
pub trait Workspace: PaneDirectory {
    /// Create a detached session if missing. Returns true when created.
    fn ensure_session(&self, name: &str) -> Result<bool>;

    fn session_windows(&self, session: &str) -> Result<Vec<WindowRecord>>;

    /// New window in `session`, optionally named and running `command`.
    fn new_window(&self, session: &str, name: Option<&str>, command: Option<&str>) -> Result<PaneTarget>;

    /// Split `window` (the current window when `None`).
    fn split_window(&self, window: Option<&str>, split: Option<Split>, command: Option<&str>) -> Result<PaneTarget>;

    fn set_pane_title(&self, pane: &PaneTarget, title: &str) -> Result<()>;

    fn select_layout(&self, window: &str, layout: &str) -> Result<()>;
}

/// Extended metadata for one pane.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PaneRecord {
    pub session: String,
    pub window_index: u32,
    pub window_name: String,
    pub window_active: bool,
    pub pane_index: u32,
    pub pane_id: String,
    pub active: bool,
    pub command: String,
    pub title: String,
    pub path: String,
    pub pid: Option<u32>,
    pub activity_at: Option<DateTime<Utc>>,
}

impl PaneRecord {
    pub fn formatted_id(&self) -> String {
        format!("{}:{}.{}", self.session, self.window_index, self.pane_index)
    }

    pub fn target(&self) -> PaneTarget {
        PaneTarget::new(&self.session, self.window_index, self.pane_index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub name: String,
    pub windows: u32,
    pub attached: u32,
    pub created_at: Option<DateTime<Utc>>,
    pub activity_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowRecord {
    pub session: String,
    pub window_index: u32,
    pub active: bool,
    pub name: String,
}

/// How `launch` splits the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Horizontal,
    Vertical,
}

/// tmux CLI client.
#[derive(Debug, Clone)]
pub struct Tmux {
    program: String,
}

impl Default for Tmux {
    fn default() -> Self {
        Self::new("tmux")
    }
}

impl Tmux {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn output<I, S>(&self, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => PaneError::TmuxMissing(e),
                _ => PaneError::tmux("exec", e.to_string()),
            })
    }

    /// Run a tmux subcommand and return its stdout.
    fn run(&self, command: &str, args: &[&str]) -> Result<String> {
        let output = self.output(std::iter::once(command).chain(args.iter().copied()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let err = classify_failure(command, &stderr, output.status.code());
            debug!(command = command, error = %err, "tmux command failed");
            return Err(err);
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// `tmux -V`, for diagnostics.
    pub fn version(&self) -> Result<String> {
        let out = self.run("-V", &[])?;
        Ok(out.trim().to_string())
    }

    /// Capture pane text; `join` merges wrapped lines (`-J`).
    pub fn capture_pane(&self, target: &PaneTarget, lines: usize, join: bool) -> Result<String> {
        let id = target.to_string();
        let start = format!("-{lines}");
        let mut args = vec!["-p", "-t", id.as_str()];
        if join {
            args.push("-J");
        }
        if lines > 0 {
            args.extend(["-S", start.as_str()]);
        }
        self.run("capture-pane", &args)
    }

    pub fn pane_activity(&self, target: &PaneTarget) -> Result<Option<SystemTime>> {
        let id = target.to_string();
        let raw = self.run("display-message", &["-p", "-t", &id, "#{pane_activity}"])?;
        Ok(parse_epoch_secs(&raw).map(|secs| UNIX_EPOCH + Duration::from_secs(secs)))
    }

    /// Detailed listing of every pane across sessions.
    pub fn list_pane_records(&self) -> Result<Vec<PaneRecord>> {
        let out = empty_if_no_server(self.run("list-panes", &["-a", "-F", PANE_FORMAT]))?;
        Ok(parse_pane_records(&out))
    }

    pub fn pane_details(&self, target: &PaneTarget) -> Result<PaneRecord> {
        let id = target.to_string();
        let out = self.run("display-message", &["-p", "-t", &id, PANE_FORMAT])?;
        parse_pane_records(&out)
            .into_iter()
            .next()
            .ok_or_else(|| PaneError::tmux("display-message", "no pane details returned"))
    }

    pub fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let out = empty_if_no_server(self.run("list-sessions", &["-F", SESSION_FORMAT]))?;
        Ok(parse_sessions(&out))
    }

    /// Windows in `session`, or in every session when `None`.
    pub fn list_windows(&self, session: Option<&str>) -> Result<Vec<WindowRecord>> {
        let mut args = vec!["-F", WINDOW_FORMAT];
        match session {
            Some(name) => args.extend(["-t", name]),
            None => args.push("-a"),
        }
        let out = empty_if_no_server(self.run("list-windows", &args))?;
        Ok(parse_windows(&out))
    }

    /// Check if a session with exactly this name exists.
    pub fn has_session(&self, name: &str) -> Result<bool> {
        match self.run("has-session", &["-t", &exact_session_target(name)]) {
            Ok(_) => Ok(true),
            Err(PaneError::NoServer | PaneError::SessionNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Create a detached session if missing. Returns true when created.
    pub fn ensure_session(&self, name: &str) -> Result<bool> {
        if self.has_session(name)? {
            return Ok(false);
        }
        self.run("new-session", &["-d", "-s", name])?;
        info!(session = name, "tmux session created");
        Ok(true)
    }

    /// Open a pane running `command` (or a shell).
    ///
    /// Inside tmux the current window is split; outside, a new window is
    /// added to `managed_session` (created on demand).
    pub fn launch(
        &self,
        inside_tmux: bool,
        managed_session: &str,
        command: Option<&str>,
        split: Option<Split>,
    ) -> Result<PaneTarget> {
        if inside_tmux {
            return self.split_window(None, split, command);
        }
        self.ensure_session(managed_session)?;
        self.new_window(managed_session, None, command)
    }

    /// Run a pane-creating subcommand and parse the new pane's id.
    fn spawn_pane<'a>(&self, subcommand: &str, mut args: Vec<&'a str>, command: Option<&'a str>) -> Result<PaneTarget> {
        args.extend(["-P", "-F", FORMATTED_ID]);
        if let Some(cmd) = command.map(str::trim).filter(|c| !c.is_empty()) {
            args.extend(["sh", "-lc", cmd]);
        }
        let out = self.run(subcommand, &args)?;
        let target: PaneTarget = out.trim().parse()?;
        info!(pane = %target, via = subcommand, "pane created");
        Ok(target)
    }

    /// Kill a pane, refusing to kill the pane this process runs in.
    pub fn kill_pane(&self, target: &PaneTarget, own_pane: Option<&PaneTarget>) -> Result<()> {
        if own_pane == Some(target) {
            return Err(PaneError::tmux("kill-pane", "refusing to kill the current pane"));
        }
        self.run("kill-pane", &["-t", &target.to_string()])?;
        info!(pane = %target, "tmux pane killed");
        Ok(())
    }

    pub fn kill_session(&self, name: &str) -> Result<()> {
        self.run("kill-session", &["-t", &exact_session_target(name)])?;
        info!(session = name, "tmux session killed");
        Ok(())
    }

    /// Attach to an existing session (blocks until detach/exit).
    pub fn attach(&self, name: &str) -> Result<()> {
        if !self.has_session(name)? {
            return Err(PaneError::SessionNotFound(name.to_string()));
        }
        // A bare name would prefix-match another session.
        let target = exact_session_target(name);
        let status = Command::new(&self.program)
            .args(["attach-session", "-t", target.as_str()])
            .status()
            .map_err(|e| PaneError::tmux("attach-session", e.to_string()))?;
        if !status.success() {
            return Err(PaneError::tmux(
                "attach-session",
                "tmux attach exited with non-zero status",
            ));
        }
        Ok(())
    }
}

impl Workspace for Tmux {
    fn ensure_session(&self, name: &str) -> Result<bool> {
        Tmux::ensure_session(self, name)
    }

    fn session_windows(&self, session: &str) -> Result<Vec<WindowRecord>> {
        self.list_windows(Some(&exact_session_target(session)))
    }

    fn new_window(&self, session: &str, name: Option<&str>, command: Option<&str>) -> Result<PaneTarget> {
        let window = format!("{}:", exact_session_target(session));
        let mut args = vec!["-t", window.as_str()];
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            args.extend(["-n", name]);
        }
        self.spawn_pane("new-window", args, command)
    }

    fn split_window(&self, window: Option<&str>, split: Option<Split>, command: Option<&str>) -> Result<PaneTarget> {
        let mut args = Vec::new();
        if let Some(window) = window {
            args.extend(["-t", window]);
        }
        match split {
            Some(Split::Horizontal) => args.push("-h"),
            Some(Split::Vertical) => args.push("-v"),
            None => {}
        }
        self.spawn_pane("split-window", args, command)
    }

    fn set_pane_title(&self, pane: &PaneTarget, title: &str) -> Result<()> {
        self.run("select-pane", &["-t", &pane.to_string(), "-T", title])?;
        Ok(())
    }

    fn select_layout(&self, window: &str, layout: &str) -> Result<()> {
        self.run("select-layout", &["-t", window, layout])?;
        Ok(())
    }
}

impl PaneSource for Tmux {
    fn capture(&self, pane: &PaneTarget, max_lines: usize) -> Result<String> {
        self.capture_pane(pane, max_lines, false)
    }

    fn last_activity(&self, pane: &PaneTarget) -> Result<Option<SystemTime>> {
        self.pane_activity(pane)
    }
}

impl CommandInjector for Tmux {
    fn send_literal(
        &self,
        pane: &PaneTarget,
        text: &str,
        press_enter: bool,
        enter_delay: Duration,
    ) -> Result<()> {
        let id = pane.to_string();
        if !text.is_empty() {
            // `-l` keeps punctuation from being read as key names.
            self.run("send-keys", &["-t", &id, "-l", "--", text])?;
        }
        if press_enter {
            if !enter_delay.is_zero() {
                std::thread::sleep(enter_delay);
            }
            self.run("send-keys", &["-t", &id, "C-m"])?;
        }
        debug!(pane = %pane, len = text.len(), enter = press_enter, "sent literal text");
        Ok(())
    }

    fn send_keys(&self, pane: &PaneTarget, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let id = pane.to_string();
        let mut args = vec!["-t", id.as_str()];
        args.extend(keys.iter().map(String::as_str));
        self.run("send-keys", &args)?;
        debug!(pane = %pane, keys = ?keys, "sent keys");
        Ok(())
    }
}

impl PaneDirectory for Tmux {
    fn list_panes(&self) -> Result<Vec<PaneRecord>> {
        self.list_pane_records()
    }

    fn current_pane(&self, hint: Option<&str>) -> Result<Option<String>> {
        let mut args = vec!["-p"];
        if let Some(pane) = hint {
            args.extend(["-t", pane]);
        }
        args.push(FORMATTED_ID);
        let out = self.run("display-message", &args)?;
        let id = out.trim();
        Ok((!id.is_empty()).then(|| id.to_string()))
    }
}

/// Listings report "no server" as nothing to list.
fn empty_if_no_server(result: Result<String>) -> Result<String> {
    match result {
        Err(PaneError::NoServer) => Ok(String::new()),
        other => other,
    }
}

fn exact_session_target(name: &str) -> String {
    if name.starts_with('=') {
        name.to_string()
    } else {
        format!("={name}")
    }
}

/// Map a failed tmux invocation to a typed error using its stderr.
pub fn classify_failure(command: &str, stderr: &str, status: Option<i32>) -> PaneError {
    let msg = stderr.trim();
    let lower = msg.to_lowercase();
    if lower.contains("no server running") || lower.contains("error connecting to") {
        return PaneError::NoServer;
    }
    if lower.contains("can't find session") || lower.contains("no current session") {
        return PaneError::SessionNotFound(msg.to_string());
    }
    if msg.is_empty() {
        let status = status.map_or_else(|| "signal".to_string(), |c| c.to_string());
        return PaneError::tmux(command, format!("exited with status {status}"));
    }
    PaneError::tmux(command, msg)
}

fn parse_flag(raw: &str) -> bool {
    raw.trim() == "1"
}

fn parse_num(raw: &str) -> u32 {
    raw.trim().parse().unwrap_or(0)
}

fn parse_epoch_secs(raw: &str) -> Option<u64> {
    raw.trim().parse::<i64>().ok().filter(|s| *s > 0).map(|s| s as u64)
}

/// Epoch seconds to a UTC timestamp; blank, zero, or garbage means unknown.
pub fn parse_epoch(raw: &str) -> Option<DateTime<Utc>> {
    parse_epoch_secs(raw).and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
}

pub fn parse_pane_records(output: &str) -> Vec<PaneRecord> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 12 {
                return None;
            }
            Some(PaneRecord {
                session: parts[0].to_string(),
                window_index: parse_num(parts[1]),
                window_name: parts[2].to_string(),
                window_active: parse_flag(parts[3]),
                pane_index: parse_num(parts[4]),
                pane_id: parts[5].to_string(),
                active: parse_flag(parts[6]),
                command: parts[7].to_string(),
                title: parts[8].to_string(),
                path: parts[9].to_string(),
                pid: parts[10].trim().parse().ok().filter(|p| *p > 0),
                activity_at: parse_epoch(parts[11]),
            })
        })
        .collect()
}

pub fn parse_sessions(output: &str) -> Vec<SessionRecord> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 5 {
                return None;
            }
            Some(SessionRecord {
                name: parts[0].to_string(),
                windows: parse_num(parts[1]),
                attached: parse_num(parts[2]),
                created_at: parse_epoch(parts[3]),
                activity_at: parse_epoch(parts[4]),
            })
        })
        .collect()
}

pub fn parse_windows(output: &str) -> Vec<WindowRecord> {
    output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(4, '\t');
            let session = parts.next()?;
            let index = parts.next()?;
            let active = parts.next()?;
            let name = parts.next()?;
            Some(WindowRecord {
                session: session.to_string(),
                window_index: parse_num(index),
                active: parse_flag(active),
                name: name.to_string(),
            })
        })
        .collect()
}
