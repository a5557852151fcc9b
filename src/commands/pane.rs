//! Per-pane actions: keystrokes, capture, signals, and pane lifecycle.

use anyhow::{Context as _, Result, anyhow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::inventory::PaneSnapshot;
use super::{App, confirm};
use crate::cli::SplitArg;
use crate::config;
use crate::detector::content_hash;
use crate::output::{Report, active_label, format_relative, push_kv};
use crate::process::{self, ProcessNode};
use crate::signal::{self, Signal};
use crate::target::PaneTarget;
use crate::tmux::{CommandInjector, PaneRecord, Split};

#[derive(Debug, Serialize)]
pub struct SendReport {
    pub pane_id: String,
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
    pub enter: bool,
    pub delay_secs: f64,
}

impl Report for SendReport {
    fn table(&self) -> String {
        format!("Text sent to {}\n", self.pane_id)
    }

    fn quiet(&self) -> Option<String> {
        Some(self.pane_id.clone())
    }
}

/// Type `text`, then any named keys, then Enter unless suppressed.
pub fn send(
    app: &App,
    pane: &str,
    text: &str,
    keys: &[String],
    press_enter: bool,
    delay_enter: Option<f64>,
) -> Result<()> {
    let target = app.resolve_pane(pane)?;
    let delay_secs = delay_enter.unwrap_or(app.config.send.delay_enter_secs).max(0.0);

    app.tmux.send_literal(&target, text, false, config::secs(0.0))?;
    app.tmux.send_keys(&target, keys)?;
    if press_enter {
        app.tmux.send_literal(&target, "", true, config::secs(delay_secs))?;
    }

    app.emit(&SendReport {
        pane_id: target.to_string(),
        text: text.to_string(),
        keys: keys.to_vec(),
        enter: press_enter,
        delay_secs,
    })
}

#[derive(Debug, Serialize)]
pub struct CaptureReport {
    pub pane_id: String,
    pub output: String,
}

impl Report for CaptureReport {
    fn table(&self) -> String {
        let mut out = self.output.clone();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }

    fn quiet(&self) -> Option<String> {
        Some(self.output.trim_end_matches('\n').to_string())
    }
}

pub fn capture(app: &App, pane: &str, lines: Option<usize>, join: bool) -> Result<()> {
    let target = app.resolve_pane(pane)?;
    let lines = lines.unwrap_or(app.config.run.lines);
    let output = app.tmux.capture_pane(&target, lines, join)?;
    app.emit(&CaptureReport {
        pane_id: target.to_string(),
        output,
    })
}

#[derive(Debug, Serialize)]
pub struct ActionReport {
    pub pane_id: String,
    pub action: &'static str,
}

impl Report for ActionReport {
    fn table(&self) -> String {
        let verb = match self.action {
            "interrupt" => "Sent Ctrl+C to",
            _ => "Sent Escape to",
        };
        format!("{verb} {}\n", self.pane_id)
    }

    fn quiet(&self) -> Option<String> {
        Some(self.action.to_string())
    }
}

pub fn interrupt(app: &App, pane: &str) -> Result<()> {
    let target = app.resolve_pane(pane)?;
    app.tmux.interrupt(&target)?;
    app.emit(&ActionReport {
        pane_id: target.to_string(),
        action: "interrupt",
    })
}

pub fn escape(app: &App, pane: &str) -> Result<()> {
    let target = app.resolve_pane(pane)?;
    app.tmux.escape(&target)?;
    app.emit(&ActionReport {
        pane_id: target.to_string(),
        action: "escape",
    })
}

#[derive(Debug, Serialize)]
pub struct KillReport {
    pub pane_id: String,
    pub dry_run: bool,
    pub killed: bool,
}

impl Report for KillReport {
    fn table(&self) -> String {
        if self.dry_run {
            format!("[dry-run] Would kill tmux pane {}\n", self.pane_id)
        } else if self.killed {
            format!("Killed tmux pane {}\n", self.pane_id)
        } else {
            "Aborted. No panes were killed.\n".to_string()
        }
    }

    fn quiet(&self) -> Option<String> {
        self.killed.then(|| self.pane_id.clone())
    }
}

pub fn kill(app: &App, pane: &str, dry_run: bool, yes: bool) -> Result<()> {
    let target = app.resolve_pane(pane)?;
    let own = app.own_pane();
    if own.as_ref() == Some(&target) {
        return Err(anyhow!("refusing to kill the current pane {target}"));
    }

    let mut report = KillReport {
        pane_id: target.to_string(),
        dry_run,
        killed: false,
    };
    if dry_run {
        return app.emit(&report);
    }
    if !yes && !confirm(&format!("Kill tmux pane {target}?"))? {
        return app.emit(&report);
    }

    app.tmux.kill_pane(&target, own.as_ref())?;
    report.killed = true;
    app.emit(&report)
}

#[derive(Debug, Serialize)]
pub struct SignalReport {
    pub pane_id: String,
    pub pid: u32,
    pub signal: String,
}

impl Report for SignalReport {
    fn table(&self) -> String {
        format!("Sent {} to pid {} ({})\n", self.signal, self.pid, self.pane_id)
    }

    fn quiet(&self) -> Option<String> {
        Some(self.pid.to_string())
    }
}

pub fn signal(app: &App, pane: &str, raw: &str) -> Result<()> {
    let target = app.resolve_pane(pane)?;
    let sig = Signal::parse(raw)?;
    let details = app.tmux.pane_details(&target)?;
    let pid = details
        .pid
        .ok_or_else(|| anyhow!("pane {target} has no process id"))?;

    signal::deliver(pid, sig).with_context(|| format!("failed to send {sig} to pid {pid}"))?;
    info!(pane = %target, pid, signal = %sig, "signal delivered");

    app.emit(&SignalReport {
        pane_id: target.to_string(),
        pid,
        signal: sig.to_string(),
    })
}

/// One look at a pane: metadata, idleness by activity timestamp, and a hash
/// of the captured tail.
#[derive(Debug, Serialize)]
pub struct MonitorSnapshot {
    pub pane_id: String,
    pub session: String,
    pub window_index: u32,
    pub pane_index: u32,
    pub active: bool,
    pub command: String,
    pub title: String,
    pub path: String,
    pub pid: Option<u32>,
    pub activity_at: Option<DateTime<Utc>>,
    pub idle_seconds: f64,
    pub idle: bool,
    pub output_hash: String,
    pub lines_checked: usize,
}

impl MonitorSnapshot {
    fn build(
        target: &PaneTarget,
        pane: PaneRecord,
        now: DateTime<Utc>,
        idle_threshold: f64,
        capture: &str,
        lines: usize,
    ) -> Self {
        // Unknown activity reads as busy.
        let idle_seconds = pane
            .activity_at
            .map(|at| ((now - at).num_milliseconds().max(0) as f64) / 1000.0)
            .unwrap_or(0.0);
        let idle = pane.activity_at.is_some() && idle_seconds >= idle_threshold;
        Self {
            pane_id: target.to_string(),
            session: pane.session,
            window_index: pane.window_index,
            pane_index: pane.pane_index,
            active: pane.active,
            command: pane.command,
            title: pane.title,
            path: pane.path,
            pid: pane.pid,
            activity_at: pane.activity_at,
            idle_seconds,
            idle,
            output_hash: content_hash(capture),
            lines_checked: lines,
        }
    }

    fn state(&self) -> &'static str {
        if self.idle { "idle" } else { "busy" }
    }
}

impl Report for MonitorSnapshot {
    fn table(&self) -> String {
        let mut out = format!(
            "Pane {} is {} (idle {:.1}s). hash={}\n",
            self.pane_id,
            self.state(),
            self.idle_seconds,
            self.output_hash
        );
        push_kv(&mut out, "command", &self.command);
        push_kv(&mut out, "title", &self.title);
        push_kv(&mut out, "path", &self.path);
        push_kv(&mut out, "pane", active_label(self.active));
        out
    }

    fn quiet(&self) -> Option<String> {
        Some(self.state().to_string())
    }
}

pub fn monitor(app: &App, pane: &str, idle: Option<f64>, lines: Option<usize>) -> Result<()> {
    let target = app.resolve_pane(pane)?;
    let threshold = idle
        .filter(|v| *v > 0.0)
        .unwrap_or(app.config.run.idle_secs);
    let lines = lines.unwrap_or(app.config.wait.hash_lines);

    let details = app.tmux.pane_details(&target)?;
    let capture = app.tmux.capture_pane(&target, lines, false)?;
    let snapshot = MonitorSnapshot::build(&target, details, Utc::now(), threshold, &capture, lines);
    app.emit(&snapshot)
}

/// Pane metadata plus the processes running under its shell.
#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub pane: PaneSnapshot,
    pub process_tree: Vec<ProcessNode>,
    #[serde(skip)]
    now: DateTime<Utc>,
}

impl Report for InspectReport {
    fn table(&self) -> String {
        let p = &self.pane.pane;
        let mut out = format!("Pane: {} (id={})\n", self.pane.formatted_id, p.pane_id);
        out.push_str(&format!(
            "  active={}  window={}:{} ({})  window_active={}\n",
            p.active, p.session, p.window_index, p.window_name, p.window_active
        ));
        out.push_str(&format!(
            "  cmd={}  title={}  path={}  pid={}  activity={}\n",
            p.command,
            p.title,
            p.path,
            p.pid.map_or_else(|| "-".to_string(), |pid| pid.to_string()),
            format_relative(p.activity_at, self.now),
        ));
        if self.process_tree.is_empty() {
            out.push_str("Process tree: (not available)\n");
            return out;
        }
        out.push_str("Process tree:\n");
        for node in &self.process_tree {
            let indent = "  ".repeat(node.depth);
            out.push_str(&format!("{indent}- {}  {}\n", node.pid, node.command));
        }
        out
    }

    fn quiet(&self) -> Option<String> {
        Some(self.pane.formatted_id.clone())
    }
}

pub fn inspect(app: &App, pane: &str) -> Result<()> {
    let target = app.resolve_pane(pane)?;
    let record = app.tmux.pane_details(&target)?;
    let process_tree = record.pid.map(process::process_tree).unwrap_or_default();
    app.emit(&InspectReport {
        pane: PaneSnapshot {
            formatted_id: record.formatted_id(),
            pane: record,
        },
        process_tree,
        now: Utc::now(),
    })
}

#[derive(Debug, Serialize)]
pub struct LaunchReport {
    pub pane_id: String,
    pub session: String,
    pub window_index: u32,
    pub pane_index: u32,
}

impl LaunchReport {
    fn from_target(target: &PaneTarget) -> Self {
        Self {
            pane_id: target.to_string(),
            session: target.session().to_string(),
            window_index: target.window(),
            pane_index: target.pane(),
        }
    }
}

impl Report for LaunchReport {
    fn table(&self) -> String {
        format!("Launched pane {}\n", self.pane_id)
    }

    fn quiet(&self) -> Option<String> {
        Some(self.pane_id.clone())
    }
}

impl From<SplitArg> for Split {
    fn from(split: SplitArg) -> Self {
        match split {
            SplitArg::H => Split::Horizontal,
            SplitArg::V => Split::Vertical,
        }
    }
}

pub fn launch(app: &App, command: &str, split: Option<SplitArg>, session: Option<&str>) -> Result<()> {
    let session = match app.resolve_session(session)? {
        Some(name) => name,
        None => app.ctx.managed_session.clone(),
    };
    let command = Some(command).filter(|c| !c.trim().is_empty());
    let target = app
        .tmux
        .launch(app.ctx.in_tmux(), &session, command, split.map(Split::from))?;
    app.emit(&LaunchReport::from_target(&target))
}
