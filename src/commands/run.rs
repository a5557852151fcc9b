//! Commands built on the idle detector: run, wait, stop, and follow.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use super::App;
use crate::config;
use crate::detector::{IdleDetector, IdleReport, SystemClock};
use crate::follow::{self, FollowEvent, FollowOptions};
use crate::output::{EventWriter, Report};
use crate::runner::{RunRequest, RunResult, Runner};
use crate::tmux::CommandInjector;

/// `run` flags as given on the command line; unset values fall back to
/// `[run]` config.
#[derive(Debug, Clone, Default)]
pub struct RunFlags {
    pub command: String,
    pub idle: Option<f64>,
    pub timeout: Option<f64>,
    pub lines: Option<usize>,
    pub exit_code: bool,
    pub exit_tag: Option<String>,
    pub exit_propagate: bool,
    pub segment: bool,
}

impl RunFlags {
    pub fn request(&self, defaults: &config::RunSettings) -> RunRequest {
        let exit_tag = self
            .exit_tag
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(defaults.exit_tag.as_str())
            .to_string();
        RunRequest {
            command: self.command.clone(),
            idle_quiet: config::secs(self.idle.unwrap_or(defaults.idle_secs)),
            timeout: defaults.timeout(self.timeout),
            capture_lines: self.lines.unwrap_or(defaults.lines),
            // Propagation needs the code, so it implies --exit-code.
            want_exit_code: self.exit_code || self.exit_propagate,
            want_segment: self.segment,
            propagate_exit: self.exit_propagate,
            exit_tag,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub pane_id: String,
    #[serde(flatten)]
    pub result: RunResult,
    #[serde(skip)]
    show_exit: bool,
}

impl Report for RunReport {
    fn table(&self) -> String {
        let mut out = self.result.output.clone();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        if self.show_exit {
            match self.result.exit_code {
                Some(code) => out.push_str(&format!("\nExit code: {code}\n")),
                None => out.push_str("\nExit code: unknown\n"),
            }
        }
        out
    }

    fn quiet(&self) -> Option<String> {
        self.result
            .exit_code
            .filter(|_| self.show_exit)
            .map(|c| c.to_string())
    }
}

pub fn run(app: &App, pane: &str, flags: &RunFlags) -> Result<()> {
    let target = app.resolve_pane(pane)?;
    let req = flags.request(&app.config.run);
    let clock = SystemClock;
    let session = Runner::new(&app.tmux, &clock)
        .with_poll_interval(app.config.wait.poll_interval())
        .with_hash_lines(app.config.wait.hash_lines)
        .run(&target, &req)?;

    app.emit(&RunReport {
        pane_id: target.to_string(),
        result: session.result.clone(),
        show_exit: req.want_exit_code,
    })?;
    session.verdict()?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct WaitReport {
    pub pane_id: String,
    pub idle: bool,
    pub timed_out: bool,
    #[serde(flatten)]
    pub report: Option<IdleReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_error: Option<String>,
}

impl Report for WaitReport {
    fn table(&self) -> String {
        if self.idle {
            format!("Pane {} is idle.\n", self.pane_id)
        } else {
            format!("Pane {} did not become idle in time.\n", self.pane_id)
        }
    }

    fn quiet(&self) -> Option<String> {
        Some(if self.idle { "idle" } else { "timeout" }.to_string())
    }
}

pub fn wait(app: &App, pane: &str, idle: Option<f64>, timeout: Option<f64>) -> Result<()> {
    let target = app.resolve_pane(pane)?;
    let quiet = config::secs(idle.unwrap_or(app.config.run.idle_secs));
    let timeout = app.config.run.timeout(timeout);
    let clock = SystemClock;
    let detector = IdleDetector::new(&app.tmux, &clock)
        .with_poll_interval(app.config.wait.poll_interval())
        .with_hash_lines(app.config.wait.hash_lines);

    match detector.wait_idle(&target, quiet, timeout) {
        Ok(report) => app.emit(&WaitReport {
            pane_id: target.to_string(),
            idle: true,
            timed_out: false,
            report: Some(report),
            wait_error: None,
        }),
        Err(e) if e.is_timeout() => {
            app.emit(&WaitReport {
                pane_id: target.to_string(),
                idle: false,
                timed_out: true,
                report: None,
                wait_error: Some(e.to_string()),
            })?;
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

#[derive(Debug, Serialize)]
pub struct StopReport {
    pub pane_id: String,
    pub interrupted: bool,
    pub killed: bool,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_error: Option<String>,
}

impl Report for StopReport {
    fn table(&self) -> String {
        if self.killed {
            format!("Pane {} did not settle after Ctrl+C; killed.\n", self.pane_id)
        } else if self.timed_out {
            format!("Pane {} did not settle after Ctrl+C.\n", self.pane_id)
        } else {
            format!("Pane {} stopped.\n", self.pane_id)
        }
    }

    fn quiet(&self) -> Option<String> {
        Some(if self.killed { "killed" } else { "interrupted" }.to_string())
    }
}

/// Ctrl+C, wait for the pane to settle, and kill it if it never does.
pub fn stop(
    app: &App,
    pane: &str,
    idle: Option<f64>,
    timeout: Option<f64>,
    kill_on_timeout: bool,
) -> Result<()> {
    let target = app.resolve_pane(pane)?;
    let quiet = config::secs(idle.unwrap_or(app.config.stop.idle_secs));
    let timeout = app.config.stop.timeout(timeout);

    app.tmux.interrupt(&target)?;
    info!(pane = %target, "sent Ctrl+C");

    let clock = SystemClock;
    let detector = IdleDetector::new(&app.tmux, &clock)
        .with_poll_interval(app.config.wait.poll_interval())
        .with_hash_lines(app.config.wait.hash_lines);
    let mut report = StopReport {
        pane_id: target.to_string(),
        interrupted: true,
        killed: false,
        timed_out: false,
        wait_error: None,
    };

    let err = match detector.wait_idle(&target, quiet, timeout) {
        Ok(_) => return app.emit(&report),
        Err(e) if e.is_timeout() => e,
        Err(e) => return Err(e.into()),
    };
    report.timed_out = true;
    report.wait_error = Some(err.to_string());

    if !kill_on_timeout {
        app.emit(&report)?;
        return Err(err.into());
    }

    warn!(pane = %target, "pane did not settle; killing");
    app.tmux.kill_pane(&target, app.own_pane().as_ref())?;
    report.killed = true;
    app.emit(&report)
}

/// Stream new pane lines until Ctrl+C, `--duration`, or `--once`.
pub fn follow(
    app: &App,
    pane: &str,
    lines: Option<usize>,
    interval: Option<f64>,
    from_start: bool,
    duration: Option<f64>,
    once: bool,
) -> Result<()> {
    let target = app.resolve_pane(pane)?;
    let opts = FollowOptions {
        // Replaying from the start needs the whole scrollback.
        lines: match lines {
            Some(n) => n,
            None if from_start => 0,
            None => app.config.follow.lines,
        },
        interval: config::secs(interval.unwrap_or(app.config.follow.interval_secs)),
        from_start,
        duration: duration.map(config::secs),
        once,
    };

    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = stop.clone();
    ctrlc::set_handler(move || {
        stop_clone.store(true, Ordering::Relaxed);
    })
    .ok();

    let clock = SystemClock;
    let mut stdout = std::io::stdout().lock();
    let mut writer = EventWriter::new(app.format, &mut stdout);
    follow::follow(&app.tmux, &clock, &target, &opts, &stop, |line| {
        writer.write(&FollowEvent::now(line), line)
    })
}
