//! Command handlers. Each handler resolves its target, talks to tmux, and
//! hands one [`Report`] to the output layer.

pub mod alias;
pub mod ensure;
pub mod inventory;
pub mod pane;
pub mod run;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use serde::Serialize;
use tracing::debug;

use crate::cli::Command;
use crate::config::ToolConfig;
use crate::context::Context;
use crate::output::{self, OutputFormat, Report, push_kv};
use crate::shell_completion;
use crate::target::{self, PaneTarget};
use crate::tmux::{PaneDirectory, Tmux};

/// Everything a handler needs for one invocation.
pub struct App {
    pub config: ToolConfig,
    pub config_path: Option<PathBuf>,
    pub ctx: Context,
    pub tmux: Tmux,
    pub format: OutputFormat,
}

impl App {
    pub fn new(config: ToolConfig, config_path: Option<PathBuf>, format: OutputFormat) -> Self {
        let ctx = Context::from_process(&config);
        Self {
            config,
            config_path,
            ctx,
            tmux: Tmux::default(),
            format,
        }
    }

    pub fn resolve_pane(&self, raw: &str) -> Result<PaneTarget> {
        Ok(target::resolve_pane_target(raw, &self.ctx, &self.tmux)?)
    }

    pub fn resolve_session(&self, raw: Option<&str>) -> Result<Option<String>> {
        match raw {
            Some(raw) => Ok(target::resolve_session_target(raw, &self.ctx, &self.tmux)?),
            None => Ok(None),
        }
    }

    /// The pane this process runs in, when inside tmux.
    pub fn own_pane(&self) -> Option<PaneTarget> {
        if !self.ctx.in_tmux() {
            return None;
        }
        match self.tmux.current_pane(self.ctx.tmux_pane.as_deref()) {
            Ok(Some(id)) => id.parse().ok(),
            Ok(None) => None,
            Err(e) => {
                debug!(error = %e, "could not determine current pane");
                None
            }
        }
    }

    pub fn emit<R: Report + ?Sized>(&self, report: &R) -> Result<()> {
        output::emit(report, self.format, &mut std::io::stdout().lock())
    }
}

pub fn dispatch(app: &App, command: Command) -> Result<()> {
    match command {
        Command::List { flat } => inventory::list(app, flat),
        Command::Panes {
            session,
            window,
            command,
            title,
            path,
        } => inventory::panes(
            app,
            &inventory::PaneFilter {
                session,
                window,
                command,
                title,
                path,
            },
        ),
        Command::Sessions => inventory::sessions(app),
        Command::Windows { session } => inventory::windows(app, session.as_deref()),
        Command::Status => inventory::status(app),
        Command::Locate {
            query,
            query_flag,
            field,
            regex,
            fuzzy,
            session,
            window,
        } => {
            let query = query_flag
                .filter(|q| !q.trim().is_empty())
                .unwrap_or_else(|| query.join(" "));
            inventory::locate(app, &query, field, regex, fuzzy, session.as_deref(), window)
        }
        Command::Inspect { target } => pane::inspect(app, &target.pane),
        Command::Send {
            target,
            text,
            keys,
            no_enter,
            delay_enter,
        } => pane::send(app, &target.pane, &text.join(" "), &keys, !no_enter, delay_enter),
        Command::Capture {
            target,
            lines,
            join,
        } => pane::capture(app, &target.pane, lines, join),
        Command::Wait {
            target,
            idle,
            timeout,
        } => run::wait(app, &target.pane, idle, timeout),
        Command::Run {
            target,
            command,
            idle,
            timeout,
            lines,
            exit_code,
            exit_tag,
            exit_propagate,
            segment,
        } => run::run(
            app,
            &target.pane,
            &run::RunFlags {
                command: command.join(" "),
                idle,
                timeout,
                lines,
                exit_code,
                exit_tag,
                exit_propagate,
                segment,
            },
        ),
        Command::Follow {
            target,
            lines,
            interval,
            from_start,
            duration,
            once,
        } => run::follow(app, &target.pane, lines, interval, from_start, duration, once),
        Command::Interrupt { target } => pane::interrupt(app, &target.pane),
        Command::Escape { target } => pane::escape(app, &target.pane),
        Command::Stop {
            target,
            idle,
            timeout,
            no_kill,
        } => run::stop(app, &target.pane, idle, timeout, !no_kill),
        Command::Kill {
            target,
            dry_run,
            yes,
        } => pane::kill(app, &target.pane, dry_run, yes),
        Command::Signal { target, signal } => pane::signal(app, &target.pane, &signal),
        Command::Monitor {
            target,
            idle,
            lines,
        } => pane::monitor(app, &target.pane, idle, lines),
        Command::Launch {
            command,
            split,
            session,
        } => pane::launch(app, &command.join(" "), split, session.as_deref()),
        Command::Ensure(args) => ensure::run(app, &args),
        Command::Attach { session } => inventory::attach(app, session.as_deref()),
        Command::Cleanup {
            session,
            dry_run,
            yes,
        } => inventory::cleanup(app, session.as_deref(), dry_run, yes),
        Command::Alias { command } => alias::dispatch(app, command),
        Command::Completions { shell } => shell_completion::print(shell),
        Command::Config => show_config(app),
    }
}

/// Ask before a destructive action. Non-interactive stdin counts as "no".
pub fn confirm(prompt: &str) -> Result<bool> {
    let answer = dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact_opt()
        .context("failed to read confirmation")?;
    Ok(answer.unwrap_or(false))
}

#[derive(Serialize)]
struct ConfigReport<'a> {
    source_path: Option<&'a Path>,
    alias_file: &'a Path,
    #[serde(flatten)]
    config: &'a ToolConfig,
}

fn config_source_label(path: Option<&Path>) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| "(defaults, no config file found)".to_string())
}

impl Report for ConfigReport<'_> {
    fn table(&self) -> String {
        let c = self.config;
        let mut out = String::new();
        out.push_str("General\n");
        push_kv(&mut out, "managed_session", &c.managed_session);
        push_kv(&mut out, "alias_file", self.alias_file.display());
        out.push('\n');

        out.push_str("Run\n");
        push_kv(&mut out, "idle", format!("{}s", c.run.idle_secs));
        push_kv(&mut out, "timeout", format!("{}s", c.run.timeout_secs));
        push_kv(&mut out, "lines", c.run.lines);
        push_kv(&mut out, "exit_tag", &c.run.exit_tag);
        out.push('\n');

        out.push_str("Wait\n");
        push_kv(&mut out, "poll_interval", format!("{}ms", c.wait.poll_interval_millis));
        push_kv(&mut out, "hash_lines", c.wait.hash_lines);
        out.push('\n');

        out.push_str("Follow\n");
        push_kv(&mut out, "interval", format!("{}s", c.follow.interval_secs));
        push_kv(&mut out, "lines", c.follow.lines);
        out.push('\n');

        out.push_str("Stop\n");
        push_kv(&mut out, "idle", format!("{}s", c.stop.idle_secs));
        push_kv(&mut out, "timeout", format!("{}s", c.stop.timeout_secs));
        out.push('\n');

        out.push_str("Send\n");
        push_kv(&mut out, "delay_enter", format!("{}s", c.send.delay_enter_secs));
        out.push('\n');

        out.push_str("Source Path\n");
        push_kv(&mut out, "path", config_source_label(self.source_path));
        out
    }

    fn quiet(&self) -> Option<String> {
        self.source_path.map(|p| p.display().to_string())
    }
}

fn show_config(app: &App) -> Result<()> {
    let report = ConfigReport {
        source_path: app.config_path.as_deref(),
        alias_file: &app.ctx.alias_file,
        config: &app.config,
    };
    app.emit(&report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(config: &ToolConfig) -> ConfigReport<'_> {
        ConfigReport {
            source_path: None,
            alias_file: Path::new("/tmp/aliases.json"),
            config,
        }
    }

    #[test]
    fn config_table_groups_sections() {
        let config = ToolConfig::default();
        let rendered = report(&config).table();
        for section in ["General", "Run", "Wait", "Follow", "Stop", "Send", "Source Path"] {
            assert!(rendered.contains(section), "missing {section}");
        }
        assert!(rendered.contains("__PANECTL_EXIT:"));
        assert!(rendered.contains("300ms"));
        assert!(rendered.contains("(defaults, no config file found)"));
    }

    #[test]
    fn config_json_flattens_sections() {
        let config = ToolConfig::default();
        let json = output::render(&report(&config), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["managed_session"], "panectl");
        assert_eq!(value["run"]["lines"], 200);
        assert_eq!(value["wait"]["poll_interval_millis"], 300);
        assert_eq!(value["alias_file"], "/tmp/aliases.json");
        assert!(value["source_path"].is_null());
    }
}
