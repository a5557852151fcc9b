//! Run orchestration: send a command, wait for the pane to settle, capture,
//! and cut this run's output out of the capture.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::detector::{Clock, IdleDetector, IdleReport};
use crate::error::{PaneError, Result};
use crate::sentinel::{self, SentinelTags};
use crate::target::PaneTarget;
use crate::tmux::{CommandInjector, PaneSource};

/// Default timeout when the caller passes zero.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub command: String,
    pub idle_quiet: Duration,
    pub timeout: Duration,
    /// Capture limit in lines; 0 is unlimited.
    pub capture_lines: usize,
    pub want_exit_code: bool,
    pub want_segment: bool,
    pub propagate_exit: bool,
    pub exit_tag: String,
}

impl RunRequest {
    fn uses_sentinels(&self) -> bool {
        self.want_exit_code || self.want_segment
    }
}

/// Structured result handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    pub exit_found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_error: Option<String>,
}

#[derive(Debug)]
pub enum WaitOutcome {
    Idle(IdleReport),
    TimedOut(PaneError),
}

/// Everything one `run` invocation produced.
#[derive(Debug)]
pub struct RunSession {
    pub tags: Option<SentinelTags>,
    pub wrapped: String,
    pub wait: WaitOutcome,
    pub raw_capture: String,
    pub result: RunResult,
    propagate_exit: bool,
    want_exit_code: bool,
}

impl RunSession {
    /// Overall outcome of the invocation.
    ///
    /// An idle timeout takes precedence over everything. With propagation,
    /// a requested-but-missing exit code and a non-zero code are errors.
    pub fn verdict(&self) -> Result<()> {
        if let WaitOutcome::TimedOut(PaneError::IdleTimeout { waited }) = &self.wait {
            return Err(PaneError::IdleTimeout { waited: *waited });
        }
        if !self.propagate_exit {
            return Ok(());
        }
        match self.result.exit_code {
            None if self.want_exit_code => Err(PaneError::ExitCodeNotFound),
            Some(code) if code != 0 => Err(PaneError::CommandExit(code)),
            _ => Ok(()),
        }
    }
}

pub struct Runner<'a, M: ?Sized, C: ?Sized> {
    mux: &'a M,
    clock: &'a C,
    poll_interval: Duration,
    hash_lines: usize,
}

impl<'a, M, C> Runner<'a, M, C>
where
    M: PaneSource + CommandInjector + ?Sized,
    C: Clock + ?Sized,
{
    pub fn new(mux: &'a M, clock: &'a C) -> Self {
        Self {
            mux,
            clock,
            poll_interval: crate::detector::DEFAULT_POLL_INTERVAL,
            hash_lines: crate::detector::DEFAULT_HASH_LINES,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_hash_lines(mut self, lines: usize) -> Self {
        self.hash_lines = lines;
        self
    }

    pub fn run(&self, pane: &PaneTarget, req: &RunRequest) -> Result<RunSession> {
        self.run_with_id(pane, req, &sentinel::new_run_id())
    }

    /// Like [`Runner::run`] with a caller-supplied run id.
    pub fn run_with_id(&self, pane: &PaneTarget, req: &RunRequest, run_id: &str) -> Result<RunSession> {
        let tags = req.uses_sentinels().then(|| {
            SentinelTags::for_run(run_id, req.want_exit_code.then_some(req.exit_tag.as_str()))
        });
        let wrapped = match &tags {
            Some(tags) => sentinel::wrap_command(&req.command, tags),
            None => req.command.clone(),
        };

        self.mux.send_literal(pane, &wrapped, true, Duration::ZERO)?;
        info!(pane = %pane, run_id = run_id, sentinels = tags.is_some(), "command sent");

        let timeout = if req.timeout.is_zero() {
            DEFAULT_TIMEOUT
        } else {
            req.timeout
        };
        let detector = IdleDetector::new(self.mux, self.clock)
            .with_poll_interval(self.poll_interval)
            .with_hash_lines(self.hash_lines);
        let wait = match detector.wait_idle(pane, req.idle_quiet, timeout) {
            Ok(report) => WaitOutcome::Idle(report),
            Err(e) if e.is_timeout() => {
                warn!(pane = %pane, error = %e, "idle wait timed out; capturing anyway");
                WaitOutcome::TimedOut(e)
            }
            Err(e) => return Err(e),
        };

        let raw_capture = self.mux.capture(pane, req.capture_lines)?;
        let mut result = RunResult {
            output: raw_capture.clone(),
            exit_code: None,
            exit_found: false,
            wait_error: match &wait {
                WaitOutcome::TimedOut(e) => Some(e.to_string()),
                WaitOutcome::Idle(_) => None,
            },
        };

        if let Some(tags) = &tags {
            self.extract(pane, req, tags, &raw_capture, &mut result)?;
        }

        Ok(RunSession {
            tags,
            wrapped,
            wait,
            raw_capture,
            result,
            propagate_exit: req.propagate_exit,
            want_exit_code: req.want_exit_code,
        })
    }

    fn extract(
        &self,
        pane: &PaneTarget,
        req: &RunRequest,
        tags: &SentinelTags,
        captured: &str,
        result: &mut RunResult,
    ) -> Result<()> {
        let exit_tag = tags.exit.as_deref();
        let mut found = sentinel::extract_window(
            captured,
            &tags.start,
            &tags.end,
            exit_tag,
            req.want_exit_code,
        );

        if !found.window_found && req.capture_lines > 0 {
            debug!(pane = %pane, lines = req.capture_lines, "start marker outside capture; retrying unlimited");
            // A failed re-capture keeps the limited result.
            match self.mux.capture(pane, 0) {
                Ok(full) => {
                    found = sentinel::extract_window(
                        &full,
                        &tags.start,
                        &tags.end,
                        exit_tag,
                        req.want_exit_code,
                    )
                }
                Err(e) => warn!(pane = %pane, error = %e, "full capture failed"),
            }
        }

        if found.window_found {
            result.output = found.text;
            result.exit_code = found.exit_code;
            result.exit_found = found.exit_found;
        } else {
            debug!(pane = %pane, "run markers not found in capture");
        }

        // Without a window this scans the raw capture, so an exit line left
        // in scrollback by an earlier run can still match. Accepted.
        if req.want_exit_code && !result.exit_found {
            if let Some((text, code)) = exit_tag.and_then(|tag| sentinel::extract_exit_code(&result.output, tag)) {
                result.output = text;
                result.exit_code = Some(code);
                result.exit_found = true;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::testing::ManualClock;
    use std::cell::RefCell;
    use std::time::SystemTime;

    const RUN_ID: &str = "0a1b2c3d4e5f";

    /// Pane that "executes" a wrapped command by appending a scripted screen.
    struct FakeMux<'a> {
        clock: &'a ManualClock,
        sent: RefCell<Vec<String>>,
        /// Text visible after the command ran (unlimited capture).
        screen: RefCell<String>,
        /// Lines returned by a limited capture; `None` honours the limit.
        limited_override: Option<String>,
        /// Keep producing output so the wait never settles.
        busy: bool,
        captures: RefCell<Vec<usize>>,
    }

    impl<'a> FakeMux<'a> {
        fn new(clock: &'a ManualClock, screen: &str) -> Self {
            Self {
                clock,
                sent: RefCell::new(Vec::new()),
                screen: RefCell::new(screen.to_string()),
                limited_override: None,
                busy: false,
                captures: RefCell::new(Vec::new()),
            }
        }
    }

    impl PaneSource for FakeMux<'_> {
        fn capture(&self, _pane: &PaneTarget, max_lines: usize) -> Result<String> {
            self.captures.borrow_mut().push(max_lines);
            if max_lines > 0 {
                if let Some(text) = &self.limited_override {
                    return Ok(text.clone());
                }
            }
            Ok(self.screen.borrow().clone())
        }

        fn last_activity(&self, _pane: &PaneTarget) -> Result<Option<SystemTime>> {
            let at = if self.busy {
                self.clock.elapsed()
            } else {
                Duration::ZERO
            };
            Ok(Some(self.clock.wall_at(at)))
        }
    }

    impl CommandInjector for FakeMux<'_> {
        fn send_literal(&self, _pane: &PaneTarget, text: &str, press_enter: bool, _delay: Duration) -> Result<()> {
            assert!(press_enter, "run always presses Enter");
            self.sent.borrow_mut().push(text.to_string());
            Ok(())
        }

        fn send_keys(&self, _pane: &PaneTarget, _keys: &[String]) -> Result<()> {
            Ok(())
        }
    }

    fn pane() -> PaneTarget {
        PaneTarget::new("dev", 1, 0)
    }

    fn request(command: &str) -> RunRequest {
        RunRequest {
            command: command.to_string(),
            idle_quiet: Duration::from_millis(600),
            timeout: Duration::from_secs(5),
            capture_lines: 200,
            want_exit_code: true,
            want_segment: false,
            propagate_exit: false,
            exit_tag: sentinel::DEFAULT_EXIT_TAG.to_string(),
        }
    }

    fn screen_for(body: &str, code: i32) -> String {
        let tags = SentinelTags::for_run(RUN_ID, Some(sentinel::DEFAULT_EXIT_TAG));
        format!(
            "$ {}\n{}\n{body}\n{}{code}\n{}\n$ \n",
            sentinel::wrap_command("ignored", &tags),
            tags.start,
            sentinel::DEFAULT_EXIT_TAG,
            tags.end
        )
    }

    #[test]
    fn captures_segment_and_exit_code() {
        let clock = ManualClock::new();
        let mux = FakeMux::new(&clock, &screen_for("ok 1\nok 2", 0));
        let session = Runner::new(&mux, &clock)
            .run_with_id(&pane(), &request("make test"), RUN_ID)
            .unwrap();

        assert_eq!(session.result.output, "ok 1\nok 2\n");
        assert_eq!(session.result.exit_code, Some(0));
        assert!(session.result.exit_found);
        assert_eq!(session.result.wait_error, None);
        assert!(matches!(session.wait, WaitOutcome::Idle(_)));
        assert!(session.verdict().is_ok());

        let sent = mux.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].starts_with("sh -lc '"));
        assert!(sent[0].contains("( make test )"));
        assert_eq!(session.wrapped, sent[0]);
    }

    #[test]
    fn propagated_non_zero_exit_is_an_error_but_result_is_kept() {
        let clock = ManualClock::new();
        let mux = FakeMux::new(&clock, &screen_for("boom", 7));
        let mut req = request("false");
        req.propagate_exit = true;

        let session = Runner::new(&mux, &clock)
            .run_with_id(&pane(), &req, RUN_ID)
            .unwrap();
        assert_eq!(session.result.exit_code, Some(7));
        assert!(session.result.exit_found);

        let err = session.verdict().unwrap_err();
        assert_eq!(err.remote_exit_code(), Some(7));
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn non_zero_exit_without_propagation_succeeds() {
        let clock = ManualClock::new();
        let mux = FakeMux::new(&clock, &screen_for("boom", 3));
        let session = Runner::new(&mux, &clock)
            .run_with_id(&pane(), &request("false"), RUN_ID)
            .unwrap();
        assert_eq!(session.result.exit_code, Some(3));
        assert!(session.verdict().is_ok());
    }

    #[test]
    fn missing_exit_code_with_propagation_fails() {
        let clock = ManualClock::new();
        let mux = FakeMux::new(&clock, "$ something else\n");
        let mut req = request("sleep 100 &");
        req.propagate_exit = true;

        let session = Runner::new(&mux, &clock)
            .run_with_id(&pane(), &req, RUN_ID)
            .unwrap();
        assert!(!session.result.exit_found);
        assert_eq!(session.result.output, "$ something else\n");
        assert!(matches!(session.verdict(), Err(PaneError::ExitCodeNotFound)));
    }

    #[test]
    fn truncated_capture_retries_unlimited() {
        let clock = ManualClock::new();
        let mut mux = FakeMux::new(&clock, &screen_for("first\nsecond", 0));
        mux.limited_override = Some("second\n__PANECTL_EXIT:0\n".to_string());

        let session = Runner::new(&mux, &clock)
            .run_with_id(&pane(), &request("seq 2"), RUN_ID)
            .unwrap();
        assert_eq!(session.result.output, "first\nsecond\n");
        assert_eq!(session.result.exit_code, Some(0));
        assert_eq!(mux.captures.borrow().last(), Some(&0));
        assert_eq!(session.raw_capture, "second\n__PANECTL_EXIT:0\n");
    }

    #[test]
    fn unlimited_capture_does_not_retry() {
        let clock = ManualClock::new();
        let mux = FakeMux::new(&clock, "nothing here\n");
        let mut req = request("true");
        req.capture_lines = 0;
        Runner::new(&mux, &clock)
            .run_with_id(&pane(), &req, RUN_ID)
            .unwrap();
        assert_eq!(*mux.captures.borrow(), vec![0]);
    }

    #[test]
    fn exit_tag_outside_window_is_found_by_whole_text_scan() {
        let clock = ManualClock::new();
        let mux = FakeMux::new(&clock, "log line\n__PANECTL_EXIT:5\n");
        let session = Runner::new(&mux, &clock)
            .run_with_id(&pane(), &request("x"), RUN_ID)
            .unwrap();
        assert_eq!(session.result.exit_code, Some(5));
        assert_eq!(session.result.output, "log line\n");
    }

    #[test]
    fn stale_exit_line_from_another_run_is_picked_up_without_a_window() {
        let clock = ManualClock::new();
        let old = SentinelTags::for_run("ffffffffffff", Some(sentinel::DEFAULT_EXIT_TAG));
        let screen = format!(
            "{}\nold output\n__PANECTL_EXIT:1\n{}\n$ x\n",
            old.start, old.end
        );
        let mux = FakeMux::new(&clock, &screen);
        let session = Runner::new(&mux, &clock)
            .run_with_id(&pane(), &request("x"), RUN_ID)
            .unwrap();
        assert!(session.result.exit_found);
        assert_eq!(session.result.exit_code, Some(1));
        assert_eq!(
            session.result.output,
            format!("{}\nold output\n{}\n$ x\n", old.start, old.end)
        );
    }

    #[test]
    fn timeout_is_recorded_and_wins_the_verdict() {
        let clock = ManualClock::new();
        let mut mux = FakeMux::new(&clock, &screen_for("partial", 9));
        mux.busy = true;
        let mut req = request("tail -f log");
        req.timeout = Duration::from_secs(1);
        req.propagate_exit = true;

        let session = Runner::new(&mux, &clock)
            .run_with_id(&pane(), &req, RUN_ID)
            .unwrap();
        assert!(matches!(session.wait, WaitOutcome::TimedOut(_)));
        assert!(session.result.wait_error.as_deref().unwrap().contains("timeout"));
        assert_eq!(session.result.exit_code, Some(9));
        assert!(session.verdict().unwrap_err().is_timeout());
    }

    #[test]
    fn plain_run_sends_raw_command() {
        let clock = ManualClock::new();
        let mux = FakeMux::new(&clock, "hello\n");
        let mut req = request("echo hello");
        req.want_exit_code = false;
        req.propagate_exit = true;

        let session = Runner::new(&mux, &clock).run(&pane(), &req).unwrap();
        assert!(session.tags.is_none());
        assert_eq!(mux.sent.borrow()[0], "echo hello");
        assert_eq!(session.result.output, "hello\n");
        assert!(session.verdict().is_ok());
    }

    #[test]
    fn result_json_omits_absent_fields() {
        let result = RunResult {
            output: "x\n".to_string(),
            exit_code: None,
            exit_found: false,
            wait_error: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json, serde_json::json!({"output": "x\n", "exit_found": false}));
    }
}
