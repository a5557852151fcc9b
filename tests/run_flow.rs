//! End-to-end `run` and `follow` flows against a scripted pane, using only the
//! library's public seams.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use panectl::detector::Clock;
use panectl::error::{PaneError, Result};
use panectl::follow::{self, FollowOptions};
use panectl::runner::{RunRequest, Runner, WaitOutcome};
use panectl::sentinel::{DEFAULT_EXIT_TAG, SentinelTags};
use panectl::target::PaneTarget;
use panectl::tmux::{CommandInjector, PaneSource};

const RUN_ID: &str = "feedc0ffee42";

struct TestClock {
    base: Instant,
    offset: Cell<Duration>,
}

impl TestClock {
    fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Cell::new(Duration::ZERO),
        }
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.base + self.offset.get()
    }

    fn wall(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000) + self.offset.get()
    }

    fn sleep(&self, duration: Duration) {
        self.offset.set(self.offset.get() + duration);
    }
}

/// A pane without activity timestamps. A sent command is echoed, then its
/// output appears one line per capture.
struct ScriptedShell {
    screen: RefCell<Vec<String>>,
    pending: RefCell<VecDeque<String>>,
    body: Vec<String>,
    exit: i32,
    /// Emit a fresh line on every capture once the script is exhausted.
    never_settles: bool,
    ticks: Cell<usize>,
}

impl ScriptedShell {
    fn new(scrollback: &[&str], body: &[&str], exit: i32) -> Self {
        Self {
            screen: RefCell::new(scrollback.iter().map(|s| s.to_string()).collect()),
            pending: RefCell::new(VecDeque::new()),
            body: body.iter().map(|s| s.to_string()).collect(),
            exit,
            never_settles: false,
            ticks: Cell::new(0),
        }
    }
}

impl PaneSource for ScriptedShell {
    fn capture(&self, _pane: &PaneTarget, max_lines: usize) -> Result<String> {
        let tick = self.ticks.get() + 1;
        self.ticks.set(tick);
        let next = self.pending.borrow_mut().pop_front();
        match next {
            Some(line) => self.screen.borrow_mut().push(line),
            None if self.never_settles => self.screen.borrow_mut().push(format!("tick {tick}")),
            None => {}
        }

        let screen = self.screen.borrow();
        let start = if max_lines == 0 {
            0
        } else {
            screen.len().saturating_sub(max_lines)
        };
        let mut text = screen[start..].join("\n");
        text.push('\n');
        Ok(text)
    }

    fn last_activity(&self, _pane: &PaneTarget) -> Result<Option<SystemTime>> {
        Ok(None)
    }
}

impl CommandInjector for ScriptedShell {
    fn send_literal(&self, _pane: &PaneTarget, text: &str, press_enter: bool, _delay: Duration) -> Result<()> {
        assert!(press_enter);
        self.screen.borrow_mut().push(format!("$ {text}"));

        let tags = SentinelTags::for_run(RUN_ID, Some(DEFAULT_EXIT_TAG));
        let mut pending = self.pending.borrow_mut();
        pending.push_back(tags.start.clone());
        pending.extend(self.body.iter().cloned());
        pending.push_back(format!("{DEFAULT_EXIT_TAG}{}", self.exit));
        pending.push_back(tags.end.clone());
        pending.push_back("$ ".to_string());
        Ok(())
    }

    fn send_keys(&self, _pane: &PaneTarget, _keys: &[String]) -> Result<()> {
        Ok(())
    }
}

fn pane() -> PaneTarget {
    PaneTarget::new("work", 2, 1)
}

fn request(propagate: bool) -> RunRequest {
    RunRequest {
        command: "make build".to_string(),
        idle_quiet: Duration::from_millis(900),
        timeout: Duration::from_secs(10),
        capture_lines: 200,
        want_exit_code: true,
        want_segment: true,
        propagate_exit: propagate,
        exit_tag: DEFAULT_EXIT_TAG.to_string(),
    }
}

#[test]
fn run_waits_for_output_to_settle_and_extracts_segment() {
    let clock = TestClock::new();
    let shell = ScriptedShell::new(&["old prompt"], &["compiling", "finished"], 3);
    let session = Runner::new(&shell, &clock)
        .run_with_id(&pane(), &request(false), RUN_ID)
        .unwrap();

    assert!(matches!(session.wait, WaitOutcome::Idle(_)));
    assert_eq!(session.result.output, "compiling\nfinished\n");
    assert_eq!(session.result.exit_code, Some(3));
    assert!(session.result.exit_found);
    assert!(session.wrapped.starts_with("sh -lc "));
    session.verdict().unwrap();
}

#[test]
fn propagated_failure_keeps_the_structured_result() {
    let clock = TestClock::new();
    let shell = ScriptedShell::new(&[], &["boom"], 7);
    let session = Runner::new(&shell, &clock)
        .run_with_id(&pane(), &request(true), RUN_ID)
        .unwrap();

    assert_eq!(session.result.exit_code, Some(7));
    let err = session.verdict().unwrap_err();
    assert_eq!(err.code(), "ERR_COMMAND_EXIT");
    assert_eq!(err.remote_exit_code(), Some(7));
}

#[test]
fn earlier_runs_in_scrollback_are_ignored() {
    let old = SentinelTags::for_run("0123456789ab", Some(DEFAULT_EXIT_TAG));
    let scrollback = [
        old.start.as_str(),
        "stale output",
        "__PANECTL_EXIT:1",
        old.end.as_str(),
    ];
    let clock = TestClock::new();
    let shell = ScriptedShell::new(&scrollback, &["fresh"], 0);
    let session = Runner::new(&shell, &clock)
        .run_with_id(&pane(), &request(true), RUN_ID)
        .unwrap();

    assert_eq!(session.result.output, "fresh\n");
    assert_eq!(session.result.exit_code, Some(0));
    session.verdict().unwrap();
}

#[test]
fn endless_output_times_out_but_still_captures() {
    let clock = TestClock::new();
    let mut shell = ScriptedShell::new(&[], &["loop"], 0);
    shell.never_settles = true;
    let mut req = request(false);
    req.timeout = Duration::from_secs(2);

    let session = Runner::new(&shell, &clock)
        .run_with_id(&pane(), &req, RUN_ID)
        .unwrap();

    assert!(session.result.wait_error.is_some());
    assert!(matches!(session.verdict(), Err(PaneError::IdleTimeout { .. })));
    assert!(clock.offset.get() <= Duration::from_secs(2));
}

#[test]
fn follow_streams_only_new_lines() {
    let clock = TestClock::new();
    let shell = ScriptedShell::new(&["before"], &[], 0);
    shell.pending.borrow_mut().extend(["one".to_string(), "two".to_string()]);
    let opts = FollowOptions {
        lines: 50,
        interval: Duration::from_millis(500),
        from_start: false,
        duration: Some(Duration::from_secs(2)),
        once: false,
    };
    let stop = Arc::new(AtomicBool::new(false));

    let mut seen = Vec::new();
    follow::follow(&shell, &clock, &pane(), &opts, &stop, |line| {
        seen.push(line.to_string());
        Ok::<(), PaneError>(())
    })
    .unwrap();

    // The first capture already holds "one"; only later lines stream.
    assert_eq!(seen, vec!["two"]);
}
