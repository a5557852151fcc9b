//! Streaming pane output: poll, diff against the previous capture, emit new
//! lines in buffer order.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::debug;

use crate::detector::Clock;
use crate::error::PaneError;
use crate::sentinel::split_lines;
use crate::target::PaneTarget;
use crate::tmux::PaneSource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowEvent {
    /// RFC 3339 UTC timestamp of emission.
    pub time: String,
    pub line: String,
}

impl FollowEvent {
    pub fn now(line: impl Into<String>) -> Self {
        Self {
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            line: line.into(),
        }
    }
}

/// Lines of `curr` not already seen at the end of `prev`.
///
/// Finds the longest suffix of `prev` that is a prefix of `curr` and emits
/// what follows it. No overlap means the buffer scrolled past everything we
/// saw, so all of `curr` is new.
pub fn diff_lines<'a>(prev: &[String], curr: &'a [String]) -> &'a [String] {
    if prev.is_empty() {
        return curr;
    }
    let max = prev.len().min(curr.len());
    for k in (1..=max).rev() {
        if prev[prev.len() - k..] == curr[..k] {
            return &curr[k..];
        }
    }
    curr
}

/// Diff for unlimited captures, where the buffer only grows: emit lines past
/// the previously seen count. A shrinking buffer (cleared screen) is emitted
/// whole.
pub fn diff_lines_by_count<'a>(curr: &'a [String], prev_count: &mut usize) -> &'a [String] {
    if *prev_count == 0 || curr.len() < *prev_count {
        *prev_count = curr.len();
        return curr;
    }
    let emit = &curr[*prev_count..];
    *prev_count = curr.len();
    emit
}

#[derive(Debug, Clone)]
pub struct FollowOptions {
    /// Capture limit; 0 is unlimited and switches to count diffing.
    pub lines: usize,
    pub interval: Duration,
    pub from_start: bool,
    /// Stop after this long; `None` runs until stopped.
    pub duration: Option<Duration>,
    pub once: bool,
}

/// Diff state carried between ticks.
#[derive(Debug, Default)]
pub struct FollowState {
    initialized: bool,
    prev: Vec<String>,
    prev_count: usize,
}

impl FollowState {
    /// Feed one capture; returns the lines to emit.
    pub fn advance(&mut self, capture: &str, unlimited: bool, from_start: bool) -> Vec<String> {
        let curr: Vec<String> = split_lines(capture).into_iter().map(str::to_string).collect();
        if !self.initialized {
            self.initialized = true;
            let emit = if from_start { curr.clone() } else { Vec::new() };
            if unlimited {
                self.prev_count = curr.len();
            } else {
                self.prev = curr;
            }
            return emit;
        }
        if unlimited {
            return diff_lines_by_count(&curr, &mut self.prev_count).to_vec();
        }
        let emit = diff_lines(&self.prev, &curr).to_vec();
        self.prev = curr;
        emit
    }
}

/// Poll `pane` and hand each new line to `emit` until stopped.
///
/// Ends after the first tick with `once`, when `duration` has elapsed, or
/// when `stop` is set (Ctrl+C).
pub fn follow<S, C, F, E>(
    source: &S,
    clock: &C,
    pane: &PaneTarget,
    opts: &FollowOptions,
    stop: &Arc<AtomicBool>,
    mut emit: F,
) -> std::result::Result<(), E>
where
    S: PaneSource + ?Sized,
    C: Clock + ?Sized,
    F: FnMut(&str) -> std::result::Result<(), E>,
    E: From<PaneError>,
{
    let interval = if opts.interval.is_zero() {
        Duration::from_secs(1)
    } else {
        opts.interval
    };
    let deadline = opts
        .duration
        .filter(|d| !d.is_zero())
        .and_then(|d| clock.now().checked_add(d));
    let unlimited = opts.lines == 0;
    let mut state = FollowState::default();
    debug!(pane = %pane, lines = opts.lines, interval_ms = interval.as_millis() as u64, "following pane");

    loop {
        if stop.load(Ordering::Relaxed) {
            debug!(pane = %pane, "follow interrupted");
            return Ok(());
        }
        let capture = source.capture(pane, opts.lines)?;
        for line in state.advance(&capture, unlimited, opts.from_start) {
            emit(&line)?;
        }

        if opts.once {
            return Ok(());
        }
        let now = clock.now();
        if deadline.is_some_and(|d| now >= d) {
            return Ok(());
        }
        let nap = match deadline {
            Some(d) => interval.min(d - now),
            None => interval,
        };
        clock.sleep(nap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::testing::ManualClock;
    use crate::error::Result;
    use std::cell::RefCell;
    use std::time::SystemTime;

    fn v(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn overlap_emits_only_new_tail() {
        assert_eq!(diff_lines(&v(&["a", "b", "c"]), &v(&["a", "b", "c", "d"])), v(&["d"]));
        assert_eq!(diff_lines(&v(&["a", "b", "c"]), &v(&["b", "c", "d"])), v(&["d"]));
    }

    #[test]
    fn no_overlap_emits_everything() {
        assert_eq!(diff_lines(&v(&["a", "b"]), &v(&["x"])), v(&["x"]));
        assert_eq!(diff_lines(&[], &v(&["x", "y"])), v(&["x", "y"]));
    }

    #[test]
    fn identical_capture_emits_nothing() {
        assert!(diff_lines(&v(&["a", "b"]), &v(&["a", "b"])).is_empty());
    }

    #[test]
    fn count_diff_tracks_growth_and_reset() {
        let mut count = 2;
        assert_eq!(diff_lines_by_count(&v(&["a", "b", "c"]), &mut count), v(&["c"]));
        assert_eq!(count, 3);
        assert_eq!(diff_lines_by_count(&v(&["z"]), &mut count), v(&["z"]));
        assert_eq!(count, 1);
    }

    #[test]
    fn first_tick_is_silent_unless_from_start() {
        let mut state = FollowState::default();
        assert!(state.advance("a\nb\n", false, false).is_empty());
        assert_eq!(state.advance("a\nb\nc\n", false, false), v(&["c"]));

        let mut state = FollowState::default();
        assert_eq!(state.advance("a\nb\n", true, true), v(&["a", "b"]));
        assert_eq!(state.advance("a\nb\nc\nd\n", true, true), v(&["c", "d"]));
    }

    struct Script {
        frames: RefCell<Vec<&'static str>>,
    }

    impl PaneSource for Script {
        fn capture(&self, _pane: &PaneTarget, _max_lines: usize) -> Result<String> {
            let mut frames = self.frames.borrow_mut();
            let frame = if frames.len() > 1 {
                frames.remove(0)
            } else {
                frames[0]
            };
            Ok(frame.to_string())
        }

        fn last_activity(&self, _pane: &PaneTarget) -> Result<Option<SystemTime>> {
            Ok(None)
        }
    }

    fn opts(duration: Option<Duration>, once: bool) -> FollowOptions {
        FollowOptions {
            lines: 200,
            interval: Duration::from_secs(1),
            from_start: false,
            duration,
            once,
        }
    }

    #[test]
    fn streams_new_lines_until_duration_elapses() {
        let clock = ManualClock::new();
        let source = Script {
            frames: RefCell::new(vec!["a\nb\nc\n", "a\nb\nc\nd\n", "b\nc\nd\ne\nf\n"]),
        };
        let stop = Arc::new(AtomicBool::new(false));
        let mut seen = Vec::new();

        follow(
            &source,
            &clock,
            &PaneTarget::new("s", 0, 0),
            &opts(Some(Duration::from_millis(2500)), false),
            &stop,
            |line| -> Result<()> {
                seen.push(line.to_string());
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(seen, v(&["d", "e", "f"]));
        assert_eq!(clock.elapsed(), Duration::from_millis(2500));
    }

    #[test]
    fn huge_duration_runs_until_stopped() {
        let clock = ManualClock::new();
        let source = Script {
            frames: RefCell::new(vec!["a\n", "a\nb\n", "a\nb\nc\n"]),
        };
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let mut seen = Vec::new();

        follow(
            &source,
            &clock,
            &PaneTarget::new("s", 0, 0),
            &opts(Some(Duration::MAX), false),
            &stop,
            |line| -> Result<()> {
                seen.push(line.to_string());
                if line == "c" {
                    flag.store(true, Ordering::Relaxed);
                }
                Ok(())
            },
        )
        .unwrap();

        assert_eq!(seen, v(&["b", "c"]));
        // Three ticks, each followed by a full interval.
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn once_captures_a_single_tick() {
        let clock = ManualClock::new();
        let source = Script {
            frames: RefCell::new(vec!["x\n"]),
        };
        let stop = Arc::new(AtomicBool::new(false));
        let mut options = opts(None, true);
        options.from_start = true;
        let mut seen = Vec::new();

        follow(&source, &clock, &PaneTarget::new("s", 0, 0), &options, &stop, |line| -> Result<()> {
            seen.push(line.to_string());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, v(&["x"]));
        assert_eq!(clock.sleeps(), 0);
    }

    #[test]
    fn stop_flag_ends_the_loop() {
        let clock = ManualClock::new();
        let source = Script {
            frames: RefCell::new(vec!["x\n"]),
        };
        let stop = Arc::new(AtomicBool::new(true));
        follow(&source, &clock, &PaneTarget::new("s", 0, 0), &opts(None, false), &stop, |_| -> Result<()> {
            panic!("nothing should be emitted")
        })
        .unwrap();
    }
}
