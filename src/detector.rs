//! Idle detection for a pane.
//!
//! Polls the pane until nothing has changed for a quiet period, bounded by a
//! timeout. Two progress signals are supported, picked once when the wait
//! starts:
//!
//! ```text
//! Activity     → tmux reports #{pane_activity} → idle when now - max(activity) >= quiet
//! ContentHash  → no activity timestamp         → idle when sha256(tail) unchanged for quiet
//! ```
//!
//! The detector never sleeps longer than the poll interval and never past
//! the deadline; the deadline is checked before every sleep.

use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{PaneError, Result};
use crate::target::PaneTarget;
use crate::tmux::PaneSource;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(300);
pub const DEFAULT_HASH_LINES: usize = 200;

/// Time source for the poll loop.
pub trait Clock {
    /// Monotonic time, used for the deadline and hash bookkeeping.
    fn now(&self) -> Instant;
    /// Wall time, compared against tmux activity timestamps.
    fn wall(&self) -> SystemTime;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Which progress signal decided the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleSignal {
    Activity,
    ContentHash,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdleReport {
    #[serde(serialize_with = "serialize_millis", rename = "waited_ms")]
    pub waited: Duration,
    pub signal: IdleSignal,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Transient polling state for one wait call.
#[derive(Debug)]
enum IdleState {
    Activity {
        /// Highest timestamp seen; never moves backward.
        latest: SystemTime,
    },
    ContentHash {
        last: Option<[u8; 32]>,
        changed_at: Instant,
    },
}

impl IdleState {
    fn signal(&self) -> IdleSignal {
        match self {
            IdleState::Activity { .. } => IdleSignal::Activity,
            IdleState::ContentHash { .. } => IdleSignal::ContentHash,
        }
    }
}

/// Hex SHA-256 of pane text.
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

fn digest(text: &str) -> [u8; 32] {
    Sha256::digest(text.as_bytes()).into()
}

pub struct IdleDetector<'a, S: ?Sized, C: ?Sized> {
    source: &'a S,
    clock: &'a C,
    poll_interval: Duration,
    hash_lines: usize,
}

impl<'a, S, C> IdleDetector<'a, S, C>
where
    S: PaneSource + ?Sized,
    C: Clock + ?Sized,
{
    pub fn new(source: &'a S, clock: &'a C) -> Self {
        Self {
            source,
            clock,
            poll_interval: DEFAULT_POLL_INTERVAL,
            hash_lines: DEFAULT_HASH_LINES,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_hash_lines(mut self, lines: usize) -> Self {
        self.hash_lines = lines;
        self
    }

    fn initial_state(&self, pane: &PaneTarget, started: Instant) -> IdleState {
        match self.source.last_activity(pane) {
            Ok(Some(latest)) => IdleState::Activity { latest },
            Ok(None) => {
                debug!(pane = %pane, "no activity timestamp; hashing pane content");
                IdleState::ContentHash {
                    last: None,
                    changed_at: started,
                }
            }
            Err(e) => {
                warn!(pane = %pane, error = %e, "activity query failed; hashing pane content");
                IdleState::ContentHash {
                    last: None,
                    changed_at: started,
                }
            }
        }
    }

    /// One observation. Returns true when the pane has been quiet long enough.
    fn observe(&self, pane: &PaneTarget, state: &mut IdleState, quiet: Duration) -> Result<bool> {
        match state {
            IdleState::Activity { latest } => {
                if let Some(seen) = self.source.last_activity(pane)? {
                    if seen > *latest {
                        *latest = seen;
                    }
                }
                let quiet_for = self
                    .clock
                    .wall()
                    .duration_since(*latest)
                    .unwrap_or(Duration::ZERO);
                Ok(quiet_for >= quiet)
            }
            IdleState::ContentHash { last, changed_at } => {
                let text = self.source.capture(pane, self.hash_lines)?;
                let hash = digest(&text);
                let now = self.clock.now();
                if *last != Some(hash) {
                    *last = Some(hash);
                    *changed_at = now;
                    return Ok(false);
                }
                Ok(now.duration_since(*changed_at) >= quiet)
            }
        }
    }

    /// Block until the pane is quiet for `quiet`, or fail with
    /// [`PaneError::IdleTimeout`] once `timeout` has elapsed.
    pub fn wait_idle(
        &self,
        pane: &PaneTarget,
        quiet: Duration,
        timeout: Duration,
    ) -> Result<IdleReport> {
        let started = self.clock.now();
        // A timeout past the end of the clock means no deadline at all.
        let deadline = started.checked_add(timeout);
        let mut state = self.initial_state(pane, started);
        debug!(pane = %pane, signal = ?state.signal(), quiet_ms = quiet.as_millis() as u64,
            timeout_ms = timeout.as_millis() as u64, "waiting for idle");

        loop {
            if self.observe(pane, &mut state, quiet)? {
                let waited = self.clock.now().duration_since(started);
                debug!(pane = %pane, waited_ms = waited.as_millis() as u64, "pane idle");
                return Ok(IdleReport {
                    waited,
                    signal: state.signal(),
                });
            }

            let now = self.clock.now();
            let nap = match deadline {
                Some(deadline) if now >= deadline => {
                    let waited = now.duration_since(started);
                    debug!(pane = %pane, waited_ms = waited.as_millis() as u64, "idle wait timed out");
                    return Err(PaneError::IdleTimeout { waited });
                }
                Some(deadline) => self.poll_interval.min(deadline - now),
                None => self.poll_interval,
            };
            self.clock.sleep(nap);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ManualClock;
    use super::*;
    use std::cell::RefCell;

    const POLL: Duration = Duration::from_millis(300);

    fn pane() -> PaneTarget {
        PaneTarget::new("dev", 0, 0)
    }

    /// Content source whose text changes until `stop_at`, then stays fixed.
    struct SettlingText<'a> {
        clock: &'a ManualClock,
        stop_at: Duration,
    }

    impl PaneSource for SettlingText<'_> {
        fn capture(&self, _pane: &PaneTarget, _max_lines: usize) -> Result<String> {
            let t = self.clock.elapsed().min(self.stop_at);
            Ok(format!("tick {}", t.as_millis()))
        }

        fn last_activity(&self, _pane: &PaneTarget) -> Result<Option<SystemTime>> {
            Ok(None)
        }
    }

    /// Activity source replaying a fixed list of timestamps.
    struct ActivityScript<'a> {
        clock: &'a ManualClock,
        script: RefCell<Vec<Duration>>,
    }

    impl PaneSource for ActivityScript<'_> {
        fn capture(&self, _pane: &PaneTarget, _max_lines: usize) -> Result<String> {
            panic!("activity mode must not capture");
        }

        fn last_activity(&self, _pane: &PaneTarget) -> Result<Option<SystemTime>> {
            let mut script = self.script.borrow_mut();
            let next = if script.len() > 1 {
                script.remove(0)
            } else {
                script[0]
            };
            Ok(Some(self.clock.wall_at(next)))
        }
    }

    struct FailingActivity {
        text: &'static str,
    }

    impl PaneSource for FailingActivity {
        fn capture(&self, _pane: &PaneTarget, _max_lines: usize) -> Result<String> {
            Ok(self.text.to_string())
        }

        fn last_activity(&self, _pane: &PaneTarget) -> Result<Option<SystemTime>> {
            Err(PaneError::tmux("display-message", "unknown format"))
        }
    }

    #[test]
    fn hash_mode_succeeds_one_quiet_period_after_output_stops() {
        let clock = ManualClock::new();
        let t0 = Duration::from_millis(900);
        let quiet = Duration::from_millis(600);
        let source = SettlingText {
            clock: &clock,
            stop_at: t0,
        };

        let report = IdleDetector::new(&source, &clock)
            .with_poll_interval(POLL)
            .wait_idle(&pane(), quiet, Duration::from_secs(10))
            .unwrap();

        assert_eq!(report.signal, IdleSignal::ContentHash);
        assert!(report.waited >= t0 + quiet, "too early: {:?}", report.waited);
        assert!(report.waited < t0 + quiet + POLL, "too late: {:?}", report.waited);
    }

    #[test]
    fn endless_output_times_out_within_one_poll() {
        let clock = ManualClock::new();
        let source = SettlingText {
            clock: &clock,
            stop_at: Duration::MAX,
        };
        let timeout = Duration::from_millis(1000);

        let err = IdleDetector::new(&source, &clock)
            .with_poll_interval(POLL)
            .wait_idle(&pane(), Duration::from_millis(500), timeout)
            .unwrap_err();

        assert!(err.is_timeout());
        let PaneError::IdleTimeout { waited } = err else {
            unreachable!()
        };
        assert!(waited >= timeout);
        assert!(waited < timeout + POLL);
    }

    #[test]
    fn never_sleeps_past_deadline() {
        let clock = ManualClock::new();
        let source = SettlingText {
            clock: &clock,
            stop_at: Duration::MAX,
        };
        let _ = IdleDetector::new(&source, &clock)
            .with_poll_interval(POLL)
            .wait_idle(&pane(), Duration::from_secs(5), Duration::from_millis(1000));
        // 0, 300, 600, 900, then a 100ms sleep lands exactly on the deadline.
        assert_eq!(clock.elapsed(), Duration::from_millis(1000));
        assert_eq!(clock.sleeps(), 4);
    }

    #[test]
    fn unrepresentable_deadline_waits_without_one() {
        let clock = ManualClock::new();
        let source = SettlingText {
            clock: &clock,
            stop_at: Duration::from_millis(600),
        };
        let report = IdleDetector::new(&source, &clock)
            .with_poll_interval(POLL)
            .wait_idle(&pane(), Duration::from_millis(300), Duration::MAX)
            .unwrap();
        assert_eq!(report.waited, Duration::from_millis(900));
    }

    #[test]
    fn zero_quiet_in_hash_mode_needs_one_unchanged_repeat() {
        let clock = ManualClock::new();
        let source = SettlingText {
            clock: &clock,
            stop_at: Duration::ZERO,
        };
        let report = IdleDetector::new(&source, &clock)
            .with_poll_interval(POLL)
            .wait_idle(&pane(), Duration::ZERO, Duration::from_secs(5))
            .unwrap();
        assert_eq!(report.waited, POLL);
    }

    #[test]
    fn activity_mode_uses_elapsed_since_last_activity() {
        let clock = ManualClock::new();
        let source = ActivityScript {
            clock: &clock,
            script: RefCell::new(vec![Duration::ZERO]),
        };
        let report = IdleDetector::new(&source, &clock)
            .with_poll_interval(POLL)
            .wait_idle(&pane(), Duration::from_millis(600), Duration::from_secs(5))
            .unwrap();
        assert_eq!(report.signal, IdleSignal::Activity);
        assert_eq!(report.waited, Duration::from_millis(600));
    }

    #[test]
    fn zero_quiet_in_activity_mode_is_idle_on_first_observation() {
        let clock = ManualClock::new();
        let source = ActivityScript {
            clock: &clock,
            script: RefCell::new(vec![Duration::ZERO]),
        };
        let report = IdleDetector::new(&source, &clock)
            .wait_idle(&pane(), Duration::ZERO, Duration::from_secs(5))
            .unwrap();
        assert_eq!(report.waited, Duration::ZERO);
        assert_eq!(clock.sleeps(), 0);
    }

    #[test]
    fn stale_activity_never_moves_bookkeeping_backward() {
        let clock = ManualClock::new();
        // Initial read says 1.2s (in the future of the first poll), then the
        // source briefly reports an older value.
        let source = ActivityScript {
            clock: &clock,
            script: RefCell::new(vec![
                Duration::from_millis(1200),
                Duration::ZERO,
                Duration::ZERO,
            ]),
        };
        let report = IdleDetector::new(&source, &clock)
            .with_poll_interval(POLL)
            .wait_idle(&pane(), Duration::from_millis(300), Duration::from_secs(5))
            .unwrap();
        // Idle only once 300ms passed after 1.2s, not after the stale zero.
        assert_eq!(report.waited, Duration::from_millis(1500));
    }

    #[test]
    fn activity_errors_fall_back_to_hashing() {
        let clock = ManualClock::new();
        let source = FailingActivity { text: "$ " };
        let report = IdleDetector::new(&source, &clock)
            .with_poll_interval(POLL)
            .wait_idle(&pane(), Duration::from_millis(300), Duration::from_secs(5))
            .unwrap();
        assert_eq!(report.signal, IdleSignal::ContentHash);
        // First capture records the hash; the next poll confirms it.
        assert_eq!(report.waited, POLL);
    }

    #[test]
    fn content_hash_is_hex_sha256() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(content_hash("a"), content_hash("b"));
    }
}
