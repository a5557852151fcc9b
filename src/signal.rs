//! Signal name lookup and delivery to a pane's process.

use std::fmt;

use crate::error::{PaneError, Result};

/// Signals addressable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedSignal {
    Hup,
    Int,
    Quit,
    Kill,
    Term,
    Usr1,
    Usr2,
}

const TABLE: &[(&str, NamedSignal)] = &[
    ("HUP", NamedSignal::Hup),
    ("INT", NamedSignal::Int),
    ("QUIT", NamedSignal::Quit),
    ("KILL", NamedSignal::Kill),
    ("TERM", NamedSignal::Term),
    ("USR1", NamedSignal::Usr1),
    ("USR2", NamedSignal::Usr2),
];

impl NamedSignal {
    #[cfg(unix)]
    fn number(self) -> i32 {
        match self {
            NamedSignal::Hup => libc::SIGHUP,
            NamedSignal::Int => libc::SIGINT,
            NamedSignal::Quit => libc::SIGQUIT,
            NamedSignal::Kill => libc::SIGKILL,
            NamedSignal::Term => libc::SIGTERM,
            NamedSignal::Usr1 => libc::SIGUSR1,
            NamedSignal::Usr2 => libc::SIGUSR2,
        }
    }

    fn name(self) -> &'static str {
        TABLE
            .iter()
            .find(|(_, sig)| *sig == self)
            .map_or("?", |(name, _)| name)
    }
}

/// A parsed `--signal` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Named(NamedSignal),
    Number(i32),
}

impl Signal {
    /// Parse `TERM`, `SIGTERM`, `term`, or a number. Blank means TERM.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Signal::Named(NamedSignal::Term));
        }
        let upper = trimmed.to_uppercase();
        let bare = upper.strip_prefix("SIG").unwrap_or(&upper);
        if let Some((_, sig)) = TABLE.iter().find(|(name, _)| *name == bare) {
            return Ok(Signal::Named(*sig));
        }
        match bare.parse::<i32>() {
            Ok(num) if num > 0 => Ok(Signal::Number(num)),
            _ => Err(PaneError::UnsupportedSignal(raw.to_string())),
        }
    }

    #[cfg(unix)]
    pub fn number(self) -> i32 {
        match self {
            Signal::Named(sig) => sig.number(),
            Signal::Number(num) => num,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Named(sig) => write!(f, "SIG{}", sig.name()),
            Signal::Number(num) => write!(f, "SIG{num}"),
        }
    }
}

/// Deliver `signal` to `pid`.
#[cfg(unix)]
pub fn deliver(pid: u32, signal: Signal) -> std::io::Result<()> {
    let pid = libc::pid_t::try_from(pid)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(pid, signal.number()) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
pub fn deliver(_pid: u32, _signal: Signal) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "signal delivery requires a unix platform",
    ))
}
