//! Sentinel markers for `run`.
//!
//! A wrapped command prints a unique start marker, runs the user's command
//! in a subshell, optionally prints its exit status behind an exit tag, and
//! prints a unique end marker. Extraction works on plain captured pane text
//! that may also hold scrollback, the echoed command line, and markers from
//! earlier runs, so the *last* start marker wins.

use uuid::Uuid;

const START_PREFIX: &str = "__PANECTL_RUN_START:";
const END_PREFIX: &str = "__PANECTL_RUN_END:";
pub const DEFAULT_EXIT_TAG: &str = "__PANECTL_EXIT:";

/// Markers for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelTags {
    pub start: String,
    pub end: String,
    /// Present only when the exit status is captured.
    pub exit: Option<String>,
}

impl SentinelTags {
    pub fn for_run(run_id: &str, exit_tag: Option<&str>) -> Self {
        Self {
            start: format!("{START_PREFIX}{run_id}__"),
            end: format!("{END_PREFIX}{run_id}__"),
            exit: exit_tag.map(|tag| {
                if tag.trim().is_empty() {
                    DEFAULT_EXIT_TAG.to_string()
                } else {
                    tag.to_string()
                }
            }),
        }
    }
}

/// 48 random bits as 12 hex characters.
pub fn new_run_id() -> String {
    Uuid::new_v4().simple().to_string()[..12].to_string()
}

/// Quote `value` for a POSIX shell using single quotes.
pub fn shell_quote_single(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }
    format!("'{}'", value.replace('\'', r#"'"'"'"#))
}

/// Wrap `command` so its output is fenced by the run's markers.
///
/// `$?` is captured into `status` immediately after the subshell, before any
/// marker `printf` can overwrite it.
pub fn wrap_command(command: &str, tags: &SentinelTags) -> String {
    let mut inner = format!(
        "printf \"\\n{}\\n\"; ( {} ); status=$?;",
        tags.start, command
    );
    if let Some(exit) = &tags.exit {
        inner.push_str(&format!(" printf \"\\n{exit}%d\\n\" \"$status\";"));
    }
    inner.push_str(&format!(" printf \"\\n{}\\n\"", tags.end));
    format!("sh -lc {}", shell_quote_single(&inner))
}

/// Split captured text into lines, dropping the empty piece after a
/// trailing newline.
pub fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<&str> = text.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    lines
}

fn join_lines(lines: &[&str], trailing_newline: bool) -> String {
    let mut out = lines.join("\n");
    if trailing_newline {
        out.push('\n');
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub text: String,
    pub exit_code: Option<i32>,
    pub exit_found: bool,
    pub window_found: bool,
}

/// Find the last line carrying `tag` whose remainder parses as an integer,
/// and remove it. Malformed values are skipped.
fn take_exit_line(lines: &mut Vec<&str>, tag: &str) -> Option<i32> {
    if tag.is_empty() {
        return None;
    }
    for i in (0..lines.len()).rev() {
        let Some(idx) = lines[i].find(tag) else {
            continue;
        };
        let Ok(code) = lines[i][idx + tag.len()..].trim().parse::<i32>() else {
            continue;
        };
        lines.remove(i);
        return Some(code);
    }
    None
}

/// Isolate the output between the last `start` marker and the first `end`
/// marker after it, optionally pulling out the exit status.
pub fn extract_window(
    captured: &str,
    start: &str,
    end: &str,
    exit_tag: Option<&str>,
    want_exit: bool,
) -> Extraction {
    let not_found = || Extraction {
        text: captured.to_string(),
        exit_code: None,
        exit_found: false,
        window_found: false,
    };
    if start.is_empty() || end.is_empty() {
        return not_found();
    }

    let lines = split_lines(captured);
    let Some(start_idx) = lines.iter().rposition(|line| line.contains(start)) else {
        return not_found();
    };
    let end_idx = lines[start_idx + 1..]
        .iter()
        .position(|line| line.contains(end))
        .map_or(lines.len(), |offset| start_idx + 1 + offset);

    let mut window = lines[start_idx + 1..end_idx].to_vec();
    let exit_code = match exit_tag {
        Some(tag) if want_exit => take_exit_line(&mut window, tag),
        _ => None,
    };

    Extraction {
        text: join_lines(&window, captured.ends_with('\n')),
        exit_code,
        exit_found: exit_code.is_some(),
        window_found: true,
    }
}

/// Scan all of `text` for the exit tag. Returns the text without the exit
/// line and the code, or `None` when no valid exit line exists.
pub fn extract_exit_code(text: &str, tag: &str) -> Option<(String, i32)> {
    let mut lines = split_lines(text);
    let code = take_exit_line(&mut lines, tag)?;
    Some((join_lines(&lines, text.ends_with('\n')), code))
}
