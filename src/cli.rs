use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "panectl",
    about = "Drive tmux panes: send commands, wait for idle, capture output",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    pub output: OutputFormat,
}

/// `--pane` selector shared by pane-scoped commands.
#[derive(Args, Debug, Clone)]
pub struct PaneArg {
    /// Target pane: session:window.pane, @current, @active, or @<alias>
    #[arg(short, long)]
    pub pane: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List panes grouped by session and window
    List {
        /// Print a flat list instead of grouping by window
        #[arg(long)]
        flat: bool,
    },

    /// List panes with full metadata
    Panes {
        /// Filter by session name or selector (@current, @managed)
        #[arg(long)]
        session: Option<String>,

        /// Filter by window index
        #[arg(long)]
        window: Option<u32>,

        /// Filter by current command (substring, case-insensitive)
        #[arg(long)]
        command: Option<String>,

        /// Filter by pane title (substring, case-insensitive)
        #[arg(long)]
        title: Option<String>,

        /// Filter by working directory (substring, case-insensitive)
        #[arg(long)]
        path: Option<String>,
    },

    /// List tmux sessions
    Sessions,

    /// List windows, for one session or all
    Windows {
        /// Session name or selector (@current, @managed)
        #[arg(long)]
        session: Option<String>,
    },

    /// Show where this shell sits inside tmux
    Status,

    /// Search panes by command, title, or working directory
    Locate {
        /// Text to match (joined with spaces)
        query: Vec<String>,

        /// Query text, as an alternative to the positional form
        #[arg(long = "query", value_name = "QUERY")]
        query_flag: Option<String>,

        /// Field to search
        #[arg(long, value_enum, default_value_t = LocateField::Any)]
        field: LocateField,

        /// Treat the query as a regular expression
        #[arg(long, conflicts_with = "fuzzy")]
        regex: bool,

        /// Match the query as an in-order subsequence
        #[arg(long)]
        fuzzy: bool,

        /// Filter by session name or selector (@current, @managed)
        #[arg(long)]
        session: Option<String>,

        /// Filter by window index
        #[arg(long)]
        window: Option<u32>,
    },

    /// Show pane metadata and the process tree under it
    Inspect {
        #[command(flatten)]
        target: PaneArg,
    },

    /// Type text and/or named keys into a pane
    Send {
        #[command(flatten)]
        target: PaneArg,

        /// Literal text to type
        text: Vec<String>,

        /// tmux key name to send after the text (repeatable: C-c, Up, Enter)
        #[arg(long = "key", value_name = "KEY")]
        keys: Vec<String>,

        /// Do not press Enter after the text
        #[arg(long)]
        no_enter: bool,

        /// Seconds to wait before pressing Enter
        #[arg(long, value_name = "SECS")]
        delay_enter: Option<f64>,
    },

    /// Print a pane's buffer
    Capture {
        #[command(flatten)]
        target: PaneArg,

        /// Limit to the last N lines (0 for the full scrollback)
        #[arg(long)]
        lines: Option<usize>,

        /// Join wrapped lines
        #[arg(long)]
        join: bool,
    },

    /// Block until a pane stops producing output
    Wait {
        #[command(flatten)]
        target: PaneArg,

        /// Seconds without output that count as idle
        #[arg(long, value_name = "SECS")]
        idle: Option<f64>,

        /// Maximum seconds to wait
        #[arg(long, value_name = "SECS")]
        timeout: Option<f64>,
    },

    /// Send a command, wait for idle, then print its output
    Run {
        #[command(flatten)]
        target: PaneArg,

        /// Command text (joined with spaces)
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,

        /// Seconds without output that count as idle
        #[arg(long, value_name = "SECS")]
        idle: Option<f64>,

        /// Maximum seconds to wait
        #[arg(long, value_name = "SECS")]
        timeout: Option<f64>,

        /// Limit capture to the last N lines (0 for the full scrollback)
        #[arg(long)]
        lines: Option<usize>,

        /// Print the command's exit code, captured through a sentinel line
        #[arg(long)]
        exit_code: bool,

        /// Tag that prefixes the exit code line
        #[arg(long, value_name = "TAG")]
        exit_tag: Option<String>,

        /// Fail when the captured exit code is non-zero or missing
        #[arg(long)]
        exit_propagate: bool,

        /// Print only this command's output (runs through sh -lc)
        #[arg(long)]
        segment: bool,
    },

    /// Stream new pane output as it appears
    Follow {
        #[command(flatten)]
        target: PaneArg,

        /// Limit each capture to the last N lines (0 for the full scrollback)
        #[arg(long)]
        lines: Option<usize>,

        /// Seconds between polls
        #[arg(long, value_name = "SECS")]
        interval: Option<f64>,

        /// Emit the current buffer before streaming new lines
        #[arg(long)]
        from_start: bool,

        /// Stop after this many seconds
        #[arg(long, alias = "timeout", value_name = "SECS")]
        duration: Option<f64>,

        /// Capture once and exit
        #[arg(long)]
        once: bool,
    },

    /// Send Ctrl+C to a pane
    Interrupt {
        #[command(flatten)]
        target: PaneArg,
    },

    /// Send Escape to a pane
    Escape {
        #[command(flatten)]
        target: PaneArg,
    },

    /// Ctrl+C a pane, wait for it to settle, kill it if it hangs
    Stop {
        #[command(flatten)]
        target: PaneArg,

        /// Seconds without output that count as idle
        #[arg(long, value_name = "SECS")]
        idle: Option<f64>,

        /// Seconds to wait before killing
        #[arg(long, value_name = "SECS")]
        timeout: Option<f64>,

        /// Leave the pane alive when it does not settle
        #[arg(long)]
        no_kill: bool,
    },

    /// Kill a pane
    Kill {
        #[command(flatten)]
        target: PaneArg,

        /// Show what would be killed
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Send a signal to the process running in a pane
    Signal {
        #[command(flatten)]
        target: PaneArg,

        /// Signal name or number (TERM, SIGKILL, 9, ...)
        #[arg(short, long, default_value = "TERM")]
        signal: String,
    },

    /// One snapshot of pane activity and output hash
    Monitor {
        #[command(flatten)]
        target: PaneArg,

        /// Seconds without activity that count as idle
        #[arg(long, value_name = "SECS")]
        idle: Option<f64>,

        /// Lines hashed from the end of the buffer (0 for all)
        #[arg(long)]
        lines: Option<usize>,
    },

    /// Open a new pane running a shell or command
    Launch {
        /// Command to run in the new pane
        command: Vec<String>,

        /// Inside tmux: split direction
        #[arg(long, value_enum)]
        split: Option<SplitArg>,

        /// Session used outside tmux (default: managed session)
        #[arg(long)]
        session: Option<String>,
    },

    /// Create a window, and optionally a titled pane, only if missing
    Ensure(EnsureArgs),

    /// Attach to a session (default: managed session)
    Attach {
        /// Session name
        session: Option<String>,
    },

    /// Kill the managed session
    Cleanup {
        /// Session to kill (default: managed session)
        #[arg(long)]
        session: Option<String>,

        /// Show what would be killed
        #[arg(long)]
        dry_run: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Manage pane aliases used as @name selectors
    Alias {
        #[command(subcommand)]
        command: AliasCommand,
    },

    /// Print shell completions
    Completions {
        #[arg(value_enum)]
        shell: CompletionShell,
    },

    /// Show effective configuration
    Config,
}

#[derive(Args, Debug, Clone)]
pub struct EnsureArgs {
    /// Command for a newly created pane
    pub command: Vec<String>,

    /// Session name or selector (default: current session, else managed)
    #[arg(long)]
    pub session: Option<String>,

    /// Window name to look up or create
    #[arg(long)]
    pub window: String,

    /// Pane title to look up or create within the window
    #[arg(long)]
    pub pane_title: Option<String>,

    /// Make sure the window has at least N panes (0 to skip)
    #[arg(long, default_value_t = 0)]
    pub panes: usize,

    /// tmux layout to apply when anything was created (tiled, even-horizontal, ...)
    #[arg(long)]
    pub layout: Option<String>,

    /// Split direction for new panes
    #[arg(long, value_enum)]
    pub split: Option<SplitArg>,

    /// Working directory for new panes
    #[arg(long)]
    pub cwd: Option<String>,

    /// Environment for new panes (KEY=VAL, repeatable)
    #[arg(long = "env", value_name = "KEY=VAL")]
    pub env: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum AliasCommand {
    /// List aliases
    List,

    /// Point an alias at a pane (any selector accepted)
    Set {
        /// Alias name (letters, digits, '-', '_', '.')
        name: String,

        /// Pane selector to resolve and store
        target: String,
    },

    /// Remove an alias
    Unset { name: String },

    /// Print the pane an alias points to
    Resolve { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SplitArg {
    /// Side by side
    H,
    /// Stacked
    V,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LocateField {
    Any,
    Command,
    Title,
    Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    Elvish,
    Powershell,
}
