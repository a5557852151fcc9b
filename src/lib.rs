//! tmux pane control: target resolution, idle detection, sentinel-wrapped
//! runs, and output streaming, plus the command handlers behind `panectl`.

pub mod alias;
pub mod cli;
pub mod commands;
pub mod config;
pub mod context;
pub mod detector;
pub mod error;
pub mod follow;
pub mod output;
pub mod paths;
pub mod process;
pub mod runner;
pub mod sentinel;
pub mod shell_completion;
pub mod signal;
pub mod target;
pub mod tmux;
