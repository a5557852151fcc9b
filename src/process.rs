//! Process table snapshot via `ps`, used to show what runs inside a pane.

use std::collections::{HashMap, HashSet};
use std::process::Command;

use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub ppid: u32,
    pub command: String,
}

/// One process in a tree walk; `depth` 0 is the root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessNode {
    pub pid: u32,
    pub ppid: u32,
    pub command: String,
    pub depth: usize,
}

/// Every process on the host (`ps -A -o pid=,ppid=,command=`).
pub fn list_processes() -> std::io::Result<Vec<ProcessInfo>> {
    let output = Command::new("ps")
        .args(["-A", "-o", "pid=,ppid=,command="])
        .output()?;
    if !output.status.success() {
        return Err(std::io::Error::other(format!(
            "ps exited with {}",
            output.status
        )));
    }
    Ok(parse_process_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse `pid ppid command...` rows; rows without a command are skipped.
pub fn parse_process_list(output: &str) -> Vec<ProcessInfo> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pid = fields.next()?.parse().ok()?;
            let ppid = fields.next()?.parse().ok()?;
            let command = fields.collect::<Vec<_>>().join(" ");
            (!command.is_empty()).then_some(ProcessInfo { pid, ppid, command })
        })
        .collect()
}

/// Depth-first walk from `root`, children in pid order. Empty when `root`
/// is not in `procs`.
pub fn build_process_tree(root: u32, procs: &[ProcessInfo]) -> Vec<ProcessNode> {
    let by_pid: HashMap<u32, &ProcessInfo> = procs.iter().map(|p| (p.pid, p)).collect();
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for p in procs {
        if p.pid != p.ppid {
            children.entry(p.ppid).or_default().push(p.pid);
        }
    }
    for pids in children.values_mut() {
        pids.sort_unstable();
    }

    let mut nodes = Vec::new();
    if !by_pid.contains_key(&root) {
        return nodes;
    }
    let mut seen = HashSet::new();
    let mut stack = vec![(root, 0)];
    while let Some((pid, depth)) = stack.pop() {
        if !seen.insert(pid) {
            continue;
        }
        let Some(info) = by_pid.get(&pid) else {
            continue;
        };
        nodes.push(ProcessNode {
            pid,
            ppid: info.ppid,
            command: info.command.clone(),
            depth,
        });
        if let Some(kids) = children.get(&pid) {
            stack.extend(kids.iter().rev().map(|&kid| (kid, depth + 1)));
        }
    }
    nodes
}

/// Tree rooted at `pid`, or empty when `ps` fails or the pid is gone.
pub fn process_tree(pid: u32) -> Vec<ProcessNode> {
    match list_processes() {
        Ok(procs) => build_process_tree(pid, &procs),
        Err(e) => {
            debug!(pid, error = %e, "process listing failed");
            Vec::new()
        }
    }
}
