// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process table access: listing, liveness and forced termination

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("process listing failed: {0}")]
    Listing(String),
    #[error("failed to signal process {pid}: {message}")]
    Signal { pid: u32, message: String },
    #[error("process {0} still running after termination")]
    StillRunning(u32),
    #[error("process control unsupported on this platform")]
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub ppid: u32,
    pub name: String,
}

/// Parse one `/proc/<pid>/stat` line: `pid (comm) state ppid ...`
pub fn parse_proc_stat(line: &str) -> Option<(ProcessInfo, char)> {
    let open = line.find('(')?;
    let close = line.rfind(')')?;
    let pid = line[..open].trim().parse().ok()?;
    let name = line.get(open + 1..close)?.to_string();
    let mut rest = line.get(close + 1..)?.split_whitespace();
    let state = rest.next()?.chars().next()?;
    let ppid = rest.next()?.parse().ok()?;
    Some((ProcessInfo { pid, ppid, name }, state))
}

/// Parse `ps -A -o pid=,ppid=,stat=,comm=` output
pub fn parse_ps_output(output: &str) -> Vec<(ProcessInfo, char)> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pid = fields.next()?.parse().ok()?;
            let ppid = fields.next()?.parse().ok()?;
            let state = fields.next()?.chars().next()?;
            let command = fields.collect::<Vec<_>>().join(" ");
            // comm may be a full path on macOS
            let name = command.rsplit('/').next().unwrap_or(&command).to_string();
            Some((ProcessInfo { pid, ppid, name }, state))
        })
        .collect()
}

#[cfg(target_os = "linux")]
fn raw_table() -> Result<Vec<(ProcessInfo, char)>, ProcessError> {
    let entries =
        std::fs::read_dir("/proc").map_err(|e| ProcessError::Listing(e.to_string()))?;
    let mut table = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        // Processes may exit between readdir and read
        if let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) {
            if let Some(row) = parse_proc_stat(&stat) {
                table.push(row);
            }
        }
    }
    Ok(table)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn raw_table() -> Result<Vec<(ProcessInfo, char)>, ProcessError> {
    let output = std::process::Command::new("ps")
        .args(["-A", "-o", "pid=,ppid=,stat=,comm="])
        .output()
        .map_err(|e| ProcessError::Listing(e.to_string()))?;
    if !output.status.success() {
        return Err(ProcessError::Listing(
            String::from_utf8_lossy(&output.stderr).to_string(),
        ));
    }
    Ok(parse_ps_output(&String::from_utf8_lossy(&output.stdout)))
}

#[cfg(not(unix))]
fn raw_table() -> Result<Vec<(ProcessInfo, char)>, ProcessError> {
    Err(ProcessError::Unsupported)
}

/// All live (non-zombie) processes
pub fn list_processes() -> Result<Vec<ProcessInfo>, ProcessError> {
    Ok(raw_table()?
        .into_iter()
        .filter(|(_, state)| *state != 'Z')
        .map(|(info, _)| info)
        .collect())
}

/// Name of the current process as the process table reports it
pub fn current_process_name() -> Option<String> {
    let me = std::process::id();
    raw_table()
        .ok()?
        .into_iter()
        .find(|(info, _)| info.pid == me)
        .map(|(info, _)| info.name)
}

/// Every process whose ancestry includes `root` (excluding `root` itself)
pub fn descendants(table: &[ProcessInfo], root: u32) -> HashSet<u32> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    for p in table {
        children.entry(p.ppid).or_default().push(p.pid);
    }
    let mut found = HashSet::new();
    let mut pending = vec![root];
    while let Some(pid) = pending.pop() {
        for &child in children.get(&pid).map(Vec::as_slice).unwrap_or(&[]) {
            if child != root && found.insert(child) {
                pending.push(child);
            }
        }
    }
    found
}

/// Whether `pid` is running (zombies count as gone)
#[cfg(unix)]
pub fn is_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => !is_zombie(pid),
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn is_alive(_pid: u32) -> bool {
    false
}

#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| parse_proc_stat(&stat))
        .is_some_and(|(_, state)| state == 'Z')
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(pid: u32) -> bool {
    raw_table()
        .map(|table| table.iter().any(|(p, state)| p.pid == pid && *state == 'Z'))
        .unwrap_or(false)
}

/// Force-terminate `pid` and wait up to `grace` for it to disappear.
/// Returns false if the process was already gone.
#[cfg(unix)]
pub fn terminate(pid: u32, grace: Duration) -> Result<bool, ProcessError> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|e| ProcessError::Signal {
        pid,
        message: e.to_string(),
    })?;
    match kill(Pid::from_raw(raw), Signal::SIGKILL) {
        Ok(()) => {}
        Err(Errno::ESRCH) => return Ok(false),
        Err(e) => {
            return Err(ProcessError::Signal {
                pid,
                message: e.to_string(),
            })
        }
    }

    let deadline = Instant::now() + grace;
    while Instant::now() < deadline {
        if !is_alive(pid) {
            return Ok(true);
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    if is_alive(pid) {
        return Err(ProcessError::StillRunning(pid));
    }
    Ok(true)
}

#[cfg(not(unix))]
pub fn terminate(_pid: u32, _grace: Duration) -> Result<bool, ProcessError> {
    Err(ProcessError::Unsupported)
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
