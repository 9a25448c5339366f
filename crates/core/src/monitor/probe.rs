// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Platform-specific resource capture behind a common trait

use super::snapshot::ResourceSample;
use crate::process;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to read {what}: {message}")]
    Read { what: &'static str, message: String },
    #[error("resource probing unsupported on this platform")]
    Unsupported,
}

/// Source of resource samples
pub trait ResourceProbe: Send + Sync {
    fn sample(&self) -> Result<ResourceSample, ProbeError>;
}

/// One probe shared by several monitors
impl<P: ResourceProbe + ?Sized> ResourceProbe for std::sync::Arc<P> {
    fn sample(&self) -> Result<ResourceSample, ProbeError> {
        (**self).sample()
    }
}

/// Resident memory in MB from the `VmRSS` line of `/proc/<pid>/status`
pub fn parse_vm_rss_mb(status: &str) -> Option<f64> {
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kb: f64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kb / 1024.0)
}

/// Probe for a live process on this host
#[derive(Clone, Debug)]
pub struct SystemProbe {
    pid: u32,
    process_name: Option<String>,
    disk_path: PathBuf,
}

impl SystemProbe {
    /// Probe the current process; disk space is measured on `disk_path`'s filesystem
    pub fn current(disk_path: impl Into<PathBuf>) -> Self {
        Self {
            pid: std::process::id(),
            process_name: process::current_process_name(),
            disk_path: disk_path.into(),
        }
    }

    /// Processes sharing the monitored process's name plus its descendants.
    /// Workers are re-invocations of the same binary, so an orphaned worker
    /// still counts after it is reparented.
    fn process_count(&self) -> Result<u64, ProbeError> {
        let table = process::list_processes().map_err(|e| ProbeError::Read {
            what: "process table",
            message: e.to_string(),
        })?;
        let mut counted: HashSet<u32> = process::descendants(&table, self.pid);
        counted.insert(self.pid);
        if let Some(name) = &self.process_name {
            counted.extend(table.iter().filter(|p| &p.name == name).map(|p| p.pid));
        }
        Ok(counted.len() as u64)
    }

    #[cfg(target_os = "linux")]
    fn memory_mb(&self) -> Result<f64, ProbeError> {
        let status = std::fs::read_to_string(format!("/proc/{}/status", self.pid)).map_err(
            |e| ProbeError::Read {
                what: "process status",
                message: e.to_string(),
            },
        )?;
        parse_vm_rss_mb(&status).ok_or(ProbeError::Read {
            what: "process status",
            message: "no VmRSS line".to_string(),
        })
    }

    #[cfg(target_os = "linux")]
    fn file_handles(&self) -> Result<u64, ProbeError> {
        let entries = std::fs::read_dir(format!("/proc/{}/fd", self.pid)).map_err(|e| {
            ProbeError::Read {
                what: "fd table",
                message: e.to_string(),
            }
        })?;
        Ok(entries.flatten().count() as u64)
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    fn memory_mb(&self) -> Result<f64, ProbeError> {
        let out = command_output("ps", &["-o", "rss=", "-p", &self.pid.to_string()])?;
        let kb: f64 = out.trim().parse().map_err(|_| ProbeError::Read {
            what: "ps rss",
            message: out.clone(),
        })?;
        Ok(kb / 1024.0)
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    fn file_handles(&self) -> Result<u64, ProbeError> {
        let out = command_output("lsof", &["-p", &self.pid.to_string()])?;
        // First line is the header
        Ok(out.lines().count().saturating_sub(1) as u64)
    }

    #[cfg(unix)]
    fn disk_space_mb(&self) -> Result<f64, ProbeError> {
        let stat = nix::sys::statvfs::statvfs(&self.disk_path).map_err(|e| ProbeError::Read {
            what: "filesystem stats",
            message: e.to_string(),
        })?;
        let bytes = stat.blocks_available() as f64 * stat.fragment_size() as f64;
        Ok(bytes / (1024.0 * 1024.0))
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn command_output(program: &str, args: &[&str]) -> Result<String, ProbeError> {
    let output = std::process::Command::new(program)
        .args(args)
        .output()
        .map_err(|e| ProbeError::Read {
            what: "command",
            message: format!("{}: {}", program, e),
        })?;
    if !output.status.success() {
        return Err(ProbeError::Read {
            what: "command",
            message: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

impl ResourceProbe for SystemProbe {
    #[cfg(unix)]
    fn sample(&self) -> Result<ResourceSample, ProbeError> {
        Ok(ResourceSample {
            memory_mb: self.memory_mb()?,
            file_handles: self.file_handles()?,
            process_count: self.process_count()?,
            disk_space_mb: self.disk_space_mb()?,
        })
    }

    #[cfg(not(unix))]
    fn sample(&self) -> Result<ResourceSample, ProbeError> {
        Err(ProbeError::Unsupported)
    }
}

/// Probe replaying scripted samples; the last one repeats once exhausted
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    samples: Mutex<VecDeque<ResourceSample>>,
    last: Mutex<ResourceSample>,
}

impl ScriptedProbe {
    pub fn new(samples: impl IntoIterator<Item = ResourceSample>) -> Self {
        Self {
            samples: Mutex::new(samples.into_iter().collect()),
            last: Mutex::new(ResourceSample::default()),
        }
    }

    pub fn push(&self, sample: ResourceSample) {
        self.samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(sample);
    }
}

impl ResourceProbe for ScriptedProbe {
    fn sample(&self) -> Result<ResourceSample, ProbeError> {
        let next = self
            .samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sample) = next {
            *last = sample;
        }
        Ok(*last)
    }
}
