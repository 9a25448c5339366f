// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host platform and the outcomes that legitimately differ between platforms

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    Linux,
    MacOs,
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "linux") {
            Platform::Linux
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Other
        }
    }

    /// What deleting a file that another process holds open may do here
    ///
    /// Unix hosts may unlink at once or only after the writer closes.
    pub fn delete_while_open_outcomes(self) -> &'static [DeleteOutcome] {
        match self {
            Platform::Linux | Platform::MacOs => &[
                DeleteOutcome::DeletedWhileOpen,
                DeleteOutcome::DeletedAfterClose,
            ],
            Platform::Windows => &[DeleteOutcome::SharingViolation, DeleteOutcome::DeletedAfterClose],
            Platform::Other => &[
                DeleteOutcome::DeletedWhileOpen,
                DeleteOutcome::DeletedAfterClose,
                DeleteOutcome::SharingViolation,
            ],
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
            Platform::Windows => "windows",
            Platform::Other => "other",
        };
        write!(f, "{}", name)
    }
}

/// Observed result of deleting a file while a writer holds it open
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeleteOutcome {
    /// Unlinked immediately; the writer keeps an anonymous inode
    DeletedWhileOpen,
    /// The delete only succeeded once the writer closed the file
    DeletedAfterClose,
    /// The delete was refused while the file was open
    SharingViolation,
}

#[cfg(test)]
#[path = "platform_tests.rs"]
mod tests;
