//! Non-fatal findings reported while aligning and merging profiles.

use std::fmt;
use std::path::PathBuf;

/// A condition that degrades the merged result without aborting it.
#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// The profile holds no records.
    EmptyProfile { path: PathBuf },
    /// The first record is not a parseable calibration entry.
    Unsynced { path: PathBuf, reason: String },
    /// A second `sys`-mode record for a host disagreed with the first one.
    ConflictingOffset {
        path: PathBuf,
        host_id: String,
        kept: f64,
        ignored: f64,
    },
    /// A `sys`-mode host has no offset; 0.0 was assumed.
    MissingOffset { host_id: String },
    /// The profile has no `END` marker.
    NotClosed { path: PathBuf },
    /// The profile has more than one `END` marker.
    ClosedMultipleTimes { path: PathBuf, count: usize },
    /// A state transition without a target state was dropped.
    MissingState { uid: String, time: f64 },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyProfile { path } => write!(f, "empty profile {}", path.display()),
            Self::Unsynced { path, reason } => {
                write!(f, "unsynced profile {}: {reason}", path.display())
            }
            Self::ConflictingOffset {
                path,
                host_id,
                kept,
                ignored,
            } => write!(
                f,
                "conflicting time sync for {} ({host_id}): keeping {kept}, ignoring {ignored}",
                path.display()
            ),
            Self::MissingOffset { host_id } => {
                write!(f, "no time offset for {host_id}, assuming 0.0")
            }
            Self::NotClosed { path } => {
                write!(f, "profile {} not correctly closed", path.display())
            }
            Self::ClosedMultipleTimes { path, count } => {
                write!(f, "profile {} closed {count} times", path.display())
            }
            Self::MissingState { uid, time } => {
                write!(f, "state transition for {uid} at {time:.4} has no state")
            }
        }
    }
}
