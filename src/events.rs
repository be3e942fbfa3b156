//! Events emitted by a run, and the sinks that receive them.
//!
//! The engine never holds display state. Everything a front end needs
//! (log lines, progress, state changes) arrives as an [`Event`] in
//! processing order.

use crate::organizer::RunState;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

/// Which pass produced a file event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Pass {
    Correction,
    Main,
}

/// Why a file was left where it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Already inside a root-level destination folder.
    AlreadyClassified,
    /// The correction target already holds a file of the same name.
    TargetExists,
    /// Already directly in its destination folder.
    AlreadyInPlace,
}

/// A single thing that happened during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    State {
        state: RunState,
    },
    /// A file in the originals folder that is correctly filed.
    AlreadyCorrect {
        file_name: String,
    },
    FileMoved {
        pass: Pass,
        file_name: String,
        final_name: String,
        /// Source folder relative to the root, "." for the root itself.
        source: String,
        /// Destination folder relative to the root, "." for the root itself.
        target: String,
        renamed: bool,
        dry_run: bool,
    },
    FileSkipped {
        file_name: String,
        reason: SkipReason,
    },
    FileFailed {
        file_name: String,
        source: String,
        error: String,
    },
    /// Left in place by the filter rules.
    FileExcluded {
        path: String,
    },
    DirectorySkipped {
        path: String,
        reason: String,
        /// The listing was refused for lack of permission.
        access_denied: bool,
    },
    /// A folder named like a destination found below the root.
    ClassificationFolderFound {
        path: String,
    },
    DestinationReady {
        dir_name: String,
        created: bool,
    },
    ScanComplete {
        candidates: usize,
        spreadsheets: usize,
        others: usize,
    },
    Progress {
        done: usize,
        total: usize,
        file_name: String,
    },
    Cancelled,
}

impl Event {
    /// Fraction complete in `[0, 1]` for progress events.
    pub fn fraction(&self) -> Option<f64> {
        match self {
            Event::Progress { done, total, .. } if *total > 0 => {
                Some((*done as f64 / *total as f64).clamp(0.0, 1.0))
            }
            Event::Progress { .. } => Some(1.0),
            _ => None,
        }
    }

    /// True for events reporting a per-file or per-directory problem.
    pub fn is_problem(&self) -> bool {
        matches!(
            self,
            Event::FileFailed { .. } | Event::DirectorySkipped { .. }
        )
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::State { state } => write!(f, "{}", state),
            Event::AlreadyCorrect { file_name } => {
                write!(f, "already in the right place: {}", file_name)
            }
            Event::FileMoved {
                pass,
                file_name,
                final_name,
                source,
                target,
                renamed,
                dry_run,
            } => {
                let prefix = if *dry_run { "would " } else { "" };
                match (pass, renamed) {
                    (Pass::Correction, _) => {
                        write!(f, "{}correct {} -> {}/", prefix, file_name, target)
                    }
                    (Pass::Main, true) => write!(
                        f,
                        "{}rename {} -> {}/{} (from: {})",
                        prefix, file_name, target, final_name, source
                    ),
                    (Pass::Main, false) => write!(
                        f,
                        "{}move {} -> {}/ (from: {})",
                        prefix, file_name, target, source
                    ),
                }
            }
            Event::FileSkipped { file_name, reason } => match reason {
                SkipReason::AlreadyClassified => {
                    write!(f, "skipped already-classified file: {}", file_name)
                }
                SkipReason::TargetExists => {
                    write!(f, "target already exists, skipped: {}", file_name)
                }
                SkipReason::AlreadyInPlace => write!(f, "already in place: {}", file_name),
            },
            Event::FileFailed {
                file_name, error, ..
            } => write!(f, "error processing {}: {}", file_name, error),
            Event::FileExcluded { path } => write!(f, "excluded by filters: {}", path),
            Event::DirectorySkipped {
                path,
                reason,
                access_denied,
            } => {
                if *access_denied {
                    write!(f, "access denied, skipped directory {}: {}", path, reason)
                } else {
                    write!(f, "skipped directory {}: {}", path, reason)
                }
            }
            Event::ClassificationFolderFound { path } => {
                write!(f, "found classification folder: {}", path)
            }
            Event::DestinationReady { dir_name, created } => {
                if *created {
                    write!(f, "created {}/", dir_name)
                } else {
                    write!(f, "{}/ already exists", dir_name)
                }
            }
            Event::ScanComplete {
                candidates,
                spreadsheets,
                others,
            } => write!(
                f,
                "found {} files to process ({} spreadsheets, {} others)",
                candidates, spreadsheets, others
            ),
            Event::Progress {
                done,
                total,
                file_name,
            } => write!(f, "[{}/{}] {}", done, total, file_name),
            Event::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Receiver of run events.
pub trait EventSink {
    fn emit(&self, event: Event);
}

/// Discards every event.
pub struct SilentSink;

impl EventSink for SilentSink {
    fn emit(&self, _event: Event) {}
}

/// Forwards events to another thread. A dropped receiver is ignored so a
/// closed front end never aborts a run.
impl EventSink for Sender<Event> {
    fn emit(&self, event: Event) {
        let _ = self.send(event);
    }
}

/// Collects events in memory.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything received so far.
    pub fn events(&self) -> Vec<Event> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: Event) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Cooperative cancellation flag, checked between files.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}
