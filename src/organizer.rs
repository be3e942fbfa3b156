/// Two-pass reorganization of a tree into root-level destination folders.
///
/// A run first corrects misfiled entries in the root-level originals
/// folder, then walks the whole tree and moves every discovered file to
/// its destination. Per-file problems are recorded in the summary and
/// never abort the run; only failures that prevent setting up the
/// destinations or reading the root are returned as errors.
///
/// Runs assume a single writer: nothing else may modify the tree while a
/// run is in progress, and concurrent runs over overlapping trees are not
/// guarded against.
use crate::classifier::{Category, Classifier, Destination};
use crate::collision::{self, Resolved};
use crate::config::{CompiledFilters, LayoutConfig, SorterConfig};
use crate::error::{SortError, SortResult};
use crate::events::{CancelToken, Event, EventSink, Pass, SkipReason};
use crate::walker::{CandidateFile, TreeWalker, rel_display};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    /// Re-examining the root-level originals folder.
    Correcting,
    /// Walking the tree for candidates.
    Scanning,
    ProcessingSpreadsheets,
    ProcessingOthers,
    Done,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RunState::Idle => "idle",
            RunState::Correcting => "checking previously classified files",
            RunState::Scanning => "scanning for files",
            RunState::ProcessingSpreadsheets => "processing spreadsheets",
            RunState::ProcessingOthers => "processing other files",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(text)
    }
}

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MoveOutcome {
    Moved {
        file_name: String,
        target: String,
    },
    Renamed {
        original_name: String,
        final_name: String,
        target: String,
    },
    Skipped {
        file_name: String,
        reason: SkipReason,
    },
    Failed {
        file_name: String,
        error: String,
    },
}

/// A [`MoveOutcome`] with the pass and source it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileRecord {
    pub pass: Pass,
    /// Source path relative to the root.
    pub source: String,
    #[serde(flatten)]
    pub outcome: MoveOutcome,
}

/// Totals and per-file outcomes of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Files moved out of the originals folder by the correction pass.
    pub corrected: usize,
    /// Files moved by the main pass.
    pub processed: usize,
    /// Files found by the walk.
    pub candidates: usize,
    pub renamed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub excluded: usize,
    pub skipped_dirs: usize,
    /// Skipped directories whose listing was refused for lack of permission.
    pub access_denied_dirs: usize,
    pub cancelled: bool,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<FileRecord>,
}

impl RunSummary {
    fn new(dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            corrected: 0,
            processed: 0,
            candidates: 0,
            renamed: 0,
            skipped: 0,
            failed: 0,
            excluded: 0,
            skipped_dirs: 0,
            access_denied_dirs: 0,
            cancelled: false,
            dry_run,
            started_at: now,
            finished_at: now,
            outcomes: Vec::new(),
        }
    }

    /// Files moved across both passes.
    pub fn total(&self) -> usize {
        self.corrected + self.processed
    }

    fn record(&mut self, pass: Pass, source: String, outcome: MoveOutcome) {
        match &outcome {
            MoveOutcome::Moved { .. } => self.count_move(pass),
            MoveOutcome::Renamed { .. } => {
                self.count_move(pass);
                self.renamed += 1;
            }
            MoveOutcome::Skipped { .. } => self.skipped += 1,
            MoveOutcome::Failed { .. } => self.failed += 1,
        }
        self.outcomes.push(FileRecord {
            pass,
            source,
            outcome,
        });
    }

    fn count_move(&mut self, pass: Pass) {
        match pass {
            Pass::Correction => self.corrected += 1,
            Pass::Main => self.processed += 1,
        }
    }
}

/// Options that change how a run behaves.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Plan every move without touching the filesystem.
    pub dry_run: bool,
    /// Checked between files; a cancelled run stops before the next file.
    pub cancel: CancelToken,
}

/// Moves a file, falling back to copy and remove across filesystems.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            debug!("copying {} across devices", from.display());
            copy_across(from, to)?;
            // Keep exactly one copy.
            discard_on_error(fs::remove_file(from), to)
        }
        Err(e) => Err(e),
    }
}

/// Copies `from` to the free path `to`. Symlinks are recreated as links.
fn copy_across(from: &Path, to: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        if fs::symlink_metadata(from)?.file_type().is_symlink() {
            let mut target = fs::read_link(from)?;
            if target.is_relative()
                && let Some(parent) = from.parent()
            {
                target = parent.join(target);
            }
            return std::os::unix::fs::symlink(target, to);
        }
    }
    discard_on_error(fs::copy(from, to).map(|_| ()), to)
}

/// Removes whatever `result` left at `to` if it failed.
fn discard_on_error<T>(result: io::Result<T>, to: &Path) -> io::Result<T> {
    if result.is_err() && let Err(e) = fs::remove_file(to) {
        debug!("could not clean up {}: {}", to.display(), e);
    }
    result
}

/// Applies moves to disk, or simulates them for a dry run.
///
/// In a dry run, existence checks see the real filesystem overlaid with
/// the moves already planned in this run.
struct MoveExecutor {
    dry_run: bool,
    planned: HashSet<PathBuf>,
    vacated: HashSet<PathBuf>,
    created_dirs: HashSet<PathBuf>,
}

impl MoveExecutor {
    fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            planned: HashSet::new(),
            vacated: HashSet::new(),
            created_dirs: HashSet::new(),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        if self.dry_run {
            self.planned.contains(path)
                || (collision::occupied(path) && !self.vacated.contains(path))
        } else {
            collision::occupied(path)
        }
    }

    fn resolve(&self, target_dir: &Path, file_name: &str) -> Resolved {
        collision::resolve(target_dir, file_name, |p| self.exists(p))
    }

    /// Makes sure `dir` exists. Returns true if it had to be created.
    fn ensure_dir(&mut self, dir: &Path) -> SortResult<bool> {
        if dir.is_dir() || self.created_dirs.contains(dir) {
            return Ok(false);
        }
        if !self.dry_run {
            fs::create_dir_all(dir).map_err(|e| SortError::SetupFailed {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }
        self.created_dirs.insert(dir.to_path_buf());
        Ok(true)
    }

    fn apply(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        if self.dry_run {
            self.vacated.insert(from.to_path_buf());
            self.planned.insert(to.to_path_buf());
            Ok(())
        } else {
            move_file(from, to)
        }
    }
}

/// Sorts one tree into its root-level destination folders.
///
/// # Examples
///
/// ```no_run
/// use origsort::config::SorterConfig;
/// use origsort::events::SilentSink;
/// use origsort::organizer::Reorganizer;
/// use std::path::Path;
///
/// let organizer = Reorganizer::new(Path::new("/path/to/photos"), &SorterConfig::default())?;
/// let summary = organizer.run(&SilentSink)?;
/// println!("moved {} files", summary.total());
/// # Ok::<(), origsort::error::SortError>(())
/// ```
pub struct Reorganizer {
    root: PathBuf,
    layout: LayoutConfig,
    classifier: Classifier,
    filters: CompiledFilters,
    options: RunOptions,
}

impl Reorganizer {
    /// Validates the root and configuration. Nothing is touched on disk.
    ///
    /// # Errors
    ///
    /// `SortError::InvalidRoot` if the root is missing, not a directory or
    /// read-only; `SortError::Config` if the configuration is unusable.
    pub fn new(root: &Path, config: &SorterConfig) -> SortResult<Self> {
        let invalid = |reason: String| SortError::InvalidRoot {
            path: root.to_path_buf(),
            reason,
        };

        let metadata = fs::metadata(root).map_err(|e| invalid(e.to_string()))?;
        if !metadata.is_dir() {
            return Err(invalid("not a directory".to_string()));
        }
        if metadata.permissions().readonly() {
            return Err(invalid("directory is read-only".to_string()));
        }
        let root = fs::canonicalize(root).map_err(|e| invalid(e.to_string()))?;

        config.validate()?;
        let filters = config.compile_filters()?;

        Ok(Self {
            root,
            layout: config.layout.clone(),
            classifier: Classifier::new(&config.classify),
            filters,
            options: RunOptions::default(),
        })
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    /// Canonical root this organizer works on.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Runs the correction pass, then the main pass.
    ///
    /// # Errors
    ///
    /// Only run-level failures are returned (destination folders cannot be
    /// created, root or originals folder cannot be listed). A
    /// `State { Failed }` event is emitted first.
    pub fn run(&self, sink: &dyn EventSink) -> SortResult<RunSummary> {
        info!(
            "reorganizing {}{}",
            self.root.display(),
            if self.options.dry_run { " (dry run)" } else { "" }
        );
        let mut summary = RunSummary::new(self.options.dry_run);
        let mut executor = MoveExecutor::new(self.options.dry_run);

        let result = self
            .correct_misclassified(&mut executor, sink, &mut summary)
            .and_then(|()| {
                if summary.cancelled {
                    Ok(())
                } else {
                    self.process_tree(&mut executor, sink, &mut summary)
                }
            });

        summary.finished_at = Utc::now();
        match result {
            Ok(()) => {
                self.enter(sink, RunState::Done);
                info!(
                    "finished: {} corrected, {} processed, {} failed",
                    summary.corrected, summary.processed, summary.failed
                );
                Ok(summary)
            }
            Err(e) => {
                warn!("run failed: {}", e);
                self.enter(sink, RunState::Failed);
                Err(e)
            }
        }
    }

    fn enter(&self, sink: &dyn EventSink, state: RunState) {
        debug!("state -> {:?}", state);
        sink.emit(Event::State { state });
    }

    /// Stops the run if cancellation was requested.
    fn check_cancelled(&self, sink: &dyn EventSink, summary: &mut RunSummary) -> bool {
        if self.options.cancel.is_cancelled() {
            if !summary.cancelled {
                info!("run cancelled");
                sink.emit(Event::Cancelled);
            }
            summary.cancelled = true;
        }
        summary.cancelled
    }

    fn ensure_destination(
        &self,
        executor: &mut MoveExecutor,
        sink: &dyn EventSink,
        dir_name: &str,
    ) -> SortResult<PathBuf> {
        let dir = self.root.join(dir_name);
        let created = executor.ensure_dir(&dir)?;
        sink.emit(Event::DestinationReady {
            dir_name: dir_name.to_string(),
            created,
        });
        Ok(dir)
    }

    /// Pass 1: moves files in the root-level originals folder that now
    /// classify as modified. A same-named file already at the target means
    /// the file was corrected before, so it is skipped rather than renamed.
    fn correct_misclassified(
        &self,
        executor: &mut MoveExecutor,
        sink: &dyn EventSink,
        summary: &mut RunSummary,
    ) -> SortResult<()> {
        self.enter(sink, RunState::Correcting);

        let originals = self.root.join(&self.layout.original_dir_name);
        if !originals.is_dir() {
            debug!("no {} folder to correct", self.layout.original_dir_name);
            return Ok(());
        }

        let entries = fs::read_dir(&originals).map_err(|e| SortError::SetupFailed {
            path: originals.clone(),
            source: e,
        })?;

        // Materialize before moving anything out of the folder.
        let mut files = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("error listing {}: {}", originals.display(), e);
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => files.push((path, name)),
                Err(name) => debug!("skipping non UTF-8 name {:?}", name),
            }
        }

        let modified_name = self.layout.modified_dir_name.as_str();
        let mut modified_dir: Option<PathBuf> = None;

        for (path, file_name) in files {
            if self.check_cancelled(sink, summary) {
                return Ok(());
            }

            if self.classifier.classify(&file_name) == Category::Original {
                sink.emit(Event::AlreadyCorrect { file_name });
                continue;
            }

            let target_dir = match &modified_dir {
                Some(dir) => dir.clone(),
                None => {
                    let dir = self.ensure_destination(executor, sink, modified_name)?;
                    modified_dir = Some(dir.clone());
                    dir
                }
            };

            let source = rel_display(&self.root, &path);
            let target = target_dir.join(&file_name);
            if executor.exists(&target) {
                sink.emit(Event::FileSkipped {
                    file_name: file_name.clone(),
                    reason: SkipReason::TargetExists,
                });
                summary.record(
                    Pass::Correction,
                    source,
                    MoveOutcome::Skipped {
                        file_name,
                        reason: SkipReason::TargetExists,
                    },
                );
                continue;
            }

            match executor.apply(&path, &target) {
                Ok(()) => {
                    sink.emit(Event::FileMoved {
                        pass: Pass::Correction,
                        file_name: file_name.clone(),
                        final_name: file_name.clone(),
                        source: self.layout.original_dir_name.clone(),
                        target: modified_name.to_string(),
                        renamed: false,
                        dry_run: self.options.dry_run,
                    });
                    summary.record(
                        Pass::Correction,
                        source,
                        MoveOutcome::Moved {
                            file_name,
                            target: modified_name.to_string(),
                        },
                    );
                }
                Err(e) => {
                    let error = SortError::from_move(path.clone(), target, e);
                    self.record_failure(sink, summary, Pass::Correction, source, file_name, error);
                }
            }
        }

        Ok(())
    }

    /// Pass 2: walks the tree and moves every candidate, spreadsheets first.
    fn process_tree(
        &self,
        executor: &mut MoveExecutor,
        sink: &dyn EventSink,
        summary: &mut RunSummary,
    ) -> SortResult<()> {
        self.enter(sink, RunState::Scanning);

        let walk = TreeWalker::new(&self.layout, &self.filters, sink).collect(&self.root)?;
        summary.candidates = walk.candidates.len();
        summary.excluded = walk.excluded;
        summary.skipped_dirs = walk.skipped_dirs.len();
        summary.access_denied_dirs = walk.skipped_dirs.iter().filter(|d| d.access_denied).count();

        if walk.candidates.is_empty() {
            info!("no files to process");
            sink.emit(Event::ScanComplete {
                candidates: 0,
                spreadsheets: 0,
                others: 0,
            });
            return Ok(());
        }

        self.ensure_destination(executor, sink, &self.layout.original_dir_name)?;
        self.ensure_destination(executor, sink, &self.layout.modified_dir_name)?;

        let total = walk.candidates.len();
        let (spreadsheets, others): (Vec<_>, Vec<_>) = walk
            .candidates
            .into_iter()
            .partition(|c| self.classifier.is_spreadsheet(&c.file_name));

        sink.emit(Event::ScanComplete {
            candidates: total,
            spreadsheets: spreadsheets.len(),
            others: others.len(),
        });

        let mut done = 0;

        self.enter(sink, RunState::ProcessingSpreadsheets);
        for candidate in spreadsheets {
            if self.check_cancelled(sink, summary) {
                return Ok(());
            }
            self.process_candidate(executor, sink, summary, &candidate, Destination::Root);
            done += 1;
            self.emit_progress(sink, done, total, candidate.file_name);
        }

        self.enter(sink, RunState::ProcessingOthers);
        for candidate in others {
            if self.check_cancelled(sink, summary) {
                return Ok(());
            }
            let destination = self.classifier.destination_for(&candidate.file_name);
            self.process_candidate(executor, sink, summary, &candidate, destination);
            done += 1;
            self.emit_progress(sink, done, total, candidate.file_name);
        }

        Ok(())
    }

    fn emit_progress(&self, sink: &dyn EventSink, done: usize, total: usize, file_name: String) {
        sink.emit(Event::Progress {
            done,
            total,
            file_name,
        });
    }

    /// Moves one candidate. Never fails the run: errors become a
    /// `Failed` outcome.
    fn process_candidate(
        &self,
        executor: &mut MoveExecutor,
        sink: &dyn EventSink,
        summary: &mut RunSummary,
        candidate: &CandidateFile,
        destination: Destination,
    ) {
        let target_dir = destination.dir(&self.root, &self.layout);
        let target = destination.label(&self.layout).to_string();
        let source = rel_display(&self.root, &candidate.path);
        let file_name = candidate.file_name.clone();

        // A spreadsheet already at the root is where it belongs.
        if target_dir == candidate.source_folder {
            sink.emit(Event::FileSkipped {
                file_name: file_name.clone(),
                reason: SkipReason::AlreadyInPlace,
            });
            summary.record(
                Pass::Main,
                source,
                MoveOutcome::Skipped {
                    file_name,
                    reason: SkipReason::AlreadyInPlace,
                },
            );
            return;
        }

        let resolved = executor.resolve(&target_dir, &file_name);
        match executor.apply(&candidate.path, &resolved.path) {
            Ok(()) => {
                let final_name = resolved.file_name();
                debug!(
                    "{} -> {}",
                    candidate.path.display(),
                    resolved.path.display()
                );
                sink.emit(Event::FileMoved {
                    pass: Pass::Main,
                    file_name: file_name.clone(),
                    final_name: final_name.clone(),
                    source: candidate.source_rel(&self.root),
                    target: target.clone(),
                    renamed: resolved.renamed,
                    dry_run: self.options.dry_run,
                });
                let outcome = if resolved.renamed {
                    MoveOutcome::Renamed {
                        original_name: file_name,
                        final_name,
                        target,
                    }
                } else {
                    MoveOutcome::Moved { file_name, target }
                };
                summary.record(Pass::Main, source, outcome);
            }
            Err(e) => {
                let error = SortError::from_move(candidate.path.clone(), resolved.path, e);
                self.record_failure(sink, summary, Pass::Main, source, file_name, error);
            }
        }
    }

    fn record_failure(
        &self,
        sink: &dyn EventSink,
        summary: &mut RunSummary,
        pass: Pass,
        source_rel: String,
        file_name: String,
        error: SortError,
    ) {
        warn!("{}", error);
        let message = match &error {
            SortError::MoveFailed { source, .. } | SortError::AccessDenied { source, .. } => {
                source.to_string()
            }
            other => other.to_string(),
        };
        let source_folder = Path::new(&source_rel)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| ".".to_string());
        sink.emit(Event::FileFailed {
            file_name: file_name.clone(),
            source: source_folder,
            error: message.clone(),
        });
        summary.record(
            pass,
            source_rel,
            MoveOutcome::Failed {
                file_name,
                error: message,
            },
        );
    }
}
