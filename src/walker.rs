//! Breadth-first discovery of files to sort.
//!
//! The walk is materialized in full before anything moves, because
//! moving files while a listing is live would corrupt it.

use crate::config::{CompiledFilters, LayoutConfig};
use crate::error::{SortError, SortResult};
use crate::events::{Event, EventSink, SkipReason};
use log::{debug, warn};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A file found during the walk, consumed exactly once by the organizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    /// Absolute path of the file.
    pub path: PathBuf,
    pub file_name: String,
    /// Directory the file was found in.
    pub source_folder: PathBuf,
}

impl CandidateFile {
    /// Source folder relative to `root`, "." for the root itself.
    pub fn source_rel(&self, root: &Path) -> String {
        rel_display(root, &self.source_folder)
    }
}

/// A directory whose listing failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedDir {
    pub path: PathBuf,
    pub reason: String,
    pub access_denied: bool,
}

/// Result of walking a tree.
#[derive(Debug, Default)]
pub struct Walk {
    /// Files to sort, in breadth-first, listing order.
    pub candidates: Vec<CandidateFile>,
    pub skipped_dirs: Vec<SkippedDir>,
    /// Folders below the root that are, or hold, a classification folder.
    pub classification_folders: Vec<PathBuf>,
    /// Files already inside a root-level destination folder.
    pub already_classified: usize,
    /// Files left in place by the filter rules.
    pub excluded: usize,
}

/// Displays `path` relative to `root`, "." when they are equal.
pub fn rel_display(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel.to_string_lossy().into_owned(),
        Err(_) => path.to_string_lossy().into_owned(),
    }
}

/// True if `dir` is named like a destination folder, or holds one as an
/// immediate child directory.
pub fn is_classification_folder(dir: &Path, layout: &LayoutConfig) -> bool {
    let named_like_destination = dir
        .file_name()
        .map(|n| layout.is_destination_name(&n.to_string_lossy()))
        .unwrap_or(false);

    named_like_destination
        || dir.join(&layout.original_dir_name).is_dir()
        || dir.join(&layout.modified_dir_name).is_dir()
}

/// Walks a tree breadth-first with an explicit queue.
pub struct TreeWalker<'a> {
    layout: &'a LayoutConfig,
    filters: &'a CompiledFilters,
    sink: &'a dyn EventSink,
}

impl<'a> TreeWalker<'a> {
    pub fn new(layout: &'a LayoutConfig, filters: &'a CompiledFilters, sink: &'a dyn EventSink) -> Self {
        Self {
            layout,
            filters,
            sink,
        }
    }

    /// Collects every movable file under `root`.
    ///
    /// Files whose immediate parent is a root-level destination folder are
    /// excluded; files in destination-named folders deeper in the tree are
    /// collected like any other. Unlistable directories other than the root
    /// are recorded and skipped.
    ///
    /// # Errors
    ///
    /// Returns `SortError::SetupFailed` if the root itself cannot be listed.
    pub fn collect(&self, root: &Path) -> SortResult<Walk> {
        let root_destinations = [
            root.join(&self.layout.original_dir_name),
            root.join(&self.layout.modified_dir_name),
        ];

        let mut walk = Walk::default();
        let mut queue = VecDeque::from([root.to_path_buf()]);
        let mut visited: HashSet<PathBuf> = HashSet::new();

        while let Some(dir) = queue.pop_front() {
            let key = fs::canonicalize(&dir).unwrap_or_else(|_| dir.clone());
            if !visited.insert(key) {
                debug!("already visited {}", dir.display());
                continue;
            }

            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if dir == root => {
                    return Err(SortError::SetupFailed {
                        path: root.to_path_buf(),
                        source: e,
                    });
                }
                Err(e) => {
                    self.skip_dir(root, &dir, &e, &mut walk);
                    continue;
                }
            };

            let in_root_destination = root_destinations.contains(&dir);

            for entry in entries {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        // Abandon the rest of this listing.
                        self.skip_dir(root, &dir, &e, &mut walk);
                        break;
                    }
                };
                let path = entry.path();
                let file_type = match entry.file_type() {
                    Ok(file_type) => file_type,
                    Err(e) => {
                        self.skip_dir(root, &dir, &e, &mut walk);
                        break;
                    }
                };

                let (is_file, is_dir) = if file_type.is_symlink() {
                    match fs::metadata(&path) {
                        Ok(target) if target.is_dir() => {
                            debug!("not following directory symlink {}", path.display());
                            (false, false)
                        }
                        Ok(target) => (target.is_file(), false),
                        Err(_) => (false, false),
                    }
                } else {
                    (file_type.is_file(), file_type.is_dir())
                };

                if is_file {
                    self.visit_file(root, &dir, &path, in_root_destination, &mut walk);
                } else if is_dir {
                    if !root_destinations.contains(&path)
                        && is_classification_folder(&path, self.layout)
                    {
                        self.sink.emit(Event::ClassificationFolderFound {
                            path: rel_display(root, &path),
                        });
                        walk.classification_folders.push(path.clone());
                    }
                    queue.push_back(path);
                }
            }
        }

        debug!(
            "walk of {} found {} candidates",
            root.display(),
            walk.candidates.len()
        );
        Ok(walk)
    }

    fn visit_file(
        &self,
        root: &Path,
        dir: &Path,
        path: &Path,
        in_root_destination: bool,
        walk: &mut Walk,
    ) {
        let display_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if in_root_destination {
            self.sink.emit(Event::FileSkipped {
                file_name: display_name,
                reason: SkipReason::AlreadyClassified,
            });
            walk.already_classified += 1;
            return;
        }

        let rel = path.strip_prefix(root).unwrap_or(path);
        if !self.filters.should_include(rel) {
            self.sink.emit(Event::FileExcluded {
                path: rel.to_string_lossy().into_owned(),
            });
            walk.excluded += 1;
            return;
        }

        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!("leaving non UTF-8 filename in place: {}", path.display());
            self.sink.emit(Event::FileExcluded {
                path: rel.to_string_lossy().into_owned(),
            });
            walk.excluded += 1;
            return;
        };

        walk.candidates.push(CandidateFile {
            path: path.to_path_buf(),
            file_name: file_name.to_string(),
            source_folder: dir.to_path_buf(),
        });
    }

    fn skip_dir(&self, root: &Path, dir: &Path, error: &io::Error, walk: &mut Walk) {
        let access_denied = error.kind() == io::ErrorKind::PermissionDenied;
        if access_denied {
            debug!("access denied listing {}", dir.display());
        } else {
            warn!("error listing {}: {}", dir.display(), error);
        }
        self.sink.emit(Event::DirectorySkipped {
            path: rel_display(root, dir),
            reason: error.to_string(),
            access_denied,
        });
        walk.skipped_dirs.push(SkippedDir {
            path: dir.to_path_buf(),
            reason: error.to_string(),
            access_denied,
        });
    }
}
