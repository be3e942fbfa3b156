//! Collision-safe target path selection.
//!
//! The existence check is supplied by the caller and evaluated on every
//! call. Moves are interleaved with resolution, so nothing may be cached
//! between calls.

use std::fs;
use std::path::{Path, PathBuf};

/// A target path that was free at the time of resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub path: PathBuf,
    /// True if a numeric suffix had to be added.
    pub renamed: bool,
}

impl Resolved {
    /// Final filename of the resolved path.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Splits a filename into stem and extension, the extension keeping its
/// leading dot. Leading dots of hidden files belong to the stem.
///
/// ```
/// use origsort::collision::split_name;
///
/// assert_eq!(split_name("a.tar.gz"), ("a.tar", ".gz"));
/// assert_eq!(split_name(".bashrc"), (".bashrc", ""));
/// assert_eq!(split_name("README"), ("README", ""));
/// ```
pub fn split_name(file_name: &str) -> (&str, &str) {
    let leading_dots = file_name.len() - file_name.trim_start_matches('.').len();
    match file_name[leading_dots..].rfind('.') {
        Some(idx) => file_name.split_at(leading_dots + idx),
        None => (file_name, ""),
    }
}

/// Picks a free path for `file_name` inside `target_dir`.
///
/// If `target_dir/file_name` is free it is returned unchanged. Otherwise
/// `stem_1.ext`, `stem_2.ext`, ... are probed until `exists` reports a
/// free slot.
pub fn resolve<F>(target_dir: &Path, file_name: &str, exists: F) -> Resolved
where
    F: Fn(&Path) -> bool,
{
    let direct = target_dir.join(file_name);
    if !exists(&direct) {
        return Resolved {
            path: direct,
            renamed: false,
        };
    }

    let (stem, ext) = split_name(file_name);
    let mut counter: u64 = 1;
    loop {
        let candidate = target_dir.join(format!("{}_{}{}", stem, counter, ext));
        if !exists(&candidate) {
            return Resolved {
                path: candidate,
                renamed: true,
            };
        }
        counter += 1;
    }
}

/// True if anything, including a dangling symlink, occupies `path`.
pub fn occupied(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// [`resolve`] against the real filesystem.
pub fn resolve_on_disk(target_dir: &Path, file_name: &str) -> Resolved {
    resolve(target_dir, file_name, occupied)
}
