//! Filename-based classification into originals and modified files.
//!
//! Classification never touches the filesystem: it looks only at the
//! filename string, so every rule here is a pure function.
//!
//! # Examples
//!
//! ```
//! use origsort::classifier::{Category, Classifier};
//!
//! let classifier = Classifier::default();
//! assert_eq!(classifier.classify("IMG_0001.jpg"), Category::Original);
//! assert_eq!(classifier.classify("IMG_0001拷贝.jpg"), Category::Modified);
//! assert!(classifier.is_spreadsheet("report.XLSX"));
//! ```
use crate::config::{ClassifyConfig, LayoutConfig};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Destination category of a non-spreadsheet file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Untouched originals.
    Original,
    /// Edited copies.
    Modified,
}

impl Category {
    /// Returns the folder name for this category under the given layout.
    ///
    /// ```
    /// use origsort::classifier::Category;
    /// use origsort::config::LayoutConfig;
    ///
    /// let layout = LayoutConfig::default();
    /// assert_eq!(Category::Original.dir_name(&layout), "原图");
    /// assert_eq!(Category::Modified.dir_name(&layout), "处理图");
    /// ```
    pub fn dir_name<'a>(&self, layout: &'a LayoutConfig) -> &'a str {
        match self {
            Category::Original => &layout.original_dir_name,
            Category::Modified => &layout.modified_dir_name,
        }
    }
}

/// Where a candidate file ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "category")]
pub enum Destination {
    /// Directly under the root (spreadsheets).
    Root,
    /// Inside the root-level folder of a category.
    Category(Category),
}

impl Destination {
    /// Absolute directory this destination refers to.
    pub fn dir(&self, root: &Path, layout: &LayoutConfig) -> PathBuf {
        match self {
            Destination::Root => root.to_path_buf(),
            Destination::Category(category) => root.join(category.dir_name(layout)),
        }
    }

    /// Short label used in log lines.
    pub fn label<'a>(&self, layout: &'a LayoutConfig) -> &'a str {
        match self {
            Destination::Root => ".",
            Destination::Category(category) => category.dir_name(layout),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Original => write!(f, "original"),
            Category::Modified => write!(f, "modified"),
        }
    }
}

/// True if `name` contains a code point in the CJK Unified Ideographs block
/// (U+4E00 to U+9FFF).
pub fn contains_cjk(name: &str) -> bool {
    name.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

/// Applies the keyword and CJK heuristics.
#[derive(Debug, Clone)]
pub struct Classifier {
    keywords: Vec<String>,
    spreadsheet_extensions: Vec<String>,
}

impl Classifier {
    /// Creates a classifier from the classification settings.
    pub fn new(config: &ClassifyConfig) -> Self {
        Self {
            keywords: config.keywords.clone(),
            spreadsheet_extensions: config
                .spreadsheet_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// True if `file_name` contains any keyword (case-sensitive substring).
    pub fn has_keyword(&self, file_name: &str) -> bool {
        self.keywords.iter().any(|k| file_name.contains(k.as_str()))
    }

    /// Classifies a filename.
    ///
    /// A name containing a keyword or any CJK ideograph is `Modified`;
    /// everything else, including empty and extension-only names, is
    /// `Original`.
    pub fn classify(&self, file_name: &str) -> Category {
        let has_keyword = self.has_keyword(file_name);
        let has_cjk = contains_cjk(file_name);

        if has_keyword || has_cjk {
            Category::Modified
        } else {
            Category::Original
        }
    }

    /// True if the extension of `file_name` is a spreadsheet extension
    /// (case-insensitive).
    pub fn is_spreadsheet(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.spreadsheet_extensions.contains(&ext))
    }

    /// Destination of a file found during the main walk. Spreadsheets
    /// bypass classification and go to the root.
    pub fn destination_for(&self, file_name: &str) -> Destination {
        if self.is_spreadsheet(file_name) {
            Destination::Root
        } else {
            Destination::Category(self.classify(file_name))
        }
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&ClassifyConfig::default())
    }
}
