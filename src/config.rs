//! Run configuration: destination folder names, classification keywords
//! and file filtering rules.
//!
//! Configuration is read from an optional TOML file. Every section is
//! optional and falls back to the built-in defaults:
//!
//! ```toml
//! [layout]
//! original_dir_name = "原图"
//! modified_dir_name = "处理图"
//!
//! [classify]
//! keywords = ["修改后", "增加", "增加后", "拷贝", "改后"]
//! spreadsheet_extensions = ["xlsx", "xls"]
//!
//! [filters]
//! enable_hidden_files = true
//!
//! [filters.exclude]
//! filenames = ["Thumbs.db"]
//! patterns = ["*.tmp"]
//! extensions = ["bak"]
//! regex = []
//!
//! [filters.include]
//! patterns = []
//! ```

use glob::Pattern;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default name of the root-level folder holding original files.
pub const ORIGINAL_DIR_NAME: &str = "原图";
/// Default name of the root-level folder holding modified files.
pub const MODIFIED_DIR_NAME: &str = "处理图";
/// Default filename keywords that mark a file as modified.
pub const DEFAULT_KEYWORDS: [&str; 5] = ["修改后", "增加", "增加后", "拷贝", "改后"];
/// Default extensions routed straight to the root.
pub const DEFAULT_SPREADSHEET_EXTENSIONS: [&str; 2] = ["xlsx", "xls"];

const LOCAL_CONFIG_NAME: &str = ".origsortrc.toml";

/// Errors that can occur during configuration loading and validation.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),
    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),
    #[error("Invalid glob pattern '{0}': expected *.ext or dir/**")]
    InvalidGlobPattern(String),
    #[error("Invalid regex pattern '{pattern}': {reason}")]
    InvalidRegexPattern { pattern: String, reason: String },
    #[error("IO error reading configuration: {0}")]
    IoError(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SorterConfig {
    #[serde(default)]
    pub layout: LayoutConfig,
    #[serde(default)]
    pub classify: ClassifyConfig,
    #[serde(default)]
    pub filters: FilterRules,
}

/// Names of the two root-level destination folders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    #[serde(default = "default_original_dir_name")]
    pub original_dir_name: String,
    #[serde(default = "default_modified_dir_name")]
    pub modified_dir_name: String,
}

fn default_original_dir_name() -> String {
    ORIGINAL_DIR_NAME.to_string()
}

fn default_modified_dir_name() -> String {
    MODIFIED_DIR_NAME.to_string()
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            original_dir_name: default_original_dir_name(),
            modified_dir_name: default_modified_dir_name(),
        }
    }
}

impl LayoutConfig {
    /// True if `name` is one of the destination folder names.
    pub fn is_destination_name(&self, name: &str) -> bool {
        name == self.original_dir_name || name == self.modified_dir_name
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for name in [&self.original_dir_name, &self.modified_dir_name] {
            if name.is_empty() || name == "." || name == ".." {
                return Err(ConfigError::ConfigInvalid(format!(
                    "destination folder name '{}' is not usable",
                    name
                )));
            }
            if name.contains('/') || name.contains('\\') {
                return Err(ConfigError::ConfigInvalid(format!(
                    "destination folder name '{}' must not contain a path separator",
                    name
                )));
            }
        }
        if self.original_dir_name == self.modified_dir_name {
            return Err(ConfigError::ConfigInvalid(
                "original and modified folder names must differ".to_string(),
            ));
        }
        Ok(())
    }
}

/// Filename heuristics used by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyConfig {
    /// Case-sensitive substrings that mark a filename as modified.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    /// Extensions (without dot, matched case-insensitively) sent to the root.
    #[serde(default = "default_spreadsheet_extensions")]
    pub spreadsheet_extensions: Vec<String>,
}

fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

fn default_spreadsheet_extensions() -> Vec<String> {
    DEFAULT_SPREADSHEET_EXTENSIONS
        .iter()
        .map(|e| e.to_string())
        .collect()
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            spreadsheet_extensions: default_spreadsheet_extensions(),
        }
    }
}

/// Rules deciding which discovered files are left alone entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRules {
    /// Whether hidden files (starting with ".") are sorted too. Defaults to true.
    #[serde(default = "default_enable_hidden_files")]
    pub enable_hidden_files: bool,

    #[serde(default)]
    pub exclude: ExcludeRules,

    /// Whitelist, overrides exclude rules.
    #[serde(default)]
    pub include: IncludeRules,
}

fn default_enable_hidden_files() -> bool {
    true
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            enable_hidden_files: default_enable_hidden_files(),
            exclude: ExcludeRules::default(),
            include: IncludeRules::default(),
        }
    }
}

/// Rules for excluding files from sorting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExcludeRules {
    #[serde(default)]
    pub filenames: Vec<String>,
    /// Glob patterns, matched against the path relative to the root.
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Regex patterns, matched against the filename.
    #[serde(default)]
    pub regex: Vec<String>,
}

/// Glob patterns that override exclude rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncludeRules {
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl SorterConfig {
    /// Load configuration, falling back to defaults.
    ///
    /// Lookup order:
    /// 1. `config_path`, if provided
    /// 2. `.origsortrc.toml` in the current directory
    /// 3. `~/.config/origsort/config.toml`
    /// 4. built-in defaults
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly provided file cannot be read, or if
    /// any discovered file is malformed.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = config_path {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from(LOCAL_CONFIG_NAME);
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_config = PathBuf::from(home)
                .join(".config")
                .join("origsort")
                .join("config.toml");
            if home_config.exists() {
                return Self::load_from_file(&home_config);
            }
        }

        Ok(Self::default())
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::ConfigNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::ConfigInvalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the layout and classification settings for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.layout.validate()?;
        if self.classify.keywords.iter().any(|k| k.is_empty()) {
            return Err(ConfigError::ConfigInvalid(
                "classification keywords must not be empty strings".to_string(),
            ));
        }
        Ok(())
    }

    /// Compile the filter rules into matchers.
    pub fn compile_filters(&self) -> Result<CompiledFilters, ConfigError> {
        CompiledFilters::new(&self.filters)
    }
}

/// Pre-compiled filter rules.
#[derive(Debug)]
pub struct CompiledFilters {
    enable_hidden_files: bool,
    exclude_filenames: HashSet<String>,
    exclude_extensions: HashSet<String>,
    exclude_patterns: Vec<Pattern>,
    exclude_regexes: Vec<Regex>,
    include_patterns: Vec<Pattern>,
}

fn compile_globs(patterns: &[String]) -> Result<Vec<Pattern>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|_| ConfigError::InvalidGlobPattern(pattern.clone()))
        })
        .collect()
}

impl CompiledFilters {
    fn new(rules: &FilterRules) -> Result<Self, ConfigError> {
        let exclude_patterns = compile_globs(&rules.exclude.patterns)?;
        let include_patterns = compile_globs(&rules.include.patterns)?;

        let exclude_regexes = rules
            .exclude
            .regex
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| ConfigError::InvalidRegexPattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            enable_hidden_files: rules.enable_hidden_files,
            exclude_filenames: rules.exclude.filenames.iter().cloned().collect(),
            exclude_extensions: rules
                .exclude
                .extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_lowercase())
                .collect(),
            exclude_patterns,
            exclude_regexes,
            include_patterns,
        })
    }

    /// Filters that let every file through.
    pub fn allow_all() -> Self {
        Self {
            enable_hidden_files: true,
            exclude_filenames: HashSet::new(),
            exclude_extensions: HashSet::new(),
            exclude_patterns: Vec::new(),
            exclude_regexes: Vec::new(),
            include_patterns: Vec::new(),
        }
    }

    /// Check if a file should be sorted. `rel_path` is relative to the root.
    ///
    /// Include patterns win over everything; otherwise the file is dropped
    /// if it is hidden (and hidden files are disabled), or matches an
    /// excluded filename, extension, glob or regex.
    pub fn should_include(&self, rel_path: &Path) -> bool {
        let file_name = rel_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();

        if self
            .include_patterns
            .iter()
            .any(|pattern| pattern.matches_path(rel_path))
        {
            return true;
        }

        if !self.enable_hidden_files && file_name.starts_with('.') {
            return false;
        }

        if self.exclude_filenames.contains(file_name.as_ref()) {
            return false;
        }

        if let Some(ext) = rel_path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            if self.exclude_extensions.contains(&ext_lower) {
                return false;
            }
        }

        if self
            .exclude_patterns
            .iter()
            .any(|pattern| pattern.matches_path(rel_path))
        {
            return false;
        }

        !self
            .exclude_regexes
            .iter()
            .any(|regex| regex.is_match(&file_name))
    }
}
