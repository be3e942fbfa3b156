//! origsort - consolidate scattered files into originals and modified folders
//!
//! This library walks a directory tree, classifies every file by its name
//! (keywords or CJK characters mark an edited copy), and moves it into one
//! of two folders at the root of the tree. Spreadsheets go to the root
//! itself. Runs are idempotent: a second run over a sorted tree moves
//! nothing.

pub mod classifier;
pub mod cli;
pub mod collision;
pub mod config;
pub mod error;
pub mod events;
pub mod organizer;
pub mod output;
pub mod walker;

pub use classifier::{Category, Classifier, Destination};
pub use config::{CompiledFilters, ConfigError, SorterConfig};
pub use error::{SortError, SortResult};
pub use events::{CancelToken, Event, EventSink};
pub use organizer::{MoveOutcome, Reorganizer, RunOptions, RunState, RunSummary};
pub use walker::{CandidateFile, TreeWalker};

pub use cli::{Args, run_cli};
