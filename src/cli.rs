//! Command-line interface module for origsort.
//!
//! This module handles all CLI-related functionality including:
//! - Argument parsing
//! - Configuration loading
//! - Running the organizer on a worker thread
//! - Rendering its event stream as log lines, a progress bar or JSON

use crate::config::SorterConfig;
use crate::events::Event;
use crate::organizer::{Reorganizer, RunOptions, RunSummary};
use crate::output::OutputFormatter;
use clap::Parser;
use indicatif::ProgressBar;
use serde_json::json;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

/// Sort files scattered across a directory tree into root-level
/// originals and modified folders.
#[derive(Parser, Debug, Clone)]
#[command(name = "origsort", version, about)]
pub struct Args {
    /// Directory to reorganize.
    pub root: PathBuf,

    /// Show what would be moved without changing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Configuration file (defaults to .origsortrc.toml, then
    /// ~/.config/origsort/config.toml).
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print events and the summary as JSON lines.
    #[arg(long)]
    pub json: bool,

    /// Only print problems and the summary.
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Arguments for a plain run over `root`.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            dry_run: false,
            config: None,
            json: false,
            quiet: true,
        }
    }
}

/// Renders events as they arrive. Owns all display state.
enum Renderer {
    Human {
        quiet: bool,
        progress: Option<ProgressBar>,
    },
    Json,
}

impl Renderer {
    fn new(args: &Args) -> Self {
        if args.json {
            Renderer::Json
        } else {
            Renderer::Human {
                quiet: args.quiet,
                progress: None,
            }
        }
    }

    fn render(&mut self, event: &Event) {
        match self {
            Renderer::Json => match serde_json::to_string(event) {
                Ok(line) => println!("{}", line),
                Err(e) => log::warn!("could not serialize event: {}", e),
            },
            Renderer::Human { quiet, progress } => {
                match event {
                    Event::ScanComplete { candidates, .. } if *candidates > 0 && !*quiet => {
                        *progress = Some(OutputFormatter::create_progress_bar(*candidates as u64));
                    }
                    Event::Progress {
                        done, file_name, ..
                    } => {
                        if let Some(pb) = progress {
                            pb.set_position(*done as u64);
                            pb.set_message(file_name.clone());
                        }
                    }
                    _ => {}
                }

                if let Some(line) = OutputFormatter::event_line(event, *quiet) {
                    match progress {
                        Some(pb) => pb.println(line),
                        None if event.is_problem() => eprintln!("{}", line),
                        None => println!("{}", line),
                    }
                }
            }
        }
    }

    fn finish(&mut self, summary: &RunSummary) {
        match self {
            Renderer::Json => {
                println!("{}", json!({ "event": "summary", "summary": summary }));
            }
            Renderer::Human { progress, .. } => {
                if let Some(pb) = progress.take() {
                    pb.finish_and_clear();
                }
                OutputFormatter::summary_table(summary);
                if summary.dry_run {
                    OutputFormatter::dry_run_notice("No files were moved.");
                } else if let Some(line) = OutputFormatter::completion_line(summary) {
                    OutputFormatter::success(&line);
                }
            }
        }
    }

    fn abandon(&mut self) {
        if let Renderer::Human { progress, .. } = self
            && let Some(pb) = progress.take()
        {
            pb.abandon();
        }
    }
}

/// Runs one reorganization as described by `args`.
///
/// The organizer runs on a worker thread and reports through a channel;
/// this thread only renders. Per-file failures are reported but still
/// return `Ok`; only run-level failures return `Err`.
///
/// # Examples
///
/// ```no_run
/// use origsort::cli::{run_cli, Args};
///
/// match run_cli(&Args::for_root("/path/to/photos")) {
///     Ok(summary) => println!("moved {} files", summary.total()),
///     Err(e) => eprintln!("Error: {}", e),
/// }
/// ```
pub fn run_cli(args: &Args) -> Result<RunSummary, String> {
    let config = SorterConfig::load(args.config.as_deref())
        .map_err(|e| format!("Error loading configuration: {}", e))?;

    let organizer = Reorganizer::new(&args.root, &config)
        .map_err(|e| e.to_string())?
        .with_options(RunOptions {
            dry_run: args.dry_run,
            ..Default::default()
        });

    let mut renderer = Renderer::new(args);
    if !args.json {
        if args.dry_run {
            OutputFormatter::dry_run_notice(&format!(
                "Analyzing contents of: {}",
                organizer.root().display()
            ));
        } else {
            OutputFormatter::info(&format!(
                "Organizing contents of: {}",
                organizer.root().display()
            ));
        }
    }

    let (tx, rx) = mpsc::channel::<Event>();
    let worker = thread::spawn(move || organizer.run(&tx));

    // Ends once the worker drops its sender.
    for event in rx {
        renderer.render(&event);
    }

    let result = worker
        .join()
        .map_err(|_| "Organizer thread panicked".to_string())?;

    match result {
        Ok(summary) => {
            renderer.finish(&summary);
            Ok(summary)
        }
        Err(e) => {
            renderer.abandon();
            Err(format!("Error: {}", e))
        }
    }
}
