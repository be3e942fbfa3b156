//! Output formatting and styling module.
//!
//! Turns run events and summaries into colored terminal lines, progress
//! bars and the final summary table.

use crate::events::Event;
use crate::organizer::RunSummary;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

/// Manages all CLI output with consistent styling and formatting.
pub struct OutputFormatter;

impl OutputFormatter {
    /// Prints a success message in green with a checkmark.
    pub fn success(message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    /// Prints an error message in red with an X mark.
    ///
    /// ```no_run
    /// use origsort::output::OutputFormatter;
    /// OutputFormatter::error("Failed to move file");
    /// ```
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red(), message);
    }

    /// Prints a warning message in yellow with a warning symbol.
    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow(), message);
    }

    /// Prints an info message in cyan.
    pub fn info(message: &str) {
        println!("{}", message.cyan());
    }

    /// Prints a section header.
    pub fn header(header: &str) {
        println!("\n{}", header.bold());
    }

    /// Styled log line for an event, or `None` for events that only drive
    /// the progress bar.
    ///
    /// With `quiet` set, only problems and cancellation produce a line.
    pub fn event_line(event: &Event, quiet: bool) -> Option<String> {
        let text = event.to_string();
        let line = match event {
            Event::Progress { .. } => return None,
            Event::FileFailed { .. } => format!("{} {}", "✗".red(), text),
            Event::DirectorySkipped { .. } | Event::Cancelled => {
                format!("{} {}", "⚠".yellow(), text)
            }
            _ if quiet => return None,
            Event::State { .. } => format!("{}", text.cyan().bold()),
            Event::FileMoved { dry_run: true, .. } => format!("{} {}", "→".yellow(), text),
            Event::FileMoved { .. } => format!("{} {}", "✓".green(), text),
            Event::ScanComplete { .. } | Event::DestinationReady { .. } => {
                format!("{}", text.cyan())
            }
            _ => format!("  {}", text.dimmed()),
        };
        Some(line)
    }

    /// Creates a progress bar over `total` files.
    ///
    /// ```no_run
    /// use origsort::output::OutputFormatter;
    /// let pb = OutputFormatter::create_progress_bar(100);
    /// pb.inc(1);
    /// pb.finish_with_message("Completed!");
    /// ```
    pub fn create_progress_bar(total: u64) -> ProgressBar {
        let pb = ProgressBar::new(total);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");
        pb.set_style(style);
        pb
    }

    /// Rows of the summary table, in display order.
    pub fn summary_rows(summary: &RunSummary) -> Vec<(&'static str, usize)> {
        vec![
            ("Corrected", summary.corrected),
            ("Processed", summary.processed),
            ("Renamed", summary.renamed),
            ("Skipped", summary.skipped),
            ("Failed", summary.failed),
            ("Excluded", summary.excluded),
            ("Skipped dirs", summary.skipped_dirs),
            ("Access denied", summary.access_denied_dirs),
        ]
    }

    /// Prints the final summary table.
    pub fn summary_table(summary: &RunSummary) {
        Self::header(if summary.dry_run {
            "SUMMARY (dry run)"
        } else {
            "SUMMARY"
        });

        let rows = Self::summary_rows(summary);
        let width = rows
            .iter()
            .map(|(name, _)| name.len())
            .max()
            .unwrap_or(0)
            .max(8);

        println!("{:<width$} | {}", "Step".bold(), "Files".bold(), width = width);
        println!("{}", "-".repeat(width + 10));

        for (name, count) in &rows {
            let count_text = if *name == "Failed" && *count > 0 {
                count.to_string().red()
            } else {
                count.to_string().green()
            };
            println!("{:<width$} | {}", name, count_text, width = width);
        }

        println!("{}", "-".repeat(width + 10));
        let total = summary.total();
        println!(
            "{:<width$} | {} {}",
            "Total".bold(),
            total.to_string().green().bold(),
            if total == 1 { "file" } else { "files" },
            width = width
        );

        if summary.cancelled {
            Self::warning("Run was cancelled before all files were processed.");
        }
        if summary.failed > 0 {
            Self::warning("Some files could not be moved. Please review errors above.");
        }
    }

    /// Closing line for a run that finished cleanly, `None` if it was
    /// cancelled or had failures.
    pub fn completion_line(summary: &RunSummary) -> Option<String> {
        if summary.cancelled || summary.failed > 0 {
            return None;
        }
        let total = summary.total();
        Some(format!(
            "Organized {} {}",
            total,
            if total == 1 { "file" } else { "files" }
        ))
    }

    /// Prints a dry-run notice message.
    pub fn dry_run_notice(message: &str) {
        println!("{}", format!("[DRY RUN] {}", message).yellow());
    }
}
