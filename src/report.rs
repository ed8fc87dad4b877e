//! Run report.
//!
//! One [`ImageOutcome`] per local file, keyed by relative path, plus the
//! directories the walker had to skip. Rendering lives in
//! [`output`](crate::output).

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::detect::ChangeReason;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    /// Remote original already matches.
    Unchanged,
    /// No decoder for this extension.
    Unsupported,
    /// Dry run: would have been processed.
    Planned(ChangeReason),
    /// Every variant and the original were uploaded.
    Processed { variants: usize },
    Failed { reason: String },
}

/// Per-outcome totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportCounts {
    pub unchanged: usize,
    pub unsupported: usize,
    pub planned: usize,
    pub processed: usize,
    pub failed: usize,
}

impl ReportCounts {
    pub fn total(&self) -> usize {
        self.unchanged + self.unsupported + self.planned + self.processed + self.failed
    }
}

impl fmt::Display for ReportCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} unchanged, {} unsupported, {} failed",
            self.processed, self.unchanged, self.unsupported, self.failed
        )?;
        if self.planned > 0 {
            write!(f, ", {} to process", self.planned)?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct SyncReport {
    outcomes: BTreeMap<String, ImageOutcome>,
    skipped_directories: Vec<(PathBuf, String)>,
}

impl SyncReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome for `path`, replacing any earlier one.
    pub fn record(&mut self, path: impl Into<String>, outcome: ImageOutcome) {
        self.outcomes.insert(path.into(), outcome);
    }

    pub fn skip_directory(&mut self, path: PathBuf, message: impl Into<String>) {
        self.skipped_directories.push((path, message.into()));
    }

    pub fn outcome(&self, path: &str) -> Option<&ImageOutcome> {
        self.outcomes.get(path)
    }

    /// All outcomes, sorted by path.
    pub fn outcomes(&self) -> impl Iterator<Item = (&str, &ImageOutcome)> {
        self.outcomes.iter().map(|(p, o)| (p.as_str(), o))
    }

    pub fn counts(&self) -> ReportCounts {
        let mut counts = ReportCounts::default();
        for outcome in self.outcomes.values() {
            match outcome {
                ImageOutcome::Unchanged => counts.unchanged += 1,
                ImageOutcome::Unsupported => counts.unsupported += 1,
                ImageOutcome::Planned(_) => counts.planned += 1,
                ImageOutcome::Processed { .. } => counts.processed += 1,
                ImageOutcome::Failed { .. } => counts.failed += 1,
            }
        }
        counts
    }

    /// `(path, reason)` for every failed image, sorted by path.
    pub fn failures(&self) -> Vec<(&str, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(path, outcome)| match outcome {
                ImageOutcome::Failed { reason } => Some((path.as_str(), reason.as_str())),
                _ => None,
            })
            .collect()
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes
            .values()
            .any(|o| matches!(o, ImageOutcome::Failed { .. }))
    }

    pub fn skipped_directories(&self) -> &[(PathBuf, String)] {
        &self.skipped_directories
    }
}
