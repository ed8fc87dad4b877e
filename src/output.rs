//! CLI output formatting.
//!
//! # Image-First Display
//!
//! Every line leads with the image's relative path, which is also its key in
//! the originals bucket, so output can be matched against the store
//! directly. Per-image details (uploaded keys, failure reasons) follow as
//! indented context lines.
//!
//! # Output Format
//!
//! ## Sync progress
//!
//! ```text
//! Inventory: originals (1204 objects)
//! queued  reviews/2021/cover.jpg (new, 45 variants)
//!     reviews/2021/cover-small-square.webp
//!     reviews/2021/cover-xsmall-original.jpg
//!     ...
//! done    reviews/2021/cover.jpg (45 variants)
//! failed  artists/c.png
//!     Reason: Failed to render large-original (webp): ...
//! ```
//!
//! Unchanged and unsupported files are summarized in the report rather than
//! listed one per line.
//!
//! ## Report
//!
//! ```text
//! Summary
//!     Processed:   1
//!     Unchanged:   1
//!     Unsupported: 0
//!     Failed:      1
//!
//! Failures
//!     001 artists/c.png
//!         Reason: ...
//! ```
//!
//! ## Variants
//!
//! ```text
//! Variants (45)
//! 001 xsmall-original   300 × auto  [original]
//! 002 xsmall-original   300 × auto  webp
//! ```
//!
//! # Architecture
//!
//! Each display has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::matrix::ImageVariantSpec;
use crate::pipeline::SyncEvent;
use crate::report::{ImageOutcome, SyncReport};

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// Sync progress
// ============================================================================

/// Format a single sync progress event as display lines.
///
/// Returns no lines for per-file events that only feed the summary.
pub fn format_sync_event(event: &SyncEvent) -> Vec<String> {
    match event {
        SyncEvent::InventoryFetched { bucket, objects } => {
            vec![format!("Inventory: {} ({})", bucket, plural(*objects, "object"))]
        }
        SyncEvent::DirectorySkipped { path, message } => {
            vec![
                format!("skipped {}", path.display()),
                format!("{}Reason: {}", indent(1), message),
            ]
        }
        SyncEvent::Unchanged { .. } | SyncEvent::Unsupported { .. } => Vec::new(),
        SyncEvent::Planned { path, reason } => vec![format!("plan    {} ({})", path, reason)],
        SyncEvent::Queued {
            path,
            reason,
            variants,
        } => vec![format!(
            "queued  {} ({}, {})",
            path,
            reason,
            plural(*variants, "variant")
        )],
        SyncEvent::VariantUploaded { key, .. } => vec![format!("{}{}", indent(1), key)],
        SyncEvent::Completed { path, variants } => {
            vec![format!("done    {} ({})", path, plural(*variants, "variant"))]
        }
        SyncEvent::Failed { path, reason } => vec![
            format!("failed  {}", path),
            format!("{}Reason: {}", indent(1), reason),
        ],
    }
}

// ============================================================================
// Report
// ============================================================================

/// Format the end-of-run report: totals, then every failure and skipped
/// directory.
pub fn format_report(report: &SyncReport) -> Vec<String> {
    let counts = report.counts();
    let mut lines = vec!["Summary".to_string()];
    let mut rows = vec![
        ("Processed", counts.processed),
        ("Unchanged", counts.unchanged),
        ("Unsupported", counts.unsupported),
        ("Failed", counts.failed),
    ];
    if counts.planned > 0 {
        rows.insert(0, ("To process", counts.planned));
    }
    for (label, n) in rows {
        lines.push(format!("{}{:<13}{}", indent(1), format!("{label}:"), n));
    }

    let failures = report.failures();
    if !failures.is_empty() {
        lines.push(String::new());
        lines.push("Failures".to_string());
        for (i, (path, reason)) in failures.iter().enumerate() {
            lines.push(format!("{}{} {}", indent(1), format_index(i + 1), path));
            lines.push(format!("{}Reason: {}", indent(2), reason));
        }
    }

    let skipped = report.skipped_directories();
    if !skipped.is_empty() {
        lines.push(String::new());
        lines.push("Skipped directories".to_string());
        for (path, message) in skipped {
            lines.push(format!("{}{}: {}", indent(1), path.display(), message));
        }
    }

    lines
}

/// Print the report to stdout.
pub fn print_report(report: &SyncReport) {
    for line in format_report(report) {
        println!("{}", line);
    }
}

/// Format a dry-run listing: every image that would be processed.
pub fn format_plan(report: &SyncReport) -> Vec<String> {
    let planned: Vec<String> = report
        .outcomes()
        .filter_map(|(path, outcome)| match outcome {
            ImageOutcome::Planned(reason) => Some(format!("{path} ({reason})")),
            _ => None,
        })
        .collect();

    let mut lines = vec![format!("Would process {}", plural(planned.len(), "image"))];
    for (i, line) in planned.iter().enumerate() {
        lines.push(format!("{}{} {}", indent(1), format_index(i + 1), line));
    }
    lines
}

/// Print the dry-run listing to stdout.
pub fn print_plan(report: &SyncReport) {
    for line in format_plan(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Variant matrix
// ============================================================================

/// Format the resolved variant list, one line per variant.
pub fn format_variants(variants: &[ImageVariantSpec]) -> Vec<String> {
    let name_width = variants.iter().map(|v| v.name.len()).max().unwrap_or(0);
    let mut lines = vec![format!("Variants ({})", variants.len())];
    for (i, variant) in variants.iter().enumerate() {
        let height = variant
            .height()
            .map(|h| h.to_string())
            .unwrap_or_else(|| "auto".to_string());
        lines.push(format!(
            "{} {:<name_width$}  {:>5} \u{00d7} {:<5} {}",
            format_index(i + 1),
            variant.name,
            variant.width,
            height,
            variant.format,
        ));
    }
    lines
}

/// Print the resolved variant list to stdout.
pub fn print_variants(variants: &[ImageVariantSpec]) {
    for line in format_variants(variants) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================
