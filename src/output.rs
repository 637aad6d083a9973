//! CLI output formatting.
//!
//! # Information-First Display
//!
//! Output leads with what the run produced (the document, its pages, the
//! pictures that did not make it) and shows paths and causes as indented
//! context lines underneath. Diagnostics go through `tracing`; this module
//! only renders the end-of-run summary and the scheme listing.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! Picturebook → file:///home/me/books/picturebook.pdf
//!     Pictures: 12 gathered, 11 placed
//!     Pages: 14
//!
//! Skipped
//! 001 trip/broken.jpg
//!     Stage: decode
//!     Reason: decode failed: invalid JPEG marker
//!
//! Cleanup
//!     Removed 3 temp artifacts
//! ```
//!
//! ## Schemes
//!
//! ```text
//! filter
//!     any://
//!     regexp://
//! caption
//!     filename://
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure.

use crate::app::RunSummary;

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

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

/// Join a store URI and a file name without doubling the slash.
fn document_location(target: &str, filename: &str) -> String {
    if target.ends_with('/') {
        format!("{target}{filename}")
    } else {
        format!("{target}/{filename}")
    }
}

// ============================================================================
// Build summary
// ============================================================================

pub fn format_run_summary(summary: &RunSummary) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Picturebook \u{2192} {}",
            document_location(&summary.target, &summary.filename)
        ),
        format!(
            "{}Pictures: {} gathered, {} placed",
            indent(1),
            summary.gathered,
            summary.placed
        ),
        format!("{}Pages: {}", indent(1), summary.pages),
    ];
    if summary.cancelled {
        lines.push(format!("{}Cancelled before all pictures were placed", indent(1)));
    }

    if !summary.skipped.is_empty() {
        lines.push(String::new());
        lines.push("Skipped".to_string());
        for (i, item) in summary.skipped.iter().enumerate() {
            lines.push(format!("{} {}", format_index(i + 1), item.path));
            lines.push(format!("{}Stage: {}", indent(1), item.stage));
            lines.push(format!("{}Reason: {}", indent(1), item.reason));
        }
    }

    if summary.artifacts_removed > 0 || !summary.cleanup_failures.is_empty() {
        lines.push(String::new());
        lines.push("Cleanup".to_string());
        lines.push(format!(
            "{}Removed {}",
            indent(1),
            plural(summary.artifacts_removed, "temp artifact", "temp artifacts")
        ));
        for (path, reason) in &summary.cleanup_failures {
            lines.push(format!("{}Failed: {} ({})", indent(1), path, reason));
        }
    }

    lines
}

pub fn print_run_summary(summary: &RunSummary) {
    for line in format_run_summary(summary) {
        println!("{}", line);
    }
}

// ============================================================================
// Scheme listing
// ============================================================================

/// One header per extension point, its schemes indented below.
pub fn format_schemes(catalogue: &[(&str, Vec<String>)]) -> Vec<String> {
    let mut lines = Vec::new();
    for (kind, schemes) in catalogue {
        lines.push(kind.to_string());
        if schemes.is_empty() {
            lines.push(format!("{}(none)", indent(1)));
        }
        for scheme in schemes {
            lines.push(format!("{}{}", indent(1), scheme));
        }
    }
    lines
}

pub fn print_schemes(catalogue: &[(&str, Vec<String>)]) {
    for line in format_schemes(catalogue) {
        println!("{}", line);
    }
}
