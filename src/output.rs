//! CLI output formatting for `build` and `check`.
//!
//! # Output Format
//!
//! ## Check
//!
//! ```text
//! Pages
//! 001 Home → /
//!     Source: /index.md
//! 002 About → /about/
//!     Source: /about.md
//!     Uid: about
//!
//! Static files
//! 001 /css/site.css
//!
//! Checked 2 pages, 1 static file
//! ```
//!
//! ## Build
//!
//! ```text
//! Stages
//!     before-initializing 0.0ms
//!     ...
//! Processors
//!     markdown: 4/6 acted, 1.2ms
//! Output
//!     3 written, 0 unchanged, 1 copied, 0 up to date
//!
//! Built 4 pages, 1 static file, 0 dynamic pages in 12.3ms
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::content::ContentObject;
use crate::site::{BuildReport, SiteContent};
use crate::stats::ProcessorStat;
use std::time::Duration;

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

fn plural(n: usize, singular: &str, plural: &str) -> String {
    if n == 1 {
        format!("{n} {singular}")
    } else {
        format!("{n} {plural}")
    }
}

fn format_duration(d: Duration) -> String {
    format!("{:.1}ms", d.as_secs_f64() * 1000.0)
}

/// Header line for a page: index, title (or URL when untitled), URL.
fn page_header(index: usize, page: &ContentObject) -> String {
    match page.title.as_deref() {
        Some(title) if !title.is_empty() => {
            format!("{} {} → {}", format_index(index), title, page.url)
        }
        _ => format!("{} {}", format_index(index), page.url),
    }
}

fn processor_line(stat: &ProcessorStat) -> String {
    format!(
        "{}{}: {}/{} acted, {}",
        indent(1),
        stat.name,
        stat.hits,
        stat.invocations,
        format_duration(stat.elapsed)
    )
}

// ============================================================================
// Check
// ============================================================================

pub fn format_content_output(content: &SiteContent) -> Vec<String> {
    let mut lines = Vec::new();

    if !content.pages.is_empty() {
        lines.push("Pages".to_string());
        for (i, page) in content.pages.iter().enumerate() {
            lines.push(page_header(i + 1, page));
            if let Some(path) = page.path() {
                lines.push(format!("{}Source: {}", indent(1), path));
            }
            if let Some(uid) = page.uid.as_deref() {
                lines.push(format!("{}Uid: {}", indent(1), uid));
            }
        }
    }

    if !content.static_files.is_empty() {
        if !lines.is_empty() {
            lines.push(String::new());
        }
        lines.push("Static files".to_string());
        for (i, file) in content.static_files.iter().enumerate() {
            lines.push(format!("{} {}", format_index(i + 1), file.url));
        }
    }

    if !lines.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "Checked {}, {}",
        plural(content.pages.len(), "page", "pages"),
        plural(content.static_files.len(), "static file", "static files")
    ));
    lines
}

pub fn print_content_output(content: &SiteContent) {
    for line in format_content_output(content) {
        println!("{}", line);
    }
}

// ============================================================================
// Build
// ============================================================================

pub fn format_build_report(report: &BuildReport) -> Vec<String> {
    let stats = &report.stats;
    let mut lines = Vec::new();

    if !stats.stages.is_empty() {
        lines.push("Stages".to_string());
        lines.push(format!("{}loading {}", indent(1), format_duration(stats.loading)));
        for (stage, elapsed) in &stats.stages {
            lines.push(format!("{}{} {}", indent(1), stage, format_duration(*elapsed)));
        }
        lines.push(format!(
            "{}processing {}",
            indent(1),
            format_duration(stats.processing)
        ));
    }

    let processors: Vec<&ProcessorStat> = stats
        .site_processors
        .iter()
        .chain(&stats.processors)
        .collect();
    if !processors.is_empty() {
        lines.push("Processors".to_string());
        lines.extend(processors.into_iter().map(processor_line));
    }

    lines.push("Output".to_string());
    lines.push(format!("{}{}", indent(1), stats.writes));
    if stats.discarded > 0 {
        lines.push(format!(
            "{}{} discarded",
            indent(1),
            plural(stats.discarded, "entity", "entities")
        ));
    }

    lines.push(String::new());
    match report.aborted_at {
        Some(stage) => lines.push(format!(
            "Build aborted at {} ({})",
            stage,
            plural(report.error_count, "error", "errors")
        )),
        None => {
            lines.push(format!(
                "Built {}, {}, {} in {}",
                plural(stats.pages, "page", "pages"),
                plural(stats.static_files, "static file", "static files"),
                plural(stats.dynamic_pages, "dynamic page", "dynamic pages"),
                format_duration(stats.elapsed)
            ));
            if report.has_errors {
                lines.push(format!(
                    "Completed with {}, {}",
                    plural(report.error_count, "error", "errors"),
                    plural(report.warning_count, "warning", "warnings")
                ));
            }
        }
    }
    lines
}

pub fn print_build_report(report: &BuildReport) {
    for line in format_build_report(report) {
        println!("{}", line);
    }
}
