//! pkgreport core library - presentation glue for package report pages

#![deny(warnings)]

// Global invariants enforced in this crate:
// - No global mutable state; trackers and settings are passed explicitly
// - No threads, clocks, network, or async
// - Missing elements are empty selections, never errors
// - Identical input yields byte-for-byte identical output

pub mod annotate;
pub mod config;
pub mod creq;
pub mod dom;
pub mod page;
pub mod toggle;
pub mod tracker;

pub use annotate::{annotate_document, annotate_markup, Annotation, AnnotatorSettings, BugContainer};
pub use config::ResolvedConfig;
pub use dom::{Document, DomQuery, NodeId, Selector};
pub use page::Page;
pub use toggle::{EventOutcome, ToggleController};
pub use tracker::{compile_trackers, CompiledTrackers, IssueTrackerConfig};

use anyhow::{Context, Result};
use std::path::Path;

/// Trackers for a page: the configured ones, or the page's embedded
/// `issue_ref` list when none are configured
pub fn page_trackers(document: &Document, resolved: &ResolvedConfig) -> Result<CompiledTrackers> {
    if !resolved.trackers.is_empty() || !resolved.trackers.skipped.is_empty() {
        return Ok(resolved.trackers.clone());
    }
    let embedded = tracker::extract_embedded(document)?.unwrap_or_default();
    Ok(compile_trackers(&embedded))
}

/// Annotate a rendered report page
///
/// Returns the annotated markup and what was found.
pub fn annotate_html(html: &str, resolved: ResolvedConfig) -> Result<(String, Annotation)> {
    let document = Document::parse(html);
    let trackers = page_trackers(&document, &resolved)?;

    let mut page = Page::new(document, trackers, resolved.settings)?;
    let annotation = page.ready().unwrap_or_default();
    Ok((page.into_document().to_html(), annotation))
}

/// Read, annotate, and return a report page from disk
pub fn annotate_file(path: &Path, resolved: ResolvedConfig) -> Result<(String, Annotation)> {
    let html = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read report: {}", path.display()))?;
    annotate_html(&html, resolved)
}
