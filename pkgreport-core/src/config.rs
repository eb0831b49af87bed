//! Configuration file support for pkgreport
//!
//! Loads the issue tracker list and annotator settings from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.pkgreportrc.json` in the working directory
//! 3. `pkgreport.config.json` in the working directory
//!
//! When no file is found, callers fall back to the tracker list embedded in
//! the report page itself (see `tracker::extract_embedded`).
//!
//! All fields are optional.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::annotate::{
    AnnotatorSettings, DEFAULT_CHANGELOG_SELECTOR, DEFAULT_HIGHLIGHT, DEFAULT_ISSUES_SELECTOR,
};
use crate::dom::Selector;
use crate::tracker::{compile_trackers, CompiledTrackers, IssueTrackerConfig};

/// Config file names searched in order
pub const CONFIG_FILE_NAMES: &[&str] = &[".pkgreportrc.json", "pkgreport.config.json"];

/// pkgreport configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PkgReportConfig {
    /// Issue trackers in display order
    #[serde(default)]
    pub trackers: Vec<IssueTrackerConfig>,

    /// Highlight colour for linked references (default: yellow)
    #[serde(default)]
    pub highlight: Option<String>,

    /// Selector of containers to annotate (default: div.changelog)
    #[serde(default)]
    pub changelog_selector: Option<String>,

    /// Selector of containers receiving the summary (default: div#issues)
    #[serde(default)]
    pub issues_selector: Option<String>,
}

/// Resolved configuration with compiled trackers and selectors
#[derive(Debug)]
pub struct ResolvedConfig {
    pub trackers: CompiledTrackers,
    pub settings: AnnotatorSettings,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

impl PkgReportConfig {
    /// Validate the configuration for logical errors
    ///
    /// Tracker patterns are not compiled here: a bad pattern only disables
    /// its own tracker at resolve time.
    pub fn validate(&self) -> Result<()> {
        for (i, tracker) in self.trackers.iter().enumerate() {
            tracker
                .validate()
                .with_context(|| format!("trackers[{}] ('{}') is invalid", i, tracker.name))?;
        }

        if let Some(color) = &self.highlight {
            validate_color(color)?;
        }

        if let Some(sel) = &self.changelog_selector {
            Selector::parse(sel).context("invalid changelog_selector")?;
        }
        if let Some(sel) = &self.issues_selector {
            Selector::parse(sel).context("invalid issues_selector")?;
        }

        Ok(())
    }

    /// Resolve config into compiled form ready for use
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let settings = AnnotatorSettings::new(
            self.highlight.as_deref().unwrap_or(DEFAULT_HIGHLIGHT),
            self.changelog_selector
                .as_deref()
                .unwrap_or(DEFAULT_CHANGELOG_SELECTOR),
            self.issues_selector
                .as_deref()
                .unwrap_or(DEFAULT_ISSUES_SELECTOR),
        )?;

        Ok(ResolvedConfig {
            trackers: compile_trackers(&self.trackers),
            settings,
            config_path: None,
        })
    }
}

impl ResolvedConfig {
    /// Build a ResolvedConfig with all defaults (no trackers)
    pub fn defaults() -> Result<Self> {
        PkgReportConfig::default().resolve()
    }

    /// Replace the tracker list, e.g. with one embedded in the page
    pub fn with_trackers(mut self, trackers: &[IssueTrackerConfig]) -> Self {
        self.trackers = compile_trackers(trackers);
        self
    }
}

/// Colours end up inside a `style` attribute, so only plain CSS colour
/// syntax is accepted
fn validate_color(color: &str) -> Result<()> {
    if color.trim().is_empty() {
        anyhow::bail!("highlight must not be empty");
    }
    if let Some(bad) = color
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '#' | '(' | ')' | ',' | '.' | '%' | ' ')))
    {
        anyhow::bail!("highlight contains invalid character '{}' (got {})", bad, color);
    }
    Ok(())
}

/// Discover and load a config file from a directory
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(dir: &Path) -> Result<Option<(PkgReportConfig, PathBuf)>> {
    for name in CONFIG_FILE_NAMES {
        let path = dir.join(name);
        if path.exists() {
            let config = load_config_file(&path)?;
            return Ok(Some((config, path)));
        }
    }
    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<PkgReportConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: PkgReportConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load and resolve config
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config in `dir`.
/// Returns `Ok(None)` if nothing is found.
pub fn load_and_resolve(dir: &Path, config_path: Option<&Path>) -> Result<Option<ResolvedConfig>> {
    let (config, source_path) = if let Some(path) = config_path {
        (load_config_file(path)?, path.to_path_buf())
    } else {
        match discover_config(dir)? {
            Some(found) => found,
            None => return Ok(None),
        }
    };

    let mut resolved = config.resolve()?;
    resolved.config_path = Some(source_path);
    Ok(Some(resolved))
}
