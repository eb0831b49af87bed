//! Issue tracker configuration
//!
//! A tracker is a named (pattern, base URL) pair. Patterns are compiled
//! case-insensitively and every tracker carries explicit capture-group roles:
//!
//! - display group: the text that gets highlighted and linked
//! - id group: the bare issue id used in URLs and the summary
//!
//! Role resolution, first hit wins:
//! 1. named groups `(?P<display>...)` / `(?P<id>...)` in the pattern
//! 2. `display_group` / `id_group` in the config entry
//! 3. defaults: display = group 1 (whole match if there are no groups),
//!    id = group 3 if the pattern has three or more groups, otherwise the last group
//!
//! Global invariants enforced:
//! - Tracker order is preserved; it is both matching order and display order
//! - Duplicate tracker names collapse to the first occurrence
//! - An invalid tracker is skipped and reported, never fatal for the others

use anyhow::{Context, Result};
use regex::{Captures, Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::dom::{Document, DomQuery, NodeKind, Selector};

/// Field limits of the report generator's tracker records
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_PATTERN_LEN: usize = 100;
pub const MAX_URL_LEN: usize = 200;

/// Variable name the report generator embeds the tracker list under
const EMBEDDED_VAR: &str = "issue_ref";

/// One issue tracker as supplied by the report generator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IssueTrackerConfig {
    /// Display label in the summary
    pub name: String,
    /// Regex source, matched case-insensitively
    pub re: String,
    /// Base URL; `/show_bug.cgi` and `/buglist.cgi` are appended
    pub url: String,
    /// Capture group holding the text to highlight
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_group: Option<usize>,
    /// Capture group holding the bare issue id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_group: Option<usize>,
}

impl IssueTrackerConfig {
    pub fn new(name: &str, re: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            re: re.to_string(),
            url: url.to_string(),
            display_group: None,
            id_group: None,
        }
    }

    /// Validate field presence and lengths (the pattern itself is checked at compile time)
    pub fn validate(&self) -> Result<()> {
        for (field, value, max) in [
            ("name", &self.name, MAX_NAME_LEN),
            ("re", &self.re, MAX_PATTERN_LEN),
            ("url", &self.url, MAX_URL_LEN),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("tracker {} must not be empty", field);
            }
            let len = value.chars().count();
            if len > max {
                anyhow::bail!(
                    "tracker {} must be at most {} characters (got {})",
                    field,
                    max,
                    len
                );
            }
        }
        Ok(())
    }

    /// Compile the pattern and resolve capture-group roles
    pub fn compile(&self) -> Result<CompiledTracker> {
        self.validate()
            .with_context(|| format!("invalid tracker '{}'", self.name))?;

        let regex = RegexBuilder::new(&self.re)
            .case_insensitive(true)
            .build()
            .with_context(|| format!("invalid pattern for tracker '{}'", self.name))?;

        let group_count = regex.captures_len();
        let named = |wanted: &str| {
            regex
                .capture_names()
                .position(|name| name == Some(wanted))
        };

        let display_group = named("display")
            .or(self.display_group)
            .unwrap_or(if group_count > 1 { 1 } else { 0 });
        let id_group = named("id")
            .or(self.id_group)
            .unwrap_or(if group_count > 3 { 3 } else { group_count - 1 });

        for (role, index) in [("display", display_group), ("id", id_group)] {
            if index >= group_count {
                anyhow::bail!(
                    "tracker '{}': {} group {} does not exist (pattern has {} groups)",
                    self.name,
                    role,
                    index,
                    group_count - 1
                );
            }
        }

        Ok(CompiledTracker {
            name: self.name.clone(),
            url: self.url.trim_end_matches('/').to_string(),
            regex,
            display_group,
            id_group,
        })
    }
}

/// A tracker ready for matching
#[derive(Debug, Clone)]
pub struct CompiledTracker {
    pub name: String,
    /// Base URL without a trailing slash
    pub url: String,
    pub regex: Regex,
    pub display_group: usize,
    pub id_group: usize,
}

impl CompiledTracker {
    pub fn show_bug_url(&self, id: &str) -> String {
        format!("{}/show_bug.cgi?id={}", self.url, id)
    }

    /// Bulk lookup URL; every id is followed by a comma
    pub fn buglist_url<'a>(&self, ids: impl IntoIterator<Item = &'a str>) -> String {
        let mut url = format!("{}/buglist.cgi?bug_id=", self.url);
        for id in ids {
            url.push_str(id);
            url.push(',');
        }
        url
    }

    /// The id captured by this tracker's pattern, if the group participated
    pub fn id_of<'t>(&self, caps: &Captures<'t>) -> Option<&'t str> {
        caps.get(self.id_group).map(|m| m.as_str())
    }

    /// Match `text` and return the id group of the first match
    pub fn extract_id(&self, text: &str) -> Option<String> {
        self.regex
            .captures(text)
            .and_then(|caps| self.id_of(&caps).map(str::to_string))
    }
}

/// A tracker that could not be compiled
#[derive(Debug, Clone)]
pub struct SkippedTracker {
    pub name: String,
    pub reason: String,
}

/// Result of compiling a tracker list
#[derive(Debug, Clone, Default)]
pub struct CompiledTrackers {
    pub trackers: Vec<CompiledTracker>,
    pub skipped: Vec<SkippedTracker>,
}

impl CompiledTrackers {
    pub fn is_empty(&self) -> bool {
        self.trackers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.trackers.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CompiledTracker> {
        self.trackers.iter()
    }
}

/// Drop trackers whose name was already seen, keeping the first
pub fn dedup_by_name(configs: &[IssueTrackerConfig]) -> Vec<IssueTrackerConfig> {
    let mut seen = std::collections::HashSet::new();
    configs
        .iter()
        .filter(|c| seen.insert(c.name.as_str()))
        .cloned()
        .collect()
}

/// Compile a tracker list, skipping (and logging once) any entry that fails
pub fn compile_trackers(configs: &[IssueTrackerConfig]) -> CompiledTrackers {
    let mut compiled = CompiledTrackers::default();
    for config in dedup_by_name(configs) {
        match config.compile() {
            Ok(tracker) => compiled.trackers.push(tracker),
            Err(e) => {
                let reason = format!("{:#}", e);
                tracing::warn!(tracker = %config.name, error = %reason, "skipping issue tracker");
                compiled.skipped.push(SkippedTracker {
                    name: config.name.clone(),
                    reason,
                });
            }
        }
    }
    compiled
}

/// Read the tracker list the report generator embeds in the page as
/// `var issue_ref = [...];`
///
/// Returns `Ok(None)` if no script declares it.
pub fn extract_embedded(doc: &Document) -> Result<Option<Vec<IssueTrackerConfig>>> {
    let scripts = Selector::parse("script")?;
    for script in doc.query_all(&scripts) {
        for &child in doc.children(script) {
            let Some(NodeKind::Text(source)) = doc.node(child).map(|n| &n.kind) else {
                continue;
            };
            if let Some(json) = embedded_value(source) {
                let mut stream =
                    serde_json::Deserializer::from_str(json).into_iter::<Vec<IssueTrackerConfig>>();
                return match stream.next() {
                    Some(parsed) => Ok(Some(
                        parsed.context("failed to parse embedded issue_ref tracker list")?,
                    )),
                    None => anyhow::bail!("embedded issue_ref has no value"),
                };
            }
        }
    }
    Ok(None)
}

/// Find `issue_ref = <value>` in script source and return the text from `<value>` on
fn embedded_value(source: &str) -> Option<&str> {
    let mut offset = 0;
    while let Some(found) = source[offset..].find(EMBEDDED_VAR) {
        let start = offset + found;
        let end = start + EMBEDDED_VAR.len();
        let preceded_by_ident = source[..start]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '$');
        let rest = source[end..].trim_start();
        if !preceded_by_ident {
            if let Some(value) = rest.strip_prefix('=') {
                if !value.starts_with('=') {
                    return Some(value.trim_start());
                }
            }
        }
        offset = end;
    }
    None
}
