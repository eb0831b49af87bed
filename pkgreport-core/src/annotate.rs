//! Issue reference annotation
//!
//! Finds tracker-specific issue references in changelog markup, turns them
//! into highlighted links, and builds a per-tracker summary of distinct ids.
//!
//! Global invariants enforced:
//! - Pure function of (markup, trackers, settings); no global state
//! - Trackers are applied in configured order; summary follows the same order
//! - Only character data outside tags and outside existing `<a>` elements is
//!   matched, so annotating annotated markup changes nothing
//! - A container without matches keeps its markup byte-for-byte
//! - Trackers without ids contribute nothing to the summary

use anyhow::Result;
use serde::Serialize;
use std::borrow::Cow;

use crate::dom::{DomQuery, NodeId, Selector, RAW_TEXT_ELEMENTS};
use crate::tracker::{CompiledTracker, CompiledTrackers};

pub const DEFAULT_HIGHLIGHT: &str = "yellow";
pub const DEFAULT_CHANGELOG_SELECTOR: &str = "div.changelog";
pub const DEFAULT_ISSUES_SELECTOR: &str = "div#issues";

/// Where to look and how to highlight
#[derive(Debug, Clone)]
pub struct AnnotatorSettings {
    /// CSS colour used as the highlight background
    pub highlight: String,
    /// Containers whose markup is scanned
    pub changelog: Selector,
    /// Containers that receive the summary
    pub issues: Selector,
}

impl AnnotatorSettings {
    pub fn new(highlight: &str, changelog: &str, issues: &str) -> Result<Self> {
        Ok(Self {
            highlight: highlight.to_string(),
            changelog: Selector::parse(changelog)?,
            issues: Selector::parse(issues)?,
        })
    }

    pub fn defaults() -> Result<Self> {
        Self::new(
            DEFAULT_HIGHLIGHT,
            DEFAULT_CHANGELOG_SELECTOR,
            DEFAULT_ISSUES_SELECTOR,
        )
    }
}

/// Distinct issue ids for one tracker, in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BugContainer {
    ids: Vec<String>,
}

impl BugContainer {
    /// Insert unless already present; returns true if the id was new
    pub fn insert(&mut self, id: &str) -> bool {
        if self.contains(id) {
            return false;
        }
        self.ids.push(id.to_string());
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|existing| existing == id)
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Ids found for one tracker, as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackerIssues {
    pub name: String,
    pub buglist_url: String,
    pub ids: BugContainer,
}

/// Outcome of one annotation pass over a document
#[derive(Debug, Clone, Default, Serialize)]
pub struct Annotation {
    /// Changelog containers scanned
    pub containers: usize,
    /// Containers whose markup was rewritten
    pub rewritten: usize,
    /// Trackers with at least one id, in configured order
    pub issues: Vec<TrackerIssues>,
    /// Summary markup prepended to the issues containers (empty if none)
    #[serde(skip)]
    pub summary_html: String,
}

impl Annotation {
    pub fn total_ids(&self) -> usize {
        self.issues.iter().map(|t| t.ids.len()).sum()
    }
}

/// Annotate every changelog container and prepend the summary to every
/// issues container
pub fn annotate_document<D: DomQuery>(
    dom: &mut D,
    trackers: &CompiledTrackers,
    settings: &AnnotatorSettings,
) -> Annotation {
    let containers = dom.query_all(&settings.changelog);
    let mut bugs = vec![BugContainer::default(); trackers.len()];

    let mut updates: Vec<(NodeId, String)> = Vec::new();
    for &container in &containers {
        let markup = dom.inner_html(container);
        match annotate_markup(&markup, &trackers.trackers, &settings.highlight, &mut bugs) {
            Cow::Owned(updated) if updated != markup => {
                tracing::debug!(container = container.0, "annotated changelog container");
                updates.push((container, updated));
            }
            _ => {}
        }
    }

    let rewritten = updates.len();
    for (container, updated) in updates {
        dom.set_inner_html(container, &updated);
    }

    let summary_html = render_summary(&trackers.trackers, &bugs);
    if !summary_html.is_empty() {
        for issues in dom.query_all(&settings.issues) {
            dom.prepend_html(issues, &summary_html);
        }
    }

    let issues = trackers
        .iter()
        .zip(bugs)
        .filter(|(_, ids)| !ids.is_empty())
        .map(|(tracker, ids)| TrackerIssues {
            name: tracker.name.clone(),
            buglist_url: tracker.buglist_url(ids.ids().iter().map(String::as_str)),
            ids,
        })
        .collect();

    Annotation {
        containers: containers.len(),
        rewritten,
        issues,
        summary_html,
    }
}

/// Rewrite issue references in `markup` into highlighted links and record
/// their ids into `bugs` (one container per tracker, same order).
///
/// Returns `Cow::Borrowed` when nothing matched.
pub fn annotate_markup<'m>(
    markup: &'m str,
    trackers: &[CompiledTracker],
    highlight: &str,
    bugs: &mut [BugContainer],
) -> Cow<'m, str> {
    let mut buffer = Cow::Borrowed(markup);
    for (index, tracker) in trackers.iter().enumerate() {
        let Some(sack) = bugs.get_mut(index) else {
            break;
        };
        let rewritten = rewrite_text(&buffer, |text| {
            link_references(text, tracker, trackers, highlight, sack)
        });
        if let Cow::Owned(updated) = rewritten {
            buffer = Cow::Owned(updated);
        }
    }
    buffer
}

fn link_references<'t>(
    text: &'t str,
    tracker: &CompiledTracker,
    all: &[CompiledTracker],
    highlight: &str,
    sack: &mut BugContainer,
) -> Cow<'t, str> {
    tracker.regex.replace_all(text, |caps: &regex::Captures| {
        let Some(whole) = caps.get(0) else {
            return String::new();
        };
        let Some(id) = tracker.id_of(caps) else {
            return whole.as_str().to_string();
        };
        if whole.as_str().is_empty() {
            return String::new();
        }
        let display = caps.get(tracker.display_group).unwrap_or(whole);
        let prefix = &whole.as_str()[..display.start() - whole.start()];
        let suffix = &whole.as_str()[display.end() - whole.start()..];

        sack.insert(&normalize_id(display.as_str(), all, id));

        format!(
            r#"{prefix}<a href="{href}"><span style="background-color:{color}">{display}</span></a>{suffix}"#,
            prefix = prefix,
            href = escape_attr(&tracker.show_bug_url(id)),
            color = escape_attr(highlight),
            display = display.as_str(),
            suffix = suffix,
        )
    })
}

/// Reduce matched display text to a bare id: the first tracker whose pattern
/// matches the text on its own supplies the id; otherwise `fallback` is used
pub fn normalize_id(display: &str, trackers: &[CompiledTracker], fallback: &str) -> String {
    trackers
        .iter()
        .find_map(|t| t.extract_id(display))
        .unwrap_or_else(|| fallback.to_string())
}

/// Render the per-tracker summary block
///
/// Per tracker with ids: bold label, an "(ALL)" bulk lookup link, one link
/// per id, then a line break.
pub fn render_summary(trackers: &[CompiledTracker], bugs: &[BugContainer]) -> String {
    let mut out = String::new();
    for (tracker, ids) in trackers.iter().zip(bugs) {
        if ids.is_empty() {
            continue;
        }
        out.push_str(&format!("<b>{}:</b> ", html_escape(&tracker.name)));
        out.push_str(&format!(
            "<a href='{}'>(ALL) </a>",
            tracker
                .buglist_url(ids.ids().iter().map(String::as_str))
                .replace('\'', "&#39;")
        ));
        for id in ids.ids() {
            out.push_str(&format!(
                "<a href=\"{}\">{}, </a>",
                escape_attr(&tracker.show_bug_url(id)),
                id
            ));
        }
        out.push_str("<br/>");
    }
    out
}

/// Apply `f` to every run of character data that is outside tags and not
/// inside an `<a>` element. Returns `Cow::Borrowed` if `f` changed nothing.
fn rewrite_text<'m, F>(markup: &'m str, mut f: F) -> Cow<'m, str>
where
    F: for<'t> FnMut(&'t str) -> Cow<'t, str>,
{
    let mut out: Option<String> = None;
    let mut anchor_depth = 0usize;
    let mut copied_to = 0;

    for segment in segments(markup) {
        match segment {
            Segment::Tag { name, closing, .. } => {
                if name.eq_ignore_ascii_case("a") {
                    if closing {
                        anchor_depth = anchor_depth.saturating_sub(1);
                    } else {
                        anchor_depth += 1;
                    }
                }
            }
            Segment::Other => {}
            Segment::Text { start, end } => {
                if anchor_depth > 0 {
                    continue;
                }
                if let Cow::Owned(replaced) = f(&markup[start..end]) {
                    let buf = out.get_or_insert_with(|| String::with_capacity(markup.len()));
                    buf.push_str(&markup[copied_to..start]);
                    buf.push_str(&replaced);
                    copied_to = end;
                }
            }
        }
    }

    match out {
        Some(mut buf) => {
            buf.push_str(&markup[copied_to..]);
            Cow::Owned(buf)
        }
        None => Cow::Borrowed(markup),
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'m> {
    Text { start: usize, end: usize },
    Tag { name: &'m str, closing: bool },
    /// Comments, doctypes, raw text element content
    Other,
}

/// Split markup into character data and tags
fn segments(markup: &str) -> Vec<Segment<'_>> {
    let bytes = markup.as_bytes();
    let len = bytes.len();
    let mut out = Vec::new();
    let mut pos = 0;
    let mut text_start = 0;

    while pos < len {
        if bytes[pos] != b'<' {
            pos += 1;
            continue;
        }
        let rest = &markup[pos..];
        if rest.starts_with("<!--") {
            push_text(&mut out, text_start, pos);
            pos = rest[4..].find("-->").map(|i| pos + 4 + i + 3).unwrap_or(len);
            out.push(Segment::Other);
            text_start = pos;
            continue;
        }
        let (closing, name_start) = if rest.starts_with("</") {
            (true, pos + 2)
        } else {
            (false, pos + 1)
        };
        let opens_markup = bytes
            .get(name_start)
            .is_some_and(|b| b.is_ascii_alphabetic() || (*b == b'!' && !closing));
        if !opens_markup {
            pos += 1;
            continue;
        }

        push_text(&mut out, text_start, pos);
        let end = tag_end(bytes, name_start);
        if bytes[name_start] == b'!' {
            out.push(Segment::Other);
        } else {
            let mut name_end = name_start;
            while name_end < end
                && !bytes[name_end].is_ascii_whitespace()
                && bytes[name_end] != b'>'
                && bytes[name_end] != b'/'
            {
                name_end += 1;
            }
            let name = &markup[name_start..name_end];
            out.push(Segment::Tag { name, closing });

            let self_closing = end >= 2 && bytes[end - 2] == b'/';
            if !closing
                && !self_closing
                && RAW_TEXT_ELEMENTS.iter().any(|raw| raw.eq_ignore_ascii_case(name))
            {
                // Raw text runs to the matching end tag; nothing inside is markup
                let lower = markup[end..].to_ascii_lowercase();
                let content_end = lower
                    .find(&format!("</{}", name.to_ascii_lowercase()))
                    .map(|i| end + i)
                    .unwrap_or(len);
                if content_end > end {
                    out.push(Segment::Other);
                }
                pos = content_end;
                text_start = pos;
                continue;
            }
        }
        pos = end;
        text_start = pos;
    }
    push_text(&mut out, text_start, len);
    out
}

fn push_text(out: &mut Vec<Segment<'_>>, start: usize, end: usize) {
    if end > start {
        out.push(Segment::Text { start, end });
    }
}

/// Offset just past the '>' closing a tag, honouring quoted attribute values
fn tag_end(bytes: &[u8], from: usize) -> usize {
    let mut quote: Option<u8> = None;
    let mut pos = from;
    while pos < bytes.len() {
        let b = bytes[pos];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return pos + 1,
            None => {}
        }
        pos += 1;
    }
    bytes.len()
}

fn escape_attr(s: &str) -> String {
    s.replace('"', "&quot;")
}

/// Escape HTML special characters
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::tracker::{compile_trackers, IssueTrackerConfig};

    fn trackers(configs: &[(&str, &str, &str)]) -> CompiledTrackers {
        let configs: Vec<IssueTrackerConfig> = configs
            .iter()
            .map(|(name, re, url)| IssueTrackerConfig::new(name, re, url))
            .collect();
        compile_trackers(&configs)
    }

    fn bug_tracker() -> CompiledTrackers {
        trackers(&[("T", r"(BUG-(\d+))", "http://t")])
    }

    #[test]
    fn test_rewrites_every_occurrence_and_dedups_ids() {
        let t = bug_tracker();
        let mut bugs = vec![BugContainer::default()];
        let out = annotate_markup("fixed BUG-42 and BUG-42 again", &t.trackers, "yellow", &mut bugs);
        assert_eq!(
            out,
            "fixed <a href=\"http://t/show_bug.cgi?id=42\"><span style=\"background-color:yellow\">BUG-42</span></a> \
             and <a href=\"http://t/show_bug.cgi?id=42\"><span style=\"background-color:yellow\">BUG-42</span></a> again"
        );
        assert_eq!(out.matches("http://t/show_bug.cgi?id=42").count(), 2);
        assert_eq!(bugs[0].ids(), ["42"]);
    }

    #[test]
    fn test_no_match_is_borrowed() {
        let t = bug_tracker();
        let mut bugs = vec![BugContainer::default()];
        let markup = "<p>nothing to see</p>";
        let out = annotate_markup(markup, &t.trackers, "yellow", &mut bugs);
        assert!(matches!(out, Cow::Borrowed(_)));
        assert!(bugs[0].is_empty());
    }

    #[test]
    fn test_does_not_match_inside_tags() {
        let t = bug_tracker();
        let mut bugs = vec![BugContainer::default()];
        let markup = r#"<span title="BUG-7">text</span>"#;
        let out = annotate_markup(markup, &t.trackers, "yellow", &mut bugs);
        assert_eq!(out, markup);
        assert!(bugs[0].is_empty());
    }

    #[test]
    fn test_reannotation_is_idempotent() {
        let t = bug_tracker();
        let mut bugs = vec![BugContainer::default()];
        let first = annotate_markup("BUG-1, BUG-2", &t.trackers, "yellow", &mut bugs).into_owned();
        let mut again = vec![BugContainer::default()];
        let second = annotate_markup(&first, &t.trackers, "yellow", &mut again);
        assert_eq!(second, first);
        assert!(again[0].is_empty());
    }

    #[test]
    fn test_context_outside_display_group_is_kept() {
        let t = trackers(&[("T", r"fixes (BUG-(\d+))", "http://t")]);
        let mut bugs = vec![BugContainer::default()];
        let out = annotate_markup("this fixes bug-9.", &t.trackers, "yellow", &mut bugs);
        assert_eq!(
            out,
            "this fixes <a href=\"http://t/show_bug.cgi?id=9\"><span style=\"background-color:yellow\">bug-9</span></a>."
        );
        assert_eq!(bugs[0].ids(), ["9"]);
    }

    #[test]
    fn test_legacy_three_group_pattern() {
        let t = trackers(&[("bnc", r"((bnc|boo)#(\d+))", "https://bugzilla.suse.com")]);
        let mut bugs = vec![BugContainer::default()];
        let out = annotate_markup("- fix crash (bnc#123, boo#456)", &t.trackers, "yellow", &mut bugs);
        assert!(out.contains("https://bugzilla.suse.com/show_bug.cgi?id=123"));
        assert!(out.contains(">bnc#123</span>"));
        assert_eq!(bugs[0].ids(), ["123", "456"]);
    }

    #[test]
    fn test_disjoint_trackers_do_not_interfere() {
        let t = trackers(&[
            ("A", r"(A-(\d+))", "http://a"),
            ("B", r"(B-(\d+))", "http://b"),
        ]);
        let mut bugs = vec![BugContainer::default(), BugContainer::default()];
        annotate_markup("A-1 B-2 A-3", &t.trackers, "yellow", &mut bugs);
        assert_eq!(bugs[0].ids(), ["1", "3"]);
        assert_eq!(bugs[1].ids(), ["2"]);

        let summary = render_summary(&t.trackers, &bugs);
        let a = summary.find("<b>A:</b>").unwrap();
        let b = summary.find("<b>B:</b>").unwrap();
        assert!(a < b);
    }

    #[test]
    fn test_later_tracker_does_not_rematch_earlier_links() {
        let t = trackers(&[
            ("wide", r"(BUG-(\d+))", "http://wide"),
            ("narrow", r"(G-(\d+))", "http://narrow"),
        ]);
        let mut bugs = vec![BugContainer::default(), BugContainer::default()];
        let out = annotate_markup("BUG-5", &t.trackers, "yellow", &mut bugs);
        assert!(!out.contains("http://narrow"));
        assert!(bugs[1].is_empty());
    }

    #[test]
    fn test_normalize_first_matching_tracker_wins() {
        let t = trackers(&[
            ("first", r"(X(\d+))", "http://1"),
            ("second", r"(X(\d)\d*)", "http://2"),
        ]);
        assert_eq!(normalize_id("X123", &t.trackers, "fallback"), "123");
        assert_eq!(normalize_id("nope", &t.trackers, "fallback"), "fallback");
    }

    #[test]
    fn test_summary_format() {
        let t = bug_tracker();
        let mut bugs = vec![BugContainer::default()];
        bugs[0].insert("42");
        bugs[0].insert("7");
        assert_eq!(
            render_summary(&t.trackers, &bugs),
            "<b>T:</b> <a href='http://t/buglist.cgi?bug_id=42,7,'>(ALL) </a>\
             <a href=\"http://t/show_bug.cgi?id=42\">42, </a>\
             <a href=\"http://t/show_bug.cgi?id=7\">7, </a><br/>"
        );
    }

    #[test]
    fn test_summary_skips_empty_trackers_entirely() {
        let t = trackers(&[
            ("A", r"(A-(\d+))", "http://a"),
            ("B", r"(B-(\d+))", "http://b"),
        ]);
        let mut bugs = vec![BugContainer::default(), BugContainer::default()];
        bugs[1].insert("2");
        let summary = render_summary(&t.trackers, &bugs);
        assert!(!summary.contains("A:"));
        assert_eq!(summary.matches("<br/>").count(), 1);
        assert!(render_summary(&t.trackers, &[BugContainer::default(), BugContainer::default()]).is_empty());
    }

    #[test]
    fn test_annotate_document_end_to_end() {
        let mut doc = Document::parse(
            r#"<div id="issues"><p>existing</p></div><div class="changelog">fixed BUG-42 and BUG-42 again</div><div class="changelog">no refs</div>"#,
        );
        let settings = AnnotatorSettings::defaults().unwrap();
        let annotation = annotate_document(&mut doc, &bug_tracker(), &settings);

        assert_eq!(annotation.containers, 2);
        assert_eq!(annotation.rewritten, 1);
        assert_eq!(annotation.issues.len(), 1);
        assert_eq!(annotation.issues[0].ids.ids(), ["42"]);
        assert_eq!(annotation.issues[0].buglist_url, "http://t/buglist.cgi?bug_id=42,");

        let html = doc.to_html();
        assert!(html.starts_with(
            "<div id=\"issues\"><b>T:</b> <a href='http://t/buglist.cgi?bug_id=42,'>(ALL) </a>"
        ));
        assert!(html.contains("<p>existing</p></div>"));
        assert!(html.contains(r#"<div class="changelog">no refs</div>"#));
    }

    #[test]
    fn test_annotate_document_twice_changes_nothing() {
        let mut doc = Document::parse(
            r#"<div id="issues"></div><div class="changelog">BUG-1</div>"#,
        );
        let settings = AnnotatorSettings::defaults().unwrap();
        let t = bug_tracker();
        annotate_document(&mut doc, &t, &settings);
        let once = doc.to_html();
        let second = annotate_document(&mut doc, &t, &settings);
        assert_eq!(second.rewritten, 0);
        assert_eq!(second.total_ids(), 0);
        assert_eq!(doc.to_html(), once);
    }

    #[test]
    fn test_raw_text_element_content_is_not_markup() {
        let t = bug_tracker();
        let mut bugs = vec![BugContainer::default()];
        let markup = "<textarea>x <b don't BUG-5</textarea> BUG-6 <script>if (a<b) BUG-7;</script>BUG-8";
        let out = annotate_markup(markup, &t.trackers, "yellow", &mut bugs);
        assert_eq!(bugs[0].ids(), ["6", "8"]);
        assert!(out.starts_with("<textarea>x <b don't BUG-5</textarea> <a "));
        assert!(out.contains("<script>if (a<b) BUG-7;</script><a "));
    }

    #[test]
    fn test_segments_skip_raw_text_content() {
        let segs = segments("<STYLE>a<b{}</style>c");
        assert_eq!(
            segs,
            vec![
                Segment::Tag { name: "STYLE", closing: false },
                Segment::Other,
                Segment::Tag { name: "style", closing: true },
                Segment::Text { start: 20, end: 21 },
            ]
        );
    }

    #[test]
    fn test_segments_split_tags_and_text() {
        let segs = segments(r#"a<a href="x>y">b</a><!-- c -->d"#);
        assert_eq!(
            segs,
            vec![
                Segment::Text { start: 0, end: 1 },
                Segment::Tag { name: "a", closing: false },
                Segment::Text { start: 15, end: 16 },
                Segment::Tag { name: "a", closing: true },
                Segment::Other,
                Segment::Text { start: 30, end: 31 },
            ]
        );
    }
}
