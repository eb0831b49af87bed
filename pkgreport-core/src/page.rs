//! Page lifecycle: document-ready and user event dispatch
//!
//! A `Page` owns a rendered report document, the tracker list and the
//! controllers. `ready` runs the issue annotator exactly once; `click` and
//! `change` dispatch user events for the page's lifetime.
//!
//! Click dispatch follows browser bubbling: handlers are looked up on the
//! clicked element first, then on each ancestor. The first element with a
//! matching handler handles the click and propagation stops there.

use anyhow::Result;

use crate::annotate::{annotate_document, Annotation, AnnotatorSettings};
use crate::creq::RequestFilterController;
use crate::dom::{Document, DomQuery, NodeId, Selector};
use crate::toggle::{EventOutcome, ToggleController};
use crate::tracker::CompiledTrackers;

pub struct Page {
    document: Document,
    trackers: CompiledTrackers,
    settings: AnnotatorSettings,
    toggles: ToggleController,
    filters: RequestFilterController,
    checkbox: Selector,
    ready: bool,
}

impl Page {
    /// Wire a document with the report and request filter bindings
    pub fn new(
        document: Document,
        trackers: CompiledTrackers,
        settings: AnnotatorSettings,
    ) -> Result<Self> {
        let mut toggles = ToggleController::for_reports()?;
        toggles.extend(RequestFilterController::bindings()?);
        Ok(Self {
            document,
            trackers,
            settings,
            toggles,
            filters: RequestFilterController::new()?,
            checkbox: Selector::parse("input[type=checkbox]")?,
            ready: false,
        })
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Document-ready: annotate issue references once.
    /// Returns `None` if the page was already made ready.
    pub fn ready(&mut self) -> Option<Annotation> {
        if self.ready {
            return None;
        }
        self.ready = true;
        let annotation = annotate_document(&mut self.document, &self.trackers, &self.settings);
        tracing::debug!(
            containers = annotation.containers,
            rewritten = annotation.rewritten,
            ids = annotation.total_ids(),
            "page ready"
        );
        Some(annotation)
    }

    /// Dispatch a click on `node`
    pub fn click(&mut self, node: NodeId) -> EventOutcome {
        let mut current = Some(node);
        while let Some(el) = current {
            if self.document.element(el).is_some() {
                let mut outcome = self.toggles.click(&mut self.document, el);
                outcome.merge(self.filters.click(&mut self.document, el));
                if outcome.handled {
                    return outcome;
                }
            }
            current = self.document.parent(el);
        }

        // Unhandled click on a checkbox: its default action flips it, then `change` fires
        if self.document.matches(node, &self.checkbox) {
            let checked = !self.document.is_checked(node);
            self.document.set_checked(node, checked);
            let mut outcome = EventOutcome {
                checked: vec![node],
                ..EventOutcome::default()
            };
            outcome.merge(self.filters.change(&mut self.document, node));
            return outcome;
        }

        EventOutcome::default()
    }

    /// The user set a checkbox to `checked`; fires the change handlers
    pub fn change(&mut self, node: NodeId, checked: bool) -> EventOutcome {
        self.document.set_checked(node, checked);
        self.filters.change(&mut self.document, node)
    }

    /// Convenience: the `nth` element matching `selector`
    pub fn find(&self, selector: &Selector, nth: usize) -> Option<NodeId> {
        self.document.query_all(selector).get(nth).copied()
    }
}
