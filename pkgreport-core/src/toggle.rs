//! Show/hide wiring for report pages
//!
//! A toggle binding is a declarative (trigger, relation, target) rule: a
//! click on an element matching the trigger locates related containers via
//! a fixed structural relation and flips their visibility. One generic
//! dispatcher serves every binding.
//!
//! Global invariants enforced:
//! - The default action of a bound trigger is always suppressed
//! - A missing target is an empty selection, never an error
//! - Toggling is an involution: two clicks restore the original state

use anyhow::{Context, Result};

use crate::dom::{DomQuery, NodeId, Selector};

/// How a trigger finds its target containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// Every element in the document matching the target selector
    Global,
    /// The trigger's next element sibling, if it matches
    NextSibling,
    /// The next element sibling of the trigger's parent, if it matches
    ParentNextSibling,
}

impl Relation {
    /// Containers related to `trigger` that match `target`
    pub fn locate<D: DomQuery>(self, dom: &D, trigger: NodeId, target: &Selector) -> Vec<NodeId> {
        match self {
            Relation::Global => dom.query_all(target),
            Relation::NextSibling => dom.next_matching(trigger, target).into_iter().collect(),
            Relation::ParentNextSibling => dom
                .parent(trigger)
                .and_then(|parent| dom.next_matching(parent, target))
                .into_iter()
                .collect(),
        }
    }
}

/// Bindings of the package and repository report pages
pub const REPORT_BINDINGS: &[(&str, Relation, &str)] = &[
    ("a.toggle", Relation::Global, "div.changelog"),
    ("a.pkgname", Relation::ParentNextSibling, "div.changelog"),
    ("a.contents_toggle", Relation::ParentNextSibling, "div.contents"),
    ("a.pkg_contents_name", Relation::ParentNextSibling, "div.pkg_contents"),
    ("a.changelog_toggle", Relation::ParentNextSibling, "div.changelog"),
    ("a.pname", Relation::NextSibling, "div.repos"),
    ("a.expandcomparable", Relation::NextSibling, "div.comparable"),
    ("a.toggle_trace", Relation::Global, "ul.trace"),
    ("a.submitreq", Relation::ParentNextSibling, "div.submitdetails"),
    ("a.component", Relation::ParentNextSibling, "div.packages"),
    ("a.patterns", Relation::ParentNextSibling, "div.patterns"),
];

#[derive(Debug, Clone)]
pub struct ToggleBinding {
    pub trigger: Selector,
    pub relation: Relation,
    pub target: Selector,
}

impl ToggleBinding {
    pub fn parse(trigger: &str, relation: Relation, target: &str) -> Result<Self> {
        Ok(Self {
            trigger: Selector::parse(trigger)
                .with_context(|| format!("invalid trigger selector: {}", trigger))?,
            relation,
            target: Selector::parse(target)
                .with_context(|| format!("invalid target selector: {}", target))?,
        })
    }
}

/// Parse a declarative binding table
pub fn parse_bindings(table: &[(&str, Relation, &str)]) -> Result<Vec<ToggleBinding>> {
    table
        .iter()
        .map(|&(trigger, relation, target)| ToggleBinding::parse(trigger, relation, target))
        .collect()
}

/// What dispatching a user event did to the document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventOutcome {
    /// At least one handler ran
    pub handled: bool,
    /// The browser default action (navigation, checkbox flip) was suppressed
    pub default_prevented: bool,
    /// Containers whose visibility flipped, in handling order
    pub toggled: Vec<NodeId>,
    /// Checkboxes whose checked state was set, in handling order
    pub checked: Vec<NodeId>,
}

impl EventOutcome {
    pub fn merge(&mut self, other: EventOutcome) {
        self.handled |= other.handled;
        self.default_prevented |= other.default_prevented;
        self.toggled.extend(other.toggled);
        self.checked.extend(other.checked);
    }
}

/// Generic binder: dispatches clicks against a binding table
#[derive(Debug, Clone)]
pub struct ToggleController {
    bindings: Vec<ToggleBinding>,
}

impl ToggleController {
    pub fn new(bindings: Vec<ToggleBinding>) -> Self {
        Self { bindings }
    }

    /// Controller wired with `REPORT_BINDINGS`
    pub fn for_reports() -> Result<Self> {
        Ok(Self::new(parse_bindings(REPORT_BINDINGS)?))
    }

    pub fn bindings(&self) -> &[ToggleBinding] {
        &self.bindings
    }

    /// Add bindings after the existing ones
    pub fn extend(&mut self, bindings: impl IntoIterator<Item = ToggleBinding>) {
        self.bindings.extend(bindings);
    }

    /// Fire every binding whose trigger matches `node` itself
    pub fn click<D: DomQuery>(&self, dom: &mut D, node: NodeId) -> EventOutcome {
        let mut outcome = EventOutcome::default();
        for binding in &self.bindings {
            if !dom.matches(node, &binding.trigger) {
                continue;
            }
            outcome.handled = true;
            outcome.default_prevented = true;
            let targets = binding.relation.locate(dom, node, &binding.target);
            tracing::debug!(
                trigger = %binding.trigger,
                targets = targets.len(),
                "toggle"
            );
            for target in targets {
                dom.toggle_visible(target);
                outcome.toggled.push(target);
            }
        }
        outcome
    }
}
