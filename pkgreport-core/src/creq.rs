//! Request filter controls (`creq` family)
//!
//! The submit-request form lists one checkbox per package plus "group"
//! checkboxes. Checking a group cascades to every package checkbox in the
//! same block whose value ends with the group's value.

use anyhow::Result;

use crate::dom::{selector::AttrOp, DomQuery, NodeId, Selector};
use crate::toggle::{parse_bindings, EventOutcome, Relation, ToggleBinding};

/// Shows or hides every request filter control at once
pub const CREQ_BINDINGS: &[(&str, Relation, &str)] = &[(
    "a.toggle_creq",
    Relation::Global,
    "textarea.creq, input.creq, input.group, a.creq#checkall, a.creq#uncheckall",
)];

/// Check-all / uncheck-all links and group checkbox cascading
#[derive(Debug, Clone)]
pub struct RequestFilterController {
    check_all: Selector,
    uncheck_all: Selector,
    all_checkboxes: Selector,
    group: Selector,
    members: Selector,
}

impl RequestFilterController {
    pub fn new() -> Result<Self> {
        Ok(Self {
            check_all: Selector::parse("a.creq#checkall")?,
            uncheck_all: Selector::parse("a.creq#uncheckall")?,
            all_checkboxes: Selector::parse(
                "input.creq[type=checkbox], input.group[type=checkbox]",
            )?,
            group: Selector::parse("input.group[type=checkbox]")?,
            members: Selector::parse("input.creq[type=checkbox]")?,
        })
    }

    /// Toggle bindings of this control family
    pub fn bindings() -> Result<Vec<ToggleBinding>> {
        parse_bindings(CREQ_BINDINGS)
    }

    pub fn is_group(&self, dom: &impl DomQuery, node: NodeId) -> bool {
        dom.matches(node, &self.group)
    }

    /// Handle a click on a check-all or uncheck-all link
    pub fn click<D: DomQuery>(&self, dom: &mut D, node: NodeId) -> EventOutcome {
        let state = if dom.matches(node, &self.check_all) {
            true
        } else if dom.matches(node, &self.uncheck_all) {
            false
        } else {
            return EventOutcome::default();
        };

        let boxes = dom.query_all(&self.all_checkboxes);
        for &checkbox in &boxes {
            dom.set_checked(checkbox, state);
        }
        tracing::debug!(checked = state, count = boxes.len(), "set all request checkboxes");
        EventOutcome {
            handled: true,
            default_prevented: true,
            toggled: Vec::new(),
            checked: boxes,
        }
    }

    /// Handle a change of a group checkbox: members in the grandparent block
    /// whose value ends with the group's value follow its checked state
    pub fn change<D: DomQuery>(&self, dom: &mut D, node: NodeId) -> EventOutcome {
        if !self.is_group(&*dom, node) {
            return EventOutcome::default();
        }
        let state = dom.is_checked(node);
        let suffix = dom.attribute(node, "value").unwrap_or_default();
        let Some(scope) = dom.parent(node).and_then(|p| dom.parent(p)) else {
            return EventOutcome {
                handled: true,
                ..EventOutcome::default()
            };
        };

        let members = self.members.clone().with_attr("value", AttrOp::Suffix, &suffix);
        let targets = dom.find_within(scope, &members);
        for &target in &targets {
            dom.set_checked(target, state);
        }
        tracing::debug!(group = %suffix, checked = state, count = targets.len(), "group checkbox");
        EventOutcome {
            handled: true,
            default_prevented: false,
            toggled: Vec::new(),
            checked: targets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::toggle::ToggleController;

    const FORM: &str = r##"<form>
<div class="block"><p><input class="group" type="checkbox" value=":devel"></p>
  <ul>
    <li><input class="creq" type="checkbox" value="foo:devel"></li>
    <li><input class="creq" type="checkbox" value="bar:devel" checked></li>
    <li><input class="creq" type="checkbox" value="baz:release"></li>
  </ul>
</div>
<div class="block"><input class="creq" type="checkbox" value="other:devel"></div>
<textarea class="creq" style="display:none"></textarea>
<a class="creq" id="checkall" href="#">all</a><a class="creq" id="uncheckall" href="#">none</a>
<a class="toggle_creq" href="#">filters</a>
</form>"##;

    fn sel(s: &str) -> Selector {
        Selector::parse(s).unwrap()
    }

    fn by_value(doc: &Document, value: &str) -> NodeId {
        doc.query_all(&sel(&format!("input[value='{}']", value)))[0]
    }

    #[test]
    fn test_group_checked_cascades_to_matching_members_in_scope() {
        let mut doc = Document::parse(FORM);
        let controller = RequestFilterController::new().unwrap();
        let group = by_value(&doc, ":devel");
        doc.set_checked(group, true);

        let outcome = controller.change(&mut doc, group);
        assert!(outcome.handled);
        assert!(!outcome.default_prevented);
        assert_eq!(outcome.checked.len(), 2);
        assert!(doc.is_checked(by_value(&doc, "foo:devel")));
        assert!(doc.is_checked(by_value(&doc, "bar:devel")));
        assert!(!doc.is_checked(by_value(&doc, "baz:release")));
        assert!(!doc.is_checked(by_value(&doc, "other:devel")), "outside the group's block");
    }

    #[test]
    fn test_group_unchecked_clears_matching_members() {
        let mut doc = Document::parse(FORM);
        let controller = RequestFilterController::new().unwrap();
        let group = by_value(&doc, ":devel");
        let other = by_value(&doc, "other:devel");
        doc.set_checked(other, true);
        doc.set_checked(group, false);

        controller.change(&mut doc, group);
        assert!(!doc.is_checked(by_value(&doc, "foo:devel")));
        assert!(!doc.is_checked(by_value(&doc, "bar:devel")));
        assert!(doc.is_checked(other));
    }

    #[test]
    fn test_change_on_non_group_is_ignored() {
        let mut doc = Document::parse(FORM);
        let controller = RequestFilterController::new().unwrap();
        let member = by_value(&doc, "foo:devel");
        assert_eq!(controller.change(&mut doc, member), EventOutcome::default());
    }

    #[test]
    fn test_check_all_and_uncheck_all() {
        let mut doc = Document::parse(FORM);
        let controller = RequestFilterController::new().unwrap();
        let check_all = doc.query_all(&sel("a#checkall"))[0];
        let uncheck_all = doc.query_all(&sel("a#uncheckall"))[0];
        let boxes = doc.query_all(&sel("input[type=checkbox]"));

        let outcome = controller.click(&mut doc, check_all);
        assert!(outcome.default_prevented);
        assert_eq!(outcome.checked.len(), boxes.len());
        assert!(boxes.iter().all(|&b| doc.is_checked(b)));

        controller.click(&mut doc, uncheck_all);
        assert!(boxes.iter().all(|&b| !doc.is_checked(b)));
    }

    #[test]
    fn test_toggle_creq_shows_and_hides_controls() {
        let mut doc = Document::parse(FORM);
        let toggles = ToggleController::new(RequestFilterController::bindings().unwrap());
        let trigger = doc.query_all(&sel("a.toggle_creq"))[0];
        let textarea = doc.query_all(&sel("textarea.creq"))[0];
        let group = by_value(&doc, ":devel");

        let outcome = toggles.click(&mut doc, trigger);
        assert!(outcome.default_prevented);
        // 1 textarea + 4 creq inputs + 1 group + 2 links
        assert_eq!(outcome.toggled.len(), 8);
        assert!(doc.is_visible(textarea));
        assert!(!doc.is_visible(group));
    }
}
