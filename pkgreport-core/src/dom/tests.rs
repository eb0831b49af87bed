//! Tests for the document model and query interface

#[cfg(test)]
mod dom_tests {
    use crate::dom::{Document, DomQuery, NodeId, Selector};

    fn sel(s: &str) -> Selector {
        Selector::parse(s).unwrap()
    }

    fn first(doc: &Document, s: &str) -> NodeId {
        doc.query_all(&sel(s))[0]
    }

    #[test]
    fn test_query_all_in_document_order() {
        let doc = Document::parse(
            r#"<div class="changelog" id="a"></div><p><div class="changelog" id="b"></div></p>"#,
        );
        let found = doc.query_all(&sel("div.changelog"));
        assert_eq!(found.len(), 2);
        assert_eq!(doc.attribute(found[0], "id").as_deref(), Some("a"));
        assert_eq!(doc.attribute(found[1], "id").as_deref(), Some("b"));
    }

    #[test]
    fn test_next_element_sibling_skips_text_and_comments() {
        let doc = Document::parse("<a class=pname>x</a>\n  <!-- c -->\n<div class=repos></div>");
        let a = first(&doc, "a.pname");
        let next = doc.next_element_sibling(a).unwrap();
        assert!(doc.matches(next, &sel("div.repos")));
    }

    #[test]
    fn test_next_matching_only_checks_immediate_sibling() {
        let doc = Document::parse("<a class=pname></a><span></span><div class=repos></div>");
        let a = first(&doc, "a.pname");
        assert_eq!(doc.next_matching(a, &sel("div.repos")), None);
        assert!(doc.next_matching(a, &sel("span")).is_some());
    }

    #[test]
    fn test_visibility_toggle_preserves_other_styles() {
        let mut doc = Document::parse(r#"<div class="c" style="color: red; display: none"></div>"#);
        let div = first(&doc, "div.c");
        assert!(!doc.is_visible(div));

        assert!(doc.toggle_visible(div));
        assert!(doc.is_visible(div));
        assert_eq!(doc.attribute(div, "style").as_deref(), Some("color: red"));

        assert!(!doc.toggle_visible(div));
        assert_eq!(
            doc.attribute(div, "style").as_deref(),
            Some("color: red; display: none")
        );
    }

    #[test]
    fn test_show_removes_empty_style_attribute() {
        let mut doc = Document::parse(r#"<div class="c" style="display:none"></div>"#);
        let div = first(&doc, "div.c");
        doc.set_visible(div, true);
        assert_eq!(doc.to_html(), r#"<div class="c"></div>"#);
    }

    #[test]
    fn test_important_display_none_is_hidden() {
        let mut doc = Document::parse(
            r#"<div class="c" style="display: none !important"></div><p style="display:NONE!important"></p>"#,
        );
        let div = first(&doc, "div.c");
        let p = first(&doc, "p");
        assert!(!doc.is_visible(div));
        assert!(!doc.is_visible(p));

        assert!(doc.toggle_visible(div));
        assert_eq!(doc.attribute(div, "style"), None);
        assert!(!doc.toggle_visible(div));
        assert_eq!(doc.attribute(div, "style").as_deref(), Some("display: none"));
    }

    #[test]
    fn test_checked_state() {
        let mut doc = Document::parse(r#"<input type="checkbox" value="a" checked>"#);
        let input = first(&doc, "input");
        assert!(doc.is_checked(input));
        doc.set_checked(input, false);
        assert!(!doc.is_checked(input));
        assert_eq!(doc.to_html(), r#"<input type="checkbox" value="a">"#);
        doc.set_checked(input, true);
        doc.set_checked(input, true);
        assert_eq!(doc.to_html(), r#"<input type="checkbox" value="a" checked>"#);
    }

    #[test]
    fn test_set_inner_html_detaches_old_children() {
        let mut doc = Document::parse(r#"<div id="issues"><span class="old"></span></div>"#);
        let issues = first(&doc, "div#issues");
        let old = first(&doc, "span.old");
        doc.set_inner_html(issues, "<b>new</b>");
        assert!(!doc.is_attached(old));
        assert!(doc.query_all(&sel("span.old")).is_empty());
        assert_eq!(doc.inner_html(issues), "<b>new</b>");
    }

    #[test]
    fn test_prepend_html_keeps_existing_content() {
        let mut doc = Document::parse(r#"<div id="issues"><i>tail</i></div>"#);
        let issues = first(&doc, "div#issues");
        DomQuery::prepend_html(&mut doc, issues, "<b>head</b> ");
        assert_eq!(doc.inner_html(issues), "<b>head</b> <i>tail</i>");
    }

    #[test]
    fn test_find_within_is_scoped() {
        let doc = Document::parse(
            "<div id=one><input class=creq></div><div id=two><input class=creq></div>",
        );
        let one = first(&doc, "div#one");
        assert_eq!(doc.find_within(one, &sel("input.creq")).len(), 1);
    }

    #[test]
    fn test_missing_nodes_are_noops() {
        let mut doc = Document::parse("<div></div>");
        let ghost = NodeId(999);
        assert_eq!(doc.parent(ghost), None);
        assert_eq!(doc.next_element_sibling(ghost), None);
        assert!(!doc.is_visible(ghost));
        doc.set_visible(ghost, false);
        doc.set_checked(ghost, true);
        doc.set_inner_html(ghost, "<b></b>");
        assert_eq!(doc.inner_html(ghost), "");
        assert_eq!(doc.to_html(), "<div></div>");
    }
}
